// src/rl/mod.rs
//
// Gym-style threat simulation.
//
// Key components:
// - Observation: versioned feature vector encoded from a ThreatEvent
// - ThreatGenerator: synthetic or replayed event stream
// - Actions / Roles: closed per-role action sets bound to reward tables
// - EpisodeController: per-role lifecycle, step accounting and metrics
// - SimEnv: single-role environment (reset, step), VecEnv for batches
// - MultiAgentEnv: blocker + analyzer over one shared event stream
// - Policy / evaluate: scripted baselines and the evaluation harness
// - StepTelemetry: per-step JSONL records

pub mod action;
pub mod env;
pub mod episode;
pub mod evaluate;
pub mod generator;
pub mod multi_agent;
pub mod observation;
pub mod policy;
pub mod reward;
pub mod role;
pub mod sim_env;
pub mod telemetry;

// Re-exports for convenience
pub use action::{AnalyzerAction, BlockerAction, DefenderAction, DiscreteAction};
pub use env::{Environment, Transition};
pub use episode::{
    EpisodeController, EpisodeMetrics, EpisodePhase, RoleStep, ScoredDecision, StepInfo,
    TERMINATION_MAX_STEPS,
};
pub use evaluate::{
    evaluate, evaluate_with_telemetry, EpisodeRecord, EvaluationSummary, RoleScores, RoleSummary,
};
pub use generator::{EventOrigin, FeedOrder, GeneratedEvent, ThreatGenerator};
pub use multi_agent::{JointAction, MultiAgentEnv, MultiStepResult, RolePair};
pub use observation::{
    encode, encode_labelled_records, encode_records, Observation, OBS_DIM, OBS_VERSION,
};
pub use policy::{
    AlwaysBlock, NeverBlock, PacketSizeThreshold, PairedPolicy, Policy, RandomPolicy,
    ScriptedActions,
};
pub use reward::{
    AnalyzerRewards, BlockerRewards, DefenderRewards, MetricBucket, RewardBand, RewardConfig,
    RewardOutcome,
};
pub use role::{Analyzer, Blocker, Defender, Role};
pub use sim_env::{SimEnv, StepResult, VecEnv};
pub use telemetry::{StepRecord, StepTelemetry};
