//! Threat simulation core library.
//!
//! This crate exposes a Gym-style environment that streams synthetic or
//! replayed security events to decision-making policies and scores their
//! decisions against ground truth. The binary (`src/main.rs`) is a thin
//! evaluation / conversion harness around these components.
//!
//! # Layout
//!
//! - **Intel** (`intel`): threat record interchange format and replayable
//!   feeds loaded from collector output.
//! - **Events** (`event`): threat taxonomy and severity inference. Ground
//!   truth is a pure function of an event's kind and summary.
//! - **Environments** (`rl`): feature encoding, generation, reward tables,
//!   episode control, single- and multi-role environments, baselines and
//!   evaluation.
//! - **Config** (`config`): `EnvConfig` presets, env-var overrides and
//!   YAML loading.

pub mod config;
pub mod error;
pub mod event;
pub mod intel;
pub mod rl;

// --- Re-exports for ergonomic external use ---------------------------------

pub use config::EnvConfig;
pub use error::{ConfigError, EnvError, FeedError};
pub use event::{infer_severity, SeverityLevel, ThreatEvent, ThreatKind, ThreatSource};
pub use intel::{IntelFeed, ThreatRecord};
pub use rl::{
    Analyzer, Blocker, Defender, MultiAgentEnv, Observation, SimEnv, StepInfo, StepResult, VecEnv,
};
