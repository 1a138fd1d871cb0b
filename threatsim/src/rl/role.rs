// src/rl/role.rs
//
// Decision roles. A role binds an action set to its reward function, so an
// environment or controller generic over `R: Role` can only be stepped with
// that role's actions.

use super::action::{AnalyzerAction, BlockerAction, DefenderAction, DiscreteAction};
use super::reward::{score_analyzer, score_blocker, score_defender, RewardConfig, RewardOutcome};
use crate::event::ThreatEvent;

pub trait Role: Send + 'static {
    type Action: DiscreteAction;

    /// Role name used in errors, info keys and telemetry.
    const NAME: &'static str;

    fn score(action: Self::Action, event: &ThreatEvent, rewards: &RewardConfig) -> RewardOutcome;

    /// Inclusive (min, max) over every possible outcome for this role.
    fn reward_range(rewards: &RewardConfig) -> (f64, f64);
}

/// Decides whether to block traffic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Blocker;

/// Decides how an event is logged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Analyzer;

/// Single-agent defender with graded responses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Defender;

impl Role for Blocker {
    type Action = BlockerAction;
    const NAME: &'static str = "blocker";

    fn score(action: BlockerAction, event: &ThreatEvent, rewards: &RewardConfig) -> RewardOutcome {
        score_blocker(action, event, &rewards.blocker)
    }

    fn reward_range(rewards: &RewardConfig) -> (f64, f64) {
        rewards.blocker_range()
    }
}

impl Role for Analyzer {
    type Action = AnalyzerAction;
    const NAME: &'static str = "analyzer";

    fn score(action: AnalyzerAction, event: &ThreatEvent, rewards: &RewardConfig) -> RewardOutcome {
        score_analyzer(action, event, &rewards.analyzer)
    }

    fn reward_range(rewards: &RewardConfig) -> (f64, f64) {
        rewards.analyzer_range()
    }
}

impl Role for Defender {
    type Action = DefenderAction;
    const NAME: &'static str = "defender";

    fn score(action: DefenderAction, event: &ThreatEvent, rewards: &RewardConfig) -> RewardOutcome {
        score_defender(action, event, &rewards.defender)
    }

    fn reward_range(rewards: &RewardConfig) -> (f64, f64) {
        rewards.defender_range()
    }
}
