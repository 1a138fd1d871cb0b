// src/rl/episode.rs
//
// Episode controller: lifecycle, step accounting and metrics for one role.
//
// Phases run Ready -> Running -> Terminal. `begin` is the only way into
// Running; `record` is the only mutator while Running. Both the single-role
// environment and the multi-role coordinator drive one controller per role.

use std::marker::PhantomData;

use serde::{Deserialize, Serialize};

use super::action::DiscreteAction;
use super::generator::EventOrigin;
use super::reward::{MetricBucket, RewardConfig};
use super::role::Role;
use crate::error::EnvError;
use crate::event::ThreatEvent;

/// Termination reason reported when the step budget is used up.
pub const TERMINATION_MAX_STEPS: &str = "MaxSteps";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EpisodePhase {
    /// Constructed, never reset.
    Ready,
    Running,
    /// Step budget exhausted; only reset is valid.
    Terminal,
}

/// Decision-quality counters for one episode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeMetrics {
    pub correct_blocks: u64,
    pub false_positives: u64,
    pub missed_threats: u64,
    pub correct_logs: u64,
    pub benign_allowed: u64,
    pub incorrect_logs: u64,
}

impl EpisodeMetrics {
    pub fn record(&mut self, bucket: MetricBucket) {
        match bucket {
            MetricBucket::CorrectBlock => self.correct_blocks += 1,
            MetricBucket::FalsePositive => self.false_positives += 1,
            MetricBucket::MissedThreat => self.missed_threats += 1,
            MetricBucket::BenignAllowed => self.benign_allowed += 1,
            MetricBucket::CorrectLog => self.correct_logs += 1,
            MetricBucket::IncorrectLog => self.incorrect_logs += 1,
        }
    }

    /// Number of scored decisions.
    pub fn total(&self) -> u64 {
        self.correct_blocks
            + self.false_positives
            + self.missed_threats
            + self.benign_allowed
            + self.correct_logs
            + self.incorrect_logs
    }

    /// Decisions that matched ground truth.
    pub fn correct(&self) -> u64 {
        self.correct_blocks + self.benign_allowed + self.correct_logs
    }

    pub fn accuracy(&self) -> f64 {
        match self.total() {
            0 => 0.0,
            n => self.correct() as f64 / n as f64,
        }
    }
}

/// Hindsight label of the event a decision was made on.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoredDecision {
    /// 1-based step the decision was scored at.
    pub step: u64,
    /// Raw index of the action taken.
    pub action: usize,
    pub bucket: MetricBucket,
    pub is_threat: bool,
    pub severity: f64,
}

/// Additional information returned from a step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepInfo {
    /// Metric counts after this step, flattened into the top level.
    #[serde(flatten)]
    pub metrics: EpisodeMetrics,
    /// Steps taken in the episode so far.
    pub step: u64,
    pub cumulative_reward: f64,
    /// Termination reason if done.
    pub termination_reason: Option<String>,
    /// How the decided event was produced.
    pub event_origin: Option<EventOrigin>,
    pub decision: Option<ScoredDecision>,
}

/// What one `record` call produced.
#[derive(Debug, Clone, PartialEq)]
pub struct RoleStep {
    pub reward: f64,
    pub done: bool,
    pub info: StepInfo,
}

/// Per-role episode state machine.
#[derive(Debug, Clone)]
pub struct EpisodeController<R: Role> {
    max_steps: u64,
    rewards: RewardConfig,
    phase: EpisodePhase,
    step: u64,
    cumulative_reward: f64,
    metrics: EpisodeMetrics,
    seed: Option<u64>,
    _role: PhantomData<fn() -> R>,
}

impl<R: Role> EpisodeController<R> {
    pub fn new(max_steps: u64, rewards: RewardConfig) -> Self {
        Self {
            max_steps,
            rewards,
            phase: EpisodePhase::Ready,
            step: 0,
            cumulative_reward: 0.0,
            metrics: EpisodeMetrics::default(),
            seed: None,
            _role: PhantomData,
        }
    }

    /// Start a fresh episode. Valid from any phase.
    pub fn begin(&mut self, seed: u64) {
        self.phase = EpisodePhase::Running;
        self.step = 0;
        self.cumulative_reward = 0.0;
        self.metrics = EpisodeMetrics::default();
        self.seed = Some(seed);
    }

    pub fn ensure_running(&self) -> Result<(), EnvError> {
        match self.phase {
            EpisodePhase::Running => Ok(()),
            EpisodePhase::Ready => Err(EnvError::NotReset),
            EpisodePhase::Terminal => Err(EnvError::EpisodeDone { steps: self.step }),
        }
    }

    /// Score `action` against `event` and advance one step.
    ///
    /// On error nothing is mutated.
    pub fn record(
        &mut self,
        action: R::Action,
        event: &ThreatEvent,
        origin: EventOrigin,
    ) -> Result<RoleStep, EnvError> {
        self.ensure_running()?;

        let outcome = R::score(action, event, &self.rewards);
        self.metrics.record(outcome.bucket);
        self.cumulative_reward += outcome.reward;
        self.step += 1;

        let done = self.step >= self.max_steps;
        if done {
            self.phase = EpisodePhase::Terminal;
        }

        let info = StepInfo {
            metrics: self.metrics,
            step: self.step,
            cumulative_reward: self.cumulative_reward,
            termination_reason: done.then(|| TERMINATION_MAX_STEPS.to_string()),
            event_origin: Some(origin),
            decision: Some(ScoredDecision {
                step: self.step,
                action: action.index(),
                bucket: outcome.bucket,
                is_threat: outcome.is_threat,
                severity: event.severity,
            }),
        };

        Ok(RoleStep {
            reward: outcome.reward,
            done,
            info,
        })
    }

    pub fn phase(&self) -> EpisodePhase {
        self.phase
    }

    pub fn step(&self) -> u64 {
        self.step
    }

    pub fn max_steps(&self) -> u64 {
        self.max_steps
    }

    pub fn is_done(&self) -> bool {
        self.phase == EpisodePhase::Terminal
    }

    pub fn cumulative_reward(&self) -> f64 {
        self.cumulative_reward
    }

    pub fn metrics(&self) -> &EpisodeMetrics {
        &self.metrics
    }

    /// Seed of the current episode, if one has started.
    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    pub fn reward_range(&self) -> (f64, f64) {
        R::reward_range(&self.rewards)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{ThreatKind, ThreatSource};
    use crate::rl::action::{AnalyzerAction, BlockerAction};
    use crate::rl::role::{Analyzer, Blocker};

    fn threat() -> ThreatEvent {
        ThreatEvent::new(ThreatSource::DarkWeb, ThreatKind::Malware, "")
    }

    #[test]
    fn test_record_before_begin_is_not_reset() {
        let mut ctl = EpisodeController::<Blocker>::new(3, RewardConfig::default());
        assert_eq!(ctl.phase(), EpisodePhase::Ready);
        let err = ctl
            .record(BlockerAction::Block, &threat(), EventOrigin::Synthetic)
            .unwrap_err();
        assert_eq!(err, EnvError::NotReset);
        assert_eq!(ctl.step(), 0);
    }

    #[test]
    fn test_terminal_after_max_steps() {
        let mut ctl = EpisodeController::<Blocker>::new(3, RewardConfig::default());
        ctl.begin(42);
        for i in 1..=3 {
            let out = ctl
                .record(BlockerAction::Block, &threat(), EventOrigin::Synthetic)
                .unwrap();
            assert_eq!(out.done, i == 3);
            assert_eq!(out.info.step, i);
        }
        assert!(ctl.is_done());

        let err = ctl
            .record(BlockerAction::Block, &threat(), EventOrigin::Synthetic)
            .unwrap_err();
        assert_eq!(err, EnvError::EpisodeDone { steps: 3 });
        assert_eq!(ctl.metrics().correct_blocks, 3);
        assert_eq!(ctl.cumulative_reward(), 3.0);
    }

    #[test]
    fn test_terminal_info_reports_reason() {
        let mut ctl = EpisodeController::<Analyzer>::new(1, RewardConfig::default());
        ctl.begin(0);
        let out = ctl
            .record(AnalyzerAction::LogThreat, &threat(), EventOrigin::Replay { index: 4 })
            .unwrap();
        assert!(out.done);
        assert_eq!(out.info.termination_reason.as_deref(), Some(TERMINATION_MAX_STEPS));
        assert_eq!(out.info.event_origin, Some(EventOrigin::Replay { index: 4 }));

        let decision = out.info.decision.unwrap();
        assert_eq!(decision.bucket, MetricBucket::CorrectLog);
        assert!(decision.is_threat);
        assert_eq!(decision.action, 1);
    }

    #[test]
    fn test_begin_zeroes_state() {
        let mut ctl = EpisodeController::<Blocker>::new(2, RewardConfig::default());
        ctl.begin(1);
        ctl.record(BlockerAction::Allow, &threat(), EventOrigin::Synthetic)
            .unwrap();
        assert_eq!(ctl.metrics().missed_threats, 1);

        ctl.begin(2);
        assert_eq!(ctl.phase(), EpisodePhase::Running);
        assert_eq!(ctl.step(), 0);
        assert_eq!(ctl.cumulative_reward(), 0.0);
        assert_eq!(*ctl.metrics(), EpisodeMetrics::default());
        assert_eq!(ctl.seed(), Some(2));
    }

    #[test]
    fn test_metrics_accuracy() {
        let mut m = EpisodeMetrics::default();
        assert_eq!(m.accuracy(), 0.0);
        m.record(MetricBucket::CorrectBlock);
        m.record(MetricBucket::BenignAllowed);
        m.record(MetricBucket::FalsePositive);
        m.record(MetricBucket::MissedThreat);
        assert_eq!(m.total(), 4);
        assert_eq!(m.accuracy(), 0.5);
    }

    #[test]
    fn test_info_serializes_flat_metric_keys() {
        let info = StepInfo {
            metrics: EpisodeMetrics {
                correct_blocks: 2,
                ..Default::default()
            },
            ..Default::default()
        };
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["correct_blocks"], 2);
        assert_eq!(json["missed_threats"], 0);
        assert!(json.get("metrics").is_none());
    }
}
