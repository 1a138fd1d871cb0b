// src/rl/reward.rs
//
// Reward model: scores one decision against the decided event's ground truth.
//
// Every scoring function is pure in (action, is_threat, severity). Nothing
// here sees episode history, so a step's reward cannot leak information
// from earlier steps.

use serde::{Deserialize, Serialize};

use super::action::{AnalyzerAction, BlockerAction, DefenderAction};
use crate::event::ThreatEvent;

/// Metric bucket a scored decision falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricBucket {
    /// Threat stopped.
    CorrectBlock,
    /// Benign traffic stopped.
    FalsePositive,
    /// Threat let through.
    MissedThreat,
    /// Benign traffic let through.
    BenignAllowed,
    /// Log label matches ground truth.
    CorrectLog,
    /// Log label contradicts ground truth.
    IncorrectLog,
}

/// Result of scoring one decision.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RewardOutcome {
    pub reward: f64,
    pub bucket: MetricBucket,
    /// Ground truth the decision was scored against.
    pub is_threat: bool,
}

/// Blocker reward table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockerRewards {
    pub correct_block: f64,
    pub false_positive: f64,
    pub missed_threat: f64,
    pub benign_allowed: f64,
}

impl Default for BlockerRewards {
    fn default() -> Self {
        Self {
            correct_block: 1.0,
            false_positive: -1.0,
            missed_threat: -0.5,
            benign_allowed: 0.1,
        }
    }
}

/// Analyzer reward table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerRewards {
    pub correct_log: f64,
    pub incorrect_log: f64,
}

impl Default for AnalyzerRewards {
    fn default() -> Self {
        Self {
            correct_log: 0.5,
            incorrect_log: -0.5,
        }
    }
}

/// Reward range for one (action, ground truth) pair, interpolated by severity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RewardBand {
    /// Reward when severity is 0.
    pub at_zero_severity: f64,
    /// Reward when severity is 1.
    pub at_full_severity: f64,
}

impl RewardBand {
    pub const fn new(at_zero_severity: f64, at_full_severity: f64) -> Self {
        Self {
            at_zero_severity,
            at_full_severity,
        }
    }

    /// Linear interpolation; severity is clamped so the result stays in band.
    pub fn at(&self, severity: f64) -> f64 {
        let s = severity.clamp(0.0, 1.0);
        self.at_zero_severity + (self.at_full_severity - self.at_zero_severity) * s
    }
}

/// Bands for one defender action: on threats and on benign events.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActionBands {
    pub on_threat: RewardBand,
    pub on_benign: RewardBand,
}

/// Graded reward bands for the five-action defender.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefenderRewards {
    pub block: ActionBands,
    pub quarantine: ActionBands,
    pub monitor: ActionBands,
    pub ignore: ActionBands,
    pub mitigate: ActionBands,
}

impl Default for DefenderRewards {
    fn default() -> Self {
        Self {
            block: ActionBands {
                on_threat: RewardBand::new(0.8, 1.0),
                on_benign: RewardBand::new(-0.6, -1.0),
            },
            quarantine: ActionBands {
                on_threat: RewardBand::new(0.7, 0.9),
                on_benign: RewardBand::new(-0.4, -0.8),
            },
            monitor: ActionBands {
                on_threat: RewardBand::new(-0.1, -0.4),
                on_benign: RewardBand::new(0.3, 0.0),
            },
            ignore: ActionBands {
                on_threat: RewardBand::new(-0.6, -1.0),
                on_benign: RewardBand::new(0.5, 0.3),
            },
            mitigate: ActionBands {
                on_threat: RewardBand::new(0.5, 0.8),
                on_benign: RewardBand::new(-0.2, -0.5),
            },
        }
    }
}

impl DefenderRewards {
    pub fn bands_for(&self, action: DefenderAction) -> &ActionBands {
        match action {
            DefenderAction::Block => &self.block,
            DefenderAction::Quarantine => &self.quarantine,
            DefenderAction::Monitor => &self.monitor,
            DefenderAction::Ignore => &self.ignore,
            DefenderAction::Mitigate => &self.mitigate,
        }
    }
}

/// All reward tables used by an environment instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardConfig {
    pub blocker: BlockerRewards,
    pub analyzer: AnalyzerRewards,
    pub defender: DefenderRewards,
}

fn span(values: impl IntoIterator<Item = f64>) -> (f64, f64) {
    values
        .into_iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        })
}

impl RewardConfig {
    /// Check every table entry is finite.
    pub fn is_finite(&self) -> bool {
        let b = &self.blocker;
        let a = &self.analyzer;
        let scalars = [
            b.correct_block,
            b.false_positive,
            b.missed_threat,
            b.benign_allowed,
            a.correct_log,
            a.incorrect_log,
        ];
        scalars.iter().all(|v| v.is_finite())
            && self.defender_endpoints().iter().all(|v| v.is_finite())
    }

    /// Raw band endpoints. Not folded through min/max, which would drop NaN.
    fn defender_endpoints(&self) -> Vec<f64> {
        let d = &self.defender;
        [&d.block, &d.quarantine, &d.monitor, &d.ignore, &d.mitigate]
            .iter()
            .flat_map(|bands| {
                [
                    bands.on_threat.at_zero_severity,
                    bands.on_threat.at_full_severity,
                    bands.on_benign.at_zero_severity,
                    bands.on_benign.at_full_severity,
                ]
            })
            .collect()
    }

    pub fn blocker_range(&self) -> (f64, f64) {
        let b = &self.blocker;
        span([
            b.correct_block,
            b.false_positive,
            b.missed_threat,
            b.benign_allowed,
        ])
    }

    pub fn analyzer_range(&self) -> (f64, f64) {
        span([self.analyzer.correct_log, self.analyzer.incorrect_log])
    }

    pub fn defender_range(&self) -> (f64, f64) {
        span(self.defender_endpoints())
    }
}

/// Score a blocking decision.
pub fn score_blocker(
    action: BlockerAction,
    event: &ThreatEvent,
    rewards: &BlockerRewards,
) -> RewardOutcome {
    let (reward, bucket) = match (action, event.is_threat) {
        (BlockerAction::Block, true) => (rewards.correct_block, MetricBucket::CorrectBlock),
        (BlockerAction::Block, false) => (rewards.false_positive, MetricBucket::FalsePositive),
        (BlockerAction::Allow, true) => (rewards.missed_threat, MetricBucket::MissedThreat),
        (BlockerAction::Allow, false) => (rewards.benign_allowed, MetricBucket::BenignAllowed),
    };
    RewardOutcome {
        reward,
        bucket,
        is_threat: event.is_threat,
    }
}

/// Score a log labelling decision.
pub fn score_analyzer(
    action: AnalyzerAction,
    event: &ThreatEvent,
    rewards: &AnalyzerRewards,
) -> RewardOutcome {
    let labelled_threat = action == AnalyzerAction::LogThreat;
    let (reward, bucket) = if labelled_threat == event.is_threat {
        (rewards.correct_log, MetricBucket::CorrectLog)
    } else {
        (rewards.incorrect_log, MetricBucket::IncorrectLog)
    };
    RewardOutcome {
        reward,
        bucket,
        is_threat: event.is_threat,
    }
}

/// Score a graded defender response.
pub fn score_defender(
    action: DefenderAction,
    event: &ThreatEvent,
    rewards: &DefenderRewards,
) -> RewardOutcome {
    let bands = rewards.bands_for(action);
    let (band, bucket) = match (action.is_containment(), event.is_threat) {
        (true, true) => (bands.on_threat, MetricBucket::CorrectBlock),
        (true, false) => (bands.on_benign, MetricBucket::FalsePositive),
        (false, true) => (bands.on_threat, MetricBucket::MissedThreat),
        (false, false) => (bands.on_benign, MetricBucket::BenignAllowed),
    };
    RewardOutcome {
        reward: band.at(event.severity),
        bucket,
        is_threat: event.is_threat,
    }
}
