// src/rl/action.rs
//
// Closed, named action sets per role.
//
// Policies usually emit a raw categorical index; `TryFrom<i64>` is the only
// way in from that representation and rejects anything outside the set
// instead of coercing it to a default action.

use std::convert::TryFrom;

use serde::{Deserialize, Serialize};

use crate::error::EnvError;

/// Common surface of every role's action enum.
pub trait DiscreteAction: Copy + std::fmt::Debug + PartialEq + Serialize + Send + 'static {
    /// All members in index order.
    const ALL: &'static [Self];
    /// Role name reported in errors.
    const ROLE: &'static str;

    fn index(self) -> usize;

    /// Decode a raw index, rejecting out-of-set values.
    fn from_index(raw: i64) -> Result<Self, EnvError> {
        usize::try_from(raw)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
            .ok_or(EnvError::InvalidAction {
                role: Self::ROLE,
                value: raw,
                cardinality: Self::ALL.len(),
            })
    }

    fn cardinality() -> usize {
        Self::ALL.len()
    }
}

/// Blocker role: let traffic through or drop it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockerAction {
    Allow = 0,
    Block = 1,
}

/// Analyzer role: how the event is recorded in the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalyzerAction {
    LogBenign = 0,
    LogThreat = 1,
}

/// Single-role defender with a graded response set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefenderAction {
    Block = 0,
    Quarantine = 1,
    Monitor = 2,
    Ignore = 3,
    Mitigate = 4,
}

impl DefenderAction {
    /// Whether the response stops or contains the traffic.
    pub fn is_containment(self) -> bool {
        matches!(
            self,
            DefenderAction::Block | DefenderAction::Quarantine | DefenderAction::Mitigate
        )
    }
}

impl DiscreteAction for BlockerAction {
    const ALL: &'static [Self] = &[BlockerAction::Allow, BlockerAction::Block];
    const ROLE: &'static str = "blocker";

    fn index(self) -> usize {
        self as usize
    }
}

impl DiscreteAction for AnalyzerAction {
    const ALL: &'static [Self] = &[AnalyzerAction::LogBenign, AnalyzerAction::LogThreat];
    const ROLE: &'static str = "analyzer";

    fn index(self) -> usize {
        self as usize
    }
}

impl DiscreteAction for DefenderAction {
    const ALL: &'static [Self] = &[
        DefenderAction::Block,
        DefenderAction::Quarantine,
        DefenderAction::Monitor,
        DefenderAction::Ignore,
        DefenderAction::Mitigate,
    ];
    const ROLE: &'static str = "defender";

    fn index(self) -> usize {
        self as usize
    }
}

macro_rules! impl_try_from_index {
    ($($ty:ty),*) => {
        $(
            impl TryFrom<i64> for $ty {
                type Error = EnvError;

                fn try_from(raw: i64) -> Result<Self, Self::Error> {
                    <$ty as DiscreteAction>::from_index(raw)
                }
            }
        )*
    };
}

impl_try_from_index!(BlockerAction, AnalyzerAction, DefenderAction);
