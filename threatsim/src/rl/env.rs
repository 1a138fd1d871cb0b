// src/rl/env.rs
//
// Gym-style capability shared by the single-role environment and the
// multi-role coordinator, so rollout code (VecEnv, evaluate) is written once.

use serde::{Deserialize, Serialize};

use crate::error::EnvError;

/// Outcome of one step, generic over what the environment returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition<O, Rw, I> {
    /// Observation of the next event to decide on. On the terminal step
    /// this repeats the last observation.
    pub observation: O,
    pub reward: Rw,
    /// Whether the episode has terminated.
    pub done: bool,
    pub info: I,
}

pub trait Environment {
    type Action: Copy;
    type Observation: Clone;
    type Reward: Clone;
    type Info: Clone;

    /// Start a new episode and return its first observation.
    fn reset(&mut self, seed: Option<u64>) -> Self::Observation;

    fn step(
        &mut self,
        action: Self::Action,
    ) -> Result<Transition<Self::Observation, Self::Reward, Self::Info>, EnvError>;

    fn is_done(&self) -> bool;
}
