// src/rl/sim_env.rs
//
// Gym-style threat simulation environment.
//
// This module provides:
// - SimEnv<R>: single-role environment (reset, step) for any Role
// - VecEnv: independent environments for parallel rollouts
// - Deterministic execution given seeds
//
// Each step scores the event the policy just observed, then generates and
// encodes the next one. The observation never carries the label; the
// decided event's ground truth comes back in hindsight via
// `StepInfo::decision`.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use super::action::DiscreteAction;
use super::env::{Environment, Transition};
use super::episode::{EpisodeController, EpisodePhase, StepInfo};
use super::generator::{GeneratedEvent, ThreatGenerator};
use super::observation::Observation;
use super::role::Role;
use crate::config::EnvConfig;
use crate::error::EnvError;

/// Result of a single environment step.
pub type StepResult = Transition<Observation, f64, StepInfo>;

/// Event waiting for a decision, with the observation shown for it.
#[derive(Debug, Clone)]
pub(crate) struct PendingEvent {
    pub(crate) generated: GeneratedEvent,
    pub(crate) observation: Observation,
}

/// Resolve the seed for a reset: explicit, then pending, then a draw.
pub(crate) fn resolve_seed(
    explicit: Option<u64>,
    pending: &mut Option<u64>,
    seed_rng: &mut ChaCha8Rng,
) -> u64 {
    let pending = pending.take();
    explicit.or(pending).unwrap_or_else(|| seed_rng.gen())
}

/// Single-role simulation environment.
///
/// - reset(seed) -> observation
/// - step(action) -> (observation, reward, done, info)
///
/// All state transitions are deterministic given the seed.
pub struct SimEnv<R: Role> {
    config: EnvConfig,
    generator: ThreatGenerator,
    controller: EpisodeController<R>,
    /// Draws episode seeds when reset is called without one.
    seed_rng: ChaCha8Rng,
    /// Seed set via `seed()` for the next reset.
    pending_seed: Option<u64>,
    current: Option<PendingEvent>,
}

impl<R: Role> SimEnv<R> {
    /// Create a new environment. The config is validated here.
    pub fn new(config: EnvConfig) -> Result<Self, EnvError> {
        config.validate()?;
        let generator = ThreatGenerator::new(&config, config.base_seed)?;
        let controller = EpisodeController::new(config.max_steps, config.rewards.clone());
        Ok(Self {
            seed_rng: ChaCha8Rng::seed_from_u64(config.base_seed),
            config,
            generator,
            controller,
            pending_seed: None,
            current: None,
        })
    }

    /// Reset the environment for a new episode.
    pub fn reset(&mut self, seed: Option<u64>) -> Observation {
        let seed = resolve_seed(seed, &mut self.pending_seed, &mut self.seed_rng);
        self.generator.reseed(seed);
        self.controller.begin(seed);

        let generated = self.generator.next(0);
        let observation = self.generator.observe(&generated.event, 0);
        debug!(
            role = R::NAME,
            seed,
            replay = self.generator.is_replaying(),
            "episode reset"
        );
        self.current = Some(PendingEvent {
            generated,
            observation: observation.clone(),
        });
        observation
    }

    /// Take a step with the given action.
    ///
    /// Fails without touching state if no episode is running.
    pub fn step(&mut self, action: R::Action) -> Result<StepResult, EnvError> {
        self.controller.ensure_running()?;
        let pending = self.current.as_ref().ok_or(EnvError::NotReset)?;

        let outcome = self.controller.record(
            action,
            &pending.generated.event,
            pending.generated.origin,
        )?;

        let observation = if outcome.done {
            pending.observation.clone()
        } else {
            let step_index = self.controller.step();
            let generated = self.generator.next(step_index);
            let observation = self.generator.observe(&generated.event, step_index);
            self.current = Some(PendingEvent {
                generated,
                observation: observation.clone(),
            });
            observation
        };

        Ok(Transition {
            observation,
            reward: outcome.reward,
            done: outcome.done,
            info: outcome.info,
        })
    }

    /// Step with a raw categorical index, rejecting out-of-set values.
    pub fn step_index(&mut self, raw: i64) -> Result<StepResult, EnvError> {
        let action = R::Action::from_index(raw)?;
        self.step(action)
    }

    /// Fix the seed used by the next `reset(None)`.
    pub fn seed(&mut self, value: u64) {
        self.pending_seed = Some(value);
    }

    /// Seed of the running (or last) episode.
    pub fn episode_seed(&self) -> Option<u64> {
        self.controller.seed()
    }

    pub fn config(&self) -> &EnvConfig {
        &self.config
    }

    pub fn phase(&self) -> EpisodePhase {
        self.controller.phase()
    }

    pub fn steps(&self) -> u64 {
        self.controller.step()
    }

    pub fn is_done(&self) -> bool {
        self.controller.is_done()
    }

    pub fn reward_range(&self) -> (f64, f64) {
        self.controller.reward_range()
    }

    pub fn num_actions(&self) -> usize {
        R::Action::cardinality()
    }
}

impl<R: Role> Environment for SimEnv<R> {
    type Action = R::Action;
    type Observation = Observation;
    type Reward = f64;
    type Info = StepInfo;

    fn reset(&mut self, seed: Option<u64>) -> Observation {
        SimEnv::reset(self, seed)
    }

    fn step(&mut self, action: R::Action) -> Result<StepResult, EnvError> {
        SimEnv::step(self, action)
    }

    fn is_done(&self) -> bool {
        SimEnv::is_done(self)
    }
}

/// Vectorised environment: N independent instances stepped in lockstep.
pub struct VecEnv<E: Environment> {
    envs: Vec<E>,
}

impl<E: Environment> VecEnv<E> {
    /// Build `n` environments with `make(rank)`.
    pub fn from_fn<F>(n: usize, make: F) -> Result<Self, EnvError>
    where
        F: FnMut(usize) -> Result<E, EnvError>,
    {
        let envs = (0..n).map(make).collect::<Result<Vec<_>, _>>()?;
        Ok(Self { envs })
    }

    pub fn num_envs(&self) -> usize {
        self.envs.len()
    }

    /// Reset every environment; environment `rank` gets seed `base + rank`.
    pub fn reset_all(&mut self, base_seed: Option<u64>) -> Vec<E::Observation> {
        self.envs
            .iter_mut()
            .enumerate()
            .map(|(rank, env)| env.reset(base_seed.map(|base| base.wrapping_add(rank as u64))))
            .collect()
    }

    /// Step every environment with its action.
    ///
    /// Actions must have the same length as envs.
    pub fn step(
        &mut self,
        actions: &[E::Action],
    ) -> Vec<Result<Transition<E::Observation, E::Reward, E::Info>, EnvError>> {
        assert_eq!(
            actions.len(),
            self.envs.len(),
            "Actions length must match number of environments"
        );

        self.envs
            .iter_mut()
            .zip(actions.iter())
            .map(|(env, action)| env.step(*action))
            .collect()
    }

    /// Check which environments are done.
    pub fn dones(&self) -> Vec<bool> {
        self.envs.iter().map(|e| e.is_done()).collect()
    }

    pub fn envs(&self) -> &[E] {
        &self.envs
    }
}

impl<R: Role> VecEnv<SimEnv<R>> {
    /// `n` copies of a single-role environment sharing one config.
    pub fn new(n: usize, config: EnvConfig) -> Result<Self, EnvError> {
        Self::from_fn(n, |rank| {
            SimEnv::new(
                config
                    .clone()
                    .with_base_seed(config.base_seed.wrapping_add(rank as u64)),
            )
        })
    }

    /// Seeds of the current episodes.
    pub fn seeds(&self) -> Vec<Option<u64>> {
        self.envs.iter().map(|e| e.episode_seed()).collect()
    }
}
