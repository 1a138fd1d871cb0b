// src/rl/multi_agent.rs
//
// Multi-role coordinator: one event stream, two dependent decision roles.
//
// The blocker decides whether to block, the analyzer how to log. Both see
// the same observation each step, are scored against the same ground truth
// and share termination. Neither role's action influences the other's
// reward.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::action::{AnalyzerAction, BlockerAction, DiscreteAction};
use super::env::{Environment, Transition};
use super::episode::{EpisodeController, EpisodePhase, StepInfo};
use super::generator::ThreatGenerator;
use super::observation::Observation;
use super::role::{Analyzer, Blocker, Role};
use super::sim_env::{resolve_seed, PendingEvent};
use crate::config::EnvConfig;
use crate::error::EnvError;

/// One value per role, serialized as `{"blocker": .., "analyzer": ..}`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RolePair<B, A = B> {
    pub blocker: B,
    pub analyzer: A,
}

impl<B, A> RolePair<B, A> {
    pub fn new(blocker: B, analyzer: A) -> Self {
        Self { blocker, analyzer }
    }
}

impl<T> RolePair<T> {
    pub fn map<U>(self, mut f: impl FnMut(T) -> U) -> RolePair<U> {
        RolePair {
            blocker: f(self.blocker),
            analyzer: f(self.analyzer),
        }
    }

    pub fn both(value: T) -> Self
    where
        T: Clone,
    {
        Self {
            blocker: value.clone(),
            analyzer: value,
        }
    }
}

/// Actions for both roles in one step.
pub type JointAction = RolePair<BlockerAction, AnalyzerAction>;

/// Result of a joint step.
pub type MultiStepResult = Transition<RolePair<Observation>, RolePair<f64>, RolePair<StepInfo>>;

/// Two-role environment over a shared event stream.
pub struct MultiAgentEnv {
    config: EnvConfig,
    generator: ThreatGenerator,
    blocker: EpisodeController<Blocker>,
    analyzer: EpisodeController<Analyzer>,
    seed_rng: ChaCha8Rng,
    pending_seed: Option<u64>,
    current: Option<PendingEvent>,
}

impl MultiAgentEnv {
    pub fn new(config: EnvConfig) -> Result<Self, EnvError> {
        config.validate()?;
        let generator = ThreatGenerator::new(&config, config.base_seed)?;
        Ok(Self {
            blocker: EpisodeController::new(config.max_steps, config.rewards.clone()),
            analyzer: EpisodeController::new(config.max_steps, config.rewards.clone()),
            seed_rng: ChaCha8Rng::seed_from_u64(config.base_seed),
            config,
            generator,
            pending_seed: None,
            current: None,
        })
    }

    /// Reset both roles onto a fresh shared episode.
    pub fn reset(&mut self, seed: Option<u64>) -> RolePair<Observation> {
        let seed = resolve_seed(seed, &mut self.pending_seed, &mut self.seed_rng);
        self.generator.reseed(seed);
        self.blocker.begin(seed);
        self.analyzer.begin(seed);

        let generated = self.generator.next(0);
        let observation = self.generator.observe(&generated.event, 0);
        debug!(seed, replay = self.generator.is_replaying(), "multi-role episode reset");
        self.current = Some(PendingEvent {
            generated,
            observation: observation.clone(),
        });
        RolePair::both(observation)
    }

    /// Apply both roles' decisions to the pending event.
    ///
    /// Both controllers are checked before either is mutated.
    pub fn step(&mut self, actions: JointAction) -> Result<MultiStepResult, EnvError> {
        self.blocker.ensure_running()?;
        self.analyzer.ensure_running()?;
        let pending = self.current.as_ref().ok_or(EnvError::NotReset)?;
        let event = &pending.generated.event;
        let origin = pending.generated.origin;

        let blocker = self.blocker.record(actions.blocker, event, origin)?;
        let analyzer = self.analyzer.record(actions.analyzer, event, origin)?;
        debug_assert_eq!(blocker.done, analyzer.done);
        let done = blocker.done || analyzer.done;

        let observation = if done {
            pending.observation.clone()
        } else {
            let step_index = self.blocker.step();
            let generated = self.generator.next(step_index);
            let observation = self.generator.observe(&generated.event, step_index);
            self.current = Some(PendingEvent {
                generated,
                observation: observation.clone(),
            });
            observation
        };

        Ok(Transition {
            observation: RolePair::both(observation),
            reward: RolePair::new(blocker.reward, analyzer.reward),
            done,
            info: RolePair::new(blocker.info, analyzer.info),
        })
    }

    /// Step with raw indices. Both are validated before anything changes.
    pub fn step_indices(
        &mut self,
        blocker: i64,
        analyzer: i64,
    ) -> Result<MultiStepResult, EnvError> {
        let actions = RolePair::new(
            BlockerAction::from_index(blocker)?,
            AnalyzerAction::from_index(analyzer)?,
        );
        self.step(actions)
    }

    /// Fix the seed used by the next `reset(None)`.
    pub fn seed(&mut self, value: u64) {
        self.pending_seed = Some(value);
    }

    pub fn episode_seed(&self) -> Option<u64> {
        self.blocker.seed()
    }

    pub fn config(&self) -> &EnvConfig {
        &self.config
    }

    pub fn phase(&self) -> EpisodePhase {
        self.blocker.phase()
    }

    pub fn steps(&self) -> u64 {
        self.blocker.step()
    }

    pub fn is_done(&self) -> bool {
        self.blocker.is_done()
    }

    pub fn reward_ranges(&self) -> RolePair<(f64, f64)> {
        RolePair::new(self.blocker.reward_range(), self.analyzer.reward_range())
    }

    /// Action-set sizes per role.
    pub fn num_actions(&self) -> RolePair<usize> {
        RolePair::new(
            <Blocker as Role>::Action::cardinality(),
            <Analyzer as Role>::Action::cardinality(),
        )
    }
}

impl Environment for MultiAgentEnv {
    type Action = JointAction;
    type Observation = RolePair<Observation>;
    type Reward = RolePair<f64>;
    type Info = RolePair<StepInfo>;

    fn reset(&mut self, seed: Option<u64>) -> RolePair<Observation> {
        MultiAgentEnv::reset(self, seed)
    }

    fn step(&mut self, action: JointAction) -> Result<MultiStepResult, EnvError> {
        MultiAgentEnv::step(self, action)
    }

    fn is_done(&self) -> bool {
        MultiAgentEnv::is_done(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rl::reward::MetricBucket;

    #[test]
    fn test_both_roles_see_same_observation() {
        let mut env = MultiAgentEnv::new(EnvConfig::default()).unwrap();
        let obs = env.reset(Some(42));
        assert_eq!(obs.blocker, obs.analyzer);

        let r = env
            .step(RolePair::new(BlockerAction::Block, AnalyzerAction::LogThreat))
            .unwrap();
        assert_eq!(r.observation.blocker, r.observation.analyzer);
        assert_eq!(r.info.blocker.step, 1);
        assert_eq!(r.info.analyzer.step, 1);
    }

    #[test]
    fn test_roles_scored_against_same_truth() {
        let mut env = MultiAgentEnv::new(EnvConfig::default()).unwrap();
        env.reset(Some(9));
        for _ in 0..50 {
            let r = env
                .step(RolePair::new(BlockerAction::Block, AnalyzerAction::LogThreat))
                .unwrap();
            let b = r.info.blocker.decision.unwrap();
            let a = r.info.analyzer.decision.unwrap();
            assert_eq!(b.is_threat, a.is_threat);
            // Block+LogThreat agree, so both are right or both are wrong.
            assert_eq!(
                b.bucket == MetricBucket::CorrectBlock,
                a.bucket == MetricBucket::CorrectLog
            );
        }
    }

    #[test]
    fn test_invalid_analyzer_index_mutates_neither_role() {
        let mut env = MultiAgentEnv::new(EnvConfig::default()).unwrap();
        env.reset(Some(1));
        let err = env.step_indices(1, 3).unwrap_err();
        assert!(matches!(err, EnvError::InvalidAction { role: "analyzer", .. }));
        assert_eq!(env.steps(), 0);

        // The next valid step is the first one for both roles.
        let t = env.step_indices(1, 1).unwrap();
        assert_eq!(t.info.blocker.step, 1);
        assert_eq!(t.info.blocker.metrics.total(), 1);
        assert_eq!(t.info.analyzer.metrics.total(), 1);
    }

    #[test]
    fn test_shared_termination() {
        let mut env = MultiAgentEnv::new(EnvConfig::default().with_max_steps(3)).unwrap();
        assert_eq!(
            env.step(RolePair::new(BlockerAction::Allow, AnalyzerAction::LogBenign)),
            Err(EnvError::NotReset)
        );
        env.reset(Some(4));
        let mut last = None;
        for _ in 0..3 {
            last = Some(env.step_indices(0, 0).unwrap());
        }
        let last = last.unwrap();
        assert!(last.done);
        assert_eq!(last.info.blocker.termination_reason, last.info.analyzer.termination_reason);
        assert_eq!(
            env.step_indices(0, 0),
            Err(EnvError::EpisodeDone { steps: 3 })
        );
    }

    #[test]
    fn test_info_serializes_keyed_by_role() {
        let mut env = MultiAgentEnv::new(EnvConfig::default()).unwrap();
        env.reset(Some(2));
        let r = env.step_indices(1, 1).unwrap();
        let json = serde_json::to_value(&r.info).unwrap();
        assert!(json["blocker"]["correct_blocks"].is_u64());
        assert!(json["analyzer"]["correct_logs"].is_u64());
    }

    #[test]
    fn test_num_actions() {
        let env = MultiAgentEnv::new(EnvConfig::default()).unwrap();
        assert_eq!(env.num_actions(), RolePair::new(2, 2));
    }
}
