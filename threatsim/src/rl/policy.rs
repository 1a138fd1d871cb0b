// src/rl/policy.rs
//
// Scripted baseline policies.
//
// A `Policy<E>` maps an environment's observation to one of its actions.
// Learned policies live outside this crate; these baselines exist for
// evaluation, smoke tests and sanity-checking reward tables.

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use super::action::{AnalyzerAction, BlockerAction, DefenderAction, DiscreteAction};
use super::env::Environment;
use super::multi_agent::{JointAction, MultiAgentEnv, RolePair};
use super::observation::Observation;
use super::role::{Analyzer, Blocker, Defender, Role};
use super::sim_env::SimEnv;

pub trait Policy<E: Environment> {
    /// Stable name used in logs and evaluation output.
    fn name(&self) -> &str;

    fn act(&mut self, observation: &E::Observation) -> E::Action;

    /// Called after every reset with the episode seed.
    fn on_reset(&mut self, _seed: u64) {}
}

impl<E: Environment, P: Policy<E> + ?Sized> Policy<E> for Box<P> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn act(&mut self, observation: &E::Observation) -> E::Action {
        (**self).act(observation)
    }

    fn on_reset(&mut self, seed: u64) {
        (**self).on_reset(seed)
    }
}

/// The two extreme responses of a role.
pub trait ScriptedActions: Role {
    /// Treat the event as a threat.
    fn alert() -> Self::Action;
    /// Let the event through untouched.
    fn pass() -> Self::Action;
}

impl ScriptedActions for Blocker {
    fn alert() -> BlockerAction {
        BlockerAction::Block
    }
    fn pass() -> BlockerAction {
        BlockerAction::Allow
    }
}

impl ScriptedActions for Analyzer {
    fn alert() -> AnalyzerAction {
        AnalyzerAction::LogThreat
    }
    fn pass() -> AnalyzerAction {
        AnalyzerAction::LogBenign
    }
}

impl ScriptedActions for Defender {
    fn alert() -> DefenderAction {
        DefenderAction::Block
    }
    fn pass() -> DefenderAction {
        DefenderAction::Ignore
    }
}

/// Alert on every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysBlock;

impl<R: ScriptedActions> Policy<SimEnv<R>> for AlwaysBlock {
    fn name(&self) -> &str {
        "always_block"
    }

    fn act(&mut self, _observation: &Observation) -> R::Action {
        R::alert()
    }
}

/// Never alert.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverBlock;

impl<R: ScriptedActions> Policy<SimEnv<R>> for NeverBlock {
    fn name(&self) -> &str {
        "never_block"
    }

    fn act(&mut self, _observation: &Observation) -> R::Action {
        R::pass()
    }
}

/// Uniform over the role's action set.
///
/// Reseeded from `seed ^ episode_seed` on every reset so runs are
/// reproducible.
#[derive(Debug, Clone)]
pub struct RandomPolicy {
    seed: u64,
    rng: ChaCha8Rng,
}

impl RandomPolicy {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }
}

impl<R: Role> Policy<SimEnv<R>> for RandomPolicy {
    fn name(&self) -> &str {
        "random"
    }

    fn act(&mut self, _observation: &Observation) -> R::Action {
        // ALL is never empty for a role's action set.
        let all = R::Action::ALL;
        *all.choose(&mut self.rng).unwrap_or(&all[0])
    }

    fn on_reset(&mut self, seed: u64) {
        self.rng = ChaCha8Rng::seed_from_u64(self.seed ^ seed);
    }
}

pub const DEFAULT_PACKET_THRESHOLD: f32 = 900.0;

/// Alert when the packet is at least `min_bytes` or the protocol is unknown.
#[derive(Debug, Clone, Copy)]
pub struct PacketSizeThreshold {
    pub min_bytes: f32,
}

impl Default for PacketSizeThreshold {
    fn default() -> Self {
        Self {
            min_bytes: DEFAULT_PACKET_THRESHOLD,
        }
    }
}

impl PacketSizeThreshold {
    pub fn new(min_bytes: f32) -> Self {
        Self { min_bytes }
    }

    pub fn flags(&self, observation: &Observation) -> bool {
        observation.packet_size >= self.min_bytes || observation.protocol == 0.0
    }
}

impl<R: ScriptedActions> Policy<SimEnv<R>> for PacketSizeThreshold {
    fn name(&self) -> &str {
        "packet_threshold"
    }

    fn act(&mut self, observation: &Observation) -> R::Action {
        if self.flags(observation) {
            R::alert()
        } else {
            R::pass()
        }
    }
}

/// Drives the two-role environment with one single-role policy per role.
#[derive(Debug, Clone)]
pub struct PairedPolicy<B, A> {
    pub blocker: B,
    pub analyzer: A,
    name: String,
}

impl<B, A> PairedPolicy<B, A>
where
    B: Policy<SimEnv<Blocker>>,
    A: Policy<SimEnv<Analyzer>>,
{
    pub fn new(blocker: B, analyzer: A) -> Self {
        let name = format!("{}+{}", blocker.name(), analyzer.name());
        Self {
            blocker,
            analyzer,
            name,
        }
    }
}

impl<B, A> Policy<MultiAgentEnv> for PairedPolicy<B, A>
where
    B: Policy<SimEnv<Blocker>>,
    A: Policy<SimEnv<Analyzer>>,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn act(&mut self, observation: &RolePair<Observation>) -> JointAction {
        RolePair::new(
            self.blocker.act(&observation.blocker),
            self.analyzer.act(&observation.analyzer),
        )
    }

    fn on_reset(&mut self, seed: u64) {
        self.blocker.on_reset(seed);
        // Offset so random roles don't mirror each other.
        self.analyzer.on_reset(seed.wrapping_add(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rl::observation::OBS_VERSION;

    fn obs(protocol: f32, packet_size: f32) -> Observation {
        Observation {
            obs_version: OBS_VERSION,
            step_index: 0,
            source_octet: 10.0,
            dest_octet: 192.0,
            protocol,
            packet_size,
        }
    }

    #[test]
    fn test_constant_policies() {
        let o = obs(443.0, 700.0);
        assert_eq!(
            Policy::<SimEnv<Blocker>>::act(&mut AlwaysBlock, &o),
            BlockerAction::Block
        );
        assert_eq!(
            Policy::<SimEnv<Defender>>::act(&mut NeverBlock, &o),
            DefenderAction::Ignore
        );
        assert_eq!(
            Policy::<SimEnv<Analyzer>>::act(&mut AlwaysBlock, &o),
            AnalyzerAction::LogThreat
        );
    }

    #[test]
    fn test_packet_threshold() {
        let mut p = PacketSizeThreshold::default();
        assert_eq!(
            Policy::<SimEnv<Blocker>>::act(&mut p, &obs(443.0, 700.0)),
            BlockerAction::Allow
        );
        assert_eq!(
            Policy::<SimEnv<Blocker>>::act(&mut p, &obs(443.0, 2500.0)),
            BlockerAction::Block
        );
        assert_eq!(
            Policy::<SimEnv<Blocker>>::act(&mut p, &obs(0.0, 100.0)),
            BlockerAction::Block
        );
    }

    #[test]
    fn test_random_policy_reproducible_per_episode() {
        let mut a = RandomPolicy::new(3);
        let mut b = RandomPolicy::new(3);
        let o = obs(80.0, 1000.0);
        Policy::<SimEnv<Defender>>::on_reset(&mut a, 10);
        Policy::<SimEnv<Defender>>::on_reset(&mut b, 10);
        let xs: Vec<DefenderAction> = (0..32)
            .map(|_| Policy::<SimEnv<Defender>>::act(&mut a, &o))
            .collect();
        let ys: Vec<DefenderAction> = (0..32)
            .map(|_| Policy::<SimEnv<Defender>>::act(&mut b, &o))
            .collect();
        assert_eq!(xs, ys);
        assert!(xs.iter().any(|a| *a != xs[0]));
    }

    #[test]
    fn test_paired_policy() {
        let mut p = PairedPolicy::new(AlwaysBlock, NeverBlock);
        assert_eq!(Policy::<MultiAgentEnv>::name(&p), "always_block+never_block");
        let joint = p.act(&RolePair::both(obs(443.0, 700.0)));
        assert_eq!(
            joint,
            RolePair::new(BlockerAction::Block, AnalyzerAction::LogBenign)
        );
    }
}
