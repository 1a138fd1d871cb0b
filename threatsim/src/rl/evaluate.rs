// src/rl/evaluate.rs
//
// Evaluation harness: roll a policy through N seeded episodes and summarise
// reward and decision-quality metrics per role.

use std::collections::BTreeMap;
use std::io::Write;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::env::Environment;
use super::episode::{EpisodeMetrics, StepInfo};
use super::multi_agent::{MultiAgentEnv, RolePair};
use super::policy::Policy;
use super::role::{Analyzer, Blocker, Role};
use super::sim_env::SimEnv;
use super::telemetry::StepTelemetry;
use crate::error::EnvError;

/// Per-role view of an environment's rewards and step info.
pub trait RoleScores: Environment {
    fn role_rewards(reward: &Self::Reward) -> Vec<(&'static str, f64)>;
    fn role_infos(info: &Self::Info) -> Vec<(&'static str, &StepInfo)>;
}

impl<R: Role> RoleScores for SimEnv<R> {
    fn role_rewards(reward: &f64) -> Vec<(&'static str, f64)> {
        vec![(R::NAME, *reward)]
    }

    fn role_infos(info: &StepInfo) -> Vec<(&'static str, &StepInfo)> {
        vec![(R::NAME, info)]
    }
}

impl RoleScores for MultiAgentEnv {
    fn role_rewards(reward: &RolePair<f64>) -> Vec<(&'static str, f64)> {
        vec![
            (Blocker::NAME, reward.blocker),
            (Analyzer::NAME, reward.analyzer),
        ]
    }

    fn role_infos(info: &RolePair<StepInfo>) -> Vec<(&'static str, &StepInfo)> {
        vec![(Blocker::NAME, &info.blocker), (Analyzer::NAME, &info.analyzer)]
    }
}

/// One evaluated episode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeRecord {
    pub episode: usize,
    pub seed: u64,
    pub length: u64,
    pub rewards: BTreeMap<String, f64>,
    pub metrics: BTreeMap<String, EpisodeMetrics>,
}

/// Metric counts averaged over episodes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeanMetrics {
    pub correct_blocks: f64,
    pub false_positives: f64,
    pub missed_threats: f64,
    pub correct_logs: f64,
    pub benign_allowed: f64,
    pub incorrect_logs: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleSummary {
    pub mean_reward: f64,
    pub std_reward: f64,
    pub min_reward: f64,
    pub max_reward: f64,
    pub mean_metrics: MeanMetrics,
    /// Correct decisions over all decisions, pooled across episodes.
    pub accuracy: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationSummary {
    pub policy: String,
    pub episodes: usize,
    pub base_seed: u64,
    pub mean_length: f64,
    pub roles: BTreeMap<String, RoleSummary>,
    pub per_episode: Vec<EpisodeRecord>,
}

impl EvaluationSummary {
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

fn summarise_role(role: &str, records: &[EpisodeRecord]) -> RoleSummary {
    let rewards: Vec<f64> = records
        .iter()
        .filter_map(|r| r.rewards.get(role).copied())
        .collect();
    let metrics: Vec<EpisodeMetrics> = records
        .iter()
        .filter_map(|r| r.metrics.get(role).copied())
        .collect();

    let n = rewards.len().max(1) as f64;
    let mean = rewards.iter().sum::<f64>() / n;
    let var = rewards.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;

    let mut pooled = EpisodeMetrics::default();
    let mut sums = MeanMetrics::default();
    for m in &metrics {
        sums.correct_blocks += m.correct_blocks as f64;
        sums.false_positives += m.false_positives as f64;
        sums.missed_threats += m.missed_threats as f64;
        sums.correct_logs += m.correct_logs as f64;
        sums.benign_allowed += m.benign_allowed as f64;
        sums.incorrect_logs += m.incorrect_logs as f64;

        pooled.correct_blocks += m.correct_blocks;
        pooled.false_positives += m.false_positives;
        pooled.missed_threats += m.missed_threats;
        pooled.correct_logs += m.correct_logs;
        pooled.benign_allowed += m.benign_allowed;
        pooled.incorrect_logs += m.incorrect_logs;
    }
    let m = metrics.len().max(1) as f64;

    RoleSummary {
        mean_reward: mean,
        std_reward: var.sqrt(),
        min_reward: rewards.iter().copied().fold(f64::INFINITY, f64::min),
        max_reward: rewards.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        mean_metrics: MeanMetrics {
            correct_blocks: sums.correct_blocks / m,
            false_positives: sums.false_positives / m,
            missed_threats: sums.missed_threats / m,
            correct_logs: sums.correct_logs / m,
            benign_allowed: sums.benign_allowed / m,
            incorrect_logs: sums.incorrect_logs / m,
        },
        accuracy: pooled.accuracy(),
    }
}

/// Run `episodes` episodes; episode `i` is seeded `base_seed + i`.
pub fn evaluate<E, P>(
    env: &mut E,
    policy: &mut P,
    episodes: usize,
    base_seed: u64,
) -> Result<EvaluationSummary, EnvError>
where
    E: RoleScores,
    P: Policy<E> + ?Sized,
{
    evaluate_with_telemetry::<E, P, std::io::Sink>(env, policy, episodes, base_seed, None)
}

/// `evaluate`, also streaming every step to `telemetry`.
pub fn evaluate_with_telemetry<E, P, W>(
    env: &mut E,
    policy: &mut P,
    episodes: usize,
    base_seed: u64,
    mut telemetry: Option<&mut StepTelemetry<W>>,
) -> Result<EvaluationSummary, EnvError>
where
    E: RoleScores,
    P: Policy<E> + ?Sized,
    W: Write,
{
    let mut per_episode = Vec::with_capacity(episodes);

    for episode in 0..episodes {
        let seed = base_seed.wrapping_add(episode as u64);
        let mut observation = env.reset(Some(seed));
        policy.on_reset(seed);

        let mut rewards: BTreeMap<String, f64> = BTreeMap::new();
        let mut metrics: BTreeMap<String, EpisodeMetrics> = BTreeMap::new();
        let mut length = 0;

        loop {
            let action = policy.act(&observation);
            let transition = env.step(action)?;
            length += 1;

            for (role, reward) in E::role_rewards(&transition.reward) {
                *rewards.entry(role.to_string()).or_insert(0.0) += reward;
            }
            for (role, info) in E::role_infos(&transition.info) {
                metrics.insert(role.to_string(), info.metrics);
            }
            let write_error = match telemetry.as_deref_mut() {
                Some(sink) => sink.record::<E>(episode, &transition).err(),
                None => None,
            };
            if let Some(e) = write_error {
                warn!(error = %e, "telemetry write failed; disabling");
                telemetry = None;
            }

            if transition.done {
                break;
            }
            observation = transition.observation;
        }

        per_episode.push(EpisodeRecord {
            episode,
            seed,
            length,
            rewards,
            metrics,
        });
    }

    let roles: Vec<String> = per_episode
        .first()
        .map(|r| r.rewards.keys().cloned().collect())
        .unwrap_or_default();
    let roles = roles
        .into_iter()
        .map(|role| {
            let summary = summarise_role(&role, &per_episode);
            (role, summary)
        })
        .collect::<BTreeMap<_, _>>();

    let mean_length = if per_episode.is_empty() {
        0.0
    } else {
        per_episode.iter().map(|r| r.length as f64).sum::<f64>() / per_episode.len() as f64
    };

    for (role, summary) in &roles {
        info!(
            policy = policy.name(),
            role = %role,
            episodes,
            mean_reward = summary.mean_reward,
            accuracy = summary.accuracy,
            "evaluation finished"
        );
    }

    Ok(EvaluationSummary {
        policy: policy.name().to_string(),
        episodes,
        base_seed,
        mean_length,
        roles,
        per_episode,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EnvConfig;
    use crate::rl::policy::{AlwaysBlock, NeverBlock, PairedPolicy, RandomPolicy};

    #[test]
    fn test_always_block_on_all_threats() {
        let config = EnvConfig::all_threats().with_max_steps(5);
        let mut env = SimEnv::<Blocker>::new(config).unwrap();
        let summary = evaluate(&mut env, &mut AlwaysBlock, 3, 42).unwrap();

        assert_eq!(summary.episodes, 3);
        assert_eq!(summary.mean_length, 5.0);
        let blocker = &summary.roles["blocker"];
        assert_eq!(blocker.mean_reward, 5.0);
        assert_eq!(blocker.std_reward, 0.0);
        assert_eq!(blocker.mean_metrics.correct_blocks, 5.0);
        assert_eq!(blocker.accuracy, 1.0);
        assert_eq!(summary.per_episode[2].seed, 44);
    }

    #[test]
    fn test_evaluation_is_reproducible() {
        let config = EnvConfig::default().with_max_steps(20);
        let mut env_a = SimEnv::<Blocker>::new(config.clone()).unwrap();
        let mut env_b = SimEnv::<Blocker>::new(config).unwrap();
        let a = evaluate(&mut env_a, &mut RandomPolicy::new(1), 4, 7).unwrap();
        let b = evaluate(&mut env_b, &mut RandomPolicy::new(1), 4, 7).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_multi_role_summary_has_both_roles() {
        let mut env = MultiAgentEnv::new(EnvConfig::default().with_max_steps(10)).unwrap();
        let mut policy = PairedPolicy::new(AlwaysBlock, NeverBlock);
        let summary = evaluate(&mut env, &mut policy, 2, 0).unwrap();

        assert_eq!(summary.roles.len(), 2);
        assert!(summary.roles.contains_key("blocker"));
        assert!(summary.roles.contains_key("analyzer"));
        let analyzer = &summary.per_episode[0].metrics["analyzer"];
        assert_eq!(analyzer.correct_logs + analyzer.incorrect_logs, 10);
    }

    #[test]
    fn test_summary_serializes_to_json() {
        let mut env = SimEnv::<Blocker>::new(EnvConfig::default().with_max_steps(3)).unwrap();
        let summary = evaluate(&mut env, &mut NeverBlock, 1, 0).unwrap();
        let json = summary.to_json_pretty().unwrap();
        let back: EvaluationSummary = serde_json::from_str(&json).unwrap();
        assert_eq!(back.policy, "never_block");
        assert_eq!(back.per_episode.len(), 1);
    }

    #[test]
    fn test_zero_episodes() {
        let mut env = SimEnv::<Blocker>::new(EnvConfig::default()).unwrap();
        let summary = evaluate(&mut env, &mut AlwaysBlock, 0, 0).unwrap();
        assert!(summary.roles.is_empty());
        assert_eq!(summary.mean_length, 0.0);
    }
}
