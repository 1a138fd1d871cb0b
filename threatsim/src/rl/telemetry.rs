// src/rl/telemetry.rs
//
// Per-step JSONL telemetry.
//
// One JSON object per line:
//   {"obs_version":1,"episode":0,"step":3,"done":false,
//    "rewards":{"blocker":1.0},"metrics":{"blocker":{...}},
//    "termination_reason":null}
//
// Rewards and metrics are keyed by role name, so single- and multi-role
// runs share one schema.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::env::Transition;
use super::episode::EpisodeMetrics;
use super::evaluate::RoleScores;
use super::observation::OBS_VERSION;

/// One telemetry line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub obs_version: u32,
    pub episode: usize,
    /// Steps taken in the episode, including this one.
    pub step: u64,
    pub done: bool,
    pub rewards: BTreeMap<String, f64>,
    pub metrics: BTreeMap<String, EpisodeMetrics>,
    pub termination_reason: Option<String>,
}

impl StepRecord {
    pub fn from_transition<E: RoleScores>(
        episode: usize,
        transition: &Transition<E::Observation, E::Reward, E::Info>,
    ) -> Self {
        let infos = E::role_infos(&transition.info);
        let step = infos.first().map(|(_, info)| info.step).unwrap_or(0);
        let termination_reason = infos
            .first()
            .and_then(|(_, info)| info.termination_reason.clone());

        Self {
            obs_version: OBS_VERSION,
            episode,
            step,
            done: transition.done,
            rewards: E::role_rewards(&transition.reward)
                .into_iter()
                .map(|(role, reward)| (role.to_string(), reward))
                .collect(),
            metrics: infos
                .into_iter()
                .map(|(role, info)| (role.to_string(), info.metrics))
                .collect(),
            termination_reason,
        }
    }
}

/// JSONL sink over any writer.
pub struct StepTelemetry<W: Write> {
    writer: W,
    records: u64,
}

impl<W: Write> StepTelemetry<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, records: 0 }
    }

    pub fn record<E: RoleScores>(
        &mut self,
        episode: usize,
        transition: &Transition<E::Observation, E::Reward, E::Info>,
    ) -> io::Result<()> {
        self.write_record(&StepRecord::from_transition::<E>(episode, transition))
    }

    pub fn write_record(&mut self, record: &StepRecord) -> io::Result<()> {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.write_all(b"\n")?;
        self.records += 1;
        Ok(())
    }

    /// Lines written so far.
    pub fn records(&self) -> u64 {
        self.records
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl StepTelemetry<BufWriter<File>> {
    /// Append to `path`, creating parent directories as needed.
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EnvConfig;
    use crate::rl::action::BlockerAction;
    use crate::rl::multi_agent::{MultiAgentEnv, RolePair};
    use crate::rl::role::Blocker;
    use crate::rl::sim_env::SimEnv;

    #[test]
    fn test_one_line_per_step() {
        let mut env = SimEnv::<Blocker>::new(EnvConfig::default().with_max_steps(3)).unwrap();
        let mut sink = StepTelemetry::new(Vec::new());
        env.reset(Some(5));
        for _ in 0..3 {
            let t = env.step(BlockerAction::Block).unwrap();
            sink.record::<SimEnv<Blocker>>(0, &t).unwrap();
        }
        assert_eq!(sink.records(), 3);

        let bytes = sink.into_inner();
        let lines: Vec<StepRecord> = String::from_utf8(bytes)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[2].step, 3);
        assert!(lines[2].done);
        assert_eq!(lines[2].termination_reason.as_deref(), Some("MaxSteps"));
        assert!(lines[0].rewards.contains_key("blocker"));
    }

    #[test]
    fn test_multi_role_records_keyed_by_role() {
        let mut env = MultiAgentEnv::new(EnvConfig::default()).unwrap();
        env.reset(Some(1));
        let t = env.step_indices(1, 0).unwrap();
        let record = StepRecord::from_transition::<MultiAgentEnv>(4, &t);
        assert_eq!(record.episode, 4);
        assert_eq!(record.step, 1);
        let roles: Vec<&str> = record.rewards.keys().map(String::as_str).collect();
        assert_eq!(roles, vec!["analyzer", "blocker"]);
        assert_eq!(
            RolePair::new(record.rewards["blocker"], record.rewards["analyzer"]),
            t.reward
        );
    }

    #[test]
    fn test_create_appends_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("steps.jsonl");
        let record = StepRecord {
            obs_version: OBS_VERSION,
            episode: 0,
            step: 1,
            done: false,
            rewards: BTreeMap::new(),
            metrics: BTreeMap::new(),
            termination_reason: None,
        };
        for _ in 0..2 {
            let mut sink = StepTelemetry::create(&path).unwrap();
            sink.write_record(&record).unwrap();
            sink.flush().unwrap();
        }
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }
}
