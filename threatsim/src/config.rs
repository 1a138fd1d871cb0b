// src/config.rs
//
// Environment configuration.
//
// `EnvConfig` is immutable once an environment is built from it. It can be
// assembled in code (presets + `with_*` builders), overridden from
// THREATSIM_* environment variables, or loaded from a YAML file:
//
//   max_steps: 1000
//   threat_probability: 0.2
//   base_seed: 7
//   intel_feed: data/threats_20250405_101500.json   # optional
//   feed_order: shuffled                            # fixed | shuffled
//   kind_weights: {phishing: 2.0, ddos: 1.0}        # optional
//   rewards:
//     blocker: {correct_block: 1.0, false_positive: -1.0}

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::ConfigError;
use crate::event::ThreatKind;
use crate::intel::IntelFeed;
use crate::rl::generator::{kind_distribution, FeedOrder};
use crate::rl::reward::RewardConfig;

pub const DEFAULT_MAX_STEPS: u64 = 1000;
pub const DEFAULT_THREAT_PROBABILITY: f64 = 0.2;
pub const DEFAULT_BASE_SEED: u64 = 0;

#[derive(Debug, Clone, PartialEq)]
pub struct EnvConfig {
    /// Decisions per episode. Must be > 0.
    pub max_steps: u64,
    /// Chance a synthetic event is a threat, in [0, 1].
    pub threat_probability: f64,
    /// Replay source; synthetic generation when `None`.
    pub intel_feed: Option<IntelFeed>,
    pub feed_order: FeedOrder,
    /// Relative weights over threat kinds; uniform when `None`.
    pub kind_weights: Option<BTreeMap<ThreatKind, f64>>,
    pub rewards: RewardConfig,
    /// Seeds the per-instance RNG that picks episode seeds when `reset`
    /// is called without one.
    pub base_seed: u64,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            max_steps: DEFAULT_MAX_STEPS,
            threat_probability: DEFAULT_THREAT_PROBABILITY,
            intel_feed: None,
            feed_order: FeedOrder::Fixed,
            kind_weights: None,
            rewards: RewardConfig::default(),
            base_seed: DEFAULT_BASE_SEED,
        }
    }
}

/// On-disk shape of `EnvConfig`. The feed is referenced by path.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct EnvConfigFile {
    max_steps: Option<u64>,
    threat_probability: Option<f64>,
    intel_feed: Option<PathBuf>,
    feed_order: FeedOrder,
    kind_weights: Option<BTreeMap<ThreatKind, f64>>,
    rewards: RewardConfig,
    base_seed: Option<u64>,
}

impl EnvConfig {
    /// Short episodes, fixed seed.
    pub fn deterministic() -> Self {
        Self {
            max_steps: 100,
            base_seed: 42,
            ..Self::default()
        }
    }

    /// Every synthetic event is a threat.
    pub fn all_threats() -> Self {
        Self {
            threat_probability: 1.0,
            ..Self::default()
        }
    }

    pub fn with_max_steps(mut self, max_steps: u64) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_threat_probability(mut self, threat_probability: f64) -> Self {
        self.threat_probability = threat_probability;
        self
    }

    pub fn with_intel_feed(mut self, feed: IntelFeed) -> Self {
        self.intel_feed = Some(feed);
        self
    }

    pub fn with_feed_order(mut self, order: FeedOrder) -> Self {
        self.feed_order = order;
        self
    }

    pub fn with_kind_weights(mut self, weights: BTreeMap<ThreatKind, f64>) -> Self {
        self.kind_weights = Some(weights);
        self
    }

    pub fn with_rewards(mut self, rewards: RewardConfig) -> Self {
        self.rewards = rewards;
        self
    }

    pub fn with_base_seed(mut self, seed: u64) -> Self {
        self.base_seed = seed;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_steps == 0 {
            return Err(ConfigError::invalid("max_steps", "must be > 0"));
        }
        if !(0.0..=1.0).contains(&self.threat_probability) {
            return Err(ConfigError::invalid(
                "threat_probability",
                format!("must be in [0, 1], got {}", self.threat_probability),
            ));
        }
        if let Some(weights) = &self.kind_weights {
            kind_distribution(weights)?;
        }
        if !self.rewards.is_finite() {
            return Err(ConfigError::invalid("rewards", "all rewards must be finite"));
        }
        Ok(())
    }

    /// Default config with overrides from environment variables:
    ///   - THREATSIM_MAX_STEPS           (u64)
    ///   - THREATSIM_THREAT_PROBABILITY  (f64)
    ///   - THREATSIM_SEED                (u64, base seed)
    ///   - THREATSIM_INTEL_FEED          (path to a JSON feed)
    ///
    /// Any variable that fails to parse or load is ignored with a warning.
    pub fn from_env_or_default() -> Self {
        Self::default().apply_env_overrides(|key| std::env::var(key).ok())
    }

    /// Apply THREATSIM_* overrides read through `lookup`.
    pub fn apply_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(raw) = lookup("THREATSIM_MAX_STEPS") {
            match raw.trim().parse::<u64>() {
                Ok(v) if v > 0 => {
                    self.max_steps = v;
                    info!(max_steps = v, "THREATSIM_MAX_STEPS overrode default");
                }
                _ => warn!(
                    raw = %raw,
                    default = self.max_steps,
                    "could not parse THREATSIM_MAX_STEPS as a positive integer; using default"
                ),
            }
        }

        if let Some(raw) = lookup("THREATSIM_THREAT_PROBABILITY") {
            match raw.trim().parse::<f64>() {
                Ok(v) if (0.0..=1.0).contains(&v) => {
                    self.threat_probability = v;
                    info!(threat_probability = v, "THREATSIM_THREAT_PROBABILITY overrode default");
                }
                _ => warn!(
                    raw = %raw,
                    default = self.threat_probability,
                    "THREATSIM_THREAT_PROBABILITY must be a number in [0, 1]; using default"
                ),
            }
        }

        if let Some(raw) = lookup("THREATSIM_SEED") {
            match raw.trim().parse::<u64>() {
                Ok(v) => {
                    self.base_seed = v;
                    info!(base_seed = v, "THREATSIM_SEED overrode default");
                }
                Err(_) => warn!(
                    raw = %raw,
                    default = self.base_seed,
                    "could not parse THREATSIM_SEED as u64; using default"
                ),
            }
        }

        if let Some(raw) = lookup("THREATSIM_INTEL_FEED") {
            if let Some(feed) = IntelFeed::open_or_warn(raw.trim()) {
                info!(path = %raw, records = feed.len(), "THREATSIM_INTEL_FEED loaded");
                self.intel_feed = Some(feed);
            }
        }

        self
    }

    /// Parse a YAML config. A relative `intel_feed` path is resolved
    /// against the current directory.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        Self::from_yaml_in(yaml, None)
    }

    /// Load a YAML config file. A relative `intel_feed` path is resolved
    /// against the file's directory. A feed that fails to load is logged
    /// and the config falls back to synthetic events.
    pub fn load_yaml(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_yaml_in(&contents, path.parent())
    }

    fn from_yaml_in(yaml: &str, base_dir: Option<&Path>) -> Result<Self, ConfigError> {
        let file: EnvConfigFile =
            serde_yaml::from_str(yaml).map_err(|e| ConfigError::Parse(e.to_string()))?;

        let intel_feed = file.intel_feed.and_then(|feed_path| {
            let resolved = match base_dir {
                Some(dir) if feed_path.is_relative() => dir.join(feed_path),
                _ => feed_path,
            };
            IntelFeed::open_or_warn(resolved)
        });

        let defaults = Self::default();
        let config = Self {
            max_steps: file.max_steps.unwrap_or(defaults.max_steps),
            threat_probability: file
                .threat_probability
                .unwrap_or(defaults.threat_probability),
            intel_feed,
            feed_order: file.feed_order,
            kind_weights: file.kind_weights,
            rewards: file.rewards,
            base_seed: file.base_seed.unwrap_or(defaults.base_seed),
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_is_valid() {
        let cfg = EnvConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.max_steps, 1000);
        assert_eq!(cfg.threat_probability, 0.2);
        assert!(EnvConfig::deterministic().validate().is_ok());
        assert_eq!(EnvConfig::all_threats().threat_probability, 1.0);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let zero_steps = EnvConfig::default().with_max_steps(0);
        assert!(matches!(
            zero_steps.validate(),
            Err(ConfigError::Invalid { ref field, .. }) if field == "max_steps"
        ));
        assert!(EnvConfig::default()
            .with_threat_probability(1.5)
            .validate()
            .is_err());
        assert!(EnvConfig::default()
            .with_threat_probability(f64::NAN)
            .validate()
            .is_err());

        let mut rewards = RewardConfig::default();
        rewards.blocker.correct_block = f64::INFINITY;
        assert!(EnvConfig::default().with_rewards(rewards).validate().is_err());
    }

    #[test]
    fn test_env_overrides() {
        let vars = HashMap::from([
            ("THREATSIM_MAX_STEPS", "25"),
            ("THREATSIM_THREAT_PROBABILITY", "0.75"),
            ("THREATSIM_SEED", "99"),
        ]);
        let cfg = EnvConfig::default()
            .apply_env_overrides(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(cfg.max_steps, 25);
        assert_eq!(cfg.threat_probability, 0.75);
        assert_eq!(cfg.base_seed, 99);
    }

    #[test]
    fn test_env_overrides_ignore_garbage() {
        let vars = HashMap::from([
            ("THREATSIM_MAX_STEPS", "0"),
            ("THREATSIM_THREAT_PROBABILITY", "likely"),
            ("THREATSIM_SEED", "-3"),
            ("THREATSIM_INTEL_FEED", "/definitely/not/here.json"),
        ]);
        let cfg = EnvConfig::default()
            .apply_env_overrides(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(cfg, EnvConfig::default());
    }

    #[test]
    fn test_yaml_partial_config() {
        let yaml = r#"
max_steps: 50
feed_order: shuffled
kind_weights:
  phishing: 2.0
  ddos: 1.0
rewards:
  blocker:
    missed_threat: -2.0
"#;
        let cfg = EnvConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(cfg.max_steps, 50);
        assert_eq!(cfg.threat_probability, DEFAULT_THREAT_PROBABILITY);
        assert_eq!(cfg.feed_order, FeedOrder::Shuffled);
        assert_eq!(cfg.rewards.blocker.missed_threat, -2.0);
        assert_eq!(cfg.rewards.blocker.correct_block, 1.0);
        let weights = cfg.kind_weights.unwrap();
        assert_eq!(weights.get(&ThreatKind::Phishing), Some(&2.0));
    }

    #[test]
    fn test_yaml_rejects_unknown_fields_and_invalid_values() {
        assert!(matches!(
            EnvConfig::from_yaml_str("max_step: 5"),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            EnvConfig::from_yaml_str("threat_probability: 2.0"),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn test_load_yaml_resolves_feed_relative_to_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("feed.json"),
            r#"[{"source": "reddit", "type": "phishing", "summary": "x"}]"#,
        )
        .unwrap();
        let cfg_path = dir.path().join("env.yaml");
        fs::write(&cfg_path, "max_steps: 3\nintel_feed: feed.json\n").unwrap();

        let cfg = EnvConfig::load_yaml(&cfg_path).unwrap();
        assert_eq!(cfg.max_steps, 3);
        assert_eq!(cfg.intel_feed.map(|f| f.len()), Some(1));
    }

    #[test]
    fn test_unloadable_yaml_feed_falls_back_to_synthetic() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("bad.json"), "{not json").unwrap();
        for feed in ["missing.json", "bad.json"] {
            let cfg_path = dir.path().join("env.yaml");
            fs::write(&cfg_path, format!("max_steps: 3\nintel_feed: {feed}\n")).unwrap();
            let cfg = EnvConfig::load_yaml(&cfg_path).unwrap();
            assert_eq!(cfg.max_steps, 3);
            assert!(cfg.intel_feed.is_none(), "{feed} should be dropped");
        }
    }

    #[test]
    fn test_load_yaml_missing_file() {
        assert!(matches!(
            EnvConfig::load_yaml("/nonexistent/env.yaml"),
            Err(ConfigError::Io { .. })
        ));
    }
}
