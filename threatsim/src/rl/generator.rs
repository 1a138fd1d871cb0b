// src/rl/generator.rs
//
// Threat generator: produces one ThreatEvent per step.
//
// Two modes:
// - Synthetic: Bernoulli(threat_probability) threat/benign split, kind drawn
//   uniformly or by configured weights, summary filled from templates.
// - Replay: records from an IntelFeed in fixed or per-episode shuffled order.
//   Once the feed runs out the episode continues on synthetic events.
//
// The generator owns the instance RNG. Event generation and feature
// encoding both draw from it, in step order, so a seed fixes the whole
// episode.

use std::collections::BTreeMap;

use rand::distributions::WeightedIndex;
use rand::prelude::Distribution;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::observation::{encode, Observation};
use crate::config::EnvConfig;
use crate::error::ConfigError;
use crate::event::{ThreatEvent, ThreatKind, ThreatSource};
use crate::intel::IntelFeed;

/// Order in which feed records are replayed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedOrder {
    #[default]
    Fixed,
    /// Fresh permutation every episode.
    Shuffled,
}

/// How a generated event was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventOrigin {
    Synthetic,
    /// Replayed feed record at `index`.
    Replay { index: usize },
    /// Synthetic event produced because the feed ran out.
    Fallback,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedEvent {
    pub event: ThreatEvent,
    pub origin: EventOrigin,
}

const COMPANIES: &[&str] = &[
    "Microsoft", "Google", "Amazon", "Apple", "Adobe", "Salesforce", "Oracle", "Cisco",
    "PayPal", "Stripe", "Shopify", "Spotify",
];

const SERVICES: &[&str] = &[
    "email", "cloud storage", "document sharing", "password reset", "login",
    "file sharing", "billing", "customer support", "security alert", "VPN",
];

const PROCESSES: &[&str] = &[
    "svchost.exe", "update.exe", "rundll32.exe", "helper.exe", "sync.exe", "agent.exe",
];

const SYSTEMS: &[&str] = &["Windows", "Linux", "macOS", "iOS", "Android"];

const DIRECTORIES: &[&str] = &["/home/shared", "C:\\Users\\Public", "/srv/data", "/var/backups"];

fn templates_for(kind: ThreatKind) -> &'static [&'static str] {
    match kind {
        ThreatKind::Phishing => &[
            "A fake {company} login page is being used to steal user credentials.",
            "Phishing campaign targeting {company} employees with fake {service} notifications.",
            "Malicious link in email purporting to be from {company} IT department.",
            "Fake {company} password reset request sent to staff.",
        ],
        ThreatKind::Malware => &[
            "Malicious executable attempting to establish C2 connection to {ip}.",
            "Suspicious process {process} attempting to modify system files.",
            "Malware attempting to disable security services and establish persistence.",
            "Suspicious DLL injection detected from process {process}.",
        ],
        ThreatKind::Ransomware => &[
            "Ransomware activity detected encrypting files in {directory}.",
            "Ransomware attempting to delete shadow copies to prevent recovery.",
            "Suspicious process {process} accessing and modifying multiple files rapidly.",
            "Ransomware attempting to encrypt network shares from {ip}.",
        ],
        ThreatKind::DataExfiltration => &[
            "Large outbound transfer from {directory} to unrecognised host {ip}.",
            "Sensitive {company} records staged for upload over encrypted channel.",
        ],
        ThreatKind::BruteForce => &[
            "{count} failed SSH logins against {system} hosts from {ip}.",
            "Credential stuffing against the {service} endpoint from {count} sources.",
        ],
        ThreatKind::Ddos => &[
            "DDoS attack detected targeting {service} from {count} unique IP addresses.",
            "Suspicious SYN flood detected from {count} sources targeting {service}.",
            "Suspicious UDP flood detected from {count} sources to {ip}.",
        ],
        ThreatKind::SqlInjection => &[
            "SQL injection payload in {service} form parameters from {ip}.",
            "Union-based query injection attempt against {company} reporting API.",
        ],
        ThreatKind::Xss => &[
            "Script injection in {service} comment field rendering for other users.",
            "Reflected XSS attempt against {company} search page.",
        ],
        ThreatKind::CredentialTheft => &[
            "Credential dump of LSASS memory attempted by {process}.",
            "Stolen {company} session tokens offered for sale.",
        ],
        ThreatKind::Apt => &[
            "Long-lived beaconing from {system} host to {ip} matching known APT tooling.",
            "Lateral movement from {process} across {count} internal hosts.",
        ],
        ThreatKind::ZeroDay => &[
            "Unusual process behavior detected that may indicate zero-day exploit.",
            "Unknown exploit attempting to gain elevated privileges on {system}.",
            "Suspicious network connection to {ip} using unknown protocol.",
        ],
        ThreatKind::Benign | ThreatKind::Unknown => &[
            "Routine {service} traffic from {company} client.",
            "Scheduled backup of {directory} completed.",
            "User signed in to {service} from a known device.",
            "Software update for {system} downloaded from vendor mirror.",
        ],
    }
}

fn fill_template<R: Rng + ?Sized>(template: &str, rng: &mut R) -> String {
    let mut out = template.to_string();
    // Fixed placeholder order keeps RNG consumption reproducible.
    if out.contains("{company}") {
        out = out.replace("{company}", COMPANIES.choose(rng).copied().unwrap_or("Acme"));
    }
    if out.contains("{service}") {
        out = out.replace("{service}", SERVICES.choose(rng).copied().unwrap_or("web"));
    }
    if out.contains("{process}") {
        out = out.replace("{process}", PROCESSES.choose(rng).copied().unwrap_or("proc.exe"));
    }
    if out.contains("{system}") {
        out = out.replace("{system}", SYSTEMS.choose(rng).copied().unwrap_or("Linux"));
    }
    if out.contains("{directory}") {
        out = out.replace("{directory}", DIRECTORIES.choose(rng).copied().unwrap_or("/tmp"));
    }
    if out.contains("{ip}") {
        let octets: [u8; 4] = rng.gen();
        let ip = std::net::Ipv4Addr::from(octets).to_string();
        out = out.replace("{ip}", &ip);
    }
    if out.contains("{count}") {
        let count: u32 = rng.gen_range(100..10_000);
        out = out.replace("{count}", &count.to_string());
    }
    out
}

/// Kind weights over `ThreatKind::THREATS`, in that order.
///
/// Kinds absent from the map get weight 0.
pub fn kind_distribution(
    weights: &BTreeMap<ThreatKind, f64>,
) -> Result<WeightedIndex<f64>, ConfigError> {
    if let Some(kind) = weights.keys().find(|k| !ThreatKind::THREATS.contains(k)) {
        return Err(ConfigError::invalid(
            "kind_weights",
            format!("{kind} is not a threat kind"),
        ));
    }
    let ordered: Vec<f64> = ThreatKind::THREATS
        .iter()
        .map(|kind| weights.get(kind).copied().unwrap_or(0.0))
        .collect();
    WeightedIndex::new(ordered).map_err(|e| ConfigError::invalid("kind_weights", e.to_string()))
}

/// Per-instance event source.
#[derive(Debug, Clone)]
pub struct ThreatGenerator {
    threat_probability: f64,
    kinds: Option<WeightedIndex<f64>>,
    feed: Option<IntelFeed>,
    feed_order: FeedOrder,
    /// Replay order for the current episode.
    order: Vec<usize>,
    cursor: usize,
    fallback_warned: bool,
    rng: ChaCha8Rng,
}

impl ThreatGenerator {
    pub fn new(config: &EnvConfig, seed: u64) -> Result<Self, ConfigError> {
        let kinds = config
            .kind_weights
            .as_ref()
            .map(kind_distribution)
            .transpose()?;
        let mut generator = Self {
            threat_probability: config.threat_probability,
            kinds,
            feed: config.intel_feed.clone(),
            feed_order: config.feed_order,
            order: Vec::new(),
            cursor: 0,
            fallback_warned: false,
            rng: ChaCha8Rng::seed_from_u64(seed),
        };
        generator.reseed(seed);
        Ok(generator)
    }

    /// Reseed and rewind for a new episode.
    pub fn reseed(&mut self, seed: u64) {
        self.rng = ChaCha8Rng::seed_from_u64(seed);
        self.cursor = 0;
        self.fallback_warned = false;
        self.order = match &self.feed {
            Some(feed) => (0..feed.len()).collect(),
            None => Vec::new(),
        };
        if self.feed_order == FeedOrder::Shuffled {
            self.order.shuffle(&mut self.rng);
        }
    }

    pub fn is_replaying(&self) -> bool {
        self.feed.is_some()
    }

    /// Feed records not yet replayed this episode.
    pub fn remaining(&self) -> usize {
        self.order.len().saturating_sub(self.cursor)
    }

    /// Produce the event for `step_index`.
    pub fn next(&mut self, step_index: u64) -> GeneratedEvent {
        let Some(feed) = &self.feed else {
            return GeneratedEvent {
                event: self.synthetic(),
                origin: EventOrigin::Synthetic,
            };
        };

        let record = self
            .order
            .get(self.cursor)
            .and_then(|&index| feed.get(index).map(|record| (index, record)));
        match record {
            Some((index, record)) => {
                self.cursor += 1;
                GeneratedEvent {
                    event: ThreatEvent::from_record(record),
                    origin: EventOrigin::Replay { index },
                }
            }
            None => {
                if !self.fallback_warned {
                    warn!(
                        step = step_index,
                        feed_len = feed.len(),
                        "intel feed exhausted, falling back to synthetic events"
                    );
                    self.fallback_warned = true;
                }
                GeneratedEvent {
                    event: self.synthetic(),
                    origin: EventOrigin::Fallback,
                }
            }
        }
    }

    /// Encode an event with the instance RNG.
    pub fn observe(&mut self, event: &ThreatEvent, step_index: u64) -> Observation {
        encode(event, step_index, &mut self.rng)
    }

    fn synthetic(&mut self) -> ThreatEvent {
        let is_threat = self.rng.gen::<f64>() < self.threat_probability;
        let kind = if is_threat {
            match &self.kinds {
                Some(dist) => ThreatKind::THREATS[dist.sample(&mut self.rng)],
                None => *ThreatKind::THREATS
                    .choose(&mut self.rng)
                    .unwrap_or(&ThreatKind::Malware),
            }
        } else {
            ThreatKind::Benign
        };
        let source = *ThreatSource::SYNTHETIC
            .choose(&mut self.rng)
            .unwrap_or(&ThreatSource::Unknown);
        let template = templates_for(kind)
            .choose(&mut self.rng)
            .copied()
            .unwrap_or("");
        let summary = fill_template(template, &mut self.rng);
        ThreatEvent::new(source, kind, summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intel::ThreatRecord;

    fn feed(kinds: &[&str]) -> IntelFeed {
        IntelFeed::new(
            kinds
                .iter()
                .map(|k| ThreatRecord::new("reddit", k, ""))
                .collect(),
        )
    }

    #[test]
    fn test_same_seed_same_events() {
        let config = EnvConfig::default();
        let mut a = ThreatGenerator::new(&config, 9).unwrap();
        let mut b = ThreatGenerator::new(&config, 9).unwrap();
        for step in 0..100 {
            assert_eq!(a.next(step), b.next(step));
        }
    }

    #[test]
    fn test_probability_extremes() {
        let mut all = ThreatGenerator::new(&EnvConfig::all_threats(), 1).unwrap();
        let mut none =
            ThreatGenerator::new(&EnvConfig::default().with_threat_probability(0.0), 1).unwrap();
        for step in 0..200 {
            let threat = all.next(step);
            assert!(threat.event.is_threat);
            assert_eq!(threat.origin, EventOrigin::Synthetic);
            let benign = none.next(step);
            assert_eq!(benign.event.kind, ThreatKind::Benign);
            assert!(!benign.event.is_threat);
        }
    }

    #[test]
    fn test_templates_are_fully_filled() {
        let mut gen = ThreatGenerator::new(&EnvConfig::default(), 3).unwrap();
        for step in 0..300 {
            let event = gen.next(step).event;
            assert!(!event.summary.contains('{'), "unfilled: {}", event.summary);
            assert!(!event.summary.is_empty());
        }
    }

    #[test]
    fn test_kind_weights_restrict_kinds() {
        let weights = BTreeMap::from([(ThreatKind::Ddos, 1.0), (ThreatKind::Xss, 0.0)]);
        let config = EnvConfig::all_threats().with_kind_weights(weights);
        let mut gen = ThreatGenerator::new(&config, 5).unwrap();
        for step in 0..50 {
            assert_eq!(gen.next(step).event.kind, ThreatKind::Ddos);
        }
    }

    #[test]
    fn test_kind_weights_reject_non_threat_kind() {
        let weights = BTreeMap::from([(ThreatKind::Benign, 1.0)]);
        assert!(kind_distribution(&weights).is_err());
        assert!(kind_distribution(&BTreeMap::new()).is_err());
    }

    #[test]
    fn test_fixed_replay_then_fallback() {
        let config = EnvConfig::default().with_intel_feed(feed(&["phishing", "benign"]));
        let mut gen = ThreatGenerator::new(&config, 0).unwrap();

        let first = gen.next(0);
        assert_eq!(first.origin, EventOrigin::Replay { index: 0 });
        assert_eq!(first.event.kind, ThreatKind::Phishing);
        let second = gen.next(1);
        assert_eq!(second.origin, EventOrigin::Replay { index: 1 });
        assert!(!second.event.is_threat);
        assert_eq!(gen.remaining(), 0);

        for step in 2..6 {
            assert_eq!(gen.next(step).origin, EventOrigin::Fallback);
        }

        gen.reseed(1);
        assert_eq!(gen.next(0).origin, EventOrigin::Replay { index: 0 });
    }

    #[test]
    fn test_empty_feed_falls_back_immediately() {
        let config = EnvConfig::default().with_intel_feed(IntelFeed::new(Vec::new()));
        let mut gen = ThreatGenerator::new(&config, 0).unwrap();
        assert!(gen.is_replaying());
        assert_eq!(gen.next(0).origin, EventOrigin::Fallback);
    }

    #[test]
    fn test_shuffled_replay_is_a_permutation() {
        let kinds = ["phishing", "malware", "ddos", "xss", "apt", "benign", "ransomware"];
        let config = EnvConfig::default()
            .with_intel_feed(feed(&kinds))
            .with_feed_order(FeedOrder::Shuffled);
        let mut gen = ThreatGenerator::new(&config, 17).unwrap();

        let mut seen: Vec<usize> = (0..kinds.len() as u64)
            .map(|step| match gen.next(step).origin {
                EventOrigin::Replay { index } => index,
                other => panic!("unexpected origin {other:?}"),
            })
            .collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..kinds.len()).collect::<Vec<_>>());

        let mut again = ThreatGenerator::new(&config, 17).unwrap();
        let mut other = ThreatGenerator::new(&config, 17).unwrap();
        assert_eq!(again.next(0), other.next(0));
    }
}
