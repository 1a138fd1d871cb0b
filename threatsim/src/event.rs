// src/event.rs
//
// Threat taxonomy and the semantic event produced each step.
//
// Ground truth is derived here and nowhere else: severity is a pure
// function of (kind, summary) and is_threat is `severity > 0.3`. Random
// draws (addresses, packet sizes) happen in the feature encoder and never
// feed back into the label.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::intel::ThreatRecord;

/// Severity above which an event counts as a threat.
pub const THREAT_SEVERITY_THRESHOLD: f64 = 0.3;

/// Coarse severity tiers shared with the collectors' interchange format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeverityLevel {
    Critical,
    High,
    Medium,
    Low,
    Info,
}

impl SeverityLevel {
    pub fn score(self) -> f64 {
        match self {
            SeverityLevel::Critical => 1.0,
            SeverityLevel::High => 0.8,
            SeverityLevel::Medium => 0.6,
            SeverityLevel::Low => 0.4,
            SeverityLevel::Info => 0.2,
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "critical" => Some(SeverityLevel::Critical),
            "high" => Some(SeverityLevel::High),
            "medium" => Some(SeverityLevel::Medium),
            "low" => Some(SeverityLevel::Low),
            "info" => Some(SeverityLevel::Info),
            _ => None,
        }
    }
}

/// Origin of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreatSource {
    EndpointSensor,
    EmailFilter,
    NetworkMonitor,
    ExternalFeed,
    DarkWeb,
    SocialMedia,
    CodeRepository,
    Unknown,
}

impl ThreatSource {
    /// Sources the synthetic generator draws from.
    pub const SYNTHETIC: [ThreatSource; 7] = [
        ThreatSource::EndpointSensor,
        ThreatSource::EmailFilter,
        ThreatSource::NetworkMonitor,
        ThreatSource::ExternalFeed,
        ThreatSource::DarkWeb,
        ThreatSource::SocialMedia,
        ThreatSource::CodeRepository,
    ];

    /// Parse a collector source name. Unrecognised names map to `Unknown`.
    pub fn parse(raw: &str) -> Self {
        match normalize_label(raw).as_str() {
            "endpoint" | "endpoint_sensor" | "edr" => ThreatSource::EndpointSensor,
            "email" | "email_filter" | "mail" => ThreatSource::EmailFilter,
            "network" | "network_monitor" | "ids" | "netflow" => ThreatSource::NetworkMonitor,
            // Twitter shares the 172.16.0.0/12 range with the external feeds.
            "external_feed" | "feed" | "intel" | "nvd" | "cve" | "twitter" => {
                ThreatSource::ExternalFeed
            }
            "darkweb" | "dark_web" | "dark_web_feed" => ThreatSource::DarkWeb,
            "social_media" | "social" | "reddit" => ThreatSource::SocialMedia,
            "github" | "code_repository" | "repository" => ThreatSource::CodeRepository,
            _ => ThreatSource::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ThreatSource::EndpointSensor => "endpoint_sensor",
            ThreatSource::EmailFilter => "email_filter",
            ThreatSource::NetworkMonitor => "network_monitor",
            ThreatSource::ExternalFeed => "external_feed",
            ThreatSource::DarkWeb => "dark_web",
            ThreatSource::SocialMedia => "social_media",
            ThreatSource::CodeRepository => "code_repository",
            ThreatSource::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ThreatSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Threat family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreatKind {
    Phishing,
    Malware,
    Ransomware,
    DataExfiltration,
    BruteForce,
    Ddos,
    SqlInjection,
    Xss,
    CredentialTheft,
    Apt,
    ZeroDay,
    Benign,
    Unknown,
}

impl ThreatKind {
    /// Kinds that represent an actual attack (everything except Benign/Unknown).
    pub const THREATS: [ThreatKind; 11] = [
        ThreatKind::Phishing,
        ThreatKind::Malware,
        ThreatKind::Ransomware,
        ThreatKind::DataExfiltration,
        ThreatKind::BruteForce,
        ThreatKind::Ddos,
        ThreatKind::SqlInjection,
        ThreatKind::Xss,
        ThreatKind::CredentialTheft,
        ThreatKind::Apt,
        ThreatKind::ZeroDay,
    ];

    /// Parse a collector `type` label. Case, `-`, and spaces are ignored.
    pub fn parse(raw: &str) -> Self {
        match normalize_label(raw).as_str() {
            "phishing" => ThreatKind::Phishing,
            "malware" => ThreatKind::Malware,
            "ransomware" => ThreatKind::Ransomware,
            "data_exfiltration" | "exfiltration" => ThreatKind::DataExfiltration,
            "brute_force" | "bruteforce" => ThreatKind::BruteForce,
            "ddos" | "dos" => ThreatKind::Ddos,
            "sql_injection" | "sqli" => ThreatKind::SqlInjection,
            "xss" | "cross_site_scripting" => ThreatKind::Xss,
            "credential_theft" => ThreatKind::CredentialTheft,
            "apt" => ThreatKind::Apt,
            "zero_day" | "zeroday" | "0day" => ThreatKind::ZeroDay,
            "benign" | "normal" => ThreatKind::Benign,
            _ => ThreatKind::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ThreatKind::Phishing => "phishing",
            ThreatKind::Malware => "malware",
            ThreatKind::Ransomware => "ransomware",
            ThreatKind::DataExfiltration => "data_exfiltration",
            ThreatKind::BruteForce => "brute_force",
            ThreatKind::Ddos => "ddos",
            ThreatKind::SqlInjection => "sql_injection",
            ThreatKind::Xss => "xss",
            ThreatKind::CredentialTheft => "credential_theft",
            ThreatKind::Apt => "apt",
            ThreatKind::ZeroDay => "zero_day",
            ThreatKind::Benign => "benign",
            ThreatKind::Unknown => "unknown",
        }
    }

    /// Severity tier implied by the kind alone; `None` for ambiguous kinds.
    pub fn severity_tier(self) -> Option<SeverityLevel> {
        match self {
            ThreatKind::Apt | ThreatKind::Ransomware | ThreatKind::ZeroDay => {
                Some(SeverityLevel::Critical)
            }
            ThreatKind::Malware | ThreatKind::DataExfiltration | ThreatKind::CredentialTheft => {
                Some(SeverityLevel::High)
            }
            ThreatKind::Phishing | ThreatKind::BruteForce | ThreatKind::SqlInjection => {
                Some(SeverityLevel::Medium)
            }
            ThreatKind::Ddos | ThreatKind::Xss => Some(SeverityLevel::Low),
            ThreatKind::Benign => Some(SeverityLevel::Info),
            ThreatKind::Unknown => None,
        }
    }
}

impl fmt::Display for ThreatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn normalize_label(raw: &str) -> String {
    raw.trim()
        .to_ascii_lowercase()
        .chars()
        .map(|c| if c == '-' || c == ' ' { '_' } else { c })
        .collect()
}

/// Keyword tiers consulted, in order, when the kind is ambiguous.
const SEVERITY_KEYWORDS: [(SeverityLevel, &[&str]); 4] = [
    (
        SeverityLevel::Critical,
        &["critical", "emergency", "immediate", "severe", "exploit", "zero-day"],
    ),
    (
        SeverityLevel::High,
        &["high", "urgent", "important", "significant", "breach", "compromise"],
    ),
    (
        SeverityLevel::Medium,
        &["medium", "moderate", "potential", "suspicious", "anomaly"],
    ),
    (SeverityLevel::Low, &["low", "minor", "possible", "unusual"]),
];

/// Severity in [0, 1] from kind, refined by summary keywords when the kind
/// does not decide it. Defaults to medium.
pub fn infer_severity(kind: ThreatKind, summary: &str) -> f64 {
    if let Some(tier) = kind.severity_tier() {
        return tier.score();
    }

    let summary = summary.to_lowercase();
    SEVERITY_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|kw| summary.contains(kw)))
        .map(|(tier, _)| tier.score())
        .unwrap_or_else(|| SeverityLevel::Medium.score())
}

/// Semantic unit produced by the generator each step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreatEvent {
    pub source: ThreatSource,
    pub kind: ThreatKind,
    /// Free text; only used for severity inference.
    pub summary: String,
    /// Derived severity in [0, 1].
    pub severity: f64,
    /// Ground truth: `severity > THREAT_SEVERITY_THRESHOLD`.
    pub is_threat: bool,
    /// Severity declared by an external collector, kept for diagnostics only.
    pub reported_severity: Option<SeverityLevel>,
}

impl ThreatEvent {
    pub fn new(source: ThreatSource, kind: ThreatKind, summary: impl Into<String>) -> Self {
        let summary = summary.into();
        let severity = infer_severity(kind, &summary);
        Self {
            source,
            kind,
            summary,
            severity,
            is_threat: severity > THREAT_SEVERITY_THRESHOLD,
            reported_severity: None,
        }
    }

    /// Build an event from an interchange record.
    pub fn from_record(record: &ThreatRecord) -> Self {
        let mut event = Self::new(
            ThreatSource::parse(&record.source),
            ThreatKind::parse(&record.kind),
            record.summary.clone(),
        );
        event.reported_severity = record.severity;
        event
    }
}
