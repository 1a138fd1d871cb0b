// src/intel.rs
//
// Threat record interchange format and the replayable intel feed.
//
// Records arrive from external collectors as JSON objects shaped like:
//   {"source": "...", "type": "...", "summary": "...", "date": "YYYY-MM-DD",
//    "severity": "critical|high|medium|low|info"}
//
// Missing or null fields resolve to documented defaults instead of failing
// the whole feed. A feed is loaded once and shared read-only between
// environment instances.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::error::FeedError;
use crate::event::SeverityLevel;

/// Placeholder used for missing `source` / `type` fields.
pub const UNKNOWN_FIELD: &str = "unknown";

fn unknown_field() -> String {
    UNKNOWN_FIELD.to_string()
}

fn string_or_unknown<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(unknown_field))
}

fn string_or_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.unwrap_or_default())
}

fn lenient_severity<'de, D>(deserializer: D) -> Result<Option<SeverityLevel>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(SeverityLevel::parse))
}

/// One threat record as produced by the intelligence collectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreatRecord {
    /// Collector / feed the record came from (e.g. "reddit", "nvd").
    #[serde(default = "unknown_field", deserialize_with = "string_or_unknown")]
    pub source: String,
    /// Threat family label (e.g. "phishing", "zero-day").
    #[serde(
        rename = "type",
        default = "unknown_field",
        deserialize_with = "string_or_unknown"
    )]
    pub kind: String,
    /// Free-text description.
    #[serde(default, deserialize_with = "string_or_empty")]
    pub summary: String,
    /// ISO-8601 date string as reported by the collector.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    /// Severity label declared by the collector, if any.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_severity"
    )]
    pub severity: Option<SeverityLevel>,
}

impl ThreatRecord {
    pub fn new(source: &str, kind: &str, summary: &str) -> Self {
        Self {
            source: source.to_string(),
            kind: kind.to_string(),
            summary: summary.to_string(),
            date: None,
            severity: None,
        }
    }

    pub fn with_date(mut self, date: &str) -> Self {
        self.date = Some(date.to_string());
        self
    }

    pub fn with_severity(mut self, severity: SeverityLevel) -> Self {
        self.severity = Some(severity);
        self
    }
}

/// Immutable, cheaply clonable sequence of threat records.
#[derive(Debug, Clone, PartialEq)]
pub struct IntelFeed {
    records: Arc<[ThreatRecord]>,
}

impl IntelFeed {
    pub fn new(records: Vec<ThreatRecord>) -> Self {
        Self {
            records: records.into(),
        }
    }

    /// Parse a JSON array of records.
    ///
    /// Array elements that are not record-shaped are skipped with a warning;
    /// a document that is not an array is an error.
    pub fn from_json_str(json: &str) -> Result<Self, FeedError> {
        let value: JsonValue =
            serde_json::from_str(json).map_err(|e| FeedError::Parse(e.to_string()))?;
        let JsonValue::Array(items) = value else {
            return Err(FeedError::Parse("top-level value is not an array".to_string()));
        };

        let mut records = Vec::with_capacity(items.len());
        for (idx, item) in items.into_iter().enumerate() {
            match serde_json::from_value::<ThreatRecord>(item) {
                Ok(record) => records.push(record),
                Err(e) => warn!(index = idx, error = %e, "skipping malformed threat record"),
            }
        }
        Ok(Self::new(records))
    }

    /// Load a feed from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, FeedError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|e| FeedError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_json_str(&raw)
    }

    /// Load the most recent `threats_*.json` file in `dir`.
    ///
    /// Collector output files carry a `YYYYmmdd_HHMMSS` timestamp, so the
    /// lexicographically greatest name is the newest.
    pub fn load_latest(dir: impl AsRef<Path>) -> Result<Self, FeedError> {
        let dir = dir.as_ref();
        let entries = fs::read_dir(dir).map_err(|e| FeedError::Io {
            path: dir.display().to_string(),
            message: e.to_string(),
        })?;

        let latest: Option<PathBuf> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .map(|name| name.starts_with("threats_") && name.ends_with(".json"))
                    .unwrap_or(false)
            })
            .max();

        match latest {
            Some(path) => Self::load(path),
            None => Err(FeedError::NoFeedFiles(dir.display().to_string())),
        }
    }

    /// Load from a JSON file, or the newest feed file when `path` is a
    /// directory.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, FeedError> {
        let path = path.as_ref();
        if path.is_dir() {
            Self::load_latest(path)
        } else {
            Self::load(path)
        }
    }

    /// `open`, but a missing or malformed feed is logged and yields `None`
    /// so callers continue on synthetic events.
    pub fn open_or_warn(path: impl AsRef<Path>) -> Option<Self> {
        let path = path.as_ref();
        match Self::open(path) {
            Ok(feed) => Some(feed),
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "could not load intel feed; using synthetic events"
                );
                None
            }
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ThreatRecord> {
        self.records.get(index)
    }

    pub fn records(&self) -> &[ThreatRecord] {
        &self.records
    }

    /// SHA-256 of the canonical JSON encoding, hex encoded.
    ///
    /// Identifies which feed an evaluation run replayed.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        for record in self.records.iter() {
            // Serializing a plain struct of strings cannot fail.
            if let Ok(bytes) = serde_json::to_vec(record) {
                hasher.update(&bytes);
            }
            hasher.update(b"\n");
        }
        format!("{:x}", hasher.finalize())
    }
}

impl From<Vec<ThreatRecord>> for IntelFeed {
    fn from(records: Vec<ThreatRecord>) -> Self {
        Self::new(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_full_record() {
        let json = r#"[{"source": "reddit", "type": "phishing",
            "summary": "Attempted S3 credential theft", "date": "2025-04-05",
            "severity": "high"}]"#;
        let feed = IntelFeed::from_json_str(json).unwrap();
        assert_eq!(feed.len(), 1);

        let record = feed.get(0).unwrap();
        assert_eq!(record.source, "reddit");
        assert_eq!(record.kind, "phishing");
        assert_eq!(record.date.as_deref(), Some("2025-04-05"));
        assert_eq!(record.severity, Some(SeverityLevel::High));
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let json = r#"[{"summary": "something odd"}, {"source": null, "type": ""}]"#;
        let feed = IntelFeed::from_json_str(json).unwrap();
        assert_eq!(feed.len(), 2);
        for record in feed.records() {
            assert_eq!(record.source, UNKNOWN_FIELD);
            assert_eq!(record.kind, UNKNOWN_FIELD);
            assert!(record.date.is_none());
        }
        assert_eq!(feed.get(1).unwrap().summary, "");
    }

    #[test]
    fn test_unrecognised_severity_is_dropped() {
        let json = r#"[{"type": "malware", "severity": "apocalyptic"}]"#;
        let feed = IntelFeed::from_json_str(json).unwrap();
        assert_eq!(feed.get(0).unwrap().severity, None);
    }

    #[test]
    fn test_malformed_elements_are_skipped() {
        let json = r#"[42, {"type": "ddos"}, "nope", {"type": 7}]"#;
        let feed = IntelFeed::from_json_str(json).unwrap();
        assert_eq!(feed.len(), 1);
        assert_eq!(feed.get(0).unwrap().kind, "ddos");
    }

    #[test]
    fn test_non_array_document_is_error() {
        assert!(matches!(
            IntelFeed::from_json_str(r#"{"type": "ddos"}"#),
            Err(FeedError::Parse(_))
        ));
        assert!(matches!(
            IntelFeed::from_json_str("not json"),
            Err(FeedError::Parse(_))
        ));
    }

    #[test]
    fn test_load_latest_picks_newest_file() {
        let dir = tempfile::tempdir().unwrap();
        let older = dir.path().join("threats_20250101_000000.json");
        let newer = dir.path().join("threats_20250301_120000.json");
        let unrelated = dir.path().join("notes.json");

        fs::write(&older, r#"[{"type": "xss"}]"#).unwrap();
        let mut f = fs::File::create(&newer).unwrap();
        f.write_all(br#"[{"type": "apt"}, {"type": "ddos"}]"#).unwrap();
        fs::write(&unrelated, r#"[]"#).unwrap();

        let feed = IntelFeed::load_latest(dir.path()).unwrap();
        assert_eq!(feed.len(), 2);
        assert_eq!(feed.get(0).unwrap().kind, "apt");
    }

    #[test]
    fn test_load_latest_without_files_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            IntelFeed::load_latest(dir.path()),
            Err(FeedError::NoFeedFiles(_))
        ));
    }

    #[test]
    fn test_digest_is_stable_and_content_sensitive() {
        let a = IntelFeed::new(vec![ThreatRecord::new("reddit", "phishing", "x")]);
        let b = IntelFeed::new(vec![ThreatRecord::new("reddit", "phishing", "x")]);
        let c = IntelFeed::new(vec![ThreatRecord::new("reddit", "malware", "x")]);
        assert_eq!(a.digest(), b.digest());
        assert_ne!(a.digest(), c.digest());
        assert_eq!(a.digest().len(), 64);
    }

    #[test]
    fn test_clone_shares_records() {
        let feed = IntelFeed::new(vec![ThreatRecord::new("github", "xss", "")]);
        let clone = feed.clone();
        assert!(std::ptr::eq(feed.records(), clone.records()));
    }
}
