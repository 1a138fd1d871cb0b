// src/rl/observation.rs
//
// Feature encoder: ThreatEvent -> fixed-length Observation.
//
// The observation never carries severity or the ground-truth label; the
// policy has to infer threat presence from coarse network features:
// - source/destination address, reduced to the leading octet
// - protocol (port) number from a static table
// - packet size scaled by severity with multiplicative jitter
//
// All randomness comes from the caller's RNG, so a seeded RNG reproduces
// observations bit-for-bit.

use std::net::Ipv4Addr;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::event::{ThreatEvent, ThreatKind, ThreatSource};
use crate::intel::ThreatRecord;

/// Current observation schema version.
/// Increment when adding/removing/changing fields.
pub const OBS_VERSION: u32 = 1;

/// Number of features in the flat observation vector.
pub const OBS_DIM: usize = 4;

/// Protocol sentinel for kinds without a known service port.
pub const UNKNOWN_PROTOCOL: u16 = 0;

/// Packet size bounds (bytes).
pub const MIN_PACKET_SIZE: u32 = 64;
pub const MAX_PACKET_SIZE: u32 = 9000;

/// Multiplicative jitter applied to packet sizes.
const PACKET_JITTER: (f64, f64) = (0.8, 1.2);

/// IPv4 CIDR block used to partition the address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cidr {
    base: u32,
    prefix: u8,
}

impl Cidr {
    pub const fn new(a: u8, b: u8, c: u8, d: u8, prefix: u8) -> Self {
        let raw = u32::from_be_bytes([a, b, c, d]);
        let mask = if prefix == 0 {
            0
        } else {
            u32::MAX << (32 - prefix as u32)
        };
        Self {
            base: raw & mask,
            prefix,
        }
    }

    fn size(&self) -> u64 {
        1u64 << (32 - self.prefix as u32)
    }

    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        let addr = u32::from(addr) as u64;
        let base = self.base as u64;
        addr >= base && addr - base < self.size()
    }

    /// Uniformly sample a host address.
    ///
    /// Network and broadcast addresses are excluded for blocks larger
    /// than /31.
    pub fn sample_host<R: Rng + ?Sized>(&self, rng: &mut R) -> Ipv4Addr {
        let size = self.size();
        let offset = if size > 2 {
            rng.gen_range(1..size - 1)
        } else {
            rng.gen_range(0..size)
        };
        Ipv4Addr::from((self.base as u64 + offset) as u32)
    }
}

/// Address range for each event source.
pub fn source_range(source: ThreatSource) -> Cidr {
    match source {
        ThreatSource::SocialMedia => Cidr::new(10, 0, 0, 0, 8),
        ThreatSource::ExternalFeed => Cidr::new(172, 16, 0, 0, 12),
        ThreatSource::CodeRepository => Cidr::new(192, 168, 0, 0, 16),
        ThreatSource::DarkWeb => Cidr::new(10, 10, 0, 0, 16),
        ThreatSource::EndpointSensor => Cidr::new(192, 168, 10, 0, 24),
        ThreatSource::EmailFilter => Cidr::new(172, 20, 0, 0, 16),
        ThreatSource::NetworkMonitor => Cidr::new(10, 20, 0, 0, 16),
        ThreatSource::Unknown => Cidr::new(0, 0, 0, 0, 0),
    }
}

const USER_SEGMENT: Cidr = Cidr::new(192, 168, 1, 0, 24);
const SERVER_SEGMENT: Cidr = Cidr::new(10, 0, 0, 0, 8);
const INFRA_SEGMENT: Cidr = Cidr::new(172, 16, 0, 0, 12);
const INTERNAL_SEGMENTS: [Cidr; 3] = [USER_SEGMENT, SERVER_SEGMENT, INFRA_SEGMENT];

/// Destination segment targeted by each kind; `None` means any internal segment.
pub fn destination_range(kind: ThreatKind) -> Option<Cidr> {
    match kind {
        ThreatKind::Phishing | ThreatKind::Malware | ThreatKind::Ransomware => Some(USER_SEGMENT),
        ThreatKind::BruteForce | ThreatKind::SqlInjection => Some(SERVER_SEGMENT),
        ThreatKind::Ddos | ThreatKind::Apt => Some(INFRA_SEGMENT),
        _ => None,
    }
}

/// Service port associated with each kind.
pub fn protocol_for(kind: ThreatKind) -> u16 {
    match kind {
        ThreatKind::Phishing | ThreatKind::Xss => 80,
        ThreatKind::Malware
        | ThreatKind::Ransomware
        | ThreatKind::DataExfiltration
        | ThreatKind::Apt
        | ThreatKind::ZeroDay
        | ThreatKind::Benign => 443,
        ThreatKind::BruteForce => 22,
        ThreatKind::Ddos => 53,
        ThreatKind::SqlInjection => 3306,
        ThreatKind::CredentialTheft => 3389,
        ThreatKind::Unknown => UNKNOWN_PROTOCOL,
    }
}

/// Base packet size (bytes) before severity scaling and jitter.
pub fn base_packet_size(kind: ThreatKind) -> u32 {
    match kind {
        ThreatKind::Phishing => 1500,
        ThreatKind::Malware => 2000,
        ThreatKind::Ransomware => 2500,
        ThreatKind::DataExfiltration => 3000,
        ThreatKind::BruteForce => 100,
        ThreatKind::Ddos => 500,
        ThreatKind::SqlInjection => 800,
        ThreatKind::Xss => 1200,
        ThreatKind::CredentialTheft => 1000,
        ThreatKind::Apt => 3500,
        ThreatKind::ZeroDay => 4000,
        ThreatKind::Benign | ThreatKind::Unknown => 1000,
    }
}

/// Packet size scaled by `0.5 + severity`, jittered ±20%, clamped to link bounds.
pub fn sample_packet_size<R: Rng + ?Sized>(kind: ThreatKind, severity: f64, rng: &mut R) -> u32 {
    let adjusted = (base_packet_size(kind) as f64 * (0.5 + severity)).trunc();
    let variation: f64 = rng.gen_range(PACKET_JITTER.0..PACKET_JITTER.1);
    let size = (adjusted * variation).trunc() as u32;
    size.clamp(MIN_PACKET_SIZE, MAX_PACKET_SIZE)
}

fn leading_octet(addr: Ipv4Addr) -> u8 {
    addr.octets()[0]
}

/// Observation handed to a policy for one event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Observation {
    /// Schema version for forwards/backwards compatibility.
    pub obs_version: u32,
    /// Step index within the episode this observation belongs to.
    pub step_index: u64,
    /// Leading octet of the sampled source address.
    pub source_octet: f32,
    /// Leading octet of the sampled destination address.
    pub dest_octet: f32,
    /// Service port number (0 if unknown).
    pub protocol: f32,
    /// Packet size in bytes.
    pub packet_size: f32,
}

impl Observation {
    /// Flat feature vector `[source_octet, dest_octet, protocol, packet_size]`.
    pub fn features(&self) -> [f32; OBS_DIM] {
        [
            self.source_octet,
            self.dest_octet,
            self.protocol,
            self.packet_size,
        ]
    }

    /// Serialize to canonical JSON bytes for byte-level comparisons.
    pub fn to_canonical_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// Encode one event.
///
/// Draw order is fixed (source, destination, packet size) so a seeded RNG
/// yields identical observations.
pub fn encode<R: Rng + ?Sized>(event: &ThreatEvent, step_index: u64, rng: &mut R) -> Observation {
    let src = source_range(event.source).sample_host(rng);
    let dst_range = match destination_range(event.kind) {
        Some(range) => range,
        None => *INTERNAL_SEGMENTS.choose(rng).unwrap_or(&USER_SEGMENT),
    };
    let dst = dst_range.sample_host(rng);
    let packet_size = sample_packet_size(event.kind, event.severity, rng);

    Observation {
        obs_version: OBS_VERSION,
        step_index,
        source_octet: leading_octet(src) as f32,
        dest_octet: leading_octet(dst) as f32,
        protocol: protocol_for(event.kind) as f32,
        packet_size: packet_size as f32,
    }
}

/// Encode a batch of interchange records into flat state vectors.
pub fn encode_records<R: Rng + ?Sized>(
    records: &[ThreatRecord],
    rng: &mut R,
) -> Vec<[f32; OBS_DIM]> {
    records
        .iter()
        .enumerate()
        .map(|(i, record)| encode(&ThreatEvent::from_record(record), i as u64, rng).features())
        .collect()
}

/// `encode_records` with the ground-truth label (1.0 threat, 0.0 benign)
/// appended as a fifth column, for offline datasets.
///
/// Draws the same rng sequence as `encode_records`, so the feature columns
/// match for the same seed.
pub fn encode_labelled_records<R: Rng + ?Sized>(
    records: &[ThreatRecord],
    rng: &mut R,
) -> Vec<[f32; OBS_DIM + 1]> {
    records
        .iter()
        .enumerate()
        .map(|(i, record)| {
            let event = ThreatEvent::from_record(record);
            let [a, b, c, d] = encode(&event, i as u64, rng).features();
            [a, b, c, d, if event.is_threat { 1.0 } else { 0.0 }]
        })
        .collect()
}
