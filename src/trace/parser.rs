//! Parsing of raw per-rank trace records.
//!
//! The tracer writes one JSON document per rank. Field names on the wire
//! follow the tracer (`n_procs`, `tx_bytes`, ...) and are mapped onto
//! [`TraceRecord`] here, after which every structural rule is checked so the
//! aggregation state never sees a record it cannot fold.

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

use super::types::*;
use crate::aggregate::AggregationError;

/// Match: "<non-digit><RANK>.json" at the end of a member name
pub static RANK_HINT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|\D)(\d+)\.json$").expect("Invalid rank hint regex"));

/// The tracer stores process counts and ranks as C `int`s
pub const MAX_PROCESS_COUNT: i64 = i32::MAX as i64;

#[derive(Debug, Deserialize)]
struct WireSizeFrequency {
    message_size: u64,
    frequency: u64,
}

#[derive(Debug, Deserialize)]
struct WirePhase {
    tx_bytes: Vec<u64>,
    tx_messages: Vec<u64>,
    tx_message_sizes: Vec<WireSizeFrequency>,
}

#[derive(Debug, Deserialize)]
struct WireTrace {
    n_procs: i64,
    rank: i64,
    #[serde(default)]
    n_phases: Option<u64>,
    phases: Vec<WirePhase>,
    #[serde(default)]
    processor_name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    n_events: Option<u64>,
    #[serde(default)]
    duration: Option<f64>,
}

fn malformed(record: &str, reason: impl Into<String>) -> AggregationError {
    AggregationError::MalformedRecord {
        record: record.to_string(),
        reason: reason.into(),
    }
}

/// Parse a record source yielded by an archive
pub fn parse_record(source: &RecordSource) -> Result<TraceRecord, AggregationError> {
    parse_record_bytes(&source.name, &source.bytes)
}

/// Parse the raw JSON bytes of one rank's trace
pub fn parse_record_bytes(name: &str, bytes: &[u8]) -> Result<TraceRecord, AggregationError> {
    let wire: WireTrace =
        serde_json::from_slice(bytes).map_err(|e| malformed(name, e.to_string()))?;
    validate(name, wire)
}

/// Parse a record that has already been decoded into a JSON value
pub fn parse_record_value(
    name: &str,
    value: serde_json::Value,
) -> Result<TraceRecord, AggregationError> {
    let wire: WireTrace =
        serde_json::from_value(value).map_err(|e| malformed(name, e.to_string()))?;
    validate(name, wire)
}

fn validate(name: &str, wire: WireTrace) -> Result<TraceRecord, AggregationError> {
    if wire.n_procs <= 0 {
        return Err(malformed(
            name,
            format!("n_procs must be positive, got {}", wire.n_procs),
        ));
    }
    if wire.n_procs > MAX_PROCESS_COUNT {
        return Err(malformed(
            name,
            format!(
                "n_procs {} exceeds the tracer limit of {}",
                wire.n_procs, MAX_PROCESS_COUNT
            ),
        ));
    }
    let process_count = wire.n_procs as usize;

    if wire.rank < 0 || wire.rank >= wire.n_procs {
        return Err(malformed(
            name,
            format!("rank {} is outside [0, {})", wire.rank, process_count),
        ));
    }
    let rank = wire.rank as Rank;

    if let Some(n_phases) = wire.n_phases {
        if n_phases != wire.phases.len() as u64 {
            return Err(malformed(
                name,
                format!(
                    "n_phases is {} but {} phases are listed",
                    n_phases,
                    wire.phases.len()
                ),
            ));
        }
    }

    let mut phases = Vec::with_capacity(wire.phases.len());
    for (index, phase) in wire.phases.into_iter().enumerate() {
        if phase.tx_bytes.len() != process_count {
            return Err(malformed(
                name,
                format!(
                    "phase {}: tx_bytes has {} entries, expected {}",
                    index,
                    phase.tx_bytes.len(),
                    process_count
                ),
            ));
        }
        if phase.tx_messages.len() != process_count {
            return Err(malformed(
                name,
                format!(
                    "phase {}: tx_messages has {} entries, expected {}",
                    index,
                    phase.tx_messages.len(),
                    process_count
                ),
            ));
        }

        phases.push(PhaseTrace {
            sent_bytes_by_destination: phase.tx_bytes,
            sent_messages_by_destination: phase.tx_messages,
            sent_message_size_frequencies: phase
                .tx_message_sizes
                .into_iter()
                .map(|s| SizeFrequency {
                    message_size: s.message_size,
                    frequency: s.frequency,
                })
                .collect(),
        });
    }

    Ok(TraceRecord {
        process_count,
        rank,
        phases,
        metadata: RecordMetadata {
            processor_name: wire.processor_name,
            description: wire.description,
            n_events: wire.n_events,
            duration: wire.duration,
        },
    })
}
