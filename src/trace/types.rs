//! Core data types for per-rank communication traces.

use serde::{Deserialize, Serialize};

/// Zero-based identity of one process in the traced run
pub type Rank = usize;

/// One (message size, occurrence count) pair of a sparse size distribution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeFrequency {
    pub message_size: u64,
    pub frequency: u64,
}

/// Traffic a single rank reported for one phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseTrace {
    /// Bytes sent to each destination rank (index = destination)
    pub sent_bytes_by_destination: Vec<u64>,
    /// Messages sent to each destination rank (index = destination)
    pub sent_messages_by_destination: Vec<u64>,
    pub sent_message_size_frequencies: Vec<SizeFrequency>,
}

/// Descriptive fields the tracer writes alongside the counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordMetadata {
    pub processor_name: Option<String>,
    pub description: Option<String>,
    pub n_events: Option<u64>,
    /// Wall time between tracer init and finalize, in seconds
    pub duration: Option<f64>,
}

/// One process's reported behavior for all phases of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceRecord {
    pub process_count: usize,
    pub rank: Rank,
    pub phases: Vec<PhaseTrace>,
    #[serde(default)]
    pub metadata: RecordMetadata,
}

impl TraceRecord {
    pub fn phase_count(&self) -> usize {
        self.phases.len()
    }
}

/// A raw, not yet parsed record as yielded by a trace archive
#[derive(Debug, Clone)]
pub struct RecordSource {
    /// Archive member name or file path, used in diagnostics
    pub name: String,
    pub bytes: Vec<u8>,
    /// Rank encoded in the member name, if any
    pub rank_hint: Option<Rank>,
}

impl RecordSource {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let name = name.into();
        let rank_hint = rank_hint_from_name(&name);
        Self {
            name,
            bytes,
            rank_hint,
        }
    }
}

/// Extract the rank from member names like `oxton-result12.json`
pub fn rank_hint_from_name(name: &str) -> Option<Rank> {
    let caps = super::parser::RANK_HINT.captures(name)?;
    caps.get(1)?.as_str().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_hint_from_name() {
        assert_eq!(rank_hint_from_name("oxton-result12.json"), Some(12));
        assert_eq!(rank_hint_from_name("run/trace-0.json"), Some(0));
        assert_eq!(rank_hint_from_name("summary.json"), None);
        assert_eq!(rank_hint_from_name("rank3/summary.json"), None);
        assert_eq!(rank_hint_from_name("traces/7.json"), Some(7));
    }
}
