//! Errors raised while parsing and folding trace records.

use crate::trace::Rank;

/// Errors that abort an aggregation run
#[derive(Debug, thiserror::Error)]
pub enum AggregationError {
    #[error("Malformed trace record {record}: {reason}")]
    MalformedRecord { record: String, reason: String },

    #[error(
        "Shape conflict in {record}: run has {expected_procs} processes and {expected_phases} phases, \
         record declares {found_procs} processes and {found_phases} phases"
    )]
    ShapeConflict {
        record: String,
        expected_procs: usize,
        expected_phases: usize,
        found_procs: usize,
        found_phases: usize,
    },

    #[error("Duplicate rank {rank} in {record}: rank already contributed to this run")]
    DuplicateRank { record: String, rank: Rank },

    #[error(
        "Run declared by {record} is too large: cannot allocate matrices for \
         {process_count} processes and {phase_count} phases"
    )]
    TooLarge {
        record: String,
        process_count: usize,
        phase_count: usize,
    },

    #[error("Aggregation state is sealed; no records can be folded after finalize")]
    Sealed,

    #[error("Incomplete run: {} of {process_count} ranks never reported ({})", .missing.len(), format_ranks(.missing))]
    IncompleteRun { process_count: usize, missing: Vec<Rank> },
}

/// Render a rank list compactly, truncating long lists
pub fn format_ranks(ranks: &[Rank]) -> String {
    const SHOWN: usize = 8;
    let shown: Vec<String> = ranks.iter().take(SHOWN).map(|r| r.to_string()).collect();
    if ranks.len() > SHOWN {
        format!("ranks {}, ... ({} more)", shown.join(", "), ranks.len() - SHOWN)
    } else {
        format!("ranks {}", shown.join(", "))
    }
}
