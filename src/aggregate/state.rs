//! Per-phase aggregation of trace records.
//!
//! [`AggregationState`] learns the run's shape (process count, phase count)
//! from the first record it sees and checks every later record against it.
//! Matrix rows are owned by exactly one rank; the message size histogram is
//! merged additively, so the final result does not depend on record order.

use std::collections::{BTreeMap, BTreeSet};

use log::debug;

use super::error::AggregationError;
use super::matrix::RankMatrix;
use crate::trace::{Rank, RecordMetadata, TraceRecord};

/// Accumulated matrices and size histogram for one phase
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseAggregate {
    traffic_matrix: RankMatrix,
    message_matrix: RankMatrix,
    size_histogram: BTreeMap<u64, u64>,
}

impl PhaseAggregate {
    fn new(process_count: usize) -> Option<Self> {
        Some(Self {
            traffic_matrix: RankMatrix::zeros(process_count)?,
            message_matrix: RankMatrix::zeros(process_count)?,
            size_histogram: BTreeMap::new(),
        })
    }

    /// Bytes sent, row = sender, column = destination
    pub fn traffic_matrix(&self) -> &RankMatrix {
        &self.traffic_matrix
    }

    /// Message counts, same indexing as the traffic matrix
    pub fn message_matrix(&self) -> &RankMatrix {
        &self.message_matrix
    }

    /// Message size in bytes -> occurrences across all ranks
    pub fn size_histogram(&self) -> &BTreeMap<u64, u64> {
        &self.size_histogram
    }

    /// Total messages counted in the size histogram
    pub fn histogram_total(&self) -> u64 {
        self.size_histogram
            .values()
            .fold(0u64, |acc, &v| acc.saturating_add(v))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Shape {
    process_count: usize,
    phase_count: usize,
}

/// Mutable aggregation state for one run
#[derive(Debug, Default)]
pub struct AggregationState {
    shape: Option<Shape>,
    phases: Vec<PhaseAggregate>,
    /// Ranks whose record has been folded
    reported: BTreeSet<Rank>,
    metadata: BTreeMap<Rank, RecordMetadata>,
    sealed: bool,
}

impl AggregationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process count, once known
    pub fn process_count(&self) -> Option<usize> {
        self.shape.map(|s| s.process_count)
    }

    /// Phase count, once known
    pub fn phase_count(&self) -> Option<usize> {
        self.shape.map(|s| s.phase_count)
    }

    /// Number of records folded so far
    pub fn records_folded(&self) -> usize {
        self.metadata.len()
    }

    /// Allocate zeroed aggregates for `phase_count` phases of `process_count` ranks.
    ///
    /// Repeating the call with the same dimensions is a no-op; different
    /// dimensions fail with [`AggregationError::ShapeConflict`].
    pub fn initialize(
        &mut self,
        process_count: usize,
        phase_count: usize,
    ) -> Result<(), AggregationError> {
        if self.sealed {
            return Err(AggregationError::Sealed);
        }
        let requested = Shape {
            process_count,
            phase_count,
        };
        match self.shape {
            Some(shape) if shape != requested => Err(shape_conflict("initialize", shape, requested)),
            Some(_) => Ok(()),
            None => self.allocate("initialize", requested),
        }
    }

    /// Build zeroed aggregates for `shape`, leaving the state untouched on failure
    fn allocate(&mut self, source: &str, shape: Shape) -> Result<(), AggregationError> {
        debug!(
            "Initializing aggregation for {} processes, {} phases",
            shape.process_count, shape.phase_count
        );
        let too_large = || AggregationError::TooLarge {
            record: source.to_string(),
            process_count: shape.process_count,
            phase_count: shape.phase_count,
        };

        let mut phases = Vec::new();
        phases
            .try_reserve_exact(shape.phase_count)
            .map_err(|_| too_large())?;
        for _ in 0..shape.phase_count {
            phases.push(PhaseAggregate::new(shape.process_count).ok_or_else(too_large)?);
        }

        self.phases = phases;
        self.reported.clear();
        self.shape = Some(shape);
        Ok(())
    }

    /// Fold a record, labelling diagnostics with its rank
    pub fn fold(&mut self, record: &TraceRecord) -> Result<(), AggregationError> {
        self.fold_source(&format!("record for rank {}", record.rank), record)
    }

    /// Fold a record, labelling diagnostics with `source` (usually the archive member name).
    ///
    /// All checks run before anything is written, so a rejected record
    /// leaves the aggregates untouched.
    pub fn fold_source(
        &mut self,
        source: &str,
        record: &TraceRecord,
    ) -> Result<(), AggregationError> {
        if self.sealed {
            return Err(AggregationError::Sealed);
        }
        check_record(source, record)?;

        let declared = Shape {
            process_count: record.process_count,
            phase_count: record.phase_count(),
        };
        if let Some(shape) = self.shape {
            if shape != declared {
                return Err(shape_conflict(source, shape, declared));
            }
        }

        if self.reported.contains(&record.rank) {
            return Err(AggregationError::DuplicateRank {
                record: source.to_string(),
                rank: record.rank,
            });
        }

        let merged = self.merge_histograms(source, record)?;
        if self.shape.is_none() {
            self.allocate(source, declared)?;
        }

        for ((aggregate, phase), counts) in self.phases.iter_mut().zip(&record.phases).zip(merged) {
            aggregate
                .traffic_matrix
                .set_row(record.rank, &phase.sent_bytes_by_destination);
            aggregate
                .message_matrix
                .set_row(record.rank, &phase.sent_messages_by_destination);
            aggregate.size_histogram.extend(counts);
        }
        self.reported.insert(record.rank);
        self.metadata.insert(record.rank, record.metadata.clone());

        debug!(
            "Folded {} (rank {}, {} phases)",
            source,
            record.rank,
            record.phase_count()
        );
        Ok(())
    }

    /// New histogram counts for every size the record touches, per phase.
    /// Fails if any count would overflow. Works before the state is allocated.
    fn merge_histograms(
        &self,
        source: &str,
        record: &TraceRecord,
    ) -> Result<Vec<BTreeMap<u64, u64>>, AggregationError> {
        let mut merged = Vec::with_capacity(record.phases.len());
        for (index, phase) in record.phases.iter().enumerate() {
            let existing = self.phases.get(index).map(|a| &a.size_histogram);
            let mut counts: BTreeMap<u64, u64> = BTreeMap::new();
            for entry in &phase.sent_message_size_frequencies {
                let size = entry.message_size;
                let current = match counts.get(&size) {
                    Some(&count) => count,
                    None => existing.and_then(|h| h.get(&size)).copied().unwrap_or(0),
                };
                let total = current.checked_add(entry.frequency).ok_or_else(|| {
                    AggregationError::MalformedRecord {
                        record: source.to_string(),
                        reason: format!(
                            "phase {}: frequency of message size {} overflows the run total",
                            index, size
                        ),
                    }
                })?;
                counts.insert(size, total);
            }
            merged.push(counts);
        }
        Ok(merged)
    }

    /// Seal the state and hand out the finished aggregates.
    ///
    /// A state that never saw a record finalizes to an empty run.
    pub fn finalize(&mut self) -> Result<FinalizedRun, AggregationError> {
        if self.sealed {
            return Err(AggregationError::Sealed);
        }
        self.sealed = true;

        let reported_ranks = std::mem::take(&mut self.reported).into_iter().collect();

        Ok(FinalizedRun {
            process_count: self.shape.map_or(0, |s| s.process_count),
            phases: std::mem::take(&mut self.phases),
            reported_ranks,
            metadata: std::mem::take(&mut self.metadata),
        })
    }
}

/// Record-local consistency, independent of any established shape
fn check_record(source: &str, record: &TraceRecord) -> Result<(), AggregationError> {
    if record.process_count == 0 {
        return Err(AggregationError::MalformedRecord {
            record: source.to_string(),
            reason: "process count must be positive".to_string(),
        });
    }
    if record.rank >= record.process_count {
        return Err(AggregationError::MalformedRecord {
            record: source.to_string(),
            reason: format!(
                "rank {} is outside [0, {})",
                record.rank, record.process_count
            ),
        });
    }
    for (index, phase) in record.phases.iter().enumerate() {
        if phase.sent_bytes_by_destination.len() != record.process_count
            || phase.sent_messages_by_destination.len() != record.process_count
        {
            return Err(AggregationError::MalformedRecord {
                record: source.to_string(),
                reason: format!(
                    "phase {}: per-destination sequences must have {} entries",
                    index, record.process_count
                ),
            });
        }
    }
    Ok(())
}

fn shape_conflict(source: &str, expected: Shape, found: Shape) -> AggregationError {
    AggregationError::ShapeConflict {
        record: source.to_string(),
        expected_procs: expected.process_count,
        expected_phases: expected.phase_count,
        found_procs: found.process_count,
        found_phases: found.phase_count,
    }
}

/// Read-only result of a completed aggregation run
#[derive(Debug, Clone)]
pub struct FinalizedRun {
    process_count: usize,
    phases: Vec<PhaseAggregate>,
    reported_ranks: Vec<Rank>,
    metadata: BTreeMap<Rank, RecordMetadata>,
}

impl FinalizedRun {
    pub fn process_count(&self) -> usize {
        self.process_count
    }

    pub fn phase_count(&self) -> usize {
        self.phases.len()
    }

    pub fn phases(&self) -> &[PhaseAggregate] {
        &self.phases
    }

    pub fn phase(&self, index: usize) -> Option<&PhaseAggregate> {
        self.phases.get(index)
    }

    /// Ranks that contributed a record, ascending
    pub fn reported_ranks(&self) -> &[Rank] {
        &self.reported_ranks
    }

    /// Ranks whose matrix rows were never written (still all zeros)
    pub fn missing_ranks(&self) -> Vec<Rank> {
        let mut reported = self.reported_ranks.iter().peekable();
        (0..self.process_count)
            .filter(|rank| {
                if reported.peek() == Some(&rank) {
                    reported.next();
                    false
                } else {
                    true
                }
            })
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.reported_ranks.len() == self.process_count
    }

    /// Fail with [`AggregationError::IncompleteRun`] unless every rank reported
    pub fn ensure_complete(&self) -> Result<(), AggregationError> {
        if self.is_complete() {
            return Ok(());
        }
        Err(AggregationError::IncompleteRun {
            process_count: self.process_count,
            missing: self.missing_ranks(),
        })
    }

    /// Descriptive fields a rank's tracer recorded
    pub fn metadata(&self, rank: Rank) -> Option<&RecordMetadata> {
        self.metadata.get(&rank)
    }

    pub fn into_phases(self) -> Vec<PhaseAggregate> {
        self.phases
    }
}
