//! End-to-end aggregation of a stream of raw trace records.
//!
//! The driver pulls raw records from an archive, parses them and folds them
//! into a fresh [`AggregationState`]. Any failure aborts the whole run; no
//! partially aggregated result is ever returned.

use log::{debug, info, warn};
use rayon::prelude::*;

use crate::aggregate::{AggregationError, AggregationState, FinalizedRun};
use crate::archive::ArchiveError;
use crate::trace::{parse_record, RecordSource, TraceRecord};

/// Errors that abort a driver run
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Aggregation(#[from] AggregationError),
}

/// Runs parsing and aggregation over a record stream
#[derive(Debug, Clone, Copy, Default)]
pub struct Driver {
    parallel: bool,
}

impl Driver {
    /// Parse and fold one record at a time
    pub fn sequential() -> Self {
        Self { parallel: false }
    }

    /// Parse records on the rayon pool, then fold them in input order.
    /// Produces exactly the aggregates (and the first error) of a sequential run.
    pub fn parallel() -> Self {
        Self { parallel: true }
    }

    pub fn run<I>(&self, sources: I) -> Result<FinalizedRun, DriverError>
    where
        I: IntoIterator<Item = Result<RecordSource, ArchiveError>>,
    {
        let mut state = AggregationState::new();
        if self.parallel {
            run_parallel(&mut state, sources)?;
        } else {
            run_sequential(&mut state, sources)?;
        }

        let run = state.finalize()?;
        info!(
            "Aggregated {} records: {} processes, {} phases",
            run.reported_ranks().len(),
            run.process_count(),
            run.phase_count()
        );
        let missing = run.missing_ranks();
        if !missing.is_empty() {
            warn!(
                "{} of {} ranks did not report; their matrix rows are zero ({})",
                missing.len(),
                run.process_count(),
                crate::aggregate::error::format_ranks(&missing)
            );
        }
        Ok(run)
    }
}

fn run_sequential<I>(state: &mut AggregationState, sources: I) -> Result<(), DriverError>
where
    I: IntoIterator<Item = Result<RecordSource, ArchiveError>>,
{
    for source in sources {
        let source = source?;
        let record = parse_record(&source)?;
        fold_one(state, &source, &record)?;
    }
    Ok(())
}

fn run_parallel<I>(state: &mut AggregationState, sources: I) -> Result<(), DriverError>
where
    I: IntoIterator<Item = Result<RecordSource, ArchiveError>>,
{
    // Read up to the first archive failure; records before it still get
    // folded first so the reported error matches a sequential run.
    let mut pending = Vec::new();
    let mut archive_error = None;
    for source in sources {
        match source {
            Ok(source) => pending.push(source),
            Err(e) => {
                archive_error = Some(e);
                break;
            }
        }
    }

    debug!("Parsing {} records in parallel", pending.len());
    let parsed: Vec<Result<TraceRecord, AggregationError>> =
        pending.par_iter().map(parse_record).collect();

    for (source, record) in pending.iter().zip(parsed) {
        fold_one(state, source, &record?)?;
    }

    match archive_error {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}

fn fold_one(
    state: &mut AggregationState,
    source: &RecordSource,
    record: &TraceRecord,
) -> Result<(), AggregationError> {
    if let Some(hint) = source.rank_hint {
        if hint != record.rank {
            warn!(
                "{} is named for rank {} but reports rank {}",
                source.name, hint, record.rank
            );
        }
    }
    state.fold_source(&source.name, record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn source(name: &str, value: serde_json::Value) -> Result<RecordSource, ArchiveError> {
        Ok(RecordSource::new(name, serde_json::to_vec(&value).unwrap()))
    }

    fn rank_doc(n_procs: u64, rank: u64, tx_bytes: &[u64], tx_messages: &[u64], sizes: &[(u64, u64)]) -> serde_json::Value {
        let sizes: Vec<serde_json::Value> = sizes
            .iter()
            .map(|(s, f)| json!({"message_size": s, "frequency": f}))
            .collect();
        json!({
            "rank": rank,
            "n_procs": n_procs,
            "n_phases": 1,
            "phases": [{
                "tx_bytes": tx_bytes,
                "tx_messages": tx_messages,
                "tx_message_sizes": sizes,
            }]
        })
    }

    fn two_ranks() -> Vec<Result<RecordSource, ArchiveError>> {
        vec![
            source("oxton-result1.json", rank_doc(2, 1, &[50, 0], &[2, 0], &[(64, 2)])),
            source("oxton-result0.json", rank_doc(2, 0, &[0, 100], &[0, 4], &[(64, 4)])),
        ]
    }

    #[test]
    fn test_sequential_run() {
        let run = Driver::sequential().run(two_ranks()).unwrap();
        let p = run.phase(0).unwrap();
        assert_eq!(p.traffic_matrix().to_nested(), vec![vec![0, 100], vec![50, 0]]);
        assert_eq!(p.message_matrix().to_nested(), vec![vec![0, 4], vec![2, 0]]);
        assert_eq!(p.size_histogram().get(&64), Some(&6));
        assert_eq!(p.size_histogram().len(), 1);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let sequential = Driver::sequential().run(two_ranks()).unwrap();
        let parallel = Driver::parallel().run(two_ranks()).unwrap();
        assert_eq!(sequential.phases(), parallel.phases());
        assert_eq!(sequential.reported_ranks(), parallel.reported_ranks());
    }

    #[test]
    fn test_malformed_record_aborts_run() {
        let mut sources = two_ranks();
        sources.push(Ok(RecordSource::new("oxton-result2.json", b"{\"rank\": 2}".to_vec())));

        for driver in [Driver::sequential(), Driver::parallel()] {
            let err = driver.run(sources.iter().map(clone_source)).unwrap_err();
            match err {
                DriverError::Aggregation(AggregationError::MalformedRecord { record, .. }) => {
                    assert_eq!(record, "oxton-result2.json")
                }
                other => panic!("unexpected error {:?}", other),
            }
        }
    }

    #[test]
    fn test_duplicate_rank_reports_member() {
        let mut sources = two_ranks();
        sources.push(source("copy/oxton-result0.json", rank_doc(2, 0, &[0, 1], &[0, 1], &[])));

        let err = Driver::sequential().run(sources).unwrap_err();
        assert!(matches!(
            err,
            DriverError::Aggregation(AggregationError::DuplicateRank { rank: 0, ref record })
                if record == "copy/oxton-result0.json"
        ));
    }

    #[test]
    fn test_archive_error_reported_after_earlier_records() {
        let sources = vec![
            Ok(RecordSource::new("bad.json", b"[]".to_vec())),
            Err(ArchiveError::NotFound { path: "gone.tar".into() }),
        ];
        let err = Driver::parallel().run(sources).unwrap_err();
        assert!(matches!(err, DriverError::Aggregation(AggregationError::MalformedRecord { .. })));

        let sources = vec![
            source("oxton-result0.json", rank_doc(1, 0, &[0], &[0], &[])),
            Err(ArchiveError::NotFound { path: "gone.tar".into() }),
        ];
        let err = Driver::parallel().run(sources).unwrap_err();
        assert!(matches!(err, DriverError::Archive(ArchiveError::NotFound { .. })));
    }

    #[test]
    fn test_empty_stream() {
        let run = Driver::sequential().run(Vec::new()).unwrap();
        assert_eq!(run.phase_count(), 0);
        assert_eq!(run.process_count(), 0);
    }

    fn clone_source(s: &Result<RecordSource, ArchiveError>) -> Result<RecordSource, ArchiveError> {
        match s {
            Ok(s) => Ok(s.clone()),
            Err(_) => unreachable!("test sources are all readable"),
        }
    }
}
