//! # commtrace - communication matrices from per-rank MPI traces
//!
//! This library turns the per-process trace files written by an MPI
//! communication profiler into global, rank-indexed views of each execution
//! phase: a traffic matrix (bytes sent), a message matrix (messages sent) and
//! a histogram of message sizes.
//!
//! ## Overview
//!
//! Every rank of a traced run writes one JSON document describing what it
//! sent to every other rank, phase by phase. A run's documents are usually
//! bundled into a tarball. commtrace reads them back, checks that they
//! describe one consistent run, and merges them.
//!
//! ## Architecture
//!
//! - `trace`: record types and the parser for the tracer's JSON format
//! - `aggregate`: per-phase matrices and histograms, shape and rank checks
//! - `driver`: end-to-end parse + fold over a stream of raw records
//! - `archive`: directories, JSON files and (compressed) tar archives
//! - `render`: CSV matrices, binned histograms and run reports
//! - `config`: optional YAML configuration
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::path::Path;
//! use commtrace::{archive::TraceArchive, driver::Driver};
//!
//! let mut archive = TraceArchive::open(Path::new("traces.tar.gz"))?;
//! let run = Driver::sequential().run(archive.sources()?)?;
//!
//! for (i, phase) in run.phases().iter().enumerate() {
//!     println!("phase {}: {} bytes", i, phase.traffic_matrix().total());
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Error Handling
//!
//! Parsing and aggregation failures are typed ([`aggregate::AggregationError`],
//! [`archive::ArchiveError`], [`driver::DriverError`]). A single bad record
//! aborts the whole run; partial aggregates are never returned. Report
//! writing and configuration loading use `color_eyre` for context-rich errors.

pub mod aggregate;
pub mod archive;
pub mod config;
pub mod driver;
pub mod render;
pub mod trace;
