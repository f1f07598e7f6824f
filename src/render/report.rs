//! Run reports.
//!
//! Generates a JSON report, a human-readable text report and a short stdout
//! summary describing the run's shape, who reported and per-phase totals.

use std::fs;
use std::path::{Path, PathBuf};

use color_eyre::eyre::{Context, Result};
use serde::Serialize;

use super::Renderer;
use crate::aggregate::error::format_ranks;
use crate::aggregate::{FinalizedRun, PhaseAggregate};
use crate::trace::Rank;

/// Run-level facts about an aggregation
#[derive(Debug, Clone, Serialize)]
pub struct ReportMetadata {
    pub analysis_timestamp: String,
    pub archive: String,
    pub process_count: usize,
    pub phase_count: usize,
    pub reported_ranks: usize,
    pub missing_ranks: Vec<Rank>,
}

/// Tracer-provided description of one rank
#[derive(Debug, Clone, Serialize)]
pub struct RankSummary {
    pub rank: Rank,
    pub processor_name: Option<String>,
    pub description: Option<String>,
    pub n_events: Option<u64>,
    pub duration_sec: Option<f64>,
}

/// The single heaviest sender/destination pair of a phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PairTraffic {
    pub sender: Rank,
    pub destination: Rank,
    pub bytes: u64,
}

/// Totals for one phase
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseSummary {
    pub index: usize,
    pub total_bytes: u64,
    pub total_messages: u64,
    pub distinct_message_sizes: usize,
    pub smallest_message_size: Option<u64>,
    pub largest_message_size: Option<u64>,
    /// Histogram-weighted mean message size in bytes
    pub mean_message_size: f64,
    pub heaviest_pair: Option<PairTraffic>,
}

impl PhaseSummary {
    pub fn from_phase(index: usize, phase: &PhaseAggregate) -> Self {
        let histogram = phase.size_histogram();
        let counted = phase.histogram_total();
        let weighted: f64 = histogram
            .iter()
            .map(|(&size, &frequency)| size as f64 * frequency as f64)
            .sum();

        Self {
            index,
            total_bytes: phase.traffic_matrix().total(),
            total_messages: phase.message_matrix().total(),
            distinct_message_sizes: histogram.len(),
            smallest_message_size: histogram.keys().next().copied(),
            largest_message_size: histogram.keys().next_back().copied(),
            mean_message_size: if counted > 0 {
                weighted / counted as f64
            } else {
                0.0
            },
            heaviest_pair: phase
                .traffic_matrix()
                .max_cell()
                .map(|(sender, destination, bytes)| PairTraffic {
                    sender,
                    destination,
                    bytes,
                }),
        }
    }
}

/// Full report for one aggregation run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub metadata: ReportMetadata,
    pub ranks: Vec<RankSummary>,
    pub phases: Vec<PhaseSummary>,
}

/// Build a report for `run`, read from `archive`
pub fn build_report(run: &FinalizedRun, archive: &Path) -> RunReport {
    let phases = run
        .phases()
        .iter()
        .enumerate()
        .map(|(index, phase)| PhaseSummary::from_phase(index, phase))
        .collect();
    assemble(run, archive, phases)
}

fn assemble(run: &FinalizedRun, archive: &Path, phases: Vec<PhaseSummary>) -> RunReport {
    let ranks = run
        .reported_ranks()
        .iter()
        .map(|&rank| {
            let meta = run.metadata(rank).cloned().unwrap_or_default();
            RankSummary {
                rank,
                processor_name: meta.processor_name,
                description: meta.description,
                n_events: meta.n_events,
                duration_sec: meta.duration,
            }
        })
        .collect();

    RunReport {
        metadata: ReportMetadata {
            analysis_timestamp: chrono::Utc::now().to_rfc3339(),
            archive: archive.display().to_string(),
            process_count: run.process_count(),
            phase_count: run.phase_count(),
            reported_ranks: run.reported_ranks().len(),
            missing_ranks: run.missing_ranks(),
        },
        ranks,
        phases,
    }
}

/// Generate JSON report
pub fn generate_json_report(report: &RunReport, output_path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(report)
        .context("Failed to serialize report to JSON")?;

    fs::write(output_path, json)
        .with_context(|| format!("Failed to write JSON report to {}", output_path.display()))?;

    log::info!("JSON report written to {}", output_path.display());
    Ok(())
}

/// Generate human-readable text report
pub fn generate_text_report(report: &RunReport, output_path: &Path) -> Result<()> {
    let mut lines: Vec<String> = Vec::new();

    // Header
    lines.push("=".repeat(80));
    lines.push("                      COMMUNICATION TRACE AGGREGATION".to_string());
    lines.push("=".repeat(80));
    lines.push(String::new());

    // Metadata
    lines.push(format!("Analysis Date: {}", report.metadata.analysis_timestamp));
    lines.push(format!("Archive: {}", report.metadata.archive));
    lines.push(format!("Processes: {}", report.metadata.process_count));
    lines.push(format!("Phases: {}", report.metadata.phase_count));
    lines.push(format!(
        "Ranks Reported: {} of {}",
        report.metadata.reported_ranks, report.metadata.process_count
    ));
    if !report.metadata.missing_ranks.is_empty() {
        lines.push(format!(
            "  WARNING: no trace for {}; their matrix rows are all zero",
            format_ranks(&report.metadata.missing_ranks)
        ));
    }
    lines.push(String::new());

    // Phases
    for phase in &report.phases {
        lines.push("=".repeat(80));
        lines.push(format!("                                  PHASE {}", phase.index));
        lines.push("=".repeat(80));
        lines.push(String::new());

        lines.push(format!("  Bytes sent:     {}", format_bytes(phase.total_bytes)));
        lines.push(format!("  Messages sent:  {}", phase.total_messages));
        lines.push(format!("  Distinct sizes: {}", phase.distinct_message_sizes));
        if let (Some(min), Some(max)) = (phase.smallest_message_size, phase.largest_message_size) {
            lines.push(format!(
                "  Message sizes:  {} to {} (mean {:.1} B)",
                format_bytes(min),
                format_bytes(max),
                phase.mean_message_size
            ));
        }
        if let Some(pair) = phase.heaviest_pair {
            lines.push(format!(
                "  Heaviest pair:  rank {} -> rank {} ({})",
                pair.sender,
                pair.destination,
                format_bytes(pair.bytes)
            ));
        }
        lines.push(String::new());
    }

    // Ranks
    if report.ranks.iter().any(|r| r.processor_name.is_some() || r.duration_sec.is_some()) {
        lines.push("=".repeat(80));
        lines.push("                                    RANKS".to_string());
        lines.push("=".repeat(80));
        lines.push(String::new());
        for rank in &report.ranks {
            let host = rank.processor_name.as_deref().unwrap_or("-");
            let duration = rank
                .duration_sec
                .map(|d| format!("{:.3}s", d))
                .unwrap_or_else(|| "-".to_string());
            let events = rank
                .n_events
                .map(|n| n.to_string())
                .unwrap_or_else(|| "-".to_string());
            lines.push(format!(
                "  rank {:>5}  host {:<24} duration {:>12}  events {}",
                rank.rank, host, duration, events
            ));
        }
        lines.push(String::new());
    }

    let content = lines.join("\n");
    fs::write(output_path, content)
        .with_context(|| format!("Failed to write text report to {}", output_path.display()))?;

    log::info!("Text report written to {}", output_path.display());
    Ok(())
}

/// Print a summary to stdout
pub fn print_summary(report: &RunReport) {
    println!("\n=== COMMUNICATION TRACE SUMMARY ===\n");
    println!("Processes: {}", report.metadata.process_count);
    println!("Phases: {}", report.metadata.phase_count);
    println!(
        "Ranks reported: {}/{}",
        report.metadata.reported_ranks, report.metadata.process_count
    );

    for phase in &report.phases {
        println!(
            "  Phase {}: {} in {} messages",
            phase.index,
            format_bytes(phase.total_bytes),
            phase.total_messages
        );
    }

    println!();
}

/// Format bytes as human-readable string
pub fn format_bytes(bytes: u64) -> String {
    if bytes >= 1_000_000_000 {
        format!("{:.2} GB", bytes as f64 / 1_000_000_000.0)
    } else if bytes >= 1_000_000 {
        format!("{:.2} MB", bytes as f64 / 1_000_000.0)
    } else if bytes >= 1_000 {
        format!("{:.2} KB", bytes as f64 / 1_000.0)
    } else {
        format!("{} B", bytes)
    }
}

/// Collects phase summaries and writes the reports once the run is rendered
#[derive(Debug, Clone)]
pub struct ReportRenderer {
    output_dir: PathBuf,
    archive: PathBuf,
    print: bool,
    phases: Vec<PhaseSummary>,
}

impl ReportRenderer {
    pub fn new(output_dir: impl Into<PathBuf>, archive: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            archive: archive.into(),
            print: true,
            phases: Vec::new(),
        }
    }

    /// Skip the stdout summary
    pub fn quiet(mut self) -> Self {
        self.print = false;
        self
    }
}

impl Renderer for ReportRenderer {
    fn render_phase(&mut self, index: usize, phase: &PhaseAggregate) -> Result<()> {
        self.phases.push(PhaseSummary::from_phase(index, phase));
        Ok(())
    }

    fn finish(&mut self, run: &FinalizedRun) -> Result<()> {
        fs::create_dir_all(&self.output_dir).with_context(|| {
            format!("Failed to create output directory {}", self.output_dir.display())
        })?;

        let report = assemble(run, &self.archive, std::mem::take(&mut self.phases));
        generate_json_report(&report, &self.output_dir.join("summary.json"))?;
        generate_text_report(&report, &self.output_dir.join("summary.txt"))?;
        if self.print {
            print_summary(&report);
        }
        Ok(())
    }
}
