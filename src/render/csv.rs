//! CSV output of matrices and message size histograms.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use color_eyre::eyre::{Context, Result};

use super::histogram::bin_histogram;
use super::Renderer;
use crate::aggregate::{PhaseAggregate, RankMatrix};

/// Writes one set of CSV files per phase into an output directory:
/// `traffic_matrix-{i}.csv`, `message_matrix-{i}.csv`,
/// `message_size_histogram-{i}.csv` and `message_size_bins-{i}.csv`.
#[derive(Debug, Clone)]
pub struct CsvRenderer {
    output_dir: PathBuf,
    bins: usize,
    written: Vec<PathBuf>,
}

impl CsvRenderer {
    pub fn new(output_dir: impl Into<PathBuf>, bins: usize) -> Self {
        Self {
            output_dir: output_dir.into(),
            bins,
            written: Vec::new(),
        }
    }

    /// Paths written so far
    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }

    fn create(&mut self, file_name: String) -> Result<(PathBuf, BufWriter<File>)> {
        let path = self.output_dir.join(file_name);
        let file = File::create(&path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        Ok((path, BufWriter::new(file)))
    }

    fn write_matrix(&mut self, file_name: String, matrix: &RankMatrix) -> Result<()> {
        let (path, mut out) = self.create(file_name)?;
        for row in matrix.rows() {
            let line: Vec<String> = row.iter().map(|v| v.to_string()).collect();
            writeln!(out, "{}", line.join(","))?;
        }
        self.close(path, out)
    }

    fn close(&mut self, path: PathBuf, mut out: BufWriter<File>) -> Result<()> {
        out.flush()
            .with_context(|| format!("Failed to write {}", path.display()))?;
        log::debug!("Wrote {}", path.display());
        self.written.push(path);
        Ok(())
    }
}

impl Renderer for CsvRenderer {
    fn render_phase(&mut self, index: usize, phase: &PhaseAggregate) -> Result<()> {
        fs::create_dir_all(&self.output_dir).with_context(|| {
            format!("Failed to create output directory {}", self.output_dir.display())
        })?;

        self.write_matrix(format!("traffic_matrix-{}.csv", index), phase.traffic_matrix())?;
        self.write_matrix(format!("message_matrix-{}.csv", index), phase.message_matrix())?;

        let (path, mut out) = self.create(format!("message_size_histogram-{}.csv", index))?;
        writeln!(out, "message_size,frequency")?;
        for (size, frequency) in phase.size_histogram() {
            writeln!(out, "{},{}", size, frequency)?;
        }
        self.close(path, out)?;

        let (path, mut out) = self.create(format!("message_size_bins-{}.csv", index))?;
        writeln!(out, "lower,upper,messages")?;
        for bin in bin_histogram(phase.size_histogram(), self.bins) {
            writeln!(out, "{},{},{}", bin.lower, bin.upper, bin.count)?;
        }
        self.close(path, out)?;

        log::info!("Phase {} written to {}", index, display_dir(&self.output_dir));
        Ok(())
    }
}

fn display_dir(dir: &Path) -> String {
    if dir.as_os_str().is_empty() {
        ".".to_string()
    } else {
        dir.display().to_string()
    }
}
