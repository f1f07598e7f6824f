//! Output of finalized aggregates.
//!
//! Rendering only ever sees a [`FinalizedRun`], so nothing is written for a
//! run that failed part way through.

pub mod csv;
pub mod histogram;
pub mod report;

use color_eyre::eyre::Result;

use crate::aggregate::{FinalizedRun, PhaseAggregate};

pub use csv::CsvRenderer;
pub use histogram::{bin_histogram, HistogramBin, DEFAULT_BINS};
pub use report::ReportRenderer;

/// Consumer of finalized per-phase aggregates
pub trait Renderer {
    /// Called once per phase, in phase order
    fn render_phase(&mut self, index: usize, phase: &PhaseAggregate) -> Result<()>;

    /// Called after every phase has been rendered
    fn finish(&mut self, _run: &FinalizedRun) -> Result<()> {
        Ok(())
    }
}

/// Feed every phase of `run` to each renderer
pub fn render_run(run: &FinalizedRun, renderers: &mut [&mut dyn Renderer]) -> Result<()> {
    for renderer in renderers.iter_mut() {
        for (index, phase) in run.phases().iter().enumerate() {
            renderer.render_phase(index, phase)?;
        }
        renderer.finish(run)?;
    }
    Ok(())
}
