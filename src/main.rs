use std::path::PathBuf;

use clap::Parser;
use color_eyre::eyre::{bail, WrapErr};
use color_eyre::Result;
use env_logger::Env;
use log::info;

use commtrace::archive::TraceArchive;
use commtrace::config::{self, Config};
use commtrace::driver::Driver;
use commtrace::render::{self, CsvRenderer, ReportRenderer, Renderer};

/// Build per-phase communication matrices and message size histograms from MPI traces
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Trace archive: a tarball (plain, gzip or zstd), a directory or a single JSON trace
    archive: PathBuf,

    /// Output directory for matrices and reports
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of bins for the binned message size histogram
    #[arg(long)]
    bins: Option<usize>,

    /// Fail unless every rank of the run produced a trace
    #[arg(long)]
    require_complete: bool,

    /// Parse records on N worker threads (0 = parse sequentially)
    #[arg(short = 'j', long)]
    threads: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    /// Apply command-line overrides on top of the file configuration
    fn apply(&self, config: &mut Config) {
        if let Some(output) = &self.output {
            config.output.directory = output.clone();
        }
        if let Some(bins) = self.bins {
            config.output.histogram_bins = bins;
        }
        if self.require_complete {
            config.ingest.require_complete = true;
        }
        if let Some(threads) = self.threads {
            config.ingest.threads = threads;
        }
    }
}

fn main() -> Result<()> {
    // Initialize error handling
    color_eyre::install()?;

    let args = Args::parse();

    env_logger::Builder::from_env(Env::default().default_filter_or(&args.log_level)).init();

    let mut config = match &args.config {
        Some(path) => config::load_config(path)?,
        None => Config::default(),
    };
    args.apply(&mut config);
    config.validate()?;

    info!("Trace archive: {:?}", args.archive);
    info!("Output directory: {:?}", config.output.directory);

    let driver = if config.ingest.threads > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(config.ingest.threads)
            .build_global()
            .wrap_err("Failed to configure thread pool")?;
        Driver::parallel()
    } else {
        Driver::sequential()
    };

    let mut archive = TraceArchive::open(&args.archive)?;
    let run = driver
        .run(archive.sources()?)
        .wrap_err_with(|| format!("Failed to aggregate traces from {}", args.archive.display()))?;

    if run.reported_ranks().is_empty() {
        bail!("No trace records found in {}", args.archive.display());
    }
    if config.ingest.require_complete {
        run.ensure_complete()?;
    }

    let mut csv = CsvRenderer::new(&config.output.directory, config.output.histogram_bins);
    let mut reports = ReportRenderer::new(&config.output.directory, &args.archive);
    let mut renderers: Vec<&mut dyn Renderer> = Vec::new();
    if config.output.write_csv {
        renderers.push(&mut csv);
    }
    if config.output.write_reports {
        renderers.push(&mut reports);
    }
    render::render_run(&run, &mut renderers)?;

    info!("Aggregation completed successfully");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let args = Args::parse_from(["commtrace", "traces.tar.gz"]);

        assert_eq!(args.archive, PathBuf::from("traces.tar.gz"));
        assert_eq!(args.output, None);
        assert!(!args.require_complete);
        assert_eq!(args.log_level, "info");
    }

    #[test]
    fn test_overrides() {
        let args = Args::parse_from([
            "commtrace",
            "traces.tar",
            "--output", "plots",
            "--bins", "20",
            "--require-complete",
            "-j", "4",
        ]);

        let mut config = Config::default();
        args.apply(&mut config);
        assert_eq!(config.output.directory, PathBuf::from("plots"));
        assert_eq!(config.output.histogram_bins, 20);
        assert!(config.ingest.require_complete);
        assert_eq!(config.ingest.threads, 4);
    }

    #[test]
    fn test_archive_is_required() {
        assert!(Args::try_parse_from(["commtrace"]).is_err());
    }
}
