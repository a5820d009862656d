//! CLI entry point for the transit leg statistics ETL.
//!
//! Provides subcommands for running the pipeline over a data root and for
//! inspecting which partitions exist and which would be recomputed.

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use transit_leg_stats::etl::job::{self, JobConfig};
use transit_leg_stats::etl::partitioning;
use tracing::info;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "transit_leg_stats")]
#[command(about = "Derive and aggregate transit leg statistics", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline: derive legs, then aggregate leg stats
    Run {
        /// Data root: folder under which all partitioned datasets live
        #[arg(value_name = "DATA_ROOT")]
        data_root: PathBuf,

        /// Earliest partition to process
        #[arg(long, default_value = "2024-01-01")]
        from_date: NaiveDate,

        /// Invalidate and recompute all derived partitions
        #[arg(long, default_value_t = false)]
        invalidate: bool,

        /// Gzip-compress written partition files
        #[arg(long, default_value_t = false)]
        gzip: bool,

        /// Threads for internal data-parallel passes (default: all cores)
        #[arg(short, long)]
        threads: Option<usize>,
    },
    /// Show available and needed partitions without processing anything
    Status {
        /// Data root: folder under which all partitioned datasets live
        #[arg(value_name = "DATA_ROOT")]
        data_root: PathBuf,

        /// Earliest partition to consider
        #[arg(long, default_value = "2024-01-01")]
        from_date: NaiveDate,

        /// Report as if --invalidate were set
        #[arg(long, default_value_t = false)]
        invalidate: bool,
    },
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path = std::env::var("LOG_FILE_PATH")
        .unwrap_or_else(|_| "logs/transit_leg_stats.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("transit_leg_stats.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            data_root,
            from_date,
            invalidate,
            gzip,
            threads,
        } => {
            if let Some(threads) = threads {
                rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .build_global()?;
                info!(threads, "Thread pool limited");
            }

            let config = JobConfig {
                root: data_root,
                from_date,
                invalidate_all: invalidate,
                gzip,
            };
            job::run(&config)?;
        }
        Commands::Status {
            data_root,
            from_date,
            invalidate,
        } => {
            let config = JobConfig {
                root: data_root,
                from_date,
                invalidate_all: invalidate,
                gzip: false,
            };
            status(&config)?;
        }
    }

    Ok(())
}

/// Logs per-dataset partition counts and what a run would recompute.
fn status(config: &JobConfig) -> Result<()> {
    let arrivals = partitioning::available_daily(&config.arrivals_dir())?;
    let legs = partitioning::available_daily(&config.legs_dir())?;
    let stats = partitioning::available_monthly(&config.leg_stats_dir())?;

    info!(
        arrival_partitions = arrivals.len(),
        first = %fmt_bound(arrivals.first()),
        last = %fmt_bound(arrivals.last()),
        "Arrivals dataset"
    );
    info!(
        leg_partitions = legs.len(),
        first = %fmt_bound(legs.first()),
        last = %fmt_bound(legs.last()),
        "Legs dataset"
    );
    info!(stat_partitions = stats.len(), "Leg-stats dataset");

    let needed_days = job::needed_leg_partitions(config)?;
    let needed_months = job::needed_stat_partitions(config)?;
    for day in &needed_days {
        info!(partition = %day, "Legs partition needs recomputation");
    }
    for month in &needed_months {
        info!(partition = %month, "Stats partition needs recomputation");
    }
    info!(
        leg_partitions = needed_days.len(),
        stat_partitions = needed_months.len(),
        "Recomputation summary"
    );
    Ok(())
}

fn fmt_bound(bound: Option<&NaiveDate>) -> String {
    bound.map(|d| d.to_string()).unwrap_or_else(|| "-".into())
}
