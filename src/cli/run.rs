//! The `run` command: supervise workers, then report

use super::{parse_duration, DbArgs};
use anyhow::{Context, Result};
use clap::Args;
use sql_bench_core::{QuerySet, RunConfig, SupervisorBuilder};
use sql_bench_report::{CsvReport, TextReport};
use std::path::PathBuf;
use std::time::Duration;

/// Flags for `sql-bench run`
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Path to the query definition file (TOML)
    #[arg(short, long)]
    pub queries: PathBuf,

    /// Number of worker processes
    #[arg(short, long, default_value_t = 1)]
    pub workers: usize,

    /// How long to run (e.g. 1500ms, 10s, 2m)
    #[arg(short, long, default_value = "10s", value_parser = parse_duration)]
    pub runtime: Duration,

    /// Minimum time between a worker's stats flushes
    #[arg(long, default_value = "1s", value_parser = parse_duration)]
    pub flush_interval: Duration,

    /// Upper bound for the normalized schedule length
    #[arg(long, default_value_t = 100)]
    pub max_schedule_size: usize,

    /// Give every worker the schedule in the same order
    #[arg(long)]
    pub no_shuffle: bool,

    /// Also write the summary as CSV to this path
    #[arg(long)]
    pub csv: Option<PathBuf>,

    #[command(flatten)]
    pub db: DbArgs,
}

impl RunArgs {
    fn run_config(&self, verbose: bool, debug: bool) -> RunConfig {
        let mut config = RunConfig::new(self.workers)
            .with_runtime(self.runtime)
            .with_flush_interval(self.flush_interval)
            .with_max_schedule_size(self.max_schedule_size)
            .with_db(self.db.clone().into());
        config.shuffle = !self.no_shuffle;
        config.verbose = verbose;
        config.debug = debug;
        config
    }
}

pub async fn execute(args: RunArgs, verbose: bool, debug: bool) -> Result<()> {
    let queries = QuerySet::load(&args.queries)
        .with_context(|| format!("Failed to load queries from: {}", args.queries.display()))?;
    // Catch bad sampler specs before any worker is spawned
    sql_bench_samplers::prepare_queries(queries.queries())?;

    let config = args.run_config(verbose, debug);
    tracing::info!(
        queries = queries.len(),
        workers = config.workers,
        runtime_ms = config.runtime.as_millis() as u64,
        db = ?config.db,
        "Starting benchmark"
    );

    let supervisor = SupervisorBuilder::new().config(config).queries(queries).build()?;
    let summary = supervisor.run().await?;

    if summary.failed_workers > 0 {
        tracing::warn!(
            failed = summary.failed_workers,
            workers = summary.workers,
            "Some workers exited before the run ended"
        );
    }

    print!("{}", TextReport::render(&summary));

    if let Some(path) = &args.csv {
        CsvReport::write(&summary, path)
            .with_context(|| format!("Failed to export CSV to: {}", path.display()))?;
        tracing::info!(path = %path.display(), "CSV summary written");
    }

    Ok(())
}
