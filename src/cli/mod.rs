//! CLI argument parsing and command dispatch

mod run;
mod worker;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use sql_bench_core::{DbConfig, QuerySet, Schedule};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

pub use run::RunArgs;

/// sql-bench - weighted, multi-process SQL load generator
#[derive(Parser, Debug)]
#[command(name = "sql-bench")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Enable trace-level logging
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a benchmark against a database
    Run(RunArgs),

    /// Check a query file and print the normalized schedule
    Validate {
        /// Path to the query definition file (TOML)
        #[arg(short, long)]
        queries: PathBuf,

        /// Upper bound for the normalized schedule length
        #[arg(long, default_value_t = 100)]
        max_schedule_size: usize,
    },

    /// Run one worker process (config is read from stdin)
    #[command(hide = true)]
    Worker,
}

/// Database connection flags
#[derive(Args, Debug, Clone)]
pub struct DbArgs {
    /// Database host
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Database port
    #[arg(long, default_value_t = 3306)]
    pub port: u16,

    /// Database user
    #[arg(short, long, default_value = "root")]
    pub user: String,

    /// Database password
    #[arg(short, long, env = "SQL_BENCH_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Default database (schema)
    #[arg(short, long)]
    pub database: Option<String>,

    /// Unix socket path; takes precedence over host and port
    #[arg(long)]
    pub socket: Option<PathBuf>,
}

impl From<DbArgs> for DbConfig {
    fn from(args: DbArgs) -> Self {
        Self {
            host: args.host,
            port: args.port,
            user: args.user,
            password: args.password,
            database: args.database,
            socket: args.socket,
        }
    }
}

impl Cli {
    /// Dispatch the selected command
    pub async fn run(self) -> Result<()> {
        match self.command {
            Commands::Run(args) => {
                init_logging(self.verbose, self.debug);
                run::execute(args, self.verbose, self.debug).await
            }
            Commands::Validate {
                queries,
                max_schedule_size,
            } => {
                init_logging(self.verbose, self.debug);
                validate(&queries, max_schedule_size)
            }
            // Logging is set up from the config handed over stdin
            Commands::Worker => worker::execute().await,
        }
    }
}

/// Install the stderr subscriber
///
/// `RUST_LOG` wins when set; otherwise `--debug` selects trace, `--verbose`
/// debug, and the default is info.
pub fn init_logging(verbose: bool, debug: bool) {
    let level = if debug {
        "trace"
    } else if verbose {
        "debug"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .init();
}

fn validate(path: &std::path::Path, max_schedule_size: usize) -> Result<()> {
    let set = QuerySet::load(path)
        .with_context(|| format!("Failed to load queries from: {}", path.display()))?;
    sql_bench_samplers::prepare_queries(set.queries())?;
    let schedule = Schedule::normalize(set.queries(), max_schedule_size)?;

    println!("{} queries, schedule length {}", set.len(), schedule.len());
    for (index, query) in set.queries().iter().enumerate() {
        println!(
            "  {:<24} weight {:>5}  runs/pass {:>5}",
            query.id,
            query.weight,
            schedule.count_of(index)
        );
    }

    Ok(())
}

/// Parse `1500ms`, `10s`, `2m` or bare (possibly fractional) seconds
pub fn parse_duration(value: &str) -> Result<Duration, String> {
    let value = value.trim();
    let invalid = || format!("invalid duration '{value}' (expected e.g. 1500ms, 10s, 2m)");

    if let Some(ms) = value.strip_suffix("ms") {
        return ms.trim().parse::<u64>().map(Duration::from_millis).map_err(|_| invalid());
    }
    if let Some(minutes) = value.strip_suffix('m') {
        return minutes
            .trim()
            .parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
            .ok_or_else(invalid);
    }

    let secs = value.strip_suffix('s').unwrap_or(value).trim();
    secs.parse::<f64>()
        .ok()
        .and_then(|s| Duration::try_from_secs_f64(s).ok())
        .ok_or_else(invalid)
}
