//! sql-bench CLI
//!
//! Weighted, multi-process SQL load generator.

use anyhow::Result;
use clap::Parser;

mod cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    cli.run().await
}
