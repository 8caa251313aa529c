//! CSV export functionality

use anyhow::{Context, Result};
use csv::Writer;
use sql_bench_core::RunSummary;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Column headers, in record order
pub const HEADERS: [&str; 7] = [
    "scope",
    "runs",
    "run_time_s",
    "mean_latency_ms",
    "runs_per_s",
    "bytes_sent",
    "bytes_received",
];

/// Writes one row per bucket: `global` first, then each query id
pub struct CsvReport;

impl CsvReport {
    /// Export the summary to a CSV file at `path`
    pub fn write(summary: &RunSummary, path: &Path) -> Result<()> {
        let file = File::create(path)
            .with_context(|| format!("Failed to create CSV file: {}", path.display()))?;
        Self::to_writer(summary, file)
    }

    /// Export the summary to any writer
    pub fn to_writer<W: Write>(summary: &RunSummary, writer: W) -> Result<()> {
        let mut wtr = Writer::from_writer(writer);

        wtr.write_record(HEADERS)?;

        for (scope, counters) in summary.buckets() {
            wtr.write_record(&[
                scope.to_string(),
                counters.runs.to_string(),
                format!("{:.6}", counters.run_time_secs()),
                format!("{:.3}", counters.mean_latency_ms()),
                format!("{:.3}", summary.runs_per_second(counters)),
                counters.bytes_sent.to_string(),
                counters.bytes_received.to_string(),
            ])?;
        }

        wtr.flush()?;
        Ok(())
    }
}
