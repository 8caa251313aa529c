//! Plain-text run report

use sql_bench_core::{QueryCounters, RunSummary};
use std::fmt::Write;

const RULE_WIDTH: usize = 70;

/// Renders a run summary for a terminal
pub struct TextReport;

impl TextReport {
    /// Render the whole report
    pub fn render(summary: &RunSummary) -> String {
        let mut out = String::new();
        let rule = "=".repeat(RULE_WIDTH);

        // Writing into a String cannot fail
        let _ = writeln!(out, "{rule}");
        let _ = writeln!(out, "   Benchmark Results");
        let _ = writeln!(out, "{rule}");
        let _ = writeln!(out, "  Started:              {}", summary.started_at.to_rfc3339());
        let _ = writeln!(out, "  Ended:                {}", summary.ended_at.to_rfc3339());
        let _ = writeln!(out, "  Elapsed:              {:.3} s", summary.elapsed.as_secs_f64());
        let _ = writeln!(out, "  Workers:              {}", summary.workers);
        if summary.failed_workers > 0 {
            let _ = writeln!(out, "  Failed workers:       {}", summary.failed_workers);
        }
        let _ = writeln!(out, "  Messages received:    {}", summary.messages_received);
        if summary.messages_dropped > 0 {
            let _ = writeln!(out, "  Messages dropped:     {}", summary.messages_dropped);
        }

        for (scope, counters) in summary.buckets() {
            let _ = writeln!(out);
            Self::render_bucket(&mut out, summary, scope, counters);
        }

        let _ = writeln!(out, "{rule}");
        out
    }

    fn render_bucket(out: &mut String, summary: &RunSummary, scope: &str, counters: &QueryCounters) {
        let _ = writeln!(out, "[{scope}]");
        let _ = writeln!(out, "  Runs:                 {}", counters.runs);
        let _ = writeln!(out, "  Run time:             {:.3} s", counters.run_time_secs());
        let _ = writeln!(out, "  Mean latency:         {:.3} ms", counters.mean_latency_ms());
        let _ = writeln!(out, "  Runs/s:               {:.2}", summary.runs_per_second(counters));
        let _ = writeln!(out, "  Bytes sent:           {}", counters.bytes_sent);
        let _ = writeln!(out, "  Bytes received:       {}", counters.bytes_received);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;

    #[test]
    fn test_header_fields() {
        let report = TextReport::render(&fixtures::summary());

        assert!(report.contains("Started:              2024-03-01T12:00:00+00:00"));
        assert!(report.contains("Ended:                2024-03-01T12:00:10+00:00"));
        assert!(report.contains("Elapsed:              10.000 s"));
        assert!(report.contains("Workers:              4"));
        assert!(report.contains("Failed workers:       1"));
        assert!(report.contains("Messages dropped:     2"));
    }

    #[test]
    fn test_global_bucket_comes_first() {
        let report = TextReport::render(&fixtures::summary());

        let global = report.find("[global]").unwrap();
        let point = report.find("[point_select]").unwrap();
        let scan = report.find("[scan]").unwrap();
        assert!(global < point);
        assert!(point < scan);
    }

    #[test]
    fn test_bucket_metrics() {
        let report = TextReport::render(&fixtures::summary());
        let point = &report[report.find("[point_select]").unwrap()..report.find("[scan]").unwrap()];

        assert!(point.contains("Runs:                 40"));
        assert!(point.contains("Run time:             2.000 s"));
        assert!(point.contains("Mean latency:         50.000 ms"));
        assert!(point.contains("Runs/s:               4.00"));
        assert!(point.contains("Bytes sent:           4000"));
        assert!(point.contains("Bytes received:       800"));
    }

    #[test]
    fn test_idle_query_reports_zeros() {
        let report = TextReport::render(&fixtures::summary());
        let scan = &report[report.find("[scan]").unwrap()..];

        assert!(scan.contains("Runs:                 0"));
        assert!(scan.contains("Mean latency:         0.000 ms"));
        assert!(scan.contains("Runs/s:               0.00"));
    }

    #[test]
    fn test_clean_run_omits_failure_lines() {
        let mut summary = fixtures::summary();
        summary.failed_workers = 0;
        summary.messages_dropped = 0;

        let report = TextReport::render(&summary);
        assert!(!report.contains("Failed workers"));
        assert!(!report.contains("Messages dropped"));
    }
}
