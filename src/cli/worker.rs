//! The hidden `worker` command, run by the supervisor once per worker

use anyhow::{Context, Result};
use sql_bench_core::{SignalListener, StatsSender, StopFlag, WorkerBuilder, WorkerConfig};
use sql_bench_drivers::MySqlSession;
use tokio::io::AsyncReadExt;
use tracing::Instrument;

pub async fn execute() -> Result<()> {
    let mut body = String::new();
    tokio::io::stdin()
        .read_to_string(&mut body)
        .await
        .context("Failed to read worker config from stdin")?;
    let config: WorkerConfig =
        serde_json::from_str(&body).context("Failed to parse worker config")?;

    super::init_logging(config.verbose, config.debug);

    let span = tracing::info_span!("worker", worker_id = config.worker_id);
    run(config).instrument(span).await
}

async fn run(config: WorkerConfig) -> Result<()> {
    let queries = sql_bench_samplers::prepare_queries(&config.queries)?;
    let sender = StatsSender::connect(&config.endpoint, config.send_policy).with_context(|| {
        format!("Failed to connect to stats endpoint: {}", config.endpoint.display())
    })?;

    let stop = StopFlag::new();
    let mut signals = SignalListener::install().context("Failed to install signal handlers")?;

    let worker = WorkerBuilder::new(config.worker_id)
        .source_id(config.source_id())
        .session(MySqlSession::new(&config.db))
        .queries(queries)
        .schedule(config.schedule)
        .sender(sender)
        .flush_interval(config.flush_interval)
        .stop_flag(stop.clone())
        .build()?;

    let listener = tokio::spawn(
        async move {
            let signal = signals.recv().await;
            tracing::debug!(%signal, "Stop signal received");
            stop.request();
        }
        .in_current_span(),
    );

    let result = worker.run().await;
    listener.abort();

    let stats = result?;
    tracing::debug!(
        passes = stats.passes,
        samples = stats.samples,
        reconnects = stats.reconnects,
        "Worker exiting"
    );
    Ok(())
}
