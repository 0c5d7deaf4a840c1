use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tessera_client::{InventoryClient, ReservationClient};
use tessera_queue::{EventQueue, HttpQueue};
use tessera_worker::{
    metrics, shutdown, Dispatcher, Handlers, Poller, RetryPolicy, Shutdown, WorkerConfig,
    WorkerPool,
};

/// Hard cap on graceful teardown; residual work redelivers.
const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = WorkerConfig::load().context("failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(format!(
                    "tessera_worker={level},tessera_queue={level},tessera_client={level}",
                    level = cfg.log_level
                ))
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(config = %cfg, "starting reservation lifecycle worker");

    metrics::describe();
    let _recorder = PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install metrics recorder")?;

    let inventory = Arc::new(
        InventoryClient::new(&cfg.inventory_addr).context("failed to build inventory client")?,
    );
    let reservation = Arc::new(
        ReservationClient::new(&cfg.reservation_base_url)
            .context("failed to build reservation client")?,
    );
    let queue: Arc<dyn EventQueue> =
        Arc::new(HttpQueue::new(&cfg.queue_url).context("failed to build queue client")?);

    let stop = Shutdown::new();
    // Channel buffer of 2N absorbs short bursts without unbounding memory.
    let (events_tx, events_rx) = mpsc::channel(cfg.worker_concurrency * 2);

    let dispatcher = Arc::new(Dispatcher::new(
        Handlers::new(inventory, reservation),
        RetryPolicy::new(cfg.max_retries, cfg.backoff_base()),
        stop.clone(),
    ));
    let poller = Poller::new(Arc::clone(&queue), events_tx, cfg.wait(), stop.clone());
    let pool = WorkerPool::new(
        cfg.worker_concurrency,
        events_rx,
        dispatcher,
        queue,
        stop.clone(),
    );

    let poller_handle = tokio::spawn(poller.run());
    let pool_handle = tokio::spawn(pool.run());

    shutdown::wait_for_signal()
        .await
        .context("failed to listen for shutdown signals")?;
    tracing::info!("shutdown signal received");
    stop.trigger();

    let teardown = async {
        let _ = poller_handle.await;
        let _ = pool_handle.await;
    };
    if tokio::time::timeout(SHUTDOWN_DEADLINE, teardown).await.is_err() {
        tracing::warn!(
            deadline_secs = SHUTDOWN_DEADLINE.as_secs(),
            "shutdown deadline exceeded, exiting with work in flight"
        );
    }

    tracing::info!("reservation lifecycle worker stopped");
    Ok(())
}
