//! Pipeline orchestration: consumption workers, the flush timer, and the
//! shutdown coordinator.

mod processor;

pub use processor::IngestProcessor;

use snafu::prelude::*;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use sleet_common::metrics;
use sleet_common::queue::{DeadLetterStore, WorkQueue};
use sleet_common::shutdown_signal;
use sleet_common::store::JobStore;

use crate::config::Config;
use crate::error::{MetricsAddressSnafu, MetricsSnafu, PipelineError};
use crate::rate::RateLimiter;

/// Run the worker until a shutdown signal arrives.
///
/// Starts the metrics endpoint (when enabled), wires SIGINT/SIGTERM/SIGQUIT
/// to a cancellation token, and hands off to [`run_with_shutdown`].
pub async fn run_pipeline(
    config: Config,
    queue: Arc<dyn WorkQueue>,
    store: Arc<dyn JobStore>,
    dlq: Arc<dyn DeadLetterStore>,
) -> Result<(), PipelineError> {
    if config.metrics.enabled {
        let addr: SocketAddr = config
            .metrics
            .address
            .parse()
            .context(MetricsAddressSnafu {
                address: config.metrics.address.clone(),
            })?;
        metrics::init_global(addr).context(MetricsSnafu)?;
    }

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_token.cancel();
    });

    run_with_shutdown(config, queue, store, dlq, shutdown).await
}

/// Run the worker until the given token is cancelled or the queue closes.
///
/// On cancellation: workers stop consuming, the flush timer stops, buffers
/// get one final drain bounded by the shutdown grace period, and the queue
/// is closed last.
pub async fn run_with_shutdown(
    config: Config,
    queue: Arc<dyn WorkQueue>,
    store: Arc<dyn JobStore>,
    dlq: Arc<dyn DeadLetterStore>,
    shutdown: CancellationToken,
) -> Result<(), PipelineError> {
    let processor = Arc::new(IngestProcessor::new(
        &config,
        Arc::clone(&queue),
        store,
        dlq,
    ));
    let limiter = Arc::new(RateLimiter::new(
        config.rate_limit.max,
        config.rate_limit.window(),
    ));

    info!(
        queue = %config.queue.name,
        concurrency = config.worker.concurrency,
        "Starting ingestion workers"
    );

    let mut workers = JoinSet::new();
    for worker_id in 0..config.worker.concurrency {
        workers.spawn(worker_loop(
            worker_id,
            Arc::clone(&queue),
            Arc::clone(&processor),
            Arc::clone(&limiter),
            shutdown.clone(),
        ));
    }

    // The timer stops on shutdown, or once all workers have exited
    let timer_token = shutdown.child_token();
    let timer = tokio::spawn(flush_timer(
        Arc::clone(&processor),
        config.worker.flush_interval(),
        timer_token.clone(),
    ));

    while let Some(result) = workers.join_next().await {
        if let Err(e) = result {
            error!(error = %e, "Worker task failed");
        }
    }

    timer_token.cancel();
    if let Err(e) = timer.await {
        error!(error = %e, "Flush timer task failed");
    }

    // Final drain, bounded by the grace period
    let grace = config.worker.shutdown_grace();
    match tokio::time::timeout(grace, processor.flush_all()).await {
        Ok(()) => info!("Final flush complete"),
        Err(_) => {
            let pending = processor.pending_items().await;
            warn!(
                pending,
                grace_secs = grace.as_secs(),
                "Shutdown grace period elapsed before buffers drained"
            );
        }
    }

    queue.close().await;
    info!("Pipeline stopped");
    Ok(())
}

async fn worker_loop(
    worker_id: usize,
    queue: Arc<dyn WorkQueue>,
    processor: Arc<IngestProcessor>,
    limiter: Arc<RateLimiter>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            _ = limiter.acquire() => {}
        }

        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            delivery = queue.next_delivery() => {
                match delivery {
                    Some(delivery) => processor.handle_delivery(delivery).await,
                    None => break,
                }
            }
        }
    }
    debug!(worker_id, "Worker stopped");
}

async fn flush_timer(processor: Arc<IngestProcessor>, interval: Duration, token: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // The first tick of a tokio interval fires immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => processor.flush_all().await,
        }
    }
}
