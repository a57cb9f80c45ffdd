//! Daemon lifecycle: start the consumer pool and reaper, stop them on shutdown

use crate::services::Services;
use assay_pipeline::ConsumerStatsSnapshot;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// How long in-flight deliveries get to settle after shutdown is requested
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Run until `shutdown` resolves, then drain the workers
pub async fn run<F>(services: &Services, shutdown: F) -> ConsumerStatsSnapshot
where
    F: Future<Output = ()>,
{
    let cancel = CancellationToken::new();
    let pool = Arc::clone(&services.consumer).spawn(cancel.clone());

    let reaper = services.reaper.clone().map(|reaper| {
        let cancel = cancel.clone();
        tokio::spawn(async move { reaper.run(cancel).await })
    });

    info!("assay daemon running");
    shutdown.await;
    info!("Shutdown requested");

    cancel.cancel();
    pool.shutdown(SHUTDOWN_TIMEOUT).await;

    if let Some(handle) = reaper {
        if let Err(e) = handle.await {
            error!(error = %e, "Reaper task panicked");
        }
    }

    services.consumer.stats()
}
