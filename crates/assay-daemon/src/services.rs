//! Explicit construction of every service from configuration

use anyhow::{Context, Result};
use assay_config::{AssayConfig, BlobBackend, StorageBackend};
use assay_core::adapters::{
    FsBlobStore, InMemoryBlobStore, InMemoryJobQueue, InMemoryMetadataStore, InMemoryResultQueue,
    TracingNotificationGateway,
};
use assay_core::{BlobStore, MetadataStore, NotificationGateway, PayloadStore};
use assay_pipeline::{
    IngestResultReconciler, ResultConsumer, StaleDocumentReaper, WorkspaceOrchestrator,
};
use assay_sqlite::{SqliteConfig, SqliteMetadataStore, SqlitePool};
use std::sync::Arc;
use tracing::{info, warn};

/// Everything the daemon runs, built once at startup
///
/// `jobs` and `results` are in-process queues and nothing inside this crate
/// crosses them: no extractor drains `jobs` and no broker feeds `results`.
/// On its own the daemon only reaps and reconciles what is published
/// locally. A broker transport attaches here by draining
/// [`InMemoryJobQueue::take`] and feeding [`InMemoryResultQueue::publish`].
pub struct Services {
    pub orchestrator: Arc<WorkspaceOrchestrator>,
    pub reconciler: Arc<IngestResultReconciler>,
    pub consumer: Arc<ResultConsumer>,
    pub reaper: Option<Arc<StaleDocumentReaper>>,
    pub jobs: Arc<InMemoryJobQueue>,
    pub results: Arc<InMemoryResultQueue>,
}

impl Services {
    pub fn build(config: &AssayConfig) -> Result<Self> {
        let (metadata, payloads) = build_storage(config)?;
        let blobs = build_blobs(config);

        let jobs = Arc::new(InMemoryJobQueue::new());
        let results = Arc::new(InMemoryResultQueue::new());
        let notifier: Arc<dyn NotificationGateway> = Arc::new(TracingNotificationGateway::new());

        let orchestrator = Arc::new(WorkspaceOrchestrator::new(
            blobs,
            metadata.clone(),
            payloads.clone(),
            jobs.clone(),
        ));
        let reconciler = Arc::new(IngestResultReconciler::new(
            metadata.clone(),
            payloads,
            notifier,
        ));
        let consumer = Arc::new(ResultConsumer::new(
            results.clone(),
            reconciler.clone(),
            config.consumer.clone(),
        ));

        let reaper = config.reaper.enabled.then(|| {
            Arc::new(StaleDocumentReaper::new(
                metadata,
                reconciler.clone(),
                config.reaper.clone(),
            ))
        });

        info!(
            storage = ?config.storage.backend,
            blobs = ?config.blob.backend,
            workers = config.consumer.workers,
            reaper = reaper.is_some(),
            "Services constructed"
        );
        warn!("Job and result queues are in-process; no extraction worker is attached");

        Ok(Self {
            orchestrator,
            reconciler,
            consumer,
            reaper,
            jobs,
            results,
        })
    }
}

fn build_storage(config: &AssayConfig) -> Result<(Arc<dyn MetadataStore>, Arc<dyn PayloadStore>)> {
    match config.storage.backend {
        StorageBackend::Memory => {
            let store = Arc::new(InMemoryMetadataStore::new());
            let metadata: Arc<dyn MetadataStore> = store.clone();
            let payloads: Arc<dyn PayloadStore> = store;
            Ok((metadata, payloads))
        }
        StorageBackend::Sqlite => {
            let sqlite = SqliteConfig::new(&config.storage.sqlite_path)
                .with_busy_timeout(config.storage.busy_timeout_ms);
            let pool = SqlitePool::new(sqlite).with_context(|| {
                format!(
                    "failed to open SQLite database at {}",
                    config.storage.sqlite_path.display()
                )
            })?;
            let store = Arc::new(SqliteMetadataStore::new(pool));
            let metadata: Arc<dyn MetadataStore> = store.clone();
            let payloads: Arc<dyn PayloadStore> = store;
            Ok((metadata, payloads))
        }
    }
}

fn build_blobs(config: &AssayConfig) -> Arc<dyn BlobStore> {
    match config.blob.backend {
        BlobBackend::Memory => Arc::new(InMemoryBlobStore::new()),
        BlobBackend::Filesystem => Arc::new(FsBlobStore::new(&config.blob.root)),
    }
}
