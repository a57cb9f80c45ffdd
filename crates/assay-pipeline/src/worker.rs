//! Result consumer worker pool
//!
//! Each worker pulls deliveries from the [`ResultQueue`], runs them through the
//! [`IngestResultReconciler`] and settles them:
//!
//! - success: ack
//! - permanent failure (validation, not found, forbidden, integrity): dead-letter
//! - transient failure: nack with capped exponential backoff, dead-letter once
//!   `max_attempts` deliveries have failed
//!
//! A failed ack turns into an immediate nack; reconciling the redelivery is a
//! no-op that acks again.

use assay_config::ConsumerConfig;
use assay_core::{Delivery, PortError, PortResult, ResultQueue};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::reconciler::{IngestResultReconciler, Reconciliation};

/// How one delivery was settled
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    Acked(Reconciliation),
    Retried { delay: Duration },
    DeadLettered { reason: String },
}

/// Running totals across all workers
#[derive(Debug, Default)]
pub struct ConsumerStats {
    acked: AtomicU64,
    retried: AtomicU64,
    dead_lettered: AtomicU64,
    unsettled: AtomicU64,
}

/// Point-in-time copy of [`ConsumerStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStatsSnapshot {
    pub acked: u64,
    pub retried: u64,
    pub dead_lettered: u64,
    /// Deliveries the queue refused to settle at all
    pub unsettled: u64,
}

impl ConsumerStats {
    pub fn snapshot(&self) -> ConsumerStatsSnapshot {
        ConsumerStatsSnapshot {
            acked: self.acked.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            dead_lettered: self.dead_lettered.load(Ordering::Relaxed),
            unsettled: self.unsettled.load(Ordering::Relaxed),
        }
    }

    fn record(&self, disposition: &Disposition) {
        let counter = match disposition {
            Disposition::Acked(_) => &self.acked,
            Disposition::Retried { .. } => &self.retried,
            Disposition::DeadLettered { .. } => &self.dead_lettered,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Consumes result messages and settles each delivery
pub struct ResultConsumer {
    queue: Arc<dyn ResultQueue>,
    reconciler: Arc<IngestResultReconciler>,
    config: ConsumerConfig,
    stats: ConsumerStats,
}

impl ResultConsumer {
    pub fn new(
        queue: Arc<dyn ResultQueue>,
        reconciler: Arc<IngestResultReconciler>,
        config: ConsumerConfig,
    ) -> Self {
        Self {
            queue,
            reconciler,
            config,
            stats: ConsumerStats::default(),
        }
    }

    pub fn stats(&self) -> ConsumerStatsSnapshot {
        self.stats.snapshot()
    }

    /// Reconcile one delivery and ack, nack or dead-letter it
    ///
    /// Only queue failures while settling are returned as errors; they are
    /// still counted as `unsettled`.
    pub async fn process_delivery(&self, delivery: Delivery) -> PortResult<Disposition> {
        match self.settle(delivery).await {
            Ok(disposition) => {
                self.stats.record(&disposition);
                Ok(disposition)
            }
            Err(e) => {
                self.stats.unsettled.fetch_add(1, Ordering::Relaxed);
                Err(e)
            }
        }
    }

    async fn settle(&self, delivery: Delivery) -> PortResult<Disposition> {
        let tag = delivery.tag;
        let task_id = delivery.message.task_id.clone();

        let disposition = match self.reconciler.handle(&delivery.message).await {
            Ok(reconciliation) => match self.queue.ack(tag).await {
                Ok(()) => Disposition::Acked(reconciliation),
                Err(e) => {
                    warn!(
                        task_id = %task_id,
                        attempt = delivery.attempt,
                        error = %e,
                        "Ack failed, requeueing delivery"
                    );
                    self.queue.nack(tag, Duration::ZERO).await?;
                    Disposition::Retried {
                        delay: Duration::ZERO,
                    }
                }
            },
            Err(e) if e.is_permanent() => {
                let reason = e.to_string();
                warn!(
                    task_id = %task_id,
                    attempt = delivery.attempt,
                    error = %e,
                    "Permanent failure, dead-lettering"
                );
                self.queue.dead_letter(tag, &reason).await?;
                Disposition::DeadLettered { reason }
            }
            Err(e) if delivery.attempt >= self.config.max_attempts => {
                let reason = format!("gave up after {} attempts: {}", delivery.attempt, e);
                error!(
                    task_id = %task_id,
                    attempt = delivery.attempt,
                    error = %e,
                    "Retries exhausted, dead-lettering"
                );
                self.queue.dead_letter(tag, &reason).await?;
                Disposition::DeadLettered { reason }
            }
            Err(e) => {
                let delay = self.config.retry_delay(delivery.attempt);
                error!(
                    task_id = %task_id,
                    attempt = delivery.attempt,
                    retry_in_ms = delay.as_millis() as u64,
                    error = %e,
                    "Transient failure, scheduling redelivery"
                );
                self.queue.nack(tag, delay).await?;
                Disposition::Retried { delay }
            }
        };

        Ok(disposition)
    }

    /// Receive and process deliveries until `cancel` fires or the queue closes
    ///
    /// A delivery already being processed is finished before returning.
    pub async fn run_worker(&self, worker_id: usize, cancel: CancellationToken) {
        let poll_interval = self.config.poll_interval();
        debug!(worker_id, "Result worker started");

        loop {
            let received = tokio::select! {
                _ = cancel.cancelled() => break,
                received = self.queue.receive(poll_interval) => received,
            };

            match received {
                Ok(Some(delivery)) => {
                    if let Err(e) = self.process_delivery(delivery).await {
                        error!(worker_id, error = %e, "Failed to settle delivery");
                    }
                }
                Ok(None) => continue,
                Err(PortError::Closed(reason)) => {
                    info!(worker_id, reason = %reason, "Result queue closed");
                    break;
                }
                Err(e) => {
                    error!(worker_id, error = %e, "Failed to receive result");
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(poll_interval) => {}
                    }
                }
            }
        }

        debug!(worker_id, "Result worker stopped");
    }

    /// Spawn `config.workers` workers sharing this consumer
    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> ConsumerPool {
        let workers = self.config.workers.max(1);
        info!(
            workers,
            max_attempts = self.config.max_attempts,
            "Starting result consumer pool"
        );

        let handles = (0..workers)
            .map(|worker_id| {
                let consumer = Arc::clone(&self);
                let cancel = cancel.clone();
                tokio::spawn(async move { consumer.run_worker(worker_id, cancel).await })
            })
            .collect();

        ConsumerPool {
            consumer: self,
            cancel,
            handles,
        }
    }
}

/// Handle to a running worker pool
pub struct ConsumerPool {
    consumer: Arc<ResultConsumer>,
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl ConsumerPool {
    pub fn stats(&self) -> ConsumerStatsSnapshot {
        self.consumer.stats()
    }

    /// Cancel the workers and wait up to `timeout` for them to finish
    pub async fn shutdown(self, timeout: Duration) {
        self.cancel.cancel();

        let join_all = async {
            for handle in self.handles {
                if let Err(e) = handle.await {
                    error!(error = %e, "Result worker panicked");
                }
            }
        };

        if tokio::time::timeout(timeout, join_all).await.is_err() {
            warn!(timeout_ms = timeout.as_millis() as u64, "Result workers did not stop in time");
        }

        let stats = self.consumer.stats();
        info!(
            acked = stats.acked,
            retried = stats.retried,
            dead_lettered = stats.dead_lettered,
            "Result consumer pool stopped"
        );
    }
}
