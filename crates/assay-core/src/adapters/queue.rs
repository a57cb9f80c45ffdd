//! In-process job and result queues
//!
//! [`InMemoryResultQueue`] models an at-least-once broker: every received
//! message stays in flight until it is acked, nacked (redelivered later with
//! an incremented attempt) or dead-lettered.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{PortError, PortResult};
use crate::message::{IngestRequestMessage, IngestResultMessage};
use crate::ports::{Delivery, DeliveryTag, JobQueue, ResultQueue};

/// Records enqueued ingest requests in order
#[derive(Debug, Default)]
pub struct InMemoryJobQueue {
    requests: Mutex<Vec<IngestRequestMessage>>,
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every request enqueued so far
    pub fn requests(&self) -> Vec<IngestRequestMessage> {
        self.requests.lock().clone()
    }

    /// Drain the recorded requests
    pub fn take(&self) -> Vec<IngestRequestMessage> {
        std::mem::take(&mut *self.requests.lock())
    }

    pub fn len(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.lock().is_empty()
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(&self, request: IngestRequestMessage) -> PortResult<()> {
        debug!(task_id = %request.task_id, "Enqueued ingest request");
        self.requests.lock().push(request);
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct Queued {
    attempt: u32,
    message: IngestResultMessage,
}

/// A message parked on the dead-letter path
#[derive(Debug, Clone, PartialEq)]
pub struct DeadLetter {
    pub message: IngestResultMessage,
    pub attempt: u32,
    pub reason: String,
}

/// Result queue over a flume channel
#[derive(Debug)]
pub struct InMemoryResultQueue {
    sender: flume::Sender<Queued>,
    receiver: flume::Receiver<Queued>,
    next_tag: AtomicU64,
    in_flight: DashMap<DeliveryTag, Queued>,
    delayed: Arc<AtomicUsize>,
    acked: AtomicUsize,
    dead_letters: Mutex<Vec<DeadLetter>>,
}

impl Default for InMemoryResultQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryResultQueue {
    pub fn new() -> Self {
        let (sender, receiver) = flume::unbounded();
        Self {
            sender,
            receiver,
            next_tag: AtomicU64::new(1),
            in_flight: DashMap::new(),
            delayed: Arc::new(AtomicUsize::new(0)),
            acked: AtomicUsize::new(0),
            dead_letters: Mutex::new(Vec::new()),
        }
    }

    /// Publish a result as the extraction process would
    pub fn publish(&self, message: IngestResultMessage) -> PortResult<()> {
        self.sender
            .send(Queued {
                attempt: 1,
                message,
            })
            .map_err(|_| PortError::Closed("result queue".to_string()))
    }

    /// Messages waiting to be received
    pub fn pending(&self) -> usize {
        self.receiver.len()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn acked(&self) -> usize {
        self.acked.load(Ordering::SeqCst)
    }

    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.dead_letters.lock().clone()
    }

    /// Nothing queued, in flight, or waiting on a redelivery delay
    pub fn is_idle(&self) -> bool {
        self.receiver.is_empty()
            && self.in_flight.is_empty()
            && self.delayed.load(Ordering::SeqCst) == 0
    }

    fn take_in_flight(&self, tag: DeliveryTag) -> PortResult<Queued> {
        self.in_flight
            .remove(&tag)
            .map(|(_, queued)| queued)
            .ok_or_else(|| PortError::backend(format!("unknown {}", tag)))
    }
}

#[async_trait]
impl ResultQueue for InMemoryResultQueue {
    async fn receive(&self, wait: Duration) -> PortResult<Option<Delivery>> {
        let queued = match tokio::time::timeout(wait, self.receiver.recv_async()).await {
            Err(_elapsed) => return Ok(None),
            Ok(Err(_)) => return Err(PortError::Closed("result queue".to_string())),
            Ok(Ok(queued)) => queued,
        };

        let tag = DeliveryTag(self.next_tag.fetch_add(1, Ordering::SeqCst));
        let delivery = Delivery {
            tag,
            attempt: queued.attempt,
            message: queued.message.clone(),
        };
        self.in_flight.insert(tag, queued);
        Ok(Some(delivery))
    }

    async fn ack(&self, tag: DeliveryTag) -> PortResult<()> {
        self.take_in_flight(tag)?;
        self.acked.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn nack(&self, tag: DeliveryTag, delay: Duration) -> PortResult<()> {
        let mut queued = self.take_in_flight(tag)?;
        queued.attempt += 1;

        if delay.is_zero() {
            return self
                .sender
                .send(queued)
                .map_err(|_| PortError::Closed("result queue".to_string()));
        }

        let sender = self.sender.clone();
        let delayed = Arc::clone(&self.delayed);
        delayed.fetch_add(1, Ordering::SeqCst);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if sender.send(queued).is_err() {
                warn!("Result queue closed before redelivery");
            }
            delayed.fetch_sub(1, Ordering::SeqCst);
        });
        Ok(())
    }

    async fn dead_letter(&self, tag: DeliveryTag, reason: &str) -> PortResult<()> {
        let queued = self.take_in_flight(tag)?;
        warn!(
            task_id = %queued.message.task_id,
            attempt = queued.attempt,
            reason,
            "Result dead-lettered"
        );
        self.dead_letters.lock().push(DeadLetter {
            message: queued.message,
            attempt: queued.attempt,
            reason: reason.to_string(),
        });
        Ok(())
    }
}
