//! Notification gateways
//!
//! [`InMemoryNotificationGateway`] records every notification and fans it out to
//! broadcast subscribers. [`TracingNotificationGateway`] emits each notification
//! as a structured log event, which is what the daemon wires by default.

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::info;

use crate::error::PortResult;
use crate::model::WorkspaceId;
use crate::notification::Notification;
use crate::ports::NotificationGateway;

const BROADCAST_CAPACITY: usize = 256;

/// Records published notifications in order
#[derive(Debug)]
pub struct InMemoryNotificationGateway {
    published: Mutex<Vec<Notification>>,
    sender: broadcast::Sender<Notification>,
}

impl Default for InMemoryNotificationGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryNotificationGateway {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            published: Mutex::new(Vec::new()),
            sender,
        }
    }

    /// Live stream of notifications published after this call
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }

    pub fn published(&self) -> Vec<Notification> {
        self.published.lock().clone()
    }

    /// Published notifications for one workspace, in publish order
    pub fn for_workspace(&self, workspace_id: &WorkspaceId) -> Vec<Notification> {
        self.published
            .lock()
            .iter()
            .filter(|n| n.event.workspace_id() == workspace_id)
            .cloned()
            .collect()
    }

    /// Count of published events with the given name, e.g. `WORKSPACE_READY`
    pub fn count_event(&self, name: &str) -> usize {
        self.published
            .lock()
            .iter()
            .filter(|n| n.event.name() == name)
            .count()
    }
}

#[async_trait]
impl NotificationGateway for InMemoryNotificationGateway {
    async fn publish(&self, notification: Notification) -> PortResult<()> {
        self.published.lock().push(notification.clone());
        // No subscribers is fine
        let _ = self.sender.send(notification);
        Ok(())
    }
}

/// Emits notifications as `info` events on the `assay::notify` target
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotificationGateway;

impl TracingNotificationGateway {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl NotificationGateway for TracingNotificationGateway {
    async fn publish(&self, notification: Notification) -> PortResult<()> {
        let payload = serde_json::to_string(&notification.event)?;
        info!(
            target: "assay::notify",
            owner_id = %notification.owner_id,
            event = notification.event.name(),
            dedupe_key = %notification.dedupe_key,
            payload = %payload,
            "Notification"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::WorkspaceProgress;
    use chrono::Utc;

    #[tokio::test]
    async fn test_records_and_broadcasts() {
        let gateway = InMemoryNotificationGateway::new();
        let mut rx = gateway.subscribe();

        let ws = WorkspaceId::from("w1");
        let n = Notification::workspace_ready("u1", &ws, WorkspaceProgress::default(), Utc::now());
        gateway.publish(n.clone()).await.unwrap();

        assert_eq!(rx.recv().await.unwrap(), n);
        assert_eq!(gateway.for_workspace(&ws), vec![n]);
        assert_eq!(gateway.count_event("WORKSPACE_READY"), 1);
        assert!(gateway.for_workspace(&WorkspaceId::from("other")).is_empty());
    }

    #[tokio::test]
    async fn test_tracing_gateway_never_fails() {
        let gateway = TracingNotificationGateway::new();
        let n = Notification::workspace_ready(
            "u1",
            &WorkspaceId::from("w1"),
            WorkspaceProgress::default(),
            Utc::now(),
        );
        gateway.publish(n).await.unwrap();
    }
}
