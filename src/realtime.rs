//! In-process fan-out of row-change events.
//!
//! Every backend funnels its change notifications into one [`RealtimeHub`].
//! Views and the notification helper subscribe per table with an
//! [`EventFilter`]; filtering happens on the subscriber side. Dropping a
//! [`ChangeSubscription`] is the unsubscribe.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Table carrying customer orders.
pub const ORDERS_TABLE: &str = "orders";

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ChangeKind::Insert => "INSERT",
            ChangeKind::Update => "UPDATE",
            ChangeKind::Delete => "DELETE",
        })
    }
}

impl FromStr for ChangeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "INSERT" => Ok(ChangeKind::Insert),
            "UPDATE" => Ok(ChangeKind::Update),
            "DELETE" => Ok(ChangeKind::Delete),
            other => Err(format!("unknown change kind: {}", other)),
        }
    }
}

/// One row change on a table.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub table: String,
    pub kind: ChangeKind,
    /// The row after the change (absent for deletes).
    pub record: Option<Value>,
    /// The row before the change, when the source provides it.
    pub old_record: Option<Value>,
}

impl ChangeEvent {
    pub fn new(table: impl Into<String>, kind: ChangeKind, record: Option<Value>) -> Self {
        Self {
            table: table.into(),
            kind,
            record,
            old_record: None,
        }
    }
}

/// Which change kinds a subscriber wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventFilter {
    All,
    Only(ChangeKind),
}

impl EventFilter {
    pub fn matches(&self, kind: ChangeKind) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::Only(wanted) => *wanted == kind,
        }
    }
}

/// Broadcast hub shared by publishers and subscribers.
#[derive(Clone)]
pub struct RealtimeHub {
    sender: broadcast::Sender<Arc<ChangeEvent>>,
}

impl Default for RealtimeHub {
    fn default() -> Self {
        Self::new()
    }
}

impl RealtimeHub {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Publishes a change; returns how many subscribers received it.
    pub fn publish(&self, event: ChangeEvent) -> usize {
        debug!(table = %event.table, kind = %event.kind, "Publishing change");
        // No subscribers is not an error.
        self.sender.send(Arc::new(event)).unwrap_or(0)
    }

    pub fn subscribe(&self, table: impl Into<String>, filter: EventFilter) -> ChangeSubscription {
        let table = table.into();
        debug!(table = %table, ?filter, "Realtime subscription opened");
        ChangeSubscription {
            receiver: self.sender.subscribe(),
            table,
            filter,
        }
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// A live subscription. Dropping it unsubscribes.
pub struct ChangeSubscription {
    receiver: broadcast::Receiver<Arc<ChangeEvent>>,
    table: String,
    filter: EventFilter,
}

impl ChangeSubscription {
    /// Waits for the next matching change. `None` once the hub is gone.
    pub async fn recv(&mut self) -> Option<Arc<ChangeEvent>> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if event.table == self.table && self.filter.matches(event.kind) {
                        return Some(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(table = %self.table, skipped, "Realtime subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

impl Drop for ChangeSubscription {
    fn drop(&mut self) {
        debug!(table = %self.table, filter = ?self.filter, "Realtime subscription closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_subscriber_only_sees_matching_events() {
        let hub = RealtimeHub::new();
        let mut inserts = hub.subscribe(ORDERS_TABLE, EventFilter::Only(ChangeKind::Insert));

        hub.publish(ChangeEvent::new("products", ChangeKind::Insert, None));
        hub.publish(ChangeEvent::new(ORDERS_TABLE, ChangeKind::Update, None));
        hub.publish(ChangeEvent::new(ORDERS_TABLE, ChangeKind::Insert, Some(json!({"id": "1"}))));

        let event = inserts.recv().await.unwrap();
        assert_eq!(event.kind, ChangeKind::Insert);
        assert_eq!(event.record, Some(json!({"id": "1"})));
    }

    #[tokio::test]
    async fn test_drop_unsubscribes() {
        let hub = RealtimeHub::new();
        let first = hub.subscribe(ORDERS_TABLE, EventFilter::All);
        let second = hub.subscribe(ORDERS_TABLE, EventFilter::All);
        assert_eq!(hub.subscriber_count(), 2);

        drop(first);
        assert_eq!(hub.subscriber_count(), 1);
        drop(second);
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[test]
    fn test_publish_without_subscribers_is_fine() {
        let hub = RealtimeHub::new();
        assert_eq!(hub.publish(ChangeEvent::new(ORDERS_TABLE, ChangeKind::Delete, None)), 0);
    }

    #[test]
    fn test_change_kind_parses_wire_names() {
        assert_eq!("INSERT".parse::<ChangeKind>(), Ok(ChangeKind::Insert));
        assert_eq!("update".parse::<ChangeKind>(), Ok(ChangeKind::Update));
        assert!("TRUNCATE".parse::<ChangeKind>().is_err());
    }
}
