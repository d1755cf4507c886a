//! Read-only status snapshot over the broker and ingress connectivity.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;

use tapgate_broker::ReadBroker;
use tapgate_core::CardRead;

/// Point-in-time view of ingress connectivity and broker occupancy.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    /// Whether the card feed subscription is currently up.
    pub ingress_connected: bool,

    /// Reads sitting unclaimed in the broker pool.
    pub pending_count: usize,

    /// Sessions with a suspended wait.
    pub active_waiter_count: usize,

    /// Most recent read observed, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_read: Option<CardRead>,
}

/// Thin reporting façade: combines the broker's stats with the ingress
/// connectivity signal. Never mutates either.
///
/// Takes the connectivity receiver rather than an ingress handle so status
/// reporting does not couple this crate to a concrete feed implementation.
#[derive(Debug, Clone)]
pub struct StatusReporter {
    broker: Arc<ReadBroker>,
    connectivity: watch::Receiver<bool>,
}

impl StatusReporter {
    /// Create a reporter over a broker and a connectivity signal (from
    /// `IngressHandle::connectivity`).
    #[must_use]
    pub fn new(broker: Arc<ReadBroker>, connectivity: watch::Receiver<bool>) -> Self {
        Self {
            broker,
            connectivity,
        }
    }

    /// Take a consistent snapshot.
    pub async fn snapshot(&self) -> StatusSnapshot {
        let stats = self.broker.stats().await;
        StatusSnapshot {
            ingress_connected: *self.connectivity.borrow(),
            pending_count: stats.pending_count,
            active_waiter_count: stats.active_waiter_count,
            last_read: stats.last_read,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tapgate_broker::BrokerConfig;
    use tapgate_core::{CardId, TotemId};

    #[tokio::test]
    async fn test_snapshot_reflects_broker_and_connectivity() {
        let broker = Arc::new(ReadBroker::new(BrokerConfig::default()));
        let (connectivity_tx, connectivity_rx) = watch::channel(false);
        let reporter = StatusReporter::new(broker.clone(), connectivity_rx);

        let snapshot = reporter.snapshot().await;
        assert!(!snapshot.ingress_connected);
        assert_eq!(snapshot.pending_count, 0);
        assert!(snapshot.last_read.is_none());

        broker
            .submit_read(
                CardId::new("AB12").unwrap(),
                Some(TotemId::new("T1").unwrap()),
            )
            .await;
        connectivity_tx.send(true).unwrap();

        let snapshot = reporter.snapshot().await;
        assert!(snapshot.ingress_connected);
        assert_eq!(snapshot.pending_count, 1);
        assert_eq!(snapshot.active_waiter_count, 0);
        let last = snapshot.last_read.unwrap();
        assert_eq!(last.card_id, CardId::new("AB12").unwrap());
    }

    #[tokio::test]
    async fn test_snapshot_serializes_without_last_read() {
        let broker = Arc::new(ReadBroker::new(BrokerConfig::default()));
        let (_tx, rx) = watch::channel(true);
        let reporter = StatusReporter::new(broker, rx);

        let value = serde_json::to_value(reporter.snapshot().await).unwrap();
        assert_eq!(value["ingress_connected"], true);
        assert!(value.get("last_read").is_none());
    }
}
