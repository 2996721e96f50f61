//! Wallet notifications.
//!
//! The ledger only needs one capability from the outside world: publish an
//! opaque event for a wallet address. Delivery is best-effort; a failed publish
//! is logged and never fails the ledger operation that triggered it.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;

use crate::config::LedgerConfig;
use crate::transactions::{TransactionId, TxCode, TxStatus};

/// Event published to a wallet's subject
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    TransactionCreated {
        transaction_id: TransactionId,
        code: TxCode,
        status: TxStatus,
    },
    TransactionFinalized {
        transaction_id: TransactionId,
        status: TxStatus,
    },
}

/// Subject a wallet's transaction events are published on
pub fn wallet_subject(address: &str) -> String {
    format!("wallets.{address}.transactions")
}

/// Notification errors
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("No subscribers for {0}")]
    NoSubscribers(String),

    #[error("Failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Fire-and-forget publisher keyed by wallet address
pub trait Notifier: Send + Sync {
    fn publish(&self, address: &str, event: &LedgerEvent) -> Result<(), NotifyError>;
}

/// Publish and log failures instead of propagating them
pub fn publish_best_effort(notifier: &dyn Notifier, address: &str, event: &LedgerEvent) {
    if let Err(e) = notifier.publish(address, event) {
        log::warn!("Failed to notify wallet {}: {}", address, e);
    }
}

/// Drops every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn publish(&self, _address: &str, _event: &LedgerEvent) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// Message delivered to broadcast subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletNotification {
    pub subject: String,
    /// JSON-encoded [`LedgerEvent`]
    pub payload: String,
}

/// In-process fan-out over a tokio broadcast channel
#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    sender: broadcast::Sender<WalletNotification>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Channel sized by `NOTIFY_CHANNEL_CAPACITY`
    pub fn from_config(config: &LedgerConfig) -> Self {
        Self::new(config.notify_channel_capacity)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WalletNotification> {
        self.sender.subscribe()
    }
}

impl Notifier for BroadcastNotifier {
    fn publish(&self, address: &str, event: &LedgerEvent) -> Result<(), NotifyError> {
        let subject = wallet_subject(address);
        let payload = serde_json::to_string(event)?;
        self.sender
            .send(WalletNotification {
                subject: subject.clone(),
                payload,
            })
            .map(|_| ())
            .map_err(|_| NotifyError::NoSubscribers(subject))
    }
}

/// Buffers events until the surrounding storage transaction commits
#[derive(Debug, Default)]
pub struct Outbox {
    events: Mutex<Vec<(String, LedgerEvent)>>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.events.lock().map(|events| events.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver every buffered event, best-effort
    pub fn flush(self, target: &dyn Notifier) {
        let events = self.events.into_inner().unwrap_or_else(|e| e.into_inner());
        for (address, event) in &events {
            publish_best_effort(target, address, event);
        }
    }
}

impl Notifier for Outbox {
    fn publish(&self, address: &str, event: &LedgerEvent) -> Result<(), NotifyError> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((address.to_string(), event.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn created(id: TransactionId) -> LedgerEvent {
        LedgerEvent::TransactionCreated {
            transaction_id: id,
            code: TxCode::UserToUser,
            status: TxStatus::Posted,
        }
    }

    #[test]
    fn test_wallet_subject() {
        assert_eq!(wallet_subject("ABCD"), "wallets.ABCD.transactions");
    }

    #[tokio::test]
    async fn test_broadcast_delivers_json() {
        let notifier = BroadcastNotifier::new(8);
        let mut rx = notifier.subscribe();

        notifier.publish("ABCD", &created(3)).unwrap();

        let msg = rx.recv().await.unwrap();
        assert_eq!(msg.subject, "wallets.ABCD.transactions");
        let event: LedgerEvent = serde_json::from_str(&msg.payload).unwrap();
        assert_eq!(event, created(3));
    }

    #[test]
    fn test_from_config_uses_capacity() {
        let config = LedgerConfig {
            notify_channel_capacity: 2,
            ..LedgerConfig::default()
        };
        let notifier = BroadcastNotifier::from_config(&config);
        let mut rx = notifier.subscribe();
        for id in 1..=3 {
            notifier.publish("ABCD", &created(id)).unwrap();
        }
        // oldest event is dropped once the channel is full
        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Lagged(1))
        ));
    }

    #[test]
    fn test_broadcast_without_subscribers_fails_softly() {
        let notifier = BroadcastNotifier::new(8);
        let err = notifier.publish("ABCD", &created(1)).unwrap_err();
        assert!(matches!(err, NotifyError::NoSubscribers(_)));

        // must not panic
        publish_best_effort(&notifier, "ABCD", &created(1));
    }

    #[tokio::test]
    async fn test_outbox_holds_until_flush() {
        let target = BroadcastNotifier::new(8);
        let mut rx = target.subscribe();

        let outbox = Outbox::new();
        outbox.publish("AAA", &created(1)).unwrap();
        outbox.publish("BBB", &created(1)).unwrap();
        assert_eq!(outbox.len(), 2);
        assert!(rx.try_recv().is_err());

        outbox.flush(&target);
        assert_eq!(rx.recv().await.unwrap().subject, "wallets.AAA.transactions");
        assert_eq!(rx.recv().await.unwrap().subject, "wallets.BBB.transactions");
    }
}
