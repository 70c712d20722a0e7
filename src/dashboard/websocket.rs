//! WebSocket Broadcaster
//!
//! Fans each market update out to every registered subscriber. Publishing
//! snapshots the subscriber set first; subscribers whose send fails are removed
//! afterwards without affecting delivery to the others.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;

pub type SubscriberId = u64;

/// Receiving end of a subscription
#[derive(Debug)]
pub struct Subscription {
    pub id: SubscriberId,
    pub rx: mpsc::Receiver<String>,
}

/// Result of one publish
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub dropped: usize,
}

#[derive(Debug)]
struct Registry {
    subscribers: Mutex<HashMap<SubscriberId, mpsc::Sender<String>>>,
    next_id: AtomicU64,
    buffer: usize,
}

/// Dynamic subscriber registry
#[derive(Debug, Clone)]
pub struct Broadcaster {
    registry: Arc<Registry>,
}

impl Broadcaster {
    /// Create a broadcaster whose subscribers buffer up to `buffer` messages
    pub fn new(buffer: usize) -> Self {
        Self {
            registry: Arc::new(Registry {
                subscribers: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                buffer: buffer.max(1),
            }),
        }
    }

    fn subscribers(&self) -> MutexGuard<'_, HashMap<SubscriberId, mpsc::Sender<String>>> {
        self.registry
            .subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn subscribe(&self) -> Subscription {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.registry.buffer);
        self.subscribers().insert(id, tx);
        tracing::debug!(subscriber = id, "Subscriber registered");
        Subscription { id, rx }
    }

    /// Remove a subscriber; returns false if it was already gone
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.subscribers().remove(&id).is_some()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers().len()
    }

    /// Serialize once and deliver to all current subscribers
    pub fn broadcast<T: Serialize>(&self, msg: &T) -> Result<BroadcastReport, serde_json::Error> {
        let json = serde_json::to_string(msg)?;
        Ok(self.broadcast_text(json))
    }

    pub fn broadcast_text(&self, text: String) -> BroadcastReport {
        let snapshot: Vec<(SubscriberId, mpsc::Sender<String>)> = self
            .subscribers()
            .iter()
            .map(|(id, tx)| (*id, tx.clone()))
            .collect();

        let mut report = BroadcastReport::default();
        let mut failed = Vec::new();
        for (id, tx) in snapshot {
            match tx.try_send(text.clone()) {
                Ok(()) => report.delivered += 1,
                Err(err) => {
                    tracing::warn!(subscriber = id, error = %err, "Dropping subscriber after failed send");
                    failed.push(id);
                }
            }
        }

        if !failed.is_empty() {
            let mut live = self.subscribers();
            for id in &failed {
                live.remove(id);
            }
        }
        report.dropped = failed.len();
        report
    }

    /// Drop every subscriber; their receivers observe end-of-stream
    pub fn close_all(&self) -> usize {
        let mut live = self.subscribers();
        let count = live.len();
        live.clear();
        count
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_broadcast_reaches_all_subscribers() {
        let broadcaster = Broadcaster::new(4);
        let mut a = broadcaster.subscribe();
        let mut b = broadcaster.subscribe();

        let report = broadcaster.broadcast(&serde_json::json!({"k": 1})).unwrap();
        assert_eq!(report, BroadcastReport { delivered: 2, dropped: 0 });
        assert_eq!(a.rx.recv().await.unwrap(), r#"{"k":1}"#);
        assert_eq!(b.rx.recv().await.unwrap(), r#"{"k":1}"#);
    }

    #[tokio::test]
    async fn test_closed_subscriber_is_removed_only() {
        let broadcaster = Broadcaster::new(4);
        let mut alive = broadcaster.subscribe();
        let gone = broadcaster.subscribe();
        drop(gone.rx);

        let report = broadcaster.broadcast_text("x".to_string());
        assert_eq!(report.delivered, 1);
        assert_eq!(report.dropped, 1);
        assert_eq!(broadcaster.subscriber_count(), 1);
        assert_eq!(alive.rx.recv().await.unwrap(), "x");
    }

    #[tokio::test]
    async fn test_full_subscriber_is_dropped() {
        let broadcaster = Broadcaster::new(1);
        let _slow = broadcaster.subscribe();
        assert_eq!(broadcaster.broadcast_text("1".to_string()).delivered, 1);
        let report = broadcaster.broadcast_text("2".to_string());
        assert_eq!(report.dropped, 1);
        assert_eq!(broadcaster.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_unsubscribe_and_close_all() {
        let broadcaster = Broadcaster::default();
        let a = broadcaster.subscribe();
        let mut b = broadcaster.subscribe();
        assert!(broadcaster.unsubscribe(a.id));
        assert!(!broadcaster.unsubscribe(a.id));

        assert_eq!(broadcaster.close_all(), 1);
        assert!(b.rx.recv().await.is_none());
        assert_eq!(broadcaster.broadcast_text("late".to_string()).delivered, 0);
    }
}
