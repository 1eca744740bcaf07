//! # Notification broadcaster
//!
//! Owns the live subscriber set and pushes each newly stored article to it.
//!
//! Delivery is best-effort and at-most-once: a subscriber that is closed or
//! whose outbound buffer is full simply misses the message. There is no
//! backlog and no replay on reconnect.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::article::ArticleRecord;

/// Messages queued per WebSocket connection before sends start failing with `Full`.
pub const OUTBOUND_BUFFER: usize = 64;

pub type SubscriberId = u64;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SendError {
    #[error("subscriber transport closed")]
    Closed,
    #[error("subscriber buffer full")]
    Full,
}

/// One live real-time connection.
pub trait Subscriber: Send + Sync {
    fn is_open(&self) -> bool;
    /// Non-blocking hand-off of one serialized message.
    fn send(&self, message: &str) -> Result<(), SendError>;
}

/// Subscriber backed by a bounded channel; the connection task drains the receiver.
#[derive(Debug, Clone)]
pub struct ChannelSubscriber {
    tx: mpsc::Sender<String>,
}

impl ChannelSubscriber {
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self { tx }, rx)
    }
}

impl Subscriber for ChannelSubscriber {
    fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }

    fn send(&self, message: &str) -> Result<(), SendError> {
        self.tx.try_send(message.to_string()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SendError::Full,
            mpsc::error::TrySendError::Closed(_) => SendError::Closed,
        })
    }
}

/// Synchronized set of live subscribers. Cheap to clone; clones share state.
#[derive(Clone, Default)]
pub struct SubscriberRegistry {
    inner: Arc<RwLock<HashMap<SubscriberId, Arc<dyn Subscriber>>>>,
    next_id: Arc<AtomicU64>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, sub: Arc<dyn Subscriber>) -> SubscriberId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut map = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        map.insert(id, sub);
        metrics::gauge!("broadcast_subscribers").set(map.len() as f64);
        id
    }

    pub fn remove(&self, id: SubscriberId) -> bool {
        let mut map = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let removed = map.remove(&id).is_some();
        metrics::gauge!("broadcast_subscribers").set(map.len() as f64);
        removed
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Point-in-time copy so sends happen outside the lock.
    fn snapshot(&self) -> Vec<(SubscriberId, Arc<dyn Subscriber>)> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(id, s)| (*id, Arc::clone(s)))
            .collect()
    }
}

#[derive(Clone, Default)]
pub struct Broadcaster {
    registry: SubscriberRegistry,
}

impl Broadcaster {
    pub fn new(registry: SubscriberRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &SubscriberRegistry {
        &self.registry
    }

    pub fn subscribe(&self, sub: Arc<dyn Subscriber>) -> SubscriberId {
        let id = self.registry.add(sub);
        tracing::debug!(subscriber = id, live = self.registry.len(), "subscriber connected");
        id
    }

    pub fn unsubscribe(&self, id: SubscriberId) {
        if self.registry.remove(id) {
            tracing::debug!(subscriber = id, live = self.registry.len(), "subscriber disconnected");
        }
    }

    /// Push `record` to every open subscriber. Returns how many accepted it.
    pub fn publish(&self, record: &ArticleRecord) -> usize {
        match record.to_message() {
            Ok(msg) => self.publish_raw(&msg),
            Err(e) => {
                tracing::warn!(error = %e, link = %record.link, "failed to serialize article message");
                0
            }
        }
    }

    pub fn publish_raw(&self, message: &str) -> usize {
        let mut delivered = 0usize;
        for (id, sub) in self.registry.snapshot() {
            if !sub.is_open() {
                continue;
            }
            match sub.send(message) {
                Ok(()) => delivered += 1,
                Err(e) => tracing::debug!(subscriber = id, error = %e, "send skipped"),
            }
        }
        metrics::counter!("broadcast_delivered_total").increment(delivered as u64);
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn channel_subscriber_reports_closed_and_full() {
        let (sub, mut rx) = ChannelSubscriber::channel(1);
        assert!(sub.is_open());
        assert_eq!(sub.send("a"), Ok(()));
        assert_eq!(sub.send("b"), Err(SendError::Full));
        assert_eq!(rx.recv().await.as_deref(), Some("a"));
        drop(rx);
        assert!(!sub.is_open());
        assert_eq!(sub.send("c"), Err(SendError::Closed));
    }

    #[test]
    fn poisoned_registry_keeps_publishing() {
        let b = Broadcaster::default();
        let (s, mut rx) = ChannelSubscriber::channel(4);
        b.subscribe(Arc::new(s));

        let inner = b.registry().inner.clone();
        let _ = std::thread::spawn(move || {
            let _g = inner.write().unwrap();
            panic!("poison the registry");
        })
        .join();
        assert!(b.registry().inner.is_poisoned());

        assert_eq!(b.publish_raw("x"), 1);
        assert_eq!(rx.try_recv().unwrap(), "x");
        assert_eq!(b.registry().len(), 1);
    }

    #[test]
    fn unsubscribe_removes_from_set() {
        let b = Broadcaster::default();
        let (s1, _r1) = ChannelSubscriber::channel(4);
        let (s2, _r2) = ChannelSubscriber::channel(4);
        let id1 = b.subscribe(Arc::new(s1));
        let _id2 = b.subscribe(Arc::new(s2));
        assert_eq!(b.registry().len(), 2);
        b.unsubscribe(id1);
        b.unsubscribe(id1);
        assert_eq!(b.registry().len(), 1);
        assert_eq!(b.publish_raw("x"), 1);
    }
}
