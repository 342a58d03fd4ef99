//! Fan-out of debate events to live clients
//!
//! Producers push serialized JSON payloads into one bounded inbound queue.
//! A single distribution task copies each payload into every subscriber's own
//! bounded queue. A subscriber whose queue is full or closed is disconnected,
//! so one slow client never holds up the others.

use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

/// Default per-subscriber queue length
pub const SUBSCRIBER_CAPACITY: usize = 256;

/// Inbound queue length
pub const INBOUND_CAPACITY: usize = 1024;

type Subscribers = Arc<RwLock<HashMap<Uuid, mpsc::Sender<String>>>>;

/// Broadcast hub handle; cheap to share behind an `Arc`
pub struct BroadcastHub {
    inbound: mpsc::Sender<String>,
    subscribers: Subscribers,
    subscriber_capacity: usize,
}

/// One registered client
pub struct Subscription {
    pub id: Uuid,
    receiver: mpsc::Receiver<String>,
}

impl Subscription {
    /// Wait for the next payload.
    pub async fn recv(&mut self) -> Option<String> {
        self.receiver.recv().await
    }

    /// Wait for the next payload and join everything else already queued
    /// onto it, newline-separated. `None` once the hub dropped this client.
    pub async fn next_batch(&mut self) -> Option<String> {
        let first = self.receiver.recv().await?;
        Some(coalesce(first, &mut self.receiver))
    }
}

/// Join `first` with every payload immediately available on `receiver`.
pub fn coalesce(first: String, receiver: &mut mpsc::Receiver<String>) -> String {
    let mut batch = first;
    while let Ok(next) = receiver.try_recv() {
        batch.push('\n');
        batch.push_str(&next);
    }
    batch
}

impl BroadcastHub {
    /// Create a hub and spawn its distribution task.
    pub fn spawn() -> Arc<Self> {
        Self::spawn_with_capacity(SUBSCRIBER_CAPACITY)
    }

    pub fn spawn_with_capacity(subscriber_capacity: usize) -> Arc<Self> {
        let (inbound, rx) = mpsc::channel(INBOUND_CAPACITY);
        let subscribers: Subscribers = Arc::new(RwLock::new(HashMap::new()));

        tokio::spawn(distribute(rx, Arc::clone(&subscribers)));

        Arc::new(Self {
            inbound,
            subscribers,
            subscriber_capacity: subscriber_capacity.max(1),
        })
    }

    pub fn register(&self) -> Subscription {
        let (tx, receiver) = mpsc::channel(self.subscriber_capacity);
        let id = Uuid::new_v4();
        let count = {
            let mut subscribers = self.subscribers.write();
            subscribers.insert(id, tx);
            subscribers.len()
        };
        tracing::info!("Client {} connected ({} total)", id, count);
        Subscription { id, receiver }
    }

    pub fn unregister(&self, id: Uuid) {
        if self.subscribers.write().remove(&id).is_some() {
            tracing::info!("Client {} disconnected", id);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Queue a raw payload for every subscriber.
    pub async fn broadcast(&self, payload: String) {
        if self.inbound.send(payload).await.is_err() {
            tracing::warn!("Broadcast hub is shut down; payload dropped");
        }
    }

    /// Serialize `event` and queue it.
    pub async fn broadcast_json<T: Serialize>(&self, event: &T) {
        match serde_json::to_string(event) {
            Ok(payload) => self.broadcast(payload).await,
            Err(e) => tracing::error!("Failed to serialize broadcast event: {}", e),
        }
    }
}

async fn distribute(mut inbound: mpsc::Receiver<String>, subscribers: Subscribers) {
    while let Some(payload) = inbound.recv().await {
        let mut dropped = Vec::new();
        {
            let subscribers = subscribers.read();
            for (id, tx) in subscribers.iter() {
                match tx.try_send(payload.clone()) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        tracing::warn!("Client {} is too slow, disconnecting", id);
                        dropped.push(*id);
                    }
                    Err(TrySendError::Closed(_)) => dropped.push(*id),
                }
            }
        }

        if !dropped.is_empty() {
            let mut subscribers = subscribers.write();
            for id in dropped {
                subscribers.remove(&id);
            }
        }
    }
    tracing::debug!("Broadcast hub distribution loop finished");
}
