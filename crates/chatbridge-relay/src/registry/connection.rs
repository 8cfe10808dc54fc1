//! In-memory registry of connected relay consumers.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio::sync::{RwLock, mpsc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use chatbridge_core::RelayEvent;

/// Frames queued per consumer before events to it are dropped.
pub const CONSUMER_QUEUE_CAPACITY: usize = 256;

/// Work item for a consumer's socket writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Frame(Arc<String>),
    /// Close the socket and stop writing.
    Close,
}

/// A connected consumer.
pub struct ConsumerConnection {
    /// Unique connection ID.
    pub id: String,
    /// Sender feeding the consumer's socket writer.
    tx: mpsc::Sender<Outbound>,
    open: AtomicBool,
    dropped: AtomicU64,
}

impl ConsumerConnection {
    pub fn new(id: String, tx: mpsc::Sender<Outbound>) -> Self {
        Self {
            id,
            tx,
            open: AtomicBool::new(true),
            dropped: AtomicU64::new(0),
        }
    }

    /// Whether the consumer can still receive frames.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire) && !self.tx.is_closed()
    }

    pub fn mark_closed(&self) {
        self.open.store(false, Ordering::Release);
    }

    /// Queue a serialized frame. Returns `false` if the consumer is closed or
    /// its queue is full.
    pub fn send_frame(&self, frame: Arc<String>) -> bool {
        if !self.is_open() {
            return false;
        }
        match self.tx.try_send(Outbound::Frame(frame)) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(consumer_id = %self.id, dropped, "Consumer queue full, dropping frame");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.mark_closed();
                false
            }
        }
    }

    /// Serialize and queue an event for this consumer only.
    pub fn send_event(&self, event: &RelayEvent) -> bool {
        match event.to_frame() {
            Ok(frame) => self.send_frame(Arc::new(frame)),
            Err(e) => {
                warn!(error = %e, "Failed to serialize relay event");
                false
            }
        }
    }

    /// Ask the writer to close the socket.
    pub fn close(&self) {
        self.mark_closed();
        let _ = self.tx.try_send(Outbound::Close);
    }
}

/// Thread-safe registry of connected consumers.
#[derive(Clone, Default)]
pub struct ClientRegistry {
    consumers: Arc<RwLock<HashMap<String, Arc<ConsumerConnection>>>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a consumer under a freshly generated ID.
    pub async fn register(&self, tx: mpsc::Sender<Outbound>) -> Arc<ConsumerConnection> {
        let id = Uuid::new_v4().to_string();
        let conn = Arc::new(ConsumerConnection::new(id.clone(), tx));
        let count = {
            let mut consumers = self.consumers.write().await;
            consumers.insert(id.clone(), Arc::clone(&conn));
            consumers.len()
        };
        info!(consumer_id = %id, count, "Consumer connected");
        conn
    }

    /// Remove a consumer. Unknown IDs are ignored.
    pub async fn unregister(&self, id: &str) -> Option<Arc<ConsumerConnection>> {
        let (conn, count) = {
            let mut consumers = self.consumers.write().await;
            (consumers.remove(id), consumers.len())
        };
        if let Some(conn) = &conn {
            conn.mark_closed();
            info!(consumer_id = %id, count, "Consumer disconnected");
        }
        conn
    }

    /// Deliver an event to every open consumer. Returns how many accepted it.
    pub async fn broadcast(&self, event: &RelayEvent) -> usize {
        let frame = match event.to_frame() {
            Ok(frame) => Arc::new(frame),
            Err(e) => {
                warn!(error = %e, "Failed to serialize relay event");
                return 0;
            }
        };

        let targets: Vec<Arc<ConsumerConnection>> =
            self.consumers.read().await.values().cloned().collect();

        let mut delivered = 0;
        for conn in targets.iter().filter(|conn| conn.is_open()) {
            if conn.send_frame(Arc::clone(&frame)) {
                delivered += 1;
            }
        }
        debug!(delivered, total = targets.len(), "Event broadcast");
        delivered
    }

    /// Close every consumer socket and empty the registry.
    pub async fn close_all(&self) {
        let drained: Vec<_> = self.consumers.write().await.drain().collect();
        for (_, conn) in &drained {
            conn.close();
        }
        if !drained.is_empty() {
            info!(count = drained.len(), "Closed all consumer connections");
        }
    }

    /// Count of registered consumers.
    pub async fn count(&self) -> usize {
        self.consumers.read().await.len()
    }
}
