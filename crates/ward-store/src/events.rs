//! The per-session event bus.
//!
//! Store mutations and lock acquisitions are announced on a broadcast
//! channel the UI layer subscribes to. The bus is constructed with the
//! session, not process-global; a slow subscriber lags rather than blocking
//! the writer.

use serde_json::Value;
use tokio::sync::broadcast;

/// A typed event emitted by the store.
#[derive(Debug, Clone)]
pub enum StoreEvent {
    /// A new object was created.
    Created {
        /// Model name of the collection written to
        model: String,
        /// The created object, including metadata
        object: Value,
    },
    /// A new revision of an existing object was written.
    RevisionCreated {
        /// Model name of the collection written to
        model: String,
        /// The new revision, including metadata
        object: Value,
    },
    /// A waited-on lock was acquired.
    LockAcquired {
        /// The acquired lock id
        lock_id: String,
    },
}

impl StoreEvent {
    /// Renders the wire topic name subscribers key on.
    pub fn topic(&self) -> String {
        match self {
            StoreEvent::Created { model, .. } => format!("create:{model}"),
            StoreEvent::RevisionCreated { model, .. } => format!("createRevision:{model}"),
            StoreEvent::LockAcquired { lock_id } => {
                // lock ids are "<modelName>-<objectId>"; the topic keys on the prefix
                let prefix = lock_id.split('-').next().unwrap_or(lock_id);
                format!("{prefix}:lockAcquired")
            }
        }
    }
}

/// Broadcast bus carrying [`StoreEvent`]s to any number of subscribers.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<StoreEvent>,
}

impl EventBus {
    /// Creates a bus with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribes to all events from this point on.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.tx.subscribe()
    }

    /// Emits an event. Delivery is best-effort: with no subscribers the
    /// event is dropped.
    pub fn emit(&self, event: StoreEvent) {
        let _ = self.tx.send(event);
    }
}
