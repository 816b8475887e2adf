//! Replica change notifications
//!
//! Observers subscribe to a broadcast channel and are told about every
//! mutation the engine makes, so UI layers and caches can react without
//! polling the replica.

use crate::core_view::model::DocumentId;
use tokio::sync::broadcast;

/// What changed in a replica
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplicaChange {
    /// A dump was applied; the sequence is the new baseline
    Reloaded { sequence: Option<u64> },
    /// A document was added or one of its properties changed
    Upserted { id: DocumentId },
    /// A document lost its last property and was dropped
    Removed { id: DocumentId },
}

/// Broadcasts [`ReplicaChange`]s to any number of observers
#[derive(Clone)]
pub struct ChangeNotifier {
    tx: broadcast::Sender<ReplicaChange>,
}

impl ChangeNotifier {
    /// Create a notifier buffering up to `capacity` changes per observer
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Emit a change, returning how many observers received it
    pub fn emit(&self, change: ReplicaChange) -> usize {
        self.tx.send(change).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ReplicaChange> {
        self.tx.subscribe()
    }

    pub fn observer_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new(256)
    }
}
