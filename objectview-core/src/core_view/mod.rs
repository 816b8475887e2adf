/*
    core_view - Client-side view state

    The local side of a hub view:
    - Data model (subscription keys, documents, change events)
    - Replica engine applying dumps and ordered changes
    - Command encoder turning local edits into hub commands
*/

pub mod encode;
pub mod model;
pub mod replica;

// Re-export commonly used types
pub use encode::{ChangeSet, Command, FieldMap};
pub use model::{ChangeEvent, ChangeKind, ChangeMessage, Document, DocumentId, Dump, Replica, SubscriptionKey};
pub use replica::{ReplicaChange, ReplicaEngine, TargetMode};
