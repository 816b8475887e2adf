//! Data model shared by the replica engine and the coordinator

pub mod change;
pub mod document;
pub mod key;

pub use change::{ChangeEvent, ChangeKind, ChangeMessage, MalformedChange};
pub use document::{Document, DocumentId, Dump, Replica};
pub use key::SubscriptionKey;
