//! ObjectView client core
//!
//! Subscribes to named views on a hub, keeps local replicas of their
//! documents in step with ordered change streams, and encodes local edits
//! back into hub commands.

pub mod config;
pub mod core_id;
pub mod core_sync;
pub mod core_view;
pub mod errors;
pub mod logging;
pub mod metrics;
pub mod test_utils;

pub use config::Config;
pub use core_id::IdCreator;
pub use core_sync::{ObjectView, ViewDef};
pub use core_view::{ChangeEvent, ChangeMessage, Replica, ReplicaEngine, SubscriptionKey, TargetMode};
pub use errors::{EncodingError, SyncError, SyncResult};
pub use logging::{init_logging, LogLevel};

/// Crate version reported by [`ObjectView::version`]
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_exports() {
        let _ = LogLevel::Info;
        let _ = TargetMode::default();
        assert!(!VERSION.is_empty());
    }
}
