/*
    Replica subsystem - Apply the hub's change stream to a local copy

    Handles dumps, sequence checking and per-event mutation, and tells
    observers what changed.
*/

pub mod engine;
pub mod notifier;

pub use engine::{ReplicaEngine, TargetMode};
pub use notifier::{ChangeNotifier, ReplicaChange};
