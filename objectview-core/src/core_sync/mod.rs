/*
    core_sync - Keeping subscriptions in step with the hub

    Components:
    - transport: the external duplex channel (trait)
    - hub: typed hub calls and payload decoding
    - cell: partition aliases and subscription keys
    - backoff / rebind: randomized delays and coalesced re-registration
    - subscription: ViewDef handles and DocumentRef
    - coordinator: the ObjectView actor
*/

pub mod backoff;
pub mod cell;
pub mod coordinator;
pub mod hub;
pub mod rebind;
pub mod subscription;
pub mod transport;

pub use backoff::JitterWindow;
pub use cell::{normalize_cell, FALLBACK_CELL};
pub use coordinator::{CoordinatorStatus, ObjectView, ObjectViewBuilder};
pub use hub::{CommitOutcome, HubClient, RegisterResponse, ValueQuery};
pub use subscription::{DocumentRef, ViewDef, ViewDefBuilder};
pub use transport::{ConnectionState, HubEvent, HubTransport};
