//! Hub transport trait
//!
//! The duplex channel to the hub is an external collaborator: it can be
//! started, it answers request/response invocations, and it pushes named
//! events. Pushed events reach the coordinator through an mpsc channel
//! handed over alongside the transport.

use crate::errors::SyncResult;
use async_trait::async_trait;
use serde_json::Value;

/// Connection state reported by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// Inbound push from the hub
#[derive(Debug, Clone, PartialEq)]
pub enum HubEvent {
    /// A `viewEvent` push; `message` is the raw change payload
    ViewEvent { view: String, message: Value },
    /// The connection closed
    Closed { reason: String },
}

/// Duplex channel to the hub.
///
/// In production this wraps the streaming RPC client.
/// In tests, `MockHub` scripts responses in memory.
#[async_trait]
pub trait HubTransport: Send + Sync {
    /// Open the connection
    async fn start(&self) -> SyncResult<()>;

    fn state(&self) -> ConnectionState;

    fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Invoke a hub method and wait for its response
    ///
    /// # Arguments
    /// * `method` - Hub method name, e.g. `RegisterView`
    /// * `args` - Positional arguments
    async fn invoke(&self, method: &str, args: Vec<Value>) -> SyncResult<Value>;
}
