/*
    errors.rs - Error types for the replica, encoder and sync subsystems

    Failure classes:
    - Sequence: a gap was detected while applying changes (recovered by rebind)
    - Registration: the hub rejected a view registration
    - Transport: the channel closed or a connect failed (recovered by backoff)
    - Encoding: commands requested for a view without a field map
    - Commit: the hub rejected a commit, returned to the caller
*/

use serde_json::Value;
use thiserror::Error;

/// Errors raised by the replica engine, command encoder and coordinator
#[derive(Debug, Clone, Error)]
pub enum SyncError {
    /// A change arrived out of sequence
    #[error("Sequence error on {view}: received {received}, current {current:?}")]
    Sequence { view: String, received: u64, current: Option<u64> },

    /// The hub refused a registration
    #[error("Registration rejected: {message}")]
    Registration { message: String, context: Option<String> },

    /// The channel to the hub failed
    #[error("Transport error: {0}")]
    Transport(String),

    /// Commands could not be built
    #[error(transparent)]
    Encoding(#[from] EncodingError),

    /// The hub refused a commit
    #[error("Commit rejected: {error}")]
    Commit { error: String, payload: Value },

    /// A hub payload did not have the expected shape
    #[error("Decode error: {0}")]
    Decode(String),

    /// The coordinator task is no longer running
    #[error("Coordinator closed")]
    Closed,
}

/// Result type for sync operations
pub type SyncResult<T> = Result<T, SyncError>;

impl SyncError {
    /// Whether the coordinator recovers from this error on its own
    pub fn is_recoverable(&self) -> bool {
        matches!(self, SyncError::Sequence { .. } | SyncError::Transport(_))
    }

    /// Short name of the failure class, as handed to error callbacks
    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::Sequence { .. } => "SequenceError",
            SyncError::Registration { .. } => "RegistrationError",
            SyncError::Transport(_) => "TransportError",
            SyncError::Encoding(_) => "EncodingError",
            SyncError::Commit { .. } => "CommitError",
            SyncError::Decode(_) => "DecodeError",
            SyncError::Closed => "Closed",
        }
    }

    /// Sequence number that exposed a desync, if this is a sequence error
    pub fn received_sequence(&self) -> Option<u64> {
        match self {
            SyncError::Sequence { received, .. } => Some(*received),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Decode(err.to_string())
    }
}

/// Command encoding errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodingError {
    /// The view has no field map (read-only, or not fetched yet)
    #[error("View {0} is not updateable: no field map")]
    NotUpdateable(String),

    /// A subfield descriptor was applied to a scalar
    #[error("Field {field}: subfield '{subfield}' requires an object value")]
    SubfieldOfScalar { field: String, subfield: String },

    /// Unknown accessor code in a field map
    #[error("Illegal field map code {0}")]
    IllegalCode(i64),

    /// Accessor did not have the `[property, [code], ...]` shape
    #[error("Malformed accessor: {0}")]
    MalformedAccessor(String),
}
