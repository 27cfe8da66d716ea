use crate::memory::SyncState;
use crate::types::{Rank, SessionId, Tag};

pub type Result<T> = std::result::Result<T, AccelError>;

#[derive(Debug, thiserror::Error)]
pub enum AccelError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("rank {rank} not found in endpoint directory (world size {world_size})")]
    UnknownRank { rank: Rank, world_size: u32 },

    #[error("invalid rank {rank}: world size is {world_size}")]
    InvalidRank { rank: Rank, world_size: u32 },

    #[error("element count {requested} exceeds buffer capacity {capacity}")]
    SizeMismatch { requested: usize, capacity: usize },

    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout {
        operation: &'static str,
        timeout_ms: u64,
    },

    #[error(
        "no message with tag {expected} from rank {src} within {timeout_ms}ms (pending tags: {pending:?})"
    )]
    TagMismatch {
        src: Rank,
        expected: Tag,
        pending: Vec<Tag>,
        timeout_ms: u64,
    },

    #[error("client is closed")]
    ClosedClient,

    #[error("buffer is not synchronized to the device (state: {state})")]
    Unsynchronized { state: SyncState },

    #[error("session mismatch for rank {rank}: expected {expected}, got {actual}")]
    SessionMismatch {
        rank: Rank,
        expected: SessionId,
        actual: SessionId,
    },

    #[error("protocol version mismatch: local={local}, remote={remote}")]
    ProtocolMismatch { local: u16, remote: u16 },

    #[error("peer {rank} disconnected unexpectedly")]
    PeerDisconnected { rank: Rank },

    #[error("message encode failed: {0}")]
    EncodeFailed(String),

    #[error("message decode failed: {0}")]
    DecodeFailed(String),

    #[error("transport error: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("device error: {message}")]
    DeviceError {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal lock poisoned: {0}")]
    LockPoisoned(&'static str),

    #[error("operation cancelled")]
    Cancelled,
}

impl AccelError {
    /// Create a `Transport` error with just a message.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport {
            message: msg.into(),
            source: None,
        }
    }

    /// Create a `Transport` error with a message and a source error.
    pub fn transport_with_source(
        msg: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Transport {
            message: msg.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a `DeviceError` with just a message.
    pub fn device(msg: impl Into<String>) -> Self {
        Self::DeviceError {
            message: msg.into(),
            source: None,
        }
    }

    /// Create a `DeviceError` with a message and a source error.
    pub fn device_with_source(
        msg: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::DeviceError {
            message: msg.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a `Configuration` error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// True for errors a caller may retry with an adjusted timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::TagMismatch { .. })
    }
}
