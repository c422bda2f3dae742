use std::time::Duration;

use thiserror::Error;

/// Top-level error type for the Nexus client.
#[derive(Debug, Error)]
pub enum NexusError {
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Invariant violation: {0}")]
    Invariant(#[from] InvariantViolation),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

/// One `data:` line whose payload is not well-formed.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed payload '{line}': {reason}")]
    MalformedPayload { line: String, reason: String },
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Stream read failed: {0}")]
    Read(String),

    #[error("No data received for {limit:?}")]
    IdleTimeout { limit: Duration },
}

/// An internal precondition failed. Always a programming error.
#[derive(Debug, Error)]
#[error("{operation}: {reason}")]
pub struct InvariantViolation {
    pub operation: &'static str,
    pub reason: String,
}

impl InvariantViolation {
    pub fn new(operation: &'static str, reason: impl Into<String>) -> Self {
        Self {
            operation,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("History load failed: {0}")]
    Load(String),

    #[error("History save failed: {0}")]
    Save(String),

    #[error("History clear failed: {0}")]
    Clear(String),

    #[error("History backend returned HTTP {status}")]
    Status { status: u16 },
}

pub type Result<T> = std::result::Result<T, NexusError>;

impl NexusError {
    /// Whether the error belongs to the transport class that overwrites the in-flight turn.
    pub fn is_transport(&self) -> bool {
        matches!(self, NexusError::Transport(_))
    }
}
