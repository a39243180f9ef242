//! Error types for the postroom-spool crate.

use postroom_common::EnvelopeId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SpoolError {
    /// No entry is stored under this id.
    #[error("Envelope not found: {0}")]
    NotFound(EnvelopeId),

    /// The entry is held by another consumer.
    #[error("Envelope is locked: {0}")]
    Locked(EnvelopeId),

    /// `unlock` was called on an entry nobody holds.
    #[error("Envelope is not locked: {0}")]
    NotLocked(EnvelopeId),

    #[error("Spool capacity exceeded: {len}/{capacity} envelopes")]
    CapacityExceeded { len: usize, capacity: usize },

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Specialized `Result` type for spool operations.
pub type Result<T> = std::result::Result<T, SpoolError>;
