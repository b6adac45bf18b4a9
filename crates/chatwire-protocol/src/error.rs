//! Protocol error types.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while building, fragmenting or parsing messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// A write would run past the end of a packet buffer.
    #[error("packet overflow: {requested} bytes requested, {remaining} remaining")]
    Overflow { requested: usize, remaining: usize },

    /// A read would run past the end of a packet buffer.
    #[error("read of {len} bytes at offset {offset} exceeds packet capacity {capacity}")]
    OutOfBounds {
        offset: usize,
        len: usize,
        capacity: usize,
    },

    /// Invalid codec configuration (frame size, separators).
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Malformed message input.
    #[error("parse error: {0}")]
    Parse(String),

    /// A frame declared an impossible size.
    #[error("invalid frame size {declared} (header is {header} bytes, {available} bytes available)")]
    InvalidFrameSize {
        declared: u32,
        header: usize,
        available: usize,
    },

    /// Frames arrived out of order or with a gap.
    #[error("unexpected frame sequence number: expected {expected}, got {received}")]
    UnexpectedSequence { expected: u32, received: u32 },

    /// Frames of one payload disagree on the total frame count.
    #[error("frame count changed mid-payload: expected {expected}, got {received}")]
    FrameCountMismatch { expected: u32, received: u32 },

    /// Reassembled payload exceeds the configured limit.
    #[error("message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// Stream closed in the middle of a frame or payload.
    #[error("incomplete frame: expected {expected} bytes, got {received}")]
    IncompleteFrame { expected: usize, received: usize },

    /// IO error during read/write.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    /// Creates a parse error.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse(message.into())
    }

    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Returns true for errors caused by untrusted input rather than local misuse.
    ///
    /// Connection handlers answer these with an error response (or drop the
    /// message) instead of tearing the connection down.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Parse(_)
                | Self::InvalidFrameSize { .. }
                | Self::UnexpectedSequence { .. }
                | Self::FrameCountMismatch { .. }
        )
    }
}
