//! Error types for mlf-proto.
//!
//! Framing errors ([`FrameError`]) are recovered locally by the reassembler and
//! reported back to the peer as an error response. Everything a caller can
//! observe is folded into [`MlfError`].

use thiserror::Error;

use crate::protocol::Status;
use crate::transport::TransportError;

/// A frame failed validation while being reassembled.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// Header magic matched neither the request nor the response magic.
    #[error("invalid header magic {magic:#010x}")]
    InvalidHeader { magic: u32 },

    /// Request header carried a command id outside the command table.
    #[error("invalid command id {0}")]
    InvalidCommand(u8),

    /// Declared payload (or accumulated bytes) exceed what the buffer may hold.
    #[error("data size {size} exceeds maximum {max}")]
    DataTooLarge { size: usize, max: usize },

    /// Footer magic did not match.
    #[error("invalid footer magic {magic:#010x}")]
    InvalidFooter { magic: u32 },

    /// Footer checksum did not match header + payload.
    #[error("checksum mismatch: computed {computed:#010x}, received {received:#010x}")]
    ChecksumMismatch { computed: u32, received: u32 },
}

impl FrameError {
    /// Status code reported to the peer for this error.
    pub fn status(&self) -> Status {
        match self {
            FrameError::InvalidHeader { .. } => Status::InvalidHeader,
            FrameError::InvalidCommand(_) => Status::InvalidCommand,
            FrameError::DataTooLarge { .. } => Status::DataTooLarge,
            FrameError::InvalidFooter { .. } | FrameError::ChecksumMismatch { .. } => {
                Status::InvalidFooter
            }
        }
    }
}

/// Main error type for all mlf-proto operations.
#[derive(Debug, Error)]
pub enum MlfError {
    /// I/O error on the underlying device or stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration could not be parsed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed frame.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// Outbound write failed after the retry budget.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// A request is already awaiting its response on this link.
    #[error("request already in flight on link {link}")]
    RequestInFlight { link: String },

    /// No response arrived before the deadline.
    #[error("timed out waiting for response")]
    Timeout,

    /// The controller answered with an error status.
    #[error("controller failed to process command: {0}")]
    Status(Status),

    /// The controller answered with a status code outside the known table.
    #[error("controller answered with unknown status code {0}")]
    UnknownStatus(u8),

    /// Payload could not be decoded.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// The link shut down while a request was pending.
    #[error("connection closed")]
    ConnectionClosed,
}

/// Result type alias using MlfError.
pub type Result<T> = std::result::Result<T, MlfError>;
