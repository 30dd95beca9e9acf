//! Transport module - outbound write capability and inbound byte queue.
//!
//! Provides:
//! - [`Transport`] - the `write(bytes) -> Ok | Busy | Err` capability a context sends through
//! - [`IoTransport`] - any blocking `std::io::Write` (serial port, file, socket)
//! - [`ChannelTransport`] - non-blocking hand-off to the async writer task
//! - [`RxQueue`] - bounded single-producer/single-consumer byte ring for receive paths

mod channel;
mod io;
mod rx_ring;

use thiserror::Error;

pub use channel::ChannelTransport;
pub use io::IoTransport;
pub use rx_ring::{RxConsumer, RxProducer, RxQueue, DEFAULT_RX_CAPACITY};

/// Outcome of a failed write.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The transport cannot accept bytes right now; retrying later may succeed.
    #[error("transport busy")]
    Busy,

    /// The transport has been shut down.
    #[error("transport closed")]
    Closed,

    /// Hard I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Whether the write may be retried.
    pub fn is_busy(&self) -> bool {
        matches!(self, TransportError::Busy)
    }
}

/// Outbound byte sink of a link.
///
/// `write` either accepts the whole packet or fails; it never performs a
/// partial write the caller has to resume.
pub trait Transport: Send {
    fn write(&mut self, data: &[u8]) -> Result<(), TransportError>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        (**self).write(data)
    }
}
