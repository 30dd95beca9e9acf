//! Non-blocking transport feeding the async writer task.

use bytes::Bytes;
use tokio::sync::mpsc::{self, error::TrySendError};

use super::{Transport, TransportError};

/// Transport that queues packets for the writer task.
///
/// A full queue is reported as [`TransportError::Busy`] so the sender's retry
/// policy applies; a dropped writer task is [`TransportError::Closed`].
#[derive(Clone)]
pub struct ChannelTransport {
    tx: mpsc::Sender<Bytes>,
}

impl ChannelTransport {
    pub fn new(tx: mpsc::Sender<Bytes>) -> Self {
        Self { tx }
    }

    /// Whether the writer task has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl Transport for ChannelTransport {
    fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.tx
            .try_send(Bytes::copy_from_slice(data))
            .map_err(|e| match e {
                TrySendError::Full(_) => TransportError::Busy,
                TrySendError::Closed(_) => TransportError::Closed,
            })
    }
}
