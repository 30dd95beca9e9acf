//! Blocking transport over `std::io::Write`.

use std::io::{ErrorKind, Write};

use super::{Transport, TransportError};

/// Transport writing packets to a blocking writer.
///
/// `WouldBlock` from a non-blocking handle is reported as [`TransportError::Busy`].
pub struct IoTransport<W> {
    inner: W,
}

impl<W: Write + Send> IoTransport<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Get a reference to the wrapped writer.
    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Consume the transport and return the wrapped writer.
    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write + Send> Transport for IoTransport<W> {
    fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let result = self.inner.write_all(data).and_then(|_| self.inner.flush());
        match result {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Err(TransportError::Busy),
            Err(e) => Err(TransportError::Io(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    struct WouldBlock;

    impl Write for WouldBlock {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(ErrorKind::WouldBlock, "tx fifo full"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_writes_whole_packet() {
        let mut transport = IoTransport::new(Vec::new());
        transport.write(b"abc").unwrap();
        transport.write(b"def").unwrap();

        assert_eq!(transport.into_inner(), b"abcdef");
    }

    #[test]
    fn test_would_block_is_busy() {
        let mut transport = IoTransport::new(WouldBlock);
        assert!(transport.write(b"x").unwrap_err().is_busy());
    }
}
