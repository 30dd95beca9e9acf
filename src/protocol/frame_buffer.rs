//! Packet buffer for accumulating partial reads.
//!
//! Uses `bytes::BytesMut` sized for the largest legal packet. Bytes arrive in
//! arbitrarily sized chunks (down to one byte at a time from a UART ISR) and
//! are validated in two steps:
//! - once `HEADER_SIZE` bytes are present the header is checked (magic,
//!   command range, data size)
//! - once `data_size` payload bytes and the footer are present the footer is
//!   checked (magic, optionally checksum) and the frame is emitted
//!
//! Completion is decided by the `data_size` taken from the header, never by
//! scanning for the footer magic, so payloads may contain any byte sequence.
//!
//! A partial packet that sees no new bytes for `stale_timeout` is discarded
//! before the next chunk is appended.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use mlf_proto::protocol::{Command, Frame, PacketBuffer};
//!
//! let mut buffer = PacketBuffer::new();
//! let bytes = Frame::request(Command::GetInfo, Vec::<u8>::new()).unwrap().to_bytes();
//!
//! let (head, tail) = bytes.split_at(4);
//! assert!(buffer.append(head, Duration::ZERO).unwrap().is_none());
//! let frame = buffer.append(tail, Duration::ZERO).unwrap().unwrap();
//! assert_eq!(frame.command(), Some(Command::GetInfo));
//! ```

use std::time::Duration;

use bytes::BytesMut;

use super::wire_format::{checksum, Footer, Header, HEADER_SIZE, PACKET_CAPACITY};
use super::Frame;
use crate::error::FrameError;

/// Default time after which a partial packet is considered abandoned.
pub const DEFAULT_STALE_TIMEOUT: Duration = Duration::from_millis(1000);

/// Reassembly buffer turning a byte stream into frames.
pub struct PacketBuffer {
    /// Accumulated bytes, never more than `PACKET_CAPACITY`.
    buffer: BytesMut,
    /// Header of the packet being assembled, once validated.
    header: Option<Header>,
    /// Tick of the last append that left a partial packet behind.
    last_activity: Option<Duration>,
    /// Reject packets whose footer checksum does not match.
    verify_checksum: bool,
    /// Gap after which a partial packet is dropped.
    stale_timeout: Duration,
}

impl PacketBuffer {
    /// Create a new packet buffer with default settings.
    ///
    /// Checksum verification on, stale timeout 1s.
    pub fn new() -> Self {
        Self::with_options(true, DEFAULT_STALE_TIMEOUT)
    }

    /// Create a new packet buffer with custom checksum policy and stale timeout.
    pub fn with_options(verify_checksum: bool, stale_timeout: Duration) -> Self {
        Self {
            buffer: BytesMut::with_capacity(PACKET_CAPACITY),
            header: None,
            last_activity: None,
            verify_checksum,
            stale_timeout,
        }
    }

    /// Append received bytes and try to complete a frame.
    ///
    /// `now` is the current tick of the owning context's clock.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(frame))` if a frame was completed
    /// - `Ok(None)` if more data is needed
    /// - `Err(...)` on a framing error; the buffer has been cleared
    pub fn append(&mut self, data: &[u8], now: Duration) -> Result<Option<Frame>, FrameError> {
        if data.is_empty() {
            return Ok(None);
        }

        if self.is_stale(now) {
            tracing::warn!(
                buffered = self.buffer.len(),
                "Packet timeout, treating data as a new packet"
            );
            self.clear();
        }

        let size = self.buffer.len() + data.len();
        if size > PACKET_CAPACITY {
            self.clear();
            return Err(FrameError::DataTooLarge {
                size,
                max: PACKET_CAPACITY,
            });
        }

        self.buffer.extend_from_slice(data);
        self.try_extract(now)
    }

    /// Try to complete a frame from bytes already buffered.
    ///
    /// Bytes following a completed frame in the same chunk are kept as the
    /// start of the next one; call this until it returns `Ok(None)`.
    pub fn poll(&mut self, now: Duration) -> Result<Option<Frame>, FrameError> {
        if self.buffer.is_empty() {
            return Ok(None);
        }
        self.try_extract(now)
    }

    fn try_extract(&mut self, now: Duration) -> Result<Option<Frame>, FrameError> {
        if self.header.is_none() && self.buffer.len() >= HEADER_SIZE {
            let validated = Header::decode(&self.buffer[..HEADER_SIZE]).and_then(|header| {
                header.validate()?;
                Ok(header)
            });
            match validated {
                Ok(header) => self.header = Some(header),
                Err(e) => {
                    self.clear();
                    return Err(e);
                }
            }
        }

        let header = match self.header {
            Some(header) if self.buffer.len() >= header.packet_len() => header,
            _ => {
                self.last_activity = Some(now);
                return Ok(None);
            }
        };

        let packet = self.buffer.split_to(header.packet_len());
        self.header = None;
        self.last_activity = if self.buffer.is_empty() {
            None
        } else {
            Some(now)
        };

        let payload_end = HEADER_SIZE + header.data_size as usize;
        let footer = match Footer::decode(&packet[payload_end..]) {
            Ok(footer) => footer,
            Err(e) => {
                self.clear();
                return Err(e);
            }
        };

        if self.verify_checksum {
            let computed = checksum(&packet[..HEADER_SIZE], &packet[HEADER_SIZE..payload_end]);
            if computed != footer.checksum {
                self.clear();
                return Err(FrameError::ChecksumMismatch {
                    computed,
                    received: footer.checksum,
                });
            }
        }

        let payload = packet.freeze().slice(HEADER_SIZE..payload_end);
        Ok(Some(Frame::from_parts(&header, payload)))
    }

    fn is_stale(&self, now: Duration) -> bool {
        match self.last_activity {
            Some(last) => {
                !self.buffer.is_empty() && now.saturating_sub(last) >= self.stale_timeout
            }
            None => false,
        }
    }

    /// Get the number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Whether the header of the packet in progress has been validated.
    pub fn is_header_validated(&self) -> bool {
        self.header.is_some()
    }

    /// Clear the buffer and reset state. Keeps the allocation.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.header = None;
        self.last_activity = None;
    }
}

impl Default for PacketBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{
        build_frame, Command, Direction, Status, FOOTER_MAGIC, FOOTER_SIZE, MAX_DATA_SIZE,
        REQUEST_MAGIC,
    };

    fn request_bytes(command: Command, payload: &[u8]) -> Vec<u8> {
        Frame::request(command, payload.to_vec()).unwrap().to_bytes()
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_single_complete_frame() {
        let mut buffer = PacketBuffer::new();
        let bytes = request_bytes(Command::SetBrightness, &[50, 0b11]);

        let frame = buffer.append(&bytes, ms(0)).unwrap().unwrap();

        assert_eq!(frame.command(), Some(Command::SetBrightness));
        assert_eq!(frame.payload(), &[50, 0b11]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_byte_at_a_time() {
        let mut buffer = PacketBuffer::new();
        let bytes = request_bytes(Command::SetColor, &[0b11, 1, 2, 3, 4]);

        let mut frames = Vec::new();
        for byte in &bytes {
            if let Some(frame) = buffer.append(&[*byte], ms(0)).unwrap() {
                frames.push(frame);
            }
        }

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload(), &[0b11, 1, 2, 3, 4]);
    }

    #[test]
    fn test_header_validated_before_payload() {
        let mut buffer = PacketBuffer::new();
        let bytes = request_bytes(Command::SetEffect, &[0; 7]);

        buffer.append(&bytes[..HEADER_SIZE - 1], ms(0)).unwrap();
        assert!(!buffer.is_header_validated());

        buffer.append(&bytes[HEADER_SIZE - 1..HEADER_SIZE], ms(0)).unwrap();
        assert!(buffer.is_header_validated());
    }

    #[test]
    fn test_empty_append_is_noop() {
        let mut buffer = PacketBuffer::new();
        let bytes = request_bytes(Command::TurnOn, &[]);

        buffer.append(&bytes[..3], ms(0)).unwrap();
        assert_eq!(buffer.append(&[], ms(5000)).unwrap(), None);
        assert_eq!(buffer.len(), 3);
    }

    #[test]
    fn test_invalid_magic_clears_buffer() {
        let mut buffer = PacketBuffer::new();

        let result = buffer.append(&[1, 2, 3, 4, 5, 6, 7, 8], ms(0));

        assert!(matches!(result, Err(FrameError::InvalidHeader { .. })));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_invalid_command() {
        let mut buffer = PacketBuffer::new();
        let header = Header::new(Direction::Request, 42, 0);

        let result = buffer.append(&header.encode(), ms(0));

        assert_eq!(result, Err(FrameError::InvalidCommand(42)));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_declared_size_too_large() {
        let mut buffer = PacketBuffer::new();
        let mut header = Vec::new();
        header.extend_from_slice(&REQUEST_MAGIC.to_le_bytes());
        header.push(Command::SetColor.id());
        header.extend_from_slice(&((MAX_DATA_SIZE + 1) as u16).to_le_bytes());

        let result = buffer.append(&header, ms(0));

        assert!(matches!(result, Err(FrameError::DataTooLarge { size: 2049, .. })));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_overflow_clears_buffer() {
        let mut buffer = PacketBuffer::new();
        let chunk = vec![0u8; PACKET_CAPACITY + 1];

        let result = buffer.append(&chunk, ms(0));

        assert!(matches!(result, Err(FrameError::DataTooLarge { .. })));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_max_size_frame_fits() {
        let mut buffer = PacketBuffer::new();
        let payload = vec![0xAB; MAX_DATA_SIZE];
        let bytes = request_bytes(Command::SetColor, &payload);
        assert_eq!(bytes.len(), PACKET_CAPACITY);

        let frame = buffer.append(&bytes, ms(0)).unwrap().unwrap();
        assert_eq!(frame.payload_len(), MAX_DATA_SIZE);
    }

    #[test]
    fn test_invalid_footer() {
        let mut buffer = PacketBuffer::new();
        let mut bytes = request_bytes(Command::TurnOff, &[]);
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;

        let result = buffer.append(&bytes, ms(0));

        assert!(matches!(result, Err(FrameError::InvalidFooter { .. })));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_checksum_mismatch_rejected_by_default() {
        let mut buffer = PacketBuffer::new();
        let mut bytes = request_bytes(Command::SetBrightness, &[10, 1]);
        bytes[HEADER_SIZE] = 11;

        let result = buffer.append(&bytes, ms(0));

        assert!(matches!(result, Err(FrameError::ChecksumMismatch { .. })));
    }

    #[test]
    fn test_checksum_ignored_when_disabled() {
        let mut buffer = PacketBuffer::with_options(false, DEFAULT_STALE_TIMEOUT);
        let header = Header::new(Direction::Request, Command::SetBrightness.id(), 2);
        let mut bytes = header.encode().to_vec();
        bytes.extend_from_slice(&[10, 1]);
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&FOOTER_MAGIC.to_le_bytes());

        let frame = buffer.append(&bytes, ms(0)).unwrap().unwrap();
        assert_eq!(frame.payload(), &[10, 1]);
    }

    #[test]
    fn test_payload_containing_footer_magic() {
        let mut buffer = PacketBuffer::new();
        let mut payload = vec![0b11];
        payload.extend_from_slice(&FOOTER_MAGIC.to_le_bytes());
        payload.extend_from_slice(&FOOTER_MAGIC.to_le_bytes());
        let bytes = request_bytes(Command::SetColor, &payload);

        let mut frames = Vec::new();
        for chunk in bytes.chunks(3) {
            if let Some(frame) = buffer.append(chunk, ms(0)).unwrap() {
                frames.push(frame);
            }
        }

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload(), &payload[..]);
    }

    #[test]
    fn test_stale_partial_discarded() {
        let mut buffer = PacketBuffer::new();
        let stale = request_bytes(Command::SetEffect, &[1; 7]);
        let fresh = request_bytes(Command::GetInfo, &[]);

        assert!(buffer.append(&stale[..10], ms(100)).unwrap().is_none());

        let frame = buffer.append(&fresh, ms(1100)).unwrap().unwrap();
        assert_eq!(frame.command(), Some(Command::GetInfo));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_partial_within_timeout_is_continued() {
        let mut buffer = PacketBuffer::new();
        let bytes = request_bytes(Command::SetEffect, &[1; 7]);

        buffer.append(&bytes[..10], ms(100)).unwrap();
        let frame = buffer.append(&bytes[10..], ms(1099)).unwrap().unwrap();
        assert_eq!(frame.command(), Some(Command::SetEffect));
    }

    #[test]
    fn test_leftover_bytes_start_next_frame() {
        let mut buffer = PacketBuffer::new();
        let mut bytes = request_bytes(Command::TurnOff, &[]);
        bytes.extend(request_bytes(Command::TurnOn, &[]));

        let first = buffer.append(&bytes, ms(0)).unwrap().unwrap();
        assert_eq!(first.command(), Some(Command::TurnOff));

        let second = buffer.poll(ms(0)).unwrap().unwrap();
        assert_eq!(second.command(), Some(Command::TurnOn));
        assert_eq!(buffer.poll(ms(0)).unwrap(), None);
    }

    #[test]
    fn test_response_frames_accepted() {
        let mut buffer = PacketBuffer::new();
        let header = Header::new(Direction::Response, Status::NotReady.code(), 0);
        let bytes = build_frame(&header, &[]);
        assert_eq!(bytes.len(), HEADER_SIZE + FOOTER_SIZE);

        let frame = buffer.append(&bytes, ms(0)).unwrap().unwrap();
        assert_eq!(frame.status(), Some(Status::NotReady));
    }

    #[test]
    fn test_clear_resets_state() {
        let mut buffer = PacketBuffer::new();
        let bytes = request_bytes(Command::SetEffect, &[0; 7]);

        buffer.append(&bytes[..HEADER_SIZE + 2], ms(0)).unwrap();
        assert!(buffer.is_header_validated());

        buffer.clear();

        assert!(!buffer.is_header_validated());
        assert!(buffer.is_empty());
    }
}
