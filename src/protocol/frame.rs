//! Frame struct with typed accessors.
//!
//! A frame is one complete, validated packet. Uses `bytes::Bytes` for
//! zero-copy payload sharing between the reassembler, the mailbox and
//! forwarding peers.
//!
//! # Example
//!
//! ```
//! use mlf_proto::protocol::{Command, Frame};
//!
//! let frame = Frame::request(Command::SetBrightness, vec![50, 0b11]).unwrap();
//! assert_eq!(frame.command(), Some(Command::SetBrightness));
//! assert_eq!(frame.payload(), &[50, 0b11]);
//! ```

use bytes::Bytes;

use super::wire_format::{
    checksum, Command, Direction, Footer, Header, Status, CMD_MAX, FOOTER_SIZE, HEADER_SIZE,
    MAX_DATA_SIZE,
};
use crate::error::FrameError;

/// A complete protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    direction: Direction,
    selector: u8,
    payload: Bytes,
}

impl Frame {
    /// Create a frame, rejecting payloads above `MAX_DATA_SIZE` and requests
    /// for commands outside the wire table.
    pub fn new(
        direction: Direction,
        selector: u8,
        payload: impl Into<Bytes>,
    ) -> Result<Self, FrameError> {
        if direction == Direction::Request && selector >= CMD_MAX {
            return Err(FrameError::InvalidCommand(selector));
        }
        let payload = payload.into();
        if payload.len() > MAX_DATA_SIZE {
            return Err(FrameError::DataTooLarge {
                size: payload.len(),
                max: MAX_DATA_SIZE,
            });
        }
        Ok(Self {
            direction,
            selector,
            payload,
        })
    }

    /// Create a request frame for a command.
    pub fn request(command: Command, payload: impl Into<Bytes>) -> Result<Self, FrameError> {
        Self::new(Direction::Request, command.id(), payload)
    }

    /// Create a response frame carrying a status.
    pub fn response(status: Status, payload: impl Into<Bytes>) -> Result<Self, FrameError> {
        Self::new(Direction::Response, status.code(), payload)
    }

    /// Create an empty response frame reporting an error status.
    pub fn error(status: Status) -> Self {
        Self {
            direction: Direction::Response,
            selector: status.code(),
            payload: Bytes::new(),
        }
    }

    /// Rebuild a frame from a validated header and its payload.
    pub(crate) fn from_parts(header: &Header, payload: Bytes) -> Self {
        Self {
            direction: header.direction,
            selector: header.selector,
            payload,
        }
    }

    /// Header describing this frame.
    pub fn header(&self) -> Header {
        Header::new(self.direction, self.selector, self.payload.len() as u16)
    }

    #[inline]
    pub fn direction(&self) -> Direction {
        self.direction
    }

    #[inline]
    pub fn is_request(&self) -> bool {
        self.direction == Direction::Request
    }

    #[inline]
    pub fn is_response(&self) -> bool {
        self.direction == Direction::Response
    }

    /// Raw selector byte (command id or status code).
    #[inline]
    pub fn selector(&self) -> u8 {
        self.selector
    }

    /// Command of a request frame.
    pub fn command(&self) -> Option<Command> {
        match self.direction {
            Direction::Request => Command::from_wire(self.selector),
            Direction::Response => None,
        }
    }

    /// Status of a response frame, `None` for requests or unknown codes.
    pub fn status(&self) -> Option<Status> {
        match self.direction {
            Direction::Response => Status::from_code(self.selector),
            Direction::Request => None,
        }
    }

    /// Get a reference to the payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Get a clone of the payload as Bytes (cheap, zero-copy).
    #[inline]
    pub fn payload_bytes(&self) -> Bytes {
        self.payload.clone()
    }

    #[inline]
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    /// Serialize into a contiguous packet.
    pub fn to_bytes(&self) -> Vec<u8> {
        build_frame(&self.header(), &self.payload)
    }
}

/// Build a complete packet as a single byte vector.
///
/// Encodes header, appends payload and a footer with the CRC-32 of both.
///
/// # Example
///
/// ```
/// use mlf_proto::protocol::{build_frame, Direction, Header, FOOTER_SIZE, HEADER_SIZE};
///
/// let header = Header::new(Direction::Response, 0, 5);
/// let bytes = build_frame(&header, b"hello");
/// assert_eq!(bytes.len(), HEADER_SIZE + 5 + FOOTER_SIZE);
/// ```
pub fn build_frame(header: &Header, payload: &[u8]) -> Vec<u8> {
    let encoded = header.encode();
    let footer = Footer {
        checksum: checksum(&encoded, payload),
    };

    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len() + FOOTER_SIZE);
    buf.extend_from_slice(&encoded);
    buf.extend_from_slice(payload);
    buf.extend_from_slice(&footer.encode());
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{FOOTER_MAGIC, REQUEST_MAGIC};

    #[test]
    fn test_request_frame() {
        let frame = Frame::request(Command::GetInfo, Bytes::new()).unwrap();

        assert!(frame.is_request());
        assert_eq!(frame.command(), Some(Command::GetInfo));
        assert_eq!(frame.status(), None);
        assert_eq!(frame.payload_len(), 0);
    }

    #[test]
    fn test_response_frame() {
        let frame = Frame::response(Status::Ok, vec![1, 90, 0, 216, 0]).unwrap();

        assert!(frame.is_response());
        assert_eq!(frame.status(), Some(Status::Ok));
        assert_eq!(frame.command(), None);
        assert_eq!(frame.header().data_size, 5);
    }

    #[test]
    fn test_error_frame_is_empty() {
        let frame = Frame::error(Status::DataTooLarge);
        assert_eq!(frame.selector(), 134);
        assert!(frame.payload().is_empty());
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let result = Frame::request(Command::SetColor, vec![0u8; MAX_DATA_SIZE + 1]);
        assert!(matches!(result, Err(FrameError::DataTooLarge { .. })));

        assert!(Frame::request(Command::SetColor, vec![0u8; MAX_DATA_SIZE]).is_ok());
    }

    #[test]
    fn test_request_outside_command_table_rejected() {
        let result = Frame::new(Direction::Request, CMD_MAX, Bytes::new());
        assert_eq!(result, Err(FrameError::InvalidCommand(CMD_MAX)));

        let result = Frame::request(Command::HandleResponse, Bytes::new());
        assert!(matches!(result, Err(FrameError::InvalidCommand(_))));

        // Responses carry statuses, any code is allowed
        assert!(Frame::new(Direction::Response, 200, Bytes::new()).is_ok());
    }

    #[test]
    fn test_build_frame_layout() {
        let frame = Frame::request(Command::SetBrightness, vec![50u8, 3]).unwrap();
        let bytes = frame.to_bytes();

        assert_eq!(bytes.len(), HEADER_SIZE + 2 + FOOTER_SIZE);
        assert_eq!(&bytes[0..4], &REQUEST_MAGIC.to_le_bytes());
        assert_eq!(bytes[4], Command::SetBrightness.id());
        assert_eq!(&bytes[5..7], &[2, 0]);
        assert_eq!(&bytes[7..9], &[50, 3]);
        assert_eq!(&bytes[13..17], &FOOTER_MAGIC.to_le_bytes());

        let crc = u32::from_le_bytes([bytes[9], bytes[10], bytes[11], bytes[12]]);
        assert_eq!(crc, checksum(&bytes[..7], &bytes[7..9]));
    }

    #[test]
    fn test_payload_bytes_zero_copy() {
        let original = Bytes::from_static(b"test data");
        let frame = Frame::new(Direction::Request, 4, original.clone()).unwrap();

        let cloned = frame.payload_bytes();
        assert_eq!(cloned.as_ptr(), original.as_ptr());
    }
}
