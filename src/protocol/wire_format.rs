//! Wire format encoding and decoding.
//!
//! Every packet is a header, a payload of `data_size` bytes and a footer:
//! ```text
//! ┌──────────┬──────────┬───────────┬─────────────┬──────────┬──────────┐
//! │ Magic    │ Selector │ Data size │ Data        │ Checksum │ Magic    │
//! │ 4 bytes  │ 1 byte   │ 2 bytes   │ data_size   │ 4 bytes  │ 4 bytes  │
//! │ u32 LE   │          │ u16 LE    │             │ u32 LE   │ u32 LE   │
//! └──────────┴──────────┴───────────┴─────────────┴──────────┴──────────┘
//! ```
//!
//! The header magic tells requests from responses. In a request the selector
//! is a command id, in a response it is a status code. All multi-byte
//! integers are Little Endian.

use std::fmt;

use crate::error::FrameError;

/// Header magic of a request packet.
pub const REQUEST_MAGIC: u32 = 0x004D_4C46;

/// Header magic of a response packet.
pub const RESPONSE_MAGIC: u32 = 0x0052_4C4D;

/// Magic closing every packet.
pub const FOOTER_MAGIC: u32 = 0x7364_656C;

/// Maximum payload size in bytes.
pub const MAX_DATA_SIZE: usize = 2048;

/// Header size in bytes (fixed, exactly 7).
pub const HEADER_SIZE: usize = 7;

/// Footer size in bytes (fixed, exactly 8).
pub const FOOTER_SIZE: usize = 8;

/// Largest packet a reassembly buffer must hold.
pub const PACKET_CAPACITY: usize = MAX_DATA_SIZE + HEADER_SIZE + FOOTER_SIZE;

/// Number of commands that may appear on the wire.
pub const CMD_MAX: u8 = 9;

/// Commands understood by the controller.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    TurnOff = 0,
    TurnOn = 1,
    GetInfo = 2,
    SetBrightness = 3,
    SetColor = 4,
    SetEffect = 5,
    GetBrightness = 6,
    GetEffect = 7,
    GetOnState = 8,
    /// Reserved for response correlation, never sent as a command.
    HandleResponse = 9,
}

impl Command {
    /// All commands that may be sent on the wire, in id order.
    pub const WIRE: [Command; CMD_MAX as usize] = [
        Command::TurnOff,
        Command::TurnOn,
        Command::GetInfo,
        Command::SetBrightness,
        Command::SetColor,
        Command::SetEffect,
        Command::GetBrightness,
        Command::GetEffect,
        Command::GetOnState,
    ];

    /// Resolve a wire command id. Ids at or above `CMD_MAX` are rejected.
    pub fn from_wire(id: u8) -> Option<Self> {
        Self::WIRE.get(id as usize).copied()
    }

    /// Numeric id of this command.
    #[inline]
    pub fn id(self) -> u8 {
        self as u8
    }

    /// Whether this command may appear in a request header.
    #[inline]
    pub fn is_wire(self) -> bool {
        self.id() < CMD_MAX
    }
}

impl TryFrom<u8> for Command {
    type Error = FrameError;

    fn try_from(id: u8) -> Result<Self, Self::Error> {
        Self::from_wire(id).ok_or(FrameError::InvalidCommand(id))
    }
}

/// Status carried in the selector byte of a response.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Ok = 0,
    Ping = 1,
    InvalidCommand = 128,
    InvalidHeader = 129,
    InvalidData = 130,
    InvalidFooter = 131,
    NotReady = 132,
    Timeout = 133,
    DataTooLarge = 134,
}

impl Status {
    /// Resolve a wire status code.
    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => Status::Ok,
            1 => Status::Ping,
            128 => Status::InvalidCommand,
            129 => Status::InvalidHeader,
            130 => Status::InvalidData,
            131 => Status::InvalidFooter,
            132 => Status::NotReady,
            133 => Status::Timeout,
            134 => Status::DataTooLarge,
            _ => return None,
        })
    }

    /// Numeric status code.
    #[inline]
    pub fn code(self) -> u8 {
        self as u8
    }

    /// `Ok` and the informational `Ping`.
    #[inline]
    pub fn is_success(self) -> bool {
        matches!(self, Status::Ok | Status::Ping)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Status::Ok => "ok",
            Status::Ping => "ping",
            Status::InvalidCommand => "invalid command",
            Status::InvalidHeader => "malformed header",
            Status::InvalidData => "invalid data",
            Status::InvalidFooter => "malformed footer",
            Status::NotReady => "device not ready",
            Status::Timeout => "timeout",
            Status::DataTooLarge => "data too large",
        };
        f.write_str(text)
    }
}

/// Strip selection bits used by brightness, color and effect commands.
pub mod strip {
    /// Upper strip.
    pub const TOP: u8 = 0b01;
    /// Lower strip.
    pub const BOTTOM: u8 = 0b10;
    /// Both strips.
    pub const BOTH: u8 = TOP | BOTTOM;

    /// Check if a strip bit is selected in a mask.
    #[inline]
    pub fn selects(mask: u8, strip: u8) -> bool {
        mask & strip != 0
    }
}

/// Packet direction, encoded by the header magic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Request,
    Response,
}

impl Direction {
    /// Header magic for this direction.
    #[inline]
    pub fn magic(self) -> u32 {
        match self {
            Direction::Request => REQUEST_MAGIC,
            Direction::Response => RESPONSE_MAGIC,
        }
    }

    /// Resolve a header magic.
    pub fn from_magic(magic: u32) -> Option<Self> {
        match magic {
            REQUEST_MAGIC => Some(Direction::Request),
            RESPONSE_MAGIC => Some(Direction::Response),
            _ => None,
        }
    }
}

/// Decoded packet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Request or response, from the magic.
    pub direction: Direction,
    /// Command id (request) or status code (response).
    pub selector: u8,
    /// Payload length in bytes.
    pub data_size: u16,
}

impl Header {
    /// Create a new header.
    pub fn new(direction: Direction, selector: u8, data_size: u16) -> Self {
        Self {
            direction,
            selector,
            data_size,
        }
    }

    /// Encode header to bytes (Little Endian).
    ///
    /// # Example
    ///
    /// ```
    /// use mlf_proto::protocol::{Direction, Header, HEADER_SIZE};
    ///
    /// let header = Header::new(Direction::Request, 2, 0);
    /// let bytes = header.encode();
    /// assert_eq!(bytes.len(), HEADER_SIZE);
    /// assert_eq!(&bytes[..4], &[0x46, 0x4C, 0x4D, 0x00]);
    /// ```
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        self.encode_into(&mut buf);
        buf
    }

    /// Encode header into an existing buffer.
    ///
    /// # Panics
    ///
    /// Panics if buffer is smaller than `HEADER_SIZE` (7 bytes).
    pub fn encode_into(&self, buf: &mut [u8]) {
        buf[0..4].copy_from_slice(&self.direction.magic().to_le_bytes());
        buf[4] = self.selector;
        buf[5..7].copy_from_slice(&self.data_size.to_le_bytes());
    }

    /// Decode header from bytes, checking the magic only.
    ///
    /// A buffer shorter than `HEADER_SIZE` is reported as an invalid header.
    pub fn decode(buf: &[u8]) -> Result<Self, FrameError> {
        if buf.len() < HEADER_SIZE {
            return Err(FrameError::InvalidHeader { magic: 0 });
        }
        let magic = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let direction =
            Direction::from_magic(magic).ok_or(FrameError::InvalidHeader { magic })?;
        Ok(Self {
            direction,
            selector: buf[4],
            data_size: u16::from_le_bytes([buf[5], buf[6]]),
        })
    }

    /// Validate the header for protocol compliance.
    ///
    /// Checks:
    /// - Command id is in range (requests only)
    /// - Data size doesn't exceed `MAX_DATA_SIZE`
    pub fn validate(&self) -> Result<(), FrameError> {
        if self.direction == Direction::Request && self.selector >= CMD_MAX {
            return Err(FrameError::InvalidCommand(self.selector));
        }

        if self.data_size as usize > MAX_DATA_SIZE {
            return Err(FrameError::DataTooLarge {
                size: self.data_size as usize,
                max: MAX_DATA_SIZE,
            });
        }

        Ok(())
    }

    /// Total packet length announced by this header.
    #[inline]
    pub fn packet_len(&self) -> usize {
        HEADER_SIZE + self.data_size as usize + FOOTER_SIZE
    }
}

/// Decoded packet footer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Footer {
    /// CRC-32 over header and payload.
    pub checksum: u32,
}

impl Footer {
    /// Encode footer to bytes (Little Endian).
    pub fn encode(&self) -> [u8; FOOTER_SIZE] {
        let mut buf = [0u8; FOOTER_SIZE];
        buf[0..4].copy_from_slice(&self.checksum.to_le_bytes());
        buf[4..8].copy_from_slice(&FOOTER_MAGIC.to_le_bytes());
        buf
    }

    /// Decode footer from bytes, checking the magic.
    pub fn decode(buf: &[u8]) -> Result<Self, FrameError> {
        if buf.len() < FOOTER_SIZE {
            return Err(FrameError::InvalidFooter { magic: 0 });
        }
        let magic = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
        if magic != FOOTER_MAGIC {
            return Err(FrameError::InvalidFooter { magic });
        }
        Ok(Self {
            checksum: u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]),
        })
    }
}

/// CRC-32 over encoded header and payload.
pub fn checksum(header: &[u8], payload: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(header);
    hasher.update(payload);
    hasher.finalize()
}
