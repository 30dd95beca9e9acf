//! Protocol module - wire format, framing, and frame types.
//!
//! This module implements the binary packet format shared by host and device:
//! - 7-byte header and 8-byte footer encoding/decoding
//! - Packet buffer for reassembling fragmented reads
//! - Frame struct with typed accessors

mod frame;
mod frame_buffer;
mod wire_format;

pub use frame::{build_frame, Frame};
pub use frame_buffer::{PacketBuffer, DEFAULT_STALE_TIMEOUT};
pub use wire_format::{
    checksum, strip, Command, Direction, Footer, Header, Status, CMD_MAX, FOOTER_MAGIC,
    FOOTER_SIZE, HEADER_SIZE, MAX_DATA_SIZE, PACKET_CAPACITY, REQUEST_MAGIC, RESPONSE_MAGIC,
};
