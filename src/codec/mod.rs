//! Codec module - typed command payloads.
//!
//! Every command carries a fixed little-endian layout. [`WirePayload`] encodes
//! a value into a `BytesMut` and decodes it from a received payload slice.
//!
//! Decoders accept payloads longer than the layout and ignore the excess, the
//! same way the firmware reads its packed structs. Shorter payloads fail with
//! [`MlfError::InvalidData`].
//!
//! # Example
//!
//! ```
//! use mlf_proto::codec::{SetBrightness, WirePayload};
//! use mlf_proto::protocol::strip;
//!
//! let request = SetBrightness { brightness: 50, strip_mask: strip::BOTH };
//! let bytes = request.to_bytes();
//! assert_eq!(&bytes[..], &[50, 0b11]);
//! assert_eq!(SetBrightness::decode(&bytes).unwrap(), request);
//! ```

mod payloads;

use bytes::{Bytes, BytesMut};

use crate::error::{MlfError, Result};

pub use payloads::{
    BrightnessState, DeviceInfo, Effect, EffectState, OnState, SetBrightness, SetColor, SetEffect,
};

/// A value with a fixed wire layout.
pub trait WirePayload: Sized {
    /// Append the encoded value to `buf`.
    fn encode(&self, buf: &mut BytesMut);

    /// Decode a value from the start of `data`.
    fn decode(data: &[u8]) -> Result<Self>;

    /// Encode into a freshly allocated buffer.
    fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.encode(&mut buf);
        buf.freeze()
    }
}

/// Commands without a payload.
impl WirePayload for () {
    fn encode(&self, _buf: &mut BytesMut) {}

    fn decode(_data: &[u8]) -> Result<Self> {
        Ok(())
    }
}

/// Fail with `InvalidData` unless `data` holds at least `needed` bytes.
pub(crate) fn ensure_len(data: &[u8], needed: usize, what: &str) -> Result<()> {
    if data.len() < needed {
        return Err(MlfError::InvalidData(format!(
            "{what} needs {needed} bytes, got {}",
            data.len()
        )));
    }
    Ok(())
}
