//! Payload layouts for the LED controller commands.

use std::fmt;

use bytes::{BufMut, BytesMut};

use super::{ensure_len, WirePayload};
use crate::error::{MlfError, Result};

/// Built-in animation effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Effect {
    Rainbow = 0,
    ColorCycle = 1,
    StaticColor = 2,
    BarCycle = 3,
}

impl Effect {
    /// Number of effects the firmware knows.
    pub const COUNT: u8 = 4;

    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(Effect::Rainbow),
            1 => Some(Effect::ColorCycle),
            2 => Some(Effect::StaticColor),
            3 => Some(Effect::BarCycle),
            _ => None,
        }
    }

    #[inline]
    pub fn id(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for Effect {
    type Error = MlfError;

    fn try_from(id: u8) -> Result<Self> {
        Effect::from_id(id).ok_or_else(|| MlfError::InvalidData(format!("unknown effect {id}")))
    }
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Effect::Rainbow => "rainbow",
            Effect::ColorCycle => "color cycle",
            Effect::StaticColor => "static color",
            Effect::BarCycle => "bar cycle",
        };
        f.write_str(name)
    }
}

/// `GetInfo` reply: `fw_version:u8 | leds_top:u16 | leds_bottom:u16`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceInfo {
    pub fw_version: u8,
    pub leds_top: u16,
    pub leds_bottom: u16,
}

impl DeviceInfo {
    pub const SIZE: usize = 5;

    /// Total LEDs on both strips.
    pub fn leds_count(&self) -> u32 {
        u32::from(self.leds_top) + u32::from(self.leds_bottom)
    }
}

impl WirePayload for DeviceInfo {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.fw_version);
        buf.put_u16_le(self.leds_top);
        buf.put_u16_le(self.leds_bottom);
    }

    fn decode(data: &[u8]) -> Result<Self> {
        ensure_len(data, Self::SIZE, "device info")?;
        Ok(Self {
            fw_version: data[0],
            leds_top: u16::from_le_bytes([data[1], data[2]]),
            leds_bottom: u16::from_le_bytes([data[3], data[4]]),
        })
    }
}

/// `SetBrightness` request: `brightness:u8 | strip_mask:u8`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetBrightness {
    pub brightness: u8,
    pub strip_mask: u8,
}

impl WirePayload for SetBrightness {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.brightness);
        buf.put_u8(self.strip_mask);
    }

    fn decode(data: &[u8]) -> Result<Self> {
        ensure_len(data, 2, "set brightness")?;
        Ok(Self {
            brightness: data[0],
            strip_mask: data[1],
        })
    }
}

/// `SetColor` request: `strip_mask:u8` followed by one `u32` per LED.
///
/// A trailing partial color is ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetColor {
    pub strip_mask: u8,
    pub colors: Vec<u32>,
}

impl WirePayload for SetColor {
    fn encode(&self, buf: &mut BytesMut) {
        buf.reserve(1 + self.colors.len() * 4);
        buf.put_u8(self.strip_mask);
        for color in &self.colors {
            buf.put_u32_le(*color);
        }
    }

    fn decode(data: &[u8]) -> Result<Self> {
        ensure_len(data, 1, "set color")?;
        let colors = data[1..]
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        Ok(Self {
            strip_mask: data[0],
            colors,
        })
    }
}

/// `SetEffect` request: `effect:u8 | speed:u8 | strip_mask:u8 | color:u32`.
///
/// The effect id is kept raw so the receiver decides how to treat unknown ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetEffect {
    pub effect: u8,
    pub speed: u8,
    pub strip_mask: u8,
    pub color: u32,
}

impl WirePayload for SetEffect {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.effect);
        buf.put_u8(self.speed);
        buf.put_u8(self.strip_mask);
        buf.put_u32_le(self.color);
    }

    fn decode(data: &[u8]) -> Result<Self> {
        ensure_len(data, 7, "set effect")?;
        Ok(Self {
            effect: data[0],
            speed: data[1],
            strip_mask: data[2],
            color: u32::from_le_bytes([data[3], data[4], data[5], data[6]]),
        })
    }
}

/// `GetBrightness` reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrightnessState {
    pub brightness: u8,
}

impl WirePayload for BrightnessState {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.brightness);
    }

    fn decode(data: &[u8]) -> Result<Self> {
        ensure_len(data, 1, "brightness")?;
        Ok(Self {
            brightness: data[0],
        })
    }
}

/// `GetEffect` reply: `effect:u8 | speed:u8 | color:u32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectState {
    pub effect: u8,
    pub speed: u8,
    pub color: u32,
}

impl WirePayload for EffectState {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.effect);
        buf.put_u8(self.speed);
        buf.put_u32_le(self.color);
    }

    fn decode(data: &[u8]) -> Result<Self> {
        ensure_len(data, 6, "effect state")?;
        Ok(Self {
            effect: data[0],
            speed: data[1],
            color: u32::from_le_bytes([data[2], data[3], data[4], data[5]]),
        })
    }
}

/// `GetOnState` reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OnState {
    pub is_on: bool,
}

impl WirePayload for OnState {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(u8::from(self.is_on));
    }

    fn decode(data: &[u8]) -> Result<Self> {
        ensure_len(data, 1, "on state")?;
        Ok(Self { is_on: data[0] != 0 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::strip;

    #[test]
    fn test_device_info_layout() {
        let info = DeviceInfo {
            fw_version: 1,
            leds_top: 90,
            leds_bottom: 216,
        };
        let bytes = info.to_bytes();

        assert_eq!(&bytes[..], &[1, 90, 0, 216, 0]);
        assert_eq!(DeviceInfo::decode(&bytes).unwrap(), info);
        assert_eq!(info.leds_count(), 306);
    }

    #[test]
    fn test_short_payload_is_invalid_data() {
        assert!(matches!(
            DeviceInfo::decode(&[1, 90, 0, 216]),
            Err(MlfError::InvalidData(_))
        ));
        assert!(matches!(SetEffect::decode(&[0; 6]), Err(MlfError::InvalidData(_))));
        assert!(matches!(SetColor::decode(&[]), Err(MlfError::InvalidData(_))));
        assert!(matches!(OnState::decode(&[]), Err(MlfError::InvalidData(_))));
    }

    #[test]
    fn test_set_color_ignores_partial_trailing_color() {
        let data = [strip::BOTTOM, 0x11, 0x22, 0x33, 0x00, 0xFF, 0xFF];
        let decoded = SetColor::decode(&data).unwrap();

        assert_eq!(decoded.strip_mask, strip::BOTTOM);
        assert_eq!(decoded.colors, vec![0x0033_2211]);
    }

    #[test]
    fn test_set_color_layout() {
        let request = SetColor {
            strip_mask: strip::BOTH,
            colors: vec![0x00FF_0000, 0x0000_00FF],
        };
        let bytes = request.to_bytes();

        assert_eq!(bytes.len(), 9);
        assert_eq!(&bytes[1..5], &[0x00, 0x00, 0xFF, 0x00]);
    }

    #[test]
    fn test_set_effect_layout() {
        let request = SetEffect {
            effect: Effect::StaticColor.id(),
            speed: 5,
            strip_mask: strip::TOP,
            color: 0x0012_3456,
        };
        let bytes = request.to_bytes();

        assert_eq!(&bytes[..], &[2, 5, 1, 0x56, 0x34, 0x12, 0x00]);
    }

    #[test]
    fn test_effect_ids() {
        assert_eq!(Effect::from_id(3), Some(Effect::BarCycle));
        assert_eq!(Effect::from_id(Effect::COUNT), None);
        assert!(Effect::try_from(9).is_err());
        assert_eq!(Effect::ColorCycle.to_string(), "color cycle");
    }

    #[test]
    fn test_unit_payload_is_empty() {
        assert!(().to_bytes().is_empty());
    }
}
