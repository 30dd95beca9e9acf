//! Host-side API for an LED controller.
//!
//! [`Controller`] wraps an [`Invoker`] with one method per command. Connecting
//! fetches the device info once; later calls reuse it.
//!
//! # Example
//!
//! ```no_run
//! use mlf_proto::{Controller, Link};
//!
//! # async fn run(stream: tokio::io::DuplexStream) -> mlf_proto::Result<()> {
//! let link = Link::builder().name("usb").start(stream);
//! let controller = Controller::connect(link.invoker()).await?;
//!
//! controller.turn_on().await?;
//! controller.set_brightness_percent(40).await?;
//! let percent = controller.brightness_percent().await?;
//! println!("{} LEDs at {percent}%", controller.leds_count());
//! # Ok(())
//! # }
//! ```

use crate::codec::{
    BrightnessState, DeviceInfo, Effect, EffectState, OnState, SetBrightness, SetColor, SetEffect,
    WirePayload,
};
use crate::error::{MlfError, Result};
use crate::invoker::Invoker;
use crate::protocol::{strip, Command};

/// A connected LED controller.
#[derive(Debug, Clone)]
pub struct Controller {
    invoker: Invoker,
    info: DeviceInfo,
}

impl Controller {
    /// Query the device info and return a connected controller.
    ///
    /// Fails with `InvalidData` unless the reply is exactly the info layout.
    pub async fn connect(invoker: Invoker) -> Result<Self> {
        let reply = invoker.invoke(Command::GetInfo, &[]).await?;
        if reply.len() != DeviceInfo::SIZE {
            return Err(MlfError::InvalidData(format!(
                "device info reply has {} bytes, expected {}",
                reply.len(),
                DeviceInfo::SIZE
            )));
        }
        let info = DeviceInfo::decode(&reply)?;

        tracing::debug!(
            link = %invoker.link().name(),
            fw_version = info.fw_version,
            leds_top = info.leds_top,
            leds_bottom = info.leds_bottom,
            "Controller connected"
        );
        Ok(Self { invoker, info })
    }

    pub fn info(&self) -> DeviceInfo {
        self.info
    }

    pub fn fw_version(&self) -> u8 {
        self.info.fw_version
    }

    /// LEDs on both strips.
    pub fn leds_count(&self) -> u32 {
        self.info.leds_count()
    }

    pub async fn turn_on(&self) -> Result<()> {
        self.invoker.invoke(Command::TurnOn, &[]).await?;
        Ok(())
    }

    pub async fn turn_off(&self) -> Result<()> {
        self.invoker.invoke(Command::TurnOff, &[]).await?;
        Ok(())
    }

    pub async fn is_turned_on(&self) -> Result<bool> {
        let state: OnState = self.invoker.call(Command::GetOnState, &()).await?;
        Ok(state.is_on)
    }

    /// Set the brightness of both strips.
    pub async fn set_brightness(&self, brightness: u8) -> Result<()> {
        let request = SetBrightness {
            brightness,
            strip_mask: strip::BOTH,
        };
        self.invoker.call::<_, ()>(Command::SetBrightness, &request).await
    }

    /// Set the brightness of both strips from a percentage (clamped to 100).
    pub async fn set_brightness_percent(&self, percent: u8) -> Result<()> {
        let percent = u16::from(percent.min(100));
        self.set_brightness((percent * 255 / 100) as u8).await
    }

    /// Set one color per LED, bottom strip first.
    pub async fn set_colors(&self, colors: &[u32]) -> Result<()> {
        let request = SetColor {
            strip_mask: strip::BOTH,
            colors: colors.to_vec(),
        };
        self.invoker.call::<_, ()>(Command::SetColor, &request).await
    }

    pub async fn set_effect(
        &self,
        effect: Effect,
        speed: u8,
        strip_mask: u8,
        color: u32,
    ) -> Result<()> {
        let request = SetEffect {
            effect: effect.id(),
            speed,
            strip_mask,
            color,
        };
        self.invoker.call::<_, ()>(Command::SetEffect, &request).await
    }

    pub async fn brightness(&self) -> Result<u8> {
        let state: BrightnessState = self.invoker.call(Command::GetBrightness, &()).await?;
        Ok(state.brightness)
    }

    /// Current brightness as a percentage.
    pub async fn brightness_percent(&self) -> Result<u8> {
        let brightness = u16::from(self.brightness().await?);
        Ok((brightness * 100 / 255) as u8)
    }

    /// Current effect, speed and color.
    pub async fn effect(&self) -> Result<EffectState> {
        self.invoker.call(Command::GetEffect, &()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::Link;
    use crate::protocol::Status;
    use std::sync::{Arc, Mutex};

    /// Device link with canned handlers and the host link facing it.
    fn device_pair(info_reply: Vec<u8>) -> (Link, Link, Arc<Mutex<Vec<SetBrightness>>>) {
        let (host_stream, device_stream) = tokio::io::duplex(4096);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();

        let device = Link::builder()
            .name("device")
            .handle(Command::GetInfo, move |_: &[u8]| -> crate::handler::HandlerResult {
                Ok(info_reply.clone().into())
            })
            .handle_typed(Command::SetBrightness, move |req: SetBrightness| {
                log.lock().unwrap().push(req);
                Ok(())
            })
            .handle_typed(Command::GetBrightness, |_: ()| {
                Ok(BrightnessState { brightness: 128 })
            })
            .handle_typed(Command::GetOnState, |_: ()| Ok(OnState { is_on: true }))
            .start(device_stream);
        let host = Link::builder().name("host").start(host_stream);
        (device, host, seen)
    }

    #[tokio::test]
    async fn test_connect_reads_info() {
        let (_device, host, _) = device_pair(vec![1, 90, 0, 216, 0]);

        let controller = Controller::connect(host.invoker()).await.unwrap();

        assert_eq!(controller.fw_version(), 1);
        assert_eq!(controller.info().leds_top, 90);
        assert_eq!(controller.info().leds_bottom, 216);
        assert_eq!(controller.leds_count(), 306);
    }

    #[tokio::test]
    async fn test_connect_rejects_wrong_info_size() {
        let (_device, host, _) = device_pair(vec![1, 90, 0, 216, 0, 0]);

        let result = Controller::connect(host.invoker()).await;
        assert!(matches!(result, Err(MlfError::InvalidData(_))));
    }

    #[tokio::test]
    async fn test_brightness_commands() {
        let (_device, host, seen) = device_pair(vec![1, 90, 0, 216, 0]);
        let controller = Controller::connect(host.invoker()).await.unwrap();

        controller.set_brightness_percent(40).await.unwrap();
        assert_eq!(controller.brightness().await.unwrap(), 128);
        assert_eq!(controller.brightness_percent().await.unwrap(), 50);
        assert!(controller.is_turned_on().await.unwrap());

        let seen = seen.lock().unwrap();
        assert_eq!(
            seen[0],
            SetBrightness {
                brightness: 102,
                strip_mask: strip::BOTH
            }
        );
    }

    #[tokio::test]
    async fn test_missing_handler_is_not_ready() {
        let (_device, host, _) = device_pair(vec![1, 90, 0, 216, 0]);
        let controller = Controller::connect(host.invoker()).await.unwrap();

        let result = controller.effect().await;
        assert!(matches!(result, Err(MlfError::Status(Status::NotReady))));
    }
}
