//! Firmware-side handler set for an LED controller.
//!
//! A [`Device`] owns the two strips of the controller and its operating mode.
//! [`Device::handlers`] builds a [`HandlerRegistry`] answering every wire
//! command from that state, ready for [`LinkBuilder::handlers`] or
//! [`ProtocolContext::with_handlers`].
//!
//! Pixel output is behind the [`LedStrip`] trait. Effects are not rendered
//! here: [`Device::tick`] only advances the animation frame counter at the
//! configured speed, and the caller draws the frame.
//!
//! [`LinkBuilder::handlers`]: crate::link::LinkBuilder::handlers
//! [`ProtocolContext::with_handlers`]: crate::context::ProtocolContext::with_handlers

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::codec::{
    BrightnessState, DeviceInfo, Effect, EffectState, OnState, SetBrightness, SetColor, SetEffect,
};
use crate::handler::HandlerRegistry;
use crate::protocol::{strip, Command, Status};

/// Firmware version reported by `GetInfo`.
pub const FW_VERSION: u8 = 1;

/// Output side of one addressable LED strip.
pub trait LedStrip: Send + 'static {
    fn led_count(&self) -> u16;

    fn set_brightness(&mut self, brightness: u8);

    /// Set one pixel. Indexes past the end are ignored.
    fn set_pixel(&mut self, index: usize, color: u32);

    /// Switch every pixel off.
    fn clear(&mut self);
}

/// In-memory strip holding its pixels and brightness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryStrip {
    pixels: Vec<u32>,
    brightness: u8,
}

impl MemoryStrip {
    pub fn new(led_count: u16) -> Self {
        Self {
            pixels: vec![0; usize::from(led_count)],
            brightness: u8::MAX,
        }
    }

    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    pub fn brightness(&self) -> u8 {
        self.brightness
    }
}

impl LedStrip for MemoryStrip {
    fn led_count(&self) -> u16 {
        self.pixels.len() as u16
    }

    fn set_brightness(&mut self, brightness: u8) {
        self.brightness = brightness;
    }

    fn set_pixel(&mut self, index: usize, color: u32) {
        if let Some(pixel) = self.pixels.get_mut(index) {
            *pixel = color;
        }
    }

    fn clear(&mut self) {
        self.pixels.fill(0);
    }
}

/// What the strips show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Off,
    /// Animated effect, advanced by [`Device::tick`].
    Effect,
    /// Static colors set by `SetColor`.
    Colors,
}

/// Effect selected for one strip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StripEffect {
    pub effect: Effect,
    pub color: u32,
}

impl Default for StripEffect {
    fn default() -> Self {
        Self {
            effect: Effect::Rainbow,
            color: 0,
        }
    }
}

struct DeviceState<S> {
    top: S,
    bottom: S,
    mode: Mode,
    /// Mode `TurnOn` switches back to.
    resume: Mode,
    brightness: u8,
    top_effect: StripEffect,
    bottom_effect: StripEffect,
    /// Frame increment per tick, always `speed + 1`.
    speed_step: u32,
    frame: u32,
}

impl<S: LedStrip> DeviceState<S> {
    fn info(&self) -> DeviceInfo {
        DeviceInfo {
            fw_version: FW_VERSION,
            leds_top: self.top.led_count(),
            leds_bottom: self.bottom.led_count(),
        }
    }

    fn turn_off(&mut self) {
        if self.mode != Mode::Off {
            self.resume = self.mode;
        }
        self.mode = Mode::Off;
        self.top.clear();
        self.bottom.clear();
    }

    fn turn_on(&mut self) {
        if self.mode == Mode::Off {
            self.mode = self.resume;
        }
    }

    fn set_brightness(&mut self, req: SetBrightness) {
        if strip::selects(req.strip_mask, strip::TOP) {
            self.top.set_brightness(req.brightness);
        }
        if strip::selects(req.strip_mask, strip::BOTTOM) {
            self.bottom.set_brightness(req.brightness);
        }
        self.brightness = req.brightness;
    }

    fn set_effect(&mut self, req: SetEffect) -> Result<(), Status> {
        let effect = Effect::from_id(req.effect).ok_or(Status::InvalidData)?;
        let selected = StripEffect {
            effect,
            color: req.color,
        };

        self.speed_step = u32::from(req.speed) + 1;
        if strip::selects(req.strip_mask, strip::TOP) {
            self.top_effect = selected;
        }
        if strip::selects(req.strip_mask, strip::BOTTOM) {
            self.bottom_effect = selected;
        }
        self.mode = Mode::Effect;
        Ok(())
    }

    /// Bottom strip first, then the top strip.
    fn set_colors(&mut self, colors: &[u32]) {
        let bottom_len = usize::from(self.bottom.led_count());
        let total = bottom_len + usize::from(self.top.led_count());

        for (i, color) in colors.iter().take(total).enumerate() {
            if i < bottom_len {
                self.bottom.set_pixel(i, *color);
            } else {
                self.top.set_pixel(i - bottom_len, *color);
            }
        }
        self.mode = Mode::Colors;
    }

    fn effect_state(&self) -> EffectState {
        EffectState {
            effect: self.bottom_effect.effect.id(),
            speed: self.speed_step.saturating_sub(1).min(u32::from(u8::MAX)) as u8,
            color: self.bottom_effect.color,
        }
    }
}

/// LED controller state shared by its command handlers.
pub struct Device<S: LedStrip> {
    state: Arc<Mutex<DeviceState<S>>>,
}

impl<S: LedStrip> Clone for Device<S> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

impl<S: LedStrip> Device<S> {
    /// Create a device that starts switched off.
    pub fn new(top: S, bottom: S) -> Self {
        Self {
            state: Arc::new(Mutex::new(DeviceState {
                top,
                bottom,
                mode: Mode::Off,
                resume: Mode::Effect,
                brightness: u8::MAX,
                top_effect: StripEffect::default(),
                bottom_effect: StripEffect::default(),
                speed_step: 1,
                frame: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, DeviceState<S>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn info(&self) -> DeviceInfo {
        self.lock().info()
    }

    pub fn mode(&self) -> Mode {
        self.lock().mode
    }

    pub fn is_on(&self) -> bool {
        self.mode() != Mode::Off
    }

    /// Effects selected for the top and bottom strips.
    pub fn effects(&self) -> (StripEffect, StripEffect) {
        let state = self.lock();
        (state.top_effect, state.bottom_effect)
    }

    /// Run `f` with both strips, top first.
    pub fn with_strips<R>(&self, f: impl FnOnce(&mut S, &mut S) -> R) -> R {
        let mut state = self.lock();
        let state = &mut *state;
        f(&mut state.top, &mut state.bottom)
    }

    /// Advance the animation and return the frame to draw.
    ///
    /// The counter only moves while an effect is shown.
    pub fn tick(&self) -> u32 {
        let mut state = self.lock();
        if state.mode == Mode::Effect {
            state.frame = state.frame.wrapping_add(state.speed_step);
        }
        state.frame
    }

    /// Build handlers for every wire command over this device.
    pub fn handlers(&self) -> HandlerRegistry {
        let mut registry = HandlerRegistry::new();

        let device = self.clone();
        registry.register_typed(Command::GetInfo, move |_: ()| Ok(device.info()));

        let device = self.clone();
        registry.register_typed(Command::TurnOff, move |_: ()| {
            device.lock().turn_off();
            tracing::debug!("Device off");
            Ok(())
        });

        let device = self.clone();
        registry.register_typed(Command::TurnOn, move |_: ()| {
            let mut state = device.lock();
            state.turn_on();
            tracing::debug!(mode = ?state.mode, "Device on");
            Ok(())
        });

        let device = self.clone();
        registry.register_typed(Command::SetBrightness, move |req: SetBrightness| {
            device.lock().set_brightness(req);
            Ok(())
        });

        let device = self.clone();
        registry.register_typed(Command::SetEffect, move |req: SetEffect| {
            device.lock().set_effect(req).map_err(|status| {
                tracing::warn!(effect = req.effect, "Rejecting unknown effect");
                status
            })
        });

        let device = self.clone();
        registry.register_typed(Command::SetColor, move |req: SetColor| {
            device.lock().set_colors(&req.colors);
            Ok(())
        });

        let device = self.clone();
        registry.register_typed(Command::GetBrightness, move |_: ()| {
            Ok(BrightnessState {
                brightness: device.lock().brightness,
            })
        });

        let device = self.clone();
        registry.register_typed(Command::GetEffect, move |_: ()| {
            Ok(device.lock().effect_state())
        });

        let device = self.clone();
        registry.register_typed(Command::GetOnState, move |_: ()| {
            Ok(OnState {
                is_on: device.is_on(),
            })
        });

        registry
    }
}
