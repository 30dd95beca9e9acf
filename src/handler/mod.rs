//! Handler module - command handling and dispatch table.
//!
//! Provides:
//! - [`Handler`] - a command handler taking the request payload
//! - [`TypedHandler`] - decodes the request and encodes the reply via [`WirePayload`]
//! - [`HandlerRegistry`] - maps command ids to handlers
//!
//! # Example
//!
//! ```
//! use bytes::Bytes;
//! use mlf_proto::codec::{BrightnessState, SetBrightness};
//! use mlf_proto::handler::{HandlerRegistry, HandlerResult};
//! use mlf_proto::protocol::Command;
//!
//! let mut registry = HandlerRegistry::new();
//!
//! // Raw handler over payload bytes
//! registry.register(Command::TurnOn, |_payload: &[u8]| -> HandlerResult {
//!     Ok(Bytes::new())
//! });
//!
//! // Typed handler
//! registry.register_typed(Command::SetBrightness, |req: SetBrightness| {
//!     Ok(BrightnessState { brightness: req.brightness })
//! });
//!
//! assert!(registry.contains(Command::SetBrightness));
//! ```
//!
//! [`WirePayload`]: crate::codec::WirePayload

mod registry;

pub use registry::{Handler, HandlerRegistry, HandlerResult, TypedHandler};
