//! # mlf-proto
//!
//! Request/response protocol for LED controllers over a byte stream
//! (USB CDC, UART).
//!
//! Each frame is a 7-byte header, up to 2048 bytes of payload and an 8-byte
//! footer with a CRC-32. Requests carry a command id, responses a status.
//! A link has at most one outstanding request; there are no request ids.
//!
//! ## Architecture
//!
//! - **Reassembly** ([`protocol::PacketBuffer`]): bytes in, validated frames out
//! - **Dispatch** ([`ProtocolContext`]): one-frame mailbox, handler table,
//!   forwarding rules and error replies
//! - **Invocation** ([`Invoker`]): send a request and await its response
//! - **Driver** ([`Link`]): reader and writer tasks over a tokio stream
//!
//! ## Example
//!
//! ```no_run
//! use mlf_proto::device::{Device, MemoryStrip};
//! use mlf_proto::{Controller, Link};
//!
//! #[tokio::main]
//! async fn main() -> mlf_proto::Result<()> {
//!     let (host_stream, device_stream) = tokio::io::duplex(4096);
//!
//!     let device = Device::new(MemoryStrip::new(90), MemoryStrip::new(216));
//!     let _device_link = Link::builder()
//!         .name("device")
//!         .handlers(device.handlers())
//!         .start(device_stream);
//!
//!     let host = Link::builder().name("host").start(host_stream);
//!     let controller = Controller::connect(host.invoker()).await?;
//!     controller.turn_on().await?;
//!     Ok(())
//! }
//! ```

pub mod clock;
pub mod codec;
pub mod config;
pub mod context;
pub mod controller;
pub mod device;
pub mod error;
pub mod handler;
pub mod invoker;
pub mod link;
pub mod protocol;
pub mod retry;
pub mod transport;
pub mod writer;

pub use config::LinkConfig;
pub use context::{LinkHandle, ProtocolContext};
pub use controller::Controller;
pub use error::{MlfError, Result};
pub use invoker::Invoker;
pub use link::{Link, LinkBuilder};
