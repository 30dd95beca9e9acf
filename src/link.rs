//! Link builder and async driver.
//!
//! The [`LinkBuilder`] provides a fluent API for configuring handlers and
//! forwarding rules. It either builds a bare [`ProtocolContext`] over any
//! [`Transport`] (for a caller-owned poll loop), or starts a [`Link`] over an
//! async byte stream:
//! 1. Split the stream into read and write halves
//! 2. Spawn the writer task
//! 3. Spawn the read loop, which feeds the context and dispatches every frame
//!
//! # Example
//!
//! ```no_run
//! use mlf_proto::codec::{BrightnessState, SetBrightness};
//! use mlf_proto::protocol::Command;
//! use mlf_proto::Link;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (stream, _peer) = tokio::io::duplex(4096);
//!
//!     let link = Link::builder()
//!         .name("usb")
//!         .handle_typed(Command::SetBrightness, |req: SetBrightness| {
//!             Ok(BrightnessState { brightness: req.brightness })
//!         })
//!         .start(stream);
//!
//!     link.wait_for_shutdown().await?;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::clock::{Clock, SystemClock};
use crate::codec::WirePayload;
use crate::config::LinkConfig;
use crate::context::{LinkHandle, ProtocolContext};
use crate::error::{MlfError, Result};
use crate::handler::{Handler, HandlerRegistry};
use crate::invoker::Invoker;
use crate::protocol::{Command, Status};
use crate::transport::Transport;
use crate::writer::spawn_writer_task;

/// Builder for configuring and creating a link.
pub struct LinkBuilder {
    config: LinkConfig,
    clock: Arc<dyn Clock>,
    handlers: HandlerRegistry,
    forwards: Vec<(Command, LinkHandle)>,
}

impl LinkBuilder {
    /// Create a new link builder with default configuration.
    pub fn new() -> Self {
        Self {
            config: LinkConfig::default(),
            clock: Arc::new(SystemClock::new()),
            handlers: HandlerRegistry::new(),
            forwards: Vec::new(),
        }
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: LinkConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the link name used in log lines.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    /// Use a custom tick source.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Enable or disable footer checksum verification.
    ///
    /// Default: enabled
    pub fn verify_checksum(mut self, verify: bool) -> Self {
        self.config.verify_checksum = verify;
        self
    }

    /// Set the response deadline for invokers created from this link.
    ///
    /// Default: 1 second
    pub fn invoke_timeout(mut self, timeout: Duration) -> Self {
        self.config.invoke_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Replace the handler table, e.g. with [`Device::handlers`].
    ///
    /// [`Device::handlers`]: crate::device::Device::handlers
    pub fn handlers(mut self, handlers: HandlerRegistry) -> Self {
        self.handlers = handlers;
        self
    }

    /// Register a command handler over raw payload bytes.
    pub fn handle<H: Handler>(mut self, command: Command, handler: H) -> Self {
        self.handlers.register(command, handler);
        self
    }

    /// Register a command handler over typed payloads.
    pub fn handle_typed<F, Req, Resp>(mut self, command: Command, handler: F) -> Self
    where
        F: FnMut(Req) -> std::result::Result<Resp, Status> + Send + 'static,
        Req: WirePayload + 'static,
        Resp: WirePayload + 'static,
    {
        self.handlers.register_typed(command, handler);
        self
    }

    /// Relay requests for `command` to another link.
    pub fn forward(mut self, command: Command, target: &LinkHandle) -> Self {
        self.forwards.push((command, target.clone()));
        self
    }

    /// Build a context over a synchronous transport.
    ///
    /// The caller drives it with `feed`/`feed_from_queue` and `process_pending`.
    pub fn build(self, transport: impl Transport + 'static) -> ProtocolContext {
        let link = LinkHandle::with_clock(&self.config, transport, self.clock);
        let mut ctx = ProtocolContext::with_handlers(link, &self.config, self.handlers);
        for (command, target) in &self.forwards {
            ctx.register_forward(*command, target);
        }
        ctx
    }

    /// Start a link over a bidirectional stream.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start<S>(self, stream: S) -> Link
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        self.start_split(reader, writer)
    }

    /// Start a link over separate read and write halves.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start_split<R, W>(self, reader: R, writer: W) -> Link
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (transport, writer_task) = spawn_writer_task(writer, self.config.channel_capacity());
        let invoke_timeout = self.config.invoke_timeout();
        let chunk_size = self.config.read_chunk_size();

        let ctx = self.build(transport);
        let handle = ctx.link().clone();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let loop_handle = handle.clone();
        tokio::spawn(async move {
            let result = read_loop(reader, ctx, chunk_size).await;
            if let Err(e) = &result {
                tracing::error!(link = %loop_handle.name(), error = %e, "Read loop error");
            } else {
                tracing::debug!(link = %loop_handle.name(), "Stream closed");
            }
            // Wake any invoker still waiting on this link
            loop_handle.close();
            let _ = shutdown_tx.send(result);
        });

        Link {
            handle,
            invoke_timeout,
            shutdown_rx,
            _writer_task: writer_task,
        }
    }
}

impl Default for LinkBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Read loop - feeds received bytes to the context and dispatches frames.
async fn read_loop<R>(mut reader: R, mut ctx: ProtocolContext, chunk_size: usize) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; chunk_size];

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => return Ok(()),
            Ok(n) => n,
            Err(e) => return Err(MlfError::Io(e)),
        };

        ctx.receive_async(&buf[..n]).await;
    }
}

/// A running link.
///
/// Use [`invoker`](Self::invoker) to issue requests and
/// [`wait_for_shutdown`](Self::wait_for_shutdown) to block until the stream closes.
pub struct Link {
    handle: LinkHandle,
    invoke_timeout: Duration,
    shutdown_rx: oneshot::Receiver<Result<()>>,
    _writer_task: JoinHandle<Result<()>>,
}

impl Link {
    /// Create a new link builder.
    pub fn builder() -> LinkBuilder {
        LinkBuilder::new()
    }

    /// Shared handle of this link, e.g. as a forwarding target.
    pub fn handle(&self) -> &LinkHandle {
        &self.handle
    }

    pub fn name(&self) -> &str {
        self.handle.name()
    }

    /// Invoker issuing requests on this link.
    pub fn invoker(&self) -> Invoker {
        Invoker::with_timeout(self.handle.clone(), self.invoke_timeout)
    }

    /// Wait until the stream closes.
    ///
    /// Returns the read loop's error if it stopped on one.
    pub async fn wait_for_shutdown(self) -> Result<()> {
        match self.shutdown_rx.await {
            Ok(result) => result,
            Err(_) => Err(MlfError::ConnectionClosed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{BrightnessState, SetBrightness};
    use crate::handler::HandlerResult;
    use crate::protocol::strip;
    use crate::transport::IoTransport;
    use bytes::Bytes;

    #[test]
    fn test_builder_configuration() {
        let builder = Link::builder()
            .name("uart")
            .verify_checksum(false)
            .invoke_timeout(Duration::from_millis(250));

        assert_eq!(builder.config.name, "uart");
        assert!(!builder.config.verify_checksum);
        assert_eq!(builder.config.invoke_timeout(), Duration::from_millis(250));
    }

    #[test]
    fn test_builder_registers_handlers() {
        let ctx = Link::builder()
            .handle(Command::TurnOn, |_: &[u8]| -> HandlerResult { Ok(Bytes::new()) })
            .handle_typed(Command::SetBrightness, |req: SetBrightness| {
                Ok(BrightnessState {
                    brightness: req.brightness,
                })
            })
            .build(IoTransport::new(Vec::new()));

        assert!(ctx.handlers().contains(Command::TurnOn));
        assert!(ctx.handlers().contains(Command::SetBrightness));
        assert!(!ctx.handlers().contains(Command::GetInfo));
    }

    #[tokio::test]
    async fn test_link_round_trip() {
        let (host_stream, device_stream) = tokio::io::duplex(1024);

        let _device = Link::builder()
            .name("device")
            .handle_typed(Command::SetBrightness, |req: SetBrightness| {
                assert_eq!(req.strip_mask, strip::BOTH);
                Ok(())
            })
            .start(device_stream);
        let host = Link::builder().name("host").start(host_stream);

        let reply = host
            .invoker()
            .call::<_, ()>(
                Command::SetBrightness,
                &SetBrightness {
                    brightness: 50,
                    strip_mask: strip::BOTH,
                },
            )
            .await;
        assert!(reply.is_ok());
    }

    #[tokio::test]
    async fn test_shutdown_on_stream_close() {
        let (stream, peer) = tokio::io::duplex(64);
        let link = Link::builder().start(stream);

        drop(peer);

        assert!(link.wait_for_shutdown().await.is_ok());
    }
}
