//! Protocol context - one endpoint per transport.
//!
//! A [`ProtocolContext`] owns the receive side of a link: the packet buffer,
//! a single-slot mailbox, the handler table and the forwarding rules. It is
//! driven by exactly one owner through `&mut self`:
//!
//! ```text
//! transport RX ─► feed() ─► PacketBuffer ─► submit()
//!                                              ├─ Response ─► LinkHandle::complete
//!                                              └─ Request ─► mailbox (1 frame)
//!                                                                │
//!                               process_pending() ◄──────────────┘
//!                                 ├─ forward rule ─► target LinkHandle::relay
//!                                 └─ handler ─► response ─► transport TX
//! ```
//!
//! The outbound half lives in the shared [`LinkHandle`].
//!
//! # Example
//!
//! ```
//! use bytes::Bytes;
//! use mlf_proto::context::{LinkHandle, ProtocolContext};
//! use mlf_proto::handler::HandlerResult;
//! use mlf_proto::protocol::{Command, Frame};
//! use mlf_proto::transport::IoTransport;
//! use mlf_proto::LinkConfig;
//!
//! let config = LinkConfig::default();
//! let link = LinkHandle::new(&config, IoTransport::new(Vec::new()));
//! let mut ctx = ProtocolContext::new(link, &config);
//! ctx.register_handler(Command::TurnOn, |_: &[u8]| -> HandlerResult {
//!     Ok(Bytes::new())
//! });
//!
//! let request = Frame::request(Command::TurnOn, Bytes::new()).unwrap();
//! ctx.feed(&request.to_bytes());
//! assert!(ctx.is_pending());
//! assert!(ctx.process_pending());
//! assert!(!ctx.is_pending());
//! ```

mod handle;

use std::collections::HashMap;

use bytes::Bytes;

pub use handle::LinkHandle;

use crate::codec::WirePayload;
use crate::config::LinkConfig;
use crate::error::{FrameError, MlfError};
use crate::handler::{Handler, HandlerRegistry};
use crate::protocol::{Command, Frame, PacketBuffer, Status};
use crate::transport::{RxConsumer, TransportError};

/// Bytes moved from an RX ring per reassembler append.
const RX_DRAIN_CHUNK: usize = 64;

/// Receive-side endpoint of one link.
pub struct ProtocolContext {
    link: LinkHandle,
    reassembler: PacketBuffer,
    /// At most one completed frame awaiting dispatch.
    inbound: Option<Frame>,
    handlers: HandlerRegistry,
    forward_rules: HashMap<Command, LinkHandle>,
    response_capacity: usize,
    dropped: u64,
}

impl ProtocolContext {
    pub fn new(link: LinkHandle, config: &LinkConfig) -> Self {
        Self::with_handlers(link, config, HandlerRegistry::new())
    }

    /// Create a context with a prepared handler table.
    pub fn with_handlers(
        link: LinkHandle,
        config: &LinkConfig,
        handlers: HandlerRegistry,
    ) -> Self {
        Self {
            link,
            reassembler: PacketBuffer::with_options(
                config.verify_checksum,
                config.stale_timeout(),
            ),
            inbound: None,
            handlers,
            forward_rules: HashMap::new(),
            response_capacity: config.response_capacity(),
            dropped: 0,
        }
    }

    /// The link this context receives for and responds on.
    pub fn link(&self) -> &LinkHandle {
        &self.link
    }

    pub fn name(&self) -> &str {
        self.link.name()
    }

    /// Register a handler. The last registration for a command wins.
    pub fn register_handler<H: Handler>(&mut self, command: Command, handler: H) {
        self.handlers.register(command, handler);
    }

    /// Register a handler over typed request and reply payloads.
    pub fn register_typed<F, Req, Resp>(&mut self, command: Command, handler: F)
    where
        F: FnMut(Req) -> std::result::Result<Resp, Status> + Send + 'static,
        Req: WirePayload + 'static,
        Resp: WirePayload + 'static,
    {
        self.handlers.register_typed(command, handler);
    }

    /// Relay requests for `command` to `target` instead of a local handler.
    ///
    /// Forward rules are checked before the handler table.
    pub fn register_forward(&mut self, command: Command, target: &LinkHandle) {
        if !command.is_wire() {
            tracing::warn!(
                link = %self.name(),
                ?command,
                "Ignoring forward rule for internal command"
            );
            return;
        }
        self.forward_rules.insert(command, target.clone());
    }

    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    /// Whether a frame waits in the mailbox.
    pub fn is_pending(&self) -> bool {
        self.inbound.is_some()
    }

    /// Frames dropped because the mailbox was occupied.
    pub fn dropped_frames(&self) -> u64 {
        self.dropped
    }

    /// Bytes held by the reassembler.
    pub fn buffered(&self) -> usize {
        self.reassembler.len()
    }

    /// Feed received bytes to the reassembler.
    ///
    /// Completed requests go to the mailbox; a request completing while the
    /// mailbox is occupied is dropped. Responses bypass the mailbox and go
    /// straight to the link's pending slot. Framing errors are answered with
    /// an error response. Returns the number of frames completed.
    pub fn feed(&mut self, data: &[u8]) -> usize {
        self.ingest(data, false)
    }

    /// Feed received bytes and dispatch every frame as it completes.
    ///
    /// For a driver that is both producer and consumer of this context, so
    /// several frames arriving in one read are all served.
    pub fn receive(&mut self, data: &[u8]) -> usize {
        self.ingest(data, true)
    }

    /// Async variant of [`receive`](Self::receive) for the link driver.
    ///
    /// Busy transports are retried on the tokio timer, so the writer task
    /// can drain its queue between attempts.
    pub async fn receive_async(&mut self, data: &[u8]) -> usize {
        let now = self.link.now();
        let mut completed = 0;
        let mut next = self.reassembler.append(data, now);

        loop {
            match next {
                Ok(Some(frame)) => {
                    completed += 1;
                    if frame.is_response() {
                        self.link.complete_async(frame).await;
                    } else if self.submit(frame) {
                        self.process_pending_async().await;
                    }
                }
                Ok(None) => return completed,
                Err(e) => self.report_frame_error(&e),
            }
            next = self.reassembler.poll(now);
        }
    }

    /// Drain an RX ring into the reassembler. Returns the bytes consumed.
    pub fn feed_from_queue<const N: usize>(&mut self, rx: &mut RxConsumer<'_, N>) -> usize {
        let mut chunk = [0u8; RX_DRAIN_CHUNK];
        let mut total = 0;
        loop {
            let n = rx.read_into(&mut chunk);
            if n == 0 {
                return total;
            }
            self.feed(&chunk[..n]);
            total += n;
        }
    }

    fn ingest(&mut self, data: &[u8], dispatch: bool) -> usize {
        let now = self.link.now();
        let mut completed = 0;
        let mut next = self.reassembler.append(data, now);

        loop {
            match next {
                Ok(Some(frame)) => {
                    completed += 1;
                    if self.submit(frame) && dispatch {
                        self.process_pending();
                    }
                }
                Ok(None) => return completed,
                Err(e) => self.report_frame_error(&e),
            }
            next = self.reassembler.poll(now);
        }
    }

    fn report_frame_error(&self, error: &FrameError) {
        tracing::error!(link = %self.name(), error = %error, "Framing error, buffer reset");

        let status = error.status();
        if let Err(e) = self.link.send_once(&Frame::error(status)) {
            tracing::warn!(
                link = %self.name(),
                ?status,
                error = %e,
                "Failed to report framing error"
            );
        }
    }

    /// Accept a completed frame.
    ///
    /// A response is handed to the link's pending slot at once. A request is
    /// placed in the mailbox; returns `false` (and drops it) if the mailbox
    /// is occupied.
    pub fn submit(&mut self, frame: Frame) -> bool {
        if frame.is_response() {
            tracing::debug!(
                link = %self.name(),
                status = frame.selector(),
                len = frame.payload_len(),
                "Response received"
            );
            self.link.complete(frame);
            return false;
        }

        if self.inbound.is_some() {
            self.dropped += 1;
            tracing::warn!(
                link = %self.name(),
                selector = frame.selector(),
                dropped = self.dropped,
                "Mailbox occupied, dropping frame"
            );
            return false;
        }

        tracing::debug!(
            link = %self.name(),
            selector = frame.selector(),
            len = frame.payload_len(),
            "Request received"
        );
        self.inbound = Some(frame);
        true
    }

    /// Dispatch the request waiting in the mailbox, if any.
    ///
    /// Returns `false` when there was nothing to do. Never blocks except for
    /// the bounded busy-retry of the response write.
    pub fn process_pending(&mut self) -> bool {
        let outbound = match self.inbound.take() {
            Some(frame) => self.dispatch(frame),
            None => return false,
        };
        if let Some(outbound) = outbound {
            outbound.send(&self.link);
        }
        true
    }

    /// Async variant of [`process_pending`](Self::process_pending).
    pub async fn process_pending_async(&mut self) -> bool {
        let outbound = match self.inbound.take() {
            Some(frame) => self.dispatch(frame),
            None => return false,
        };
        if let Some(outbound) = outbound {
            outbound.send_async(&self.link).await;
        }
        true
    }

    /// Decide what a request produces on the wire.
    fn dispatch(&mut self, frame: Frame) -> Option<Outbound> {
        let command = match frame.command() {
            Some(command) if command.is_wire() => command,
            _ => return self.reply(Status::InvalidCommand, &[]),
        };

        if let Some(target) = self.forward_rules.get(&command) {
            return Some(Outbound::Relay {
                target: target.clone(),
                request: frame,
            });
        }

        match self.handlers.dispatch(command, frame.payload()) {
            Some(Ok(reply)) => self.reply(Status::Ok, &reply),
            Some(Err(status)) => self.reply(status, &[]),
            None => {
                tracing::debug!(link = %self.name(), ?command, "No handler registered");
                self.reply(Status::NotReady, &[])
            }
        }
    }

    /// Build a response, truncating the payload to the staging capacity.
    fn reply(&self, status: Status, payload: &[u8]) -> Option<Outbound> {
        let payload = if payload.len() > self.response_capacity {
            tracing::warn!(
                link = %self.name(),
                len = payload.len(),
                capacity = self.response_capacity,
                "Response payload truncated"
            );
            &payload[..self.response_capacity]
        } else {
            payload
        };

        match Frame::response(status, Bytes::copy_from_slice(payload)) {
            Ok(frame) => Some(Outbound::Reply(frame)),
            Err(e) => {
                tracing::error!(link = %self.name(), error = %e, "Could not build response");
                None
            }
        }
    }

    /// Write a response, retrying while the transport is busy.
    ///
    /// Failure is logged and abandoned. Returns whether the write succeeded.
    pub fn send_response(&self, frame: &Frame) -> bool {
        log_response(&self.link, frame, self.link.send_frame(frame))
    }
}

/// What dispatching one request puts on the wire.
enum Outbound {
    /// Response on the receiving link.
    Reply(Frame),
    /// Request relayed to another link.
    Relay { target: LinkHandle, request: Frame },
}

impl Outbound {
    fn send(self, link: &LinkHandle) {
        match self {
            Outbound::Reply(frame) => {
                log_response(link, &frame, link.send_frame(&frame));
            }
            Outbound::Relay { target, request } => {
                if let Err(e) = target.relay(&request, link) {
                    let frame = forward_failed(link, &target, &request, &e);
                    log_response(link, &frame, link.send_frame(&frame));
                }
            }
        }
    }

    async fn send_async(self, link: &LinkHandle) {
        match self {
            Outbound::Reply(frame) => {
                let sent = link.send_frame_async(&frame).await;
                log_response(link, &frame, sent);
            }
            Outbound::Relay { target, request } => {
                if let Err(e) = target.relay_async(&request, link).await {
                    let frame = forward_failed(link, &target, &request, &e);
                    let sent = link.send_frame_async(&frame).await;
                    log_response(link, &frame, sent);
                }
            }
        }
    }
}

/// Log a failed relay and build the `NotReady` answer for the origin.
fn forward_failed(
    link: &LinkHandle,
    target: &LinkHandle,
    request: &Frame,
    error: &MlfError,
) -> Frame {
    tracing::warn!(
        link = %link.name(),
        target = %target.name(),
        selector = request.selector(),
        error = %error,
        "Forwarding failed"
    );
    Frame::error(Status::NotReady)
}

fn log_response(
    link: &LinkHandle,
    frame: &Frame,
    sent: std::result::Result<(), TransportError>,
) -> bool {
    match sent {
        Ok(()) => {
            tracing::debug!(
                link = %link.name(),
                status = frame.selector(),
                len = frame.payload_len(),
                "Response sent"
            );
            true
        }
        Err(e) => {
            tracing::error!(
                link = %link.name(),
                status = frame.selector(),
                error = %e,
                "Failed to send response, giving up"
            );
            false
        }
    }
}
