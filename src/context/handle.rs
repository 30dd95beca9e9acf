//! Shared side of a link: outbound transport and the pending-request slot.
//!
//! A [`LinkHandle`] is cheap to clone. The owning [`ProtocolContext`], any
//! number of [`Invoker`]s and the forwarding rules of other contexts all hold
//! one. The slot allows exactly one outstanding request per link.
//!
//! [`ProtocolContext`]: super::ProtocolContext
//! [`Invoker`]: crate::invoker::Invoker

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::oneshot;

use crate::clock::{Clock, SystemClock};
use crate::config::LinkConfig;
use crate::error::{MlfError, Result};
use crate::protocol::Frame;
use crate::retry::{send_with_retry, send_with_retry_async, RetryPolicy};
use crate::transport::{Transport, TransportError};

/// What the link is waiting for.
enum PendingSlot {
    Idle,
    /// An invoker awaits the response.
    Invoke {
        tx: oneshot::Sender<Frame>,
        ticket: u64,
    },
    /// A forwarded request; the response goes back out on `reply_to`.
    Relay {
        reply_to: LinkHandle,
        deadline: Duration,
    },
}

impl PendingSlot {
    /// Whether a new request may take the slot.
    ///
    /// An invoker that gave up (receiver dropped) or an expired relay no
    /// longer holds it.
    fn is_free(&self, now: Duration) -> bool {
        match self {
            PendingSlot::Idle => true,
            PendingSlot::Invoke { tx, .. } => tx.is_closed(),
            PendingSlot::Relay { deadline, .. } => now >= *deadline,
        }
    }
}

struct LinkShared {
    name: String,
    outbound: Mutex<Box<dyn Transport>>,
    pending: Mutex<PendingSlot>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
    relay_timeout: Duration,
    next_ticket: AtomicU64,
}

/// Handle to a link's outbound path and pending-request slot.
#[derive(Clone)]
pub struct LinkHandle {
    shared: Arc<LinkShared>,
}

impl LinkHandle {
    /// Create a link over `transport` using the wall clock.
    pub fn new(config: &LinkConfig, transport: impl Transport + 'static) -> Self {
        Self::with_clock(config, transport, Arc::new(SystemClock::new()))
    }

    /// Create a link with an explicit tick source.
    pub fn with_clock(
        config: &LinkConfig,
        transport: impl Transport + 'static,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            shared: Arc::new(LinkShared {
                name: config.name.clone(),
                outbound: Mutex::new(Box::new(transport)),
                pending: Mutex::new(PendingSlot::Idle),
                clock,
                retry: config.retry_policy(),
                relay_timeout: config.relay_timeout(),
                next_ticket: AtomicU64::new(1),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Current tick of the link's clock.
    pub fn now(&self) -> Duration {
        self.shared.clock.now()
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.shared.clock
    }

    /// Whether both handles refer to the same link.
    pub fn same_link(&self, other: &LinkHandle) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Serialize and write a frame, retrying while the transport is busy.
    pub fn send_frame(&self, frame: &Frame) -> std::result::Result<(), TransportError> {
        let bytes = frame.to_bytes();
        let mut outbound = self.lock_outbound();
        send_with_retry(
            outbound.as_mut(),
            &bytes,
            &self.shared.retry,
            self.shared.clock.as_ref(),
        )
    }

    /// Serialize and write a frame, waiting on the tokio timer between
    /// attempts instead of blocking the thread.
    pub async fn send_frame_async(&self, frame: &Frame) -> std::result::Result<(), TransportError> {
        let bytes = frame.to_bytes();
        send_with_retry_async(|| self.lock_outbound().write(&bytes), &self.shared.retry).await
    }

    /// Serialize and write a frame with a single attempt.
    pub fn send_once(&self, frame: &Frame) -> std::result::Result<(), TransportError> {
        let bytes = frame.to_bytes();
        self.lock_outbound().write(&bytes)
    }

    /// Whether a request is awaiting its response on this link.
    pub fn is_awaiting(&self) -> bool {
        !self.lock_pending().is_free(self.now())
    }

    /// Claim the pending slot for an invoker.
    ///
    /// Fails with `RequestInFlight` if another request holds it. The returned
    /// ticket identifies this claim for [`cancel`](Self::cancel).
    pub(crate) fn begin(&self) -> Result<(u64, oneshot::Receiver<Frame>)> {
        let now = self.now();
        let mut pending = self.lock_pending();
        if !pending.is_free(now) {
            return Err(self.in_flight());
        }

        let ticket = self.shared.next_ticket.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        *pending = PendingSlot::Invoke { tx, ticket };
        Ok((ticket, rx))
    }

    /// Release the slot if it still belongs to `ticket`.
    pub(crate) fn cancel(&self, ticket: u64) {
        let mut pending = self.lock_pending();
        if matches!(&*pending, PendingSlot::Invoke { ticket: t, .. } if *t == ticket) {
            *pending = PendingSlot::Idle;
        }
    }

    /// Send `frame` on this link on behalf of `reply_to`.
    ///
    /// The response that later arrives here is written to `reply_to`.
    pub fn relay(&self, frame: &Frame, reply_to: &LinkHandle) -> Result<()> {
        self.claim_relay(reply_to)?;
        let sent = self.send_frame(frame);
        self.finish_relay(frame, reply_to, sent)
    }

    /// Async variant of [`relay`](Self::relay).
    pub async fn relay_async(&self, frame: &Frame, reply_to: &LinkHandle) -> Result<()> {
        self.claim_relay(reply_to)?;
        let sent = self.send_frame_async(frame).await;
        self.finish_relay(frame, reply_to, sent)
    }

    fn claim_relay(&self, reply_to: &LinkHandle) -> Result<()> {
        let now = self.now();
        let mut pending = self.lock_pending();
        if !pending.is_free(now) {
            return Err(self.in_flight());
        }
        *pending = PendingSlot::Relay {
            reply_to: reply_to.clone(),
            deadline: now + self.shared.relay_timeout,
        };
        Ok(())
    }

    fn finish_relay(
        &self,
        frame: &Frame,
        reply_to: &LinkHandle,
        sent: std::result::Result<(), TransportError>,
    ) -> Result<()> {
        if let Err(e) = sent {
            *self.lock_pending() = PendingSlot::Idle;
            return Err(e.into());
        }

        tracing::debug!(
            link = %self.name(),
            reply_to = %reply_to.name(),
            selector = frame.selector(),
            "Relayed request"
        );
        Ok(())
    }

    /// Hand a received response to whoever is waiting for it.
    pub fn complete(&self, frame: Frame) {
        if let Some((reply_to, frame)) = self.resolve(frame) {
            let sent = reply_to.send_frame(&frame);
            self.log_relay_failure(&reply_to, sent);
        }
    }

    /// Async variant of [`complete`](Self::complete).
    pub async fn complete_async(&self, frame: Frame) {
        if let Some((reply_to, frame)) = self.resolve(frame) {
            let sent = reply_to.send_frame_async(&frame).await;
            self.log_relay_failure(&reply_to, sent);
        }
    }

    /// Release the pending slot for `frame`. Returns the link a relayed
    /// response still has to be written to.
    fn resolve(&self, frame: Frame) -> Option<(LinkHandle, Frame)> {
        let slot = std::mem::replace(&mut *self.lock_pending(), PendingSlot::Idle);

        match slot {
            PendingSlot::Idle => {
                tracing::warn!(
                    link = %self.name(),
                    status = frame.selector(),
                    "Unsolicited response, dropping"
                );
                None
            }
            PendingSlot::Invoke { tx, .. } => {
                if tx.send(frame).is_err() {
                    tracing::warn!(link = %self.name(), "Response arrived after caller gave up");
                }
                None
            }
            PendingSlot::Relay { reply_to, deadline } => {
                if self.now() >= deadline {
                    tracing::warn!(
                        link = %self.name(),
                        reply_to = %reply_to.name(),
                        "Relay expired, dropping late response"
                    );
                    return None;
                }
                Some((reply_to, frame))
            }
        }
    }

    fn log_relay_failure(
        &self,
        reply_to: &LinkHandle,
        sent: std::result::Result<(), TransportError>,
    ) {
        if let Err(e) = sent {
            tracing::error!(
                link = %self.name(),
                reply_to = %reply_to.name(),
                error = %e,
                "Failed to relay response"
            );
        }
    }

    /// Drop any pending request. A waiting invoker sees `ConnectionClosed`.
    pub fn close(&self) {
        *self.lock_pending() = PendingSlot::Idle;
    }

    fn in_flight(&self) -> MlfError {
        MlfError::RequestInFlight {
            link: self.shared.name.clone(),
        }
    }

    fn lock_outbound(&self) -> MutexGuard<'_, Box<dyn Transport>> {
        self.shared
            .outbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_pending(&self) -> MutexGuard<'_, PendingSlot> {
        self.shared
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for LinkHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkHandle")
            .field("name", &self.shared.name)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::protocol::{Command, Status};
    use crate::transport::ChannelTransport;
    use bytes::Bytes;
    use tokio::sync::mpsc;

    fn link(name: &str, clock: Arc<ManualClock>) -> (LinkHandle, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(8);
        let handle = LinkHandle::with_clock(
            &LinkConfig::named(name),
            ChannelTransport::new(tx),
            clock,
        );
        (handle, rx)
    }

    #[test]
    fn test_single_outstanding() {
        let (handle, _rx) = link("host", Arc::new(ManualClock::new()));

        let (_ticket, _pending) = handle.begin().unwrap();
        assert!(handle.is_awaiting());
        assert!(matches!(handle.begin(), Err(MlfError::RequestInFlight { .. })));
    }

    #[test]
    fn test_dropped_receiver_frees_slot() {
        let (handle, _rx) = link("host", Arc::new(ManualClock::new()));

        let (_ticket, pending) = handle.begin().unwrap();
        drop(pending);

        assert!(!handle.is_awaiting());
        assert!(handle.begin().is_ok());
    }

    #[test]
    fn test_cancel_only_own_ticket() {
        let (handle, _rx) = link("host", Arc::new(ManualClock::new()));

        let (ticket, _pending) = handle.begin().unwrap();
        handle.cancel(ticket + 1);
        assert!(handle.is_awaiting());

        handle.cancel(ticket);
        assert!(!handle.is_awaiting());
    }

    #[test]
    fn test_complete_wakes_invoker() {
        let (handle, _rx) = link("host", Arc::new(ManualClock::new()));
        let (_ticket, mut pending) = handle.begin().unwrap();

        handle.complete(Frame::error(Status::Ping));

        let frame = pending.try_recv().unwrap();
        assert_eq!(frame.status(), Some(Status::Ping));
        assert!(!handle.is_awaiting());
    }

    #[test]
    fn test_relay_routes_response_back() {
        let clock = Arc::new(ManualClock::new());
        let (usb, mut usb_rx) = link("usb", clock.clone());
        let (uart, mut uart_rx) = link("uart", clock);

        let request = Frame::request(Command::TurnOn, Bytes::new()).unwrap();
        uart.relay(&request, &usb).unwrap();
        assert_eq!(uart_rx.try_recv().unwrap(), Bytes::from(request.to_bytes()));
        assert!(uart.is_awaiting());

        let response = Frame::error(Status::Ok);
        uart.complete(response.clone());
        assert_eq!(usb_rx.try_recv().unwrap(), Bytes::from(response.to_bytes()));
        assert!(!uart.is_awaiting());
    }

    #[test]
    fn test_relay_expires() {
        let clock = Arc::new(ManualClock::new());
        let (usb, mut usb_rx) = link("usb", clock.clone());
        let (uart, _uart_rx) = link("uart", clock.clone());

        let request = Frame::request(Command::TurnOff, Bytes::new()).unwrap();
        uart.relay(&request, &usb).unwrap();

        clock.advance(Duration::from_millis(1000));
        assert!(!uart.is_awaiting());

        uart.complete(Frame::error(Status::Ok));
        assert!(usb_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_async_relay_waits_for_queue_space() {
        let clock = Arc::new(ManualClock::new());
        let (usb, mut usb_rx) = link("usb", clock.clone());
        let (tx, mut uart_rx) = mpsc::channel(1);
        let uart = LinkHandle::with_clock(
            &LinkConfig::named("uart"),
            ChannelTransport::new(tx.clone()),
            clock,
        );
        tx.try_send(Bytes::from_static(b"queued")).unwrap();

        let drainer = tokio::spawn(async move {
            let first = uart_rx.recv().await.unwrap();
            let second = uart_rx.recv().await.unwrap();
            (first, second)
        });

        let request = Frame::request(Command::GetOnState, Bytes::new()).unwrap();
        uart.relay_async(&request, &usb).await.unwrap();
        let (first, second) = drainer.await.unwrap();
        assert_eq!(&first[..], b"queued");
        assert_eq!(second, Bytes::from(request.to_bytes()));

        let response = Frame::response(Status::Ok, vec![1u8]).unwrap();
        uart.complete_async(response.clone()).await;
        assert_eq!(usb_rx.try_recv().unwrap(), Bytes::from(response.to_bytes()));
    }

    #[test]
    fn test_close_wakes_invoker_with_error() {
        let (handle, _rx) = link("host", Arc::new(ManualClock::new()));
        let (_ticket, mut pending) = handle.begin().unwrap();

        handle.close();

        assert!(pending.try_recv().is_err());
        assert!(!handle.is_awaiting());
    }
}
