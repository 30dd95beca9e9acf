//! Command invoker - issue a request and await its response.
//!
//! The protocol carries no request ids: a link has exactly one outstanding
//! request at a time. [`Invoker::invoke`] claims the link's pending slot,
//! transmits the request and waits until the link's context delivers the
//! response or the deadline passes. A second call while the first is waiting
//! fails immediately with [`MlfError::RequestInFlight`] and transmits nothing.
//!
//! The response is delivered by whoever drives the link's
//! [`ProtocolContext`](crate::context::ProtocolContext), typically the read
//! loop spawned by [`Link`](crate::link::Link).

use std::time::Duration;

use bytes::Bytes;

use crate::codec::WirePayload;
use crate::config::DEFAULT_INVOKE_TIMEOUT;
use crate::context::LinkHandle;
use crate::error::{MlfError, Result};
use crate::protocol::{Command, Frame, Status};

/// Issues requests on one link.
#[derive(Debug, Clone)]
pub struct Invoker {
    link: LinkHandle,
    timeout: Duration,
}

impl Invoker {
    pub fn new(link: LinkHandle) -> Self {
        Self::with_timeout(link, DEFAULT_INVOKE_TIMEOUT)
    }

    pub fn with_timeout(link: LinkHandle, timeout: Duration) -> Self {
        Self { link, timeout }
    }

    pub fn link(&self) -> &LinkHandle {
        &self.link
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Whether a request is awaiting its response on the link.
    pub fn is_awaiting(&self) -> bool {
        self.link.is_awaiting()
    }

    /// Send `command` and return the response payload.
    ///
    /// `Ok` and `Ping` responses succeed; any other status is an error.
    pub async fn invoke(&self, command: Command, payload: &[u8]) -> Result<Bytes> {
        self.invoke_with_timeout(command, payload, self.timeout)
            .await
    }

    /// Like [`invoke`](Self::invoke) with an explicit deadline.
    pub async fn invoke_with_timeout(
        &self,
        command: Command,
        payload: &[u8],
        timeout: Duration,
    ) -> Result<Bytes> {
        if !command.is_wire() {
            return Err(MlfError::InvalidData(format!(
                "{command:?} cannot be sent as a request"
            )));
        }
        let request = Frame::request(command, Bytes::copy_from_slice(payload))?;

        let (ticket, rx) = self.link.begin()?;

        if let Err(e) = self.link.send_frame_async(&request).await {
            self.link.cancel(ticket);
            tracing::error!(
                link = %self.link.name(),
                ?command,
                error = %e,
                "Failed to send request"
            );
            return Err(e.into());
        }
        tracing::debug!(link = %self.link.name(), ?command, len = payload.len(), "Request sent");

        let response = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(frame)) => frame,
            Ok(Err(_)) => return Err(MlfError::ConnectionClosed),
            Err(_) => {
                self.link.cancel(ticket);
                tracing::warn!(link = %self.link.name(), ?command, ?timeout, "Request timed out");
                return Err(MlfError::Timeout);
            }
        };

        match Status::from_code(response.selector()) {
            Some(status) if status.is_success() => Ok(response.payload_bytes()),
            Some(status) => Err(MlfError::Status(status)),
            None => Err(MlfError::UnknownStatus(response.selector())),
        }
    }

    /// Invoke and copy the response into `out`.
    ///
    /// Returns the payload length the response declared, which exceeds
    /// `out.len()` when the reply was truncated.
    pub async fn invoke_into(
        &self,
        command: Command,
        payload: &[u8],
        out: &mut [u8],
    ) -> Result<usize> {
        let response = self.invoke(command, payload).await?;
        let n = response.len().min(out.len());
        out[..n].copy_from_slice(&response[..n]);
        Ok(response.len())
    }

    /// Invoke with typed request and reply payloads.
    pub async fn call<Req, Resp>(&self, command: Command, request: &Req) -> Result<Resp>
    where
        Req: WirePayload,
        Resp: WirePayload,
    {
        let response = self.invoke(command, &request.to_bytes()).await?;
        Resp::decode(&response)
    }
}
