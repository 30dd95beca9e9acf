//! Handler registry for dispatching requests by command id.
//!
//! At most one handler per command. Registration happens during setup and the
//! last registration for a command wins.

use std::collections::HashMap;
use std::marker::PhantomData;

use bytes::Bytes;

use crate::codec::WirePayload;
use crate::protocol::{Command, Status};

/// Result type for handler functions.
///
/// `Ok` carries the response payload sent with [`Status::Ok`]; `Err` carries
/// the status reported instead, with an empty payload.
pub type HandlerResult = std::result::Result<Bytes, Status>;

/// Trait for command handlers.
///
/// Handlers run on the dispatching context's poll path and must not block.
pub trait Handler: Send + 'static {
    /// Handle a request with raw payload bytes.
    fn call(&mut self, payload: &[u8]) -> HandlerResult;
}

impl<F> Handler for F
where
    F: FnMut(&[u8]) -> HandlerResult + Send + 'static,
{
    fn call(&mut self, payload: &[u8]) -> HandlerResult {
        self(payload)
    }
}

/// Wrapper that decodes the payload before calling the handler and encodes
/// the reply after.
///
/// A payload that fails to decode is answered with [`Status::InvalidData`].
pub struct TypedHandler<F, Req, Resp>
where
    F: FnMut(Req) -> std::result::Result<Resp, Status> + Send + 'static,
    Req: WirePayload + 'static,
    Resp: WirePayload + 'static,
{
    handler: F,
    _phantom: PhantomData<fn(Req) -> Resp>,
}

impl<F, Req, Resp> TypedHandler<F, Req, Resp>
where
    F: FnMut(Req) -> std::result::Result<Resp, Status> + Send + 'static,
    Req: WirePayload + 'static,
    Resp: WirePayload + 'static,
{
    /// Create a new typed handler.
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _phantom: PhantomData,
        }
    }
}

impl<F, Req, Resp> Handler for TypedHandler<F, Req, Resp>
where
    F: FnMut(Req) -> std::result::Result<Resp, Status> + Send + 'static,
    Req: WirePayload + 'static,
    Resp: WirePayload + 'static,
{
    fn call(&mut self, payload: &[u8]) -> HandlerResult {
        let request = match Req::decode(payload) {
            Ok(v) => v,
            Err(e) => {
                tracing::debug!(error = %e, "Rejecting undecodable payload");
                return Err(Status::InvalidData);
            }
        };

        (self.handler)(request).map(|reply| reply.to_bytes())
    }
}

/// Registry mapping command ids to handlers.
pub struct HandlerRegistry {
    handlers: HashMap<Command, Box<dyn Handler>>,
}

impl HandlerRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler, replacing any previous one for the command.
    pub fn register<H: Handler>(&mut self, command: Command, handler: H) {
        if !command.is_wire() {
            tracing::warn!(?command, "Ignoring handler for internal command");
            return;
        }
        if self.handlers.insert(command, Box::new(handler)).is_some() {
            tracing::debug!(?command, "Replaced handler");
        }
    }

    /// Register a typed handler.
    pub fn register_typed<F, Req, Resp>(&mut self, command: Command, handler: F)
    where
        F: FnMut(Req) -> std::result::Result<Resp, Status> + Send + 'static,
        Req: WirePayload + 'static,
        Resp: WirePayload + 'static,
    {
        self.register(command, TypedHandler::new(handler));
    }

    /// Check whether a handler exists for the command.
    pub fn contains(&self, command: Command) -> bool {
        self.handlers.contains_key(&command)
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Dispatch a request payload to the handler for `command`.
    ///
    /// Returns `None` if no handler is registered.
    pub fn dispatch(&mut self, command: Command, payload: &[u8]) -> Option<HandlerResult> {
        self.handlers
            .get_mut(&command)
            .map(|handler| handler.call(payload))
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
