//! Transport seam between the registry and the wire.
//!
//! A transport hands out opaque handles, drives the sockets behind them on
//! the registry's event-loop runtime, and reports everything that happens to
//! a socket as a [`TransportEvent`] tagged with its handle.

pub mod tls;
pub mod websocket;

pub use websocket::WsTransport;

use tokio::sync::mpsc;

use crate::error::TransportError;

/// Opaque reference to one transport-level connection object
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct TransportHandle(pub u64);

impl std::fmt::Display for TransportHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "hdl-{}", self.0)
    }
}

/// Close status codes used by the registry
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CloseCode {
    /// Operator asked for the connection to go away
    Normal,
    /// The client itself is shutting down
    GoingAway,
}

impl From<CloseCode> for u16 {
    fn from(code: CloseCode) -> u16 {
        match code {
            CloseCode::Normal => 1000,
            CloseCode::GoingAway => 1001,
        }
    }
}

/// What happened to a transport connection
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEventKind {
    Open,
    Fail(String),
    Close,
    Message(String),
}

impl TransportEventKind {
    /// After a terminal event the handle produces nothing further
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransportEventKind::Fail(_) | TransportEventKind::Close)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransportEvent {
    pub handle: TransportHandle,
    pub kind: TransportEventKind,
}

impl TransportEvent {
    pub fn new(handle: TransportHandle, kind: TransportEventKind) -> Self {
        Self { handle, kind }
    }
}

pub type EventSender = mpsc::UnboundedSender<TransportEvent>;

/// A streaming transport the registry can multiplex connections over.
///
/// `send` and `close` are called from the event-loop thread while it is
/// dispatching callbacks, so they must only enqueue work and never block.
pub trait Transport: Send + Sync + 'static {
    /// Create a connection object for `uri` without starting it
    fn create(&self, uri: &str) -> Result<TransportHandle, TransportError>;

    /// Begin connecting asynchronously. Open/Fail/Close/Message for this
    /// handle are reported on `events`; socket work is spawned on `runtime`.
    fn start(&self, handle: TransportHandle, events: EventSender, runtime: &tokio::runtime::Handle);

    /// Queue a text frame
    fn send(&self, handle: TransportHandle, payload: &str) -> Result<(), TransportError>;

    /// Request a graceful close
    fn close(&self, handle: TransportHandle, code: CloseCode, reason: &str)
    -> Result<(), TransportError>;
}
