use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use tracing::debug;

use crate::sink::EventHandler;
use crate::subscription::Subscription;
use crate::transport::{Transport, TransportHandle};

/// Registry-assigned identity of a connection. Never reused.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct ConnectionId(pub u64);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a connection.
///
/// `Connecting → Open | Failed | Suspended`, `Open → Closed | Suspended`.
/// Failed, Closed and Suspended are terminal.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum ConnectionStatus {
    Connecting = 0,
    Open = 1,
    Failed = 2,
    Closed = 3,
    Suspended = 4,
}

impl ConnectionStatus {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => ConnectionStatus::Connecting,
            1 => ConnectionStatus::Open,
            2 => ConnectionStatus::Failed,
            3 => ConnectionStatus::Closed,
            _ => ConnectionStatus::Suspended,
        }
    }

    fn can_become(self, next: ConnectionStatus) -> bool {
        use ConnectionStatus::*;
        matches!(
            (self, next),
            (Connecting, Open) | (Connecting, Failed) | (Connecting, Suspended)
                | (Open, Closed) | (Open, Suspended)
        )
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Open => "open",
            ConnectionStatus::Failed => "failed",
            ConnectionStatus::Closed => "closed",
            ConnectionStatus::Suspended => "suspended",
        };
        f.write_str(s)
    }
}

/// One channel subscription bound to one transport handle.
///
/// The `on_*` callbacks run on the registry's event-loop thread; status and
/// the send-failed flag are atomics so the command thread can read them.
pub struct Connection {
    id: ConnectionId,
    handle: TransportHandle,
    subscription: Subscription,
    status: AtomicU8,
    send_failed: AtomicBool,
    events: Arc<dyn EventHandler>,
}

impl Connection {
    pub fn new(
        id: ConnectionId,
        handle: TransportHandle,
        subscription: Subscription,
        events: Arc<dyn EventHandler>,
    ) -> Self {
        Self {
            id,
            handle,
            subscription,
            status: AtomicU8::new(ConnectionStatus::Connecting as u8),
            send_failed: AtomicBool::new(false),
            events,
        }
    }

    /// Move to `next` if the state machine allows it from the current status
    fn transition(&self, next: ConnectionStatus) -> bool {
        self.status
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |raw| {
                ConnectionStatus::from_u8(raw)
                    .can_become(next)
                    .then_some(next as u8)
            })
            .is_ok()
    }

    fn log(&self, text: String) {
        self.events.handle_log(text);
    }

    /// Transport reports the socket open: mark Open and send the join request.
    ///
    /// A failed send is logged and flagged but the status stays Open.
    pub fn on_open(&self, transport: &dyn Transport) {
        if !self.transition(ConnectionStatus::Open) {
            debug!(
                "Connection {} opened while {}, not subscribing",
                self.id,
                self.status()
            );
            return;
        }
        self.log(format!("[INFO] connection [{}] opened", self.id));

        match transport.send(self.handle, &self.subscription.generate_request()) {
            Ok(()) => self.log(format!(
                "[INFO] connection [{}] subscription request is successfully sent",
                self.id
            )),
            Err(e) => {
                self.send_failed.store(true, Ordering::Release);
                self.log(format!(
                    "[ERROR] connection [{}] cannot send subscription request, error message: {}",
                    self.id, e
                ));
            }
        }
    }

    pub fn on_fail(&self, reason: &str) {
        self.transition(ConnectionStatus::Failed);
        debug!("Connection {} failed: {}", self.id, reason);
        self.log(format!("[ERROR] connection [{}] cannot be opened", self.id));
    }

    pub fn on_close(&self) {
        self.transition(ConnectionStatus::Closed);
        self.log(format!("[INFO] connection [{}] closed correctly", self.id));
    }

    /// Forward a payload to the message sink; dropped silently unless Open.
    pub fn on_message(&self, payload: String) {
        if self.status() != ConnectionStatus::Open {
            return;
        }
        self.log(format!("[INFO] connection [{}] message received", self.id));
        self.events.handle_new_message(payload);
    }

    /// Stop accepting messages. Does not close the transport.
    ///
    /// Only Connecting and Open connections move to Suspended; a Failed or
    /// Closed connection keeps its status.
    pub fn suspend(&self) {
        self.transition(ConnectionStatus::Suspended);
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn handle(&self) -> TransportHandle {
        self.handle
    }

    pub fn subscription(&self) -> &Subscription {
        &self.subscription
    }

    pub fn status(&self) -> ConnectionStatus {
        ConnectionStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    /// True when the join request could not be handed to the transport
    pub fn send_failed(&self) -> bool {
        self.send_failed.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("handle", &self.handle)
            .field("channel", &self.subscription.channel())
            .field("status", &self.status())
            .field("send_failed", &self.send_failed())
            .finish()
    }
}
