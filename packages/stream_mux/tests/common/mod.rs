#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, mpsc};
use std::time::Duration;

use stream_mux::{
    CloseCode, EventHandler, EventSender, Transport, TransportError, TransportEvent,
    TransportEventKind, TransportHandle,
};

pub const WAIT: Duration = Duration::from_secs(5);

/// In-memory transport: records calls and lets tests play the remote side
#[derive(Default)]
pub struct MockTransport {
    pub fail_create: AtomicBool,
    pub fail_send: AtomicBool,
    pub fail_close: AtomicBool,
    /// When set, a successful close is answered with a Close event
    pub echo_close: AtomicBool,
    next: AtomicU64,
    started: Mutex<HashMap<TransportHandle, EventSender>>,
    pub sent: Mutex<Vec<(TransportHandle, String)>>,
    pub closed: Mutex<Vec<(TransportHandle, CloseCode)>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(100),
            echo_close: AtomicBool::new(true),
            ..Default::default()
        }
    }

    /// Deliver an event for `handle` as the transport thread would
    pub fn emit(&self, handle: TransportHandle, kind: TransportEventKind) {
        let started = self.started.lock().unwrap();
        let events = started.get(&handle).expect("handle was never started");
        events.send(TransportEvent::new(handle, kind)).unwrap();
    }

    /// Like [`emit`](Self::emit) but reports whether anyone is still listening
    pub fn try_emit(&self, handle: TransportHandle, kind: TransportEventKind) -> bool {
        let started = self.started.lock().unwrap();
        started
            .get(&handle)
            .is_some_and(|events| events.send(TransportEvent::new(handle, kind)).is_ok())
    }

    pub fn started_handles(&self) -> Vec<TransportHandle> {
        let mut handles: Vec<_> = self.started.lock().unwrap().keys().copied().collect();
        handles.sort();
        handles
    }

    pub fn sent(&self) -> Vec<(TransportHandle, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn closed(&self) -> Vec<(TransportHandle, CloseCode)> {
        self.closed.lock().unwrap().clone()
    }
}

impl Transport for MockTransport {
    fn create(&self, uri: &str) -> Result<TransportHandle, TransportError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(TransportError::InvalidUri {
                uri: uri.to_string(),
                reason: "refused by test".to_string(),
            });
        }
        Ok(TransportHandle(self.next.fetch_add(1, Ordering::SeqCst)))
    }

    fn start(&self, handle: TransportHandle, events: EventSender, _: &tokio::runtime::Handle) {
        self.started.lock().unwrap().insert(handle, events);
    }

    fn send(&self, handle: TransportHandle, payload: &str) -> Result<(), TransportError> {
        if self.fail_send.load(Ordering::SeqCst) {
            return Err(TransportError::NotOpen(handle));
        }
        self.sent.lock().unwrap().push((handle, payload.to_string()));
        Ok(())
    }

    fn close(
        &self,
        handle: TransportHandle,
        code: CloseCode,
        _reason: &str,
    ) -> Result<(), TransportError> {
        if self.fail_close.load(Ordering::SeqCst) {
            return Err(TransportError::NotOpen(handle));
        }
        self.closed.lock().unwrap().push((handle, code));
        if self.echo_close.load(Ordering::SeqCst) {
            if let Some(events) = self.started.lock().unwrap().get(&handle) {
                let _ = events.send(TransportEvent::new(handle, TransportEventKind::Close));
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Recorded {
    Log(String),
    Message(String),
}

/// Event handler that forwards everything to a channel the test can wait on
pub struct Recorder {
    tx: Mutex<mpsc::Sender<Recorded>>,
}

impl Recorder {
    pub fn new() -> (Self, mpsc::Receiver<Recorded>) {
        let (tx, rx) = mpsc::channel();
        (Self { tx: Mutex::new(tx) }, rx)
    }
}

impl EventHandler for Recorder {
    fn handle_new_message(&self, payload: String) {
        let _ = self.tx.lock().unwrap().send(Recorded::Message(payload));
    }

    fn handle_log(&self, text: String) {
        let _ = self.tx.lock().unwrap().send(Recorded::Log(text));
    }
}

/// Next recorded event, failing the test after [`WAIT`]
pub fn next(rx: &mpsc::Receiver<Recorded>) -> Recorded {
    rx.recv_timeout(WAIT).expect("timed out waiting for event")
}

/// Everything recorded so far, without waiting
pub fn drain(rx: &mpsc::Receiver<Recorded>) -> Vec<Recorded> {
    rx.try_iter().collect()
}

pub fn log(text: &str) -> Recorded {
    Recorded::Log(text.to_string())
}
