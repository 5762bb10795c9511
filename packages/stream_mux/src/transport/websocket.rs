//! WebSocket transport over tokio-tungstenite with a rustls connector.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::{SinkExt, StreamExt};
use rustls::ClientConfig;
use tokio::sync::mpsc;
use tokio_tungstenite::Connector;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tracing::{debug, info, warn};

use super::{CloseCode, EventSender, Transport, TransportEvent, TransportEventKind, TransportHandle};
use crate::error::TransportError;
use crate::lock;

/// Work queued for a socket task by `send`/`close`
enum Outbound {
    Text(String),
    Close { code: u16, reason: String },
}

/// Per-handle state. `request` and `commands_rx` are taken when the socket starts.
struct Socket {
    request: Option<Request>,
    commands: mpsc::UnboundedSender<Outbound>,
    commands_rx: Option<mpsc::UnboundedReceiver<Outbound>>,
}

type SocketTable = Arc<Mutex<HashMap<TransportHandle, Socket>>>;

pub struct WsTransport {
    tls: Arc<ClientConfig>,
    next_handle: AtomicU64,
    sockets: SocketTable,
}

impl WsTransport {
    pub fn new(tls: Arc<ClientConfig>) -> Self {
        Self {
            tls,
            next_handle: AtomicU64::new(1),
            sockets: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn commands(&self, handle: TransportHandle) -> Result<mpsc::UnboundedSender<Outbound>, TransportError> {
        let sockets = lock(&self.sockets);
        let socket = sockets
            .get(&handle)
            .ok_or(TransportError::UnknownHandle(handle))?;
        Ok(socket.commands.clone())
    }
}

impl Transport for WsTransport {
    fn create(&self, uri: &str) -> Result<TransportHandle, TransportError> {
        let request = uri
            .into_client_request()
            .map_err(|e| TransportError::InvalidUri {
                uri: uri.to_string(),
                reason: e.to_string(),
            })?;

        let handle = TransportHandle(self.next_handle.fetch_add(1, Ordering::SeqCst));
        let (commands, commands_rx) = mpsc::unbounded_channel();
        lock(&self.sockets).insert(
            handle,
            Socket {
                request: Some(request),
                commands,
                commands_rx: Some(commands_rx),
            },
        );

        debug!("Created transport connection {} for {}", handle, uri);
        Ok(handle)
    }

    fn start(&self, handle: TransportHandle, events: EventSender, runtime: &tokio::runtime::Handle) {
        let taken = {
            let mut sockets = lock(&self.sockets);
            sockets
                .get_mut(&handle)
                .and_then(|socket| Some((socket.request.take()?, socket.commands_rx.take()?)))
        };

        let Some((request, commands_rx)) = taken else {
            warn!("Cannot start {}: unknown or already started", handle);
            let _ = events.send(TransportEvent::new(
                handle,
                TransportEventKind::Fail(TransportError::UnknownHandle(handle).to_string()),
            ));
            return;
        };

        let tls = self.tls.clone();
        let sockets = self.sockets.clone();
        runtime.spawn(async move {
            run_socket(handle, request, tls, commands_rx, &events).await;
            lock(&sockets).remove(&handle);
        });
    }

    fn send(&self, handle: TransportHandle, payload: &str) -> Result<(), TransportError> {
        self.commands(handle)?
            .send(Outbound::Text(payload.to_string()))
            .map_err(|_| TransportError::NotOpen(handle))
    }

    fn close(
        &self,
        handle: TransportHandle,
        code: CloseCode,
        reason: &str,
    ) -> Result<(), TransportError> {
        self.commands(handle)?
            .send(Outbound::Close {
                code: code.into(),
                reason: reason.to_string(),
            })
            .map_err(|_| TransportError::NotOpen(handle))
    }
}

/// Drive one socket from handshake to close, reporting each step on `events`.
async fn run_socket(
    handle: TransportHandle,
    request: Request,
    tls: Arc<ClientConfig>,
    mut commands: mpsc::UnboundedReceiver<Outbound>,
    events: &EventSender,
) {
    let emit = |kind| {
        let _ = events.send(TransportEvent::new(handle, kind));
    };

    let connected = tokio_tungstenite::connect_async_tls_with_config(
        request,
        None,
        false,
        Some(Connector::Rustls(tls)),
    )
    .await;

    let stream = match connected {
        Ok((stream, _response)) => stream,
        Err(e) => {
            debug!("Handshake failed on {}: {}", handle, e);
            emit(TransportEventKind::Fail(e.to_string()));
            return;
        }
    };

    info!("WebSocket {} connected", handle);
    emit(TransportEventKind::Open);

    let (mut write, mut read) = stream.split();
    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Outbound::Text(payload)) => {
                    if let Err(e) = write.send(Message::Text(payload.into())).await {
                        warn!("Write on {} failed: {}", handle, e);
                        break;
                    }
                }
                Some(Outbound::Close { code, reason }) => {
                    let frame = CloseFrame {
                        code: code.into(),
                        reason: reason.into(),
                    };
                    // Keep reading until the peer acknowledges the close.
                    if let Err(e) = write.send(Message::Close(Some(frame))).await {
                        debug!("Close frame on {} not sent: {}", handle, e);
                        break;
                    }
                }
                None => break,
            },
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    emit(TransportEventKind::Message(text.as_str().to_owned()));
                }
                Some(Ok(Message::Binary(bytes))) => {
                    emit(TransportEventKind::Message(String::from_utf8_lossy(&bytes).into_owned()));
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!("Read on {} failed: {}", handle, e);
                    break;
                }
            },
        }
    }

    info!("WebSocket {} closed", handle);
    emit(TransportEventKind::Close);
}
