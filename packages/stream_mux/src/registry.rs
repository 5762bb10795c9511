use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::connection::{Connection, ConnectionId, ConnectionStatus};
use crate::error::RegistryError;
use crate::lock;
use crate::sink::EventHandler;
use crate::subscription::Subscription;
use crate::transport::{
    CloseCode, EventSender, Transport, TransportEvent, TransportEventKind, TransportHandle,
};

const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Handle → connection lookup used by the event loop to route callbacks
type RouteTable = Arc<Mutex<HashMap<TransportHandle, Arc<Connection>>>>;

struct RegistryState {
    next_id: u64,
    connections: BTreeMap<ConnectionId, Arc<Connection>>,
}

/// Owner of every connection to one endpoint and of the event-loop thread
/// that drives their sockets.
pub struct ConnectionRegistry {
    uri: String,
    transport: Arc<dyn Transport>,
    events: Arc<dyn EventHandler>,
    state: Mutex<RegistryState>,
    routes: RouteTable,
    event_tx: EventSender,
    runtime: tokio::runtime::Handle,
    shutdown_grace: Duration,
    shutdown_tx: Option<oneshot::Sender<Duration>>,
    event_loop: Option<JoinHandle<()>>,
}

impl ConnectionRegistry {
    /// Start the event-loop thread for connections to `uri`
    pub fn new(
        uri: impl Into<String>,
        transport: Arc<dyn Transport>,
        events: Arc<dyn EventHandler>,
    ) -> Result<Self, RegistryError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let handle = runtime.handle().clone();

        let routes: RouteTable = Arc::new(Mutex::new(HashMap::new()));
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let event_loop = {
            let routes = routes.clone();
            let transport = transport.clone();
            std::thread::Builder::new()
                .name("mux-event-loop".to_string())
                .spawn(move || {
                    runtime.block_on(run_event_loop(event_rx, routes, transport, shutdown_rx));
                    debug!("Event loop finished, dropping runtime");
                })?
        };

        Ok(Self {
            uri: uri.into(),
            transport,
            events,
            state: Mutex::new(RegistryState {
                next_id: 1,
                connections: BTreeMap::new(),
            }),
            routes,
            event_tx,
            runtime: handle,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            shutdown_tx: Some(shutdown_tx),
            event_loop: Some(event_loop),
        })
    }

    /// How long teardown waits for connections to finish closing
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Register a new connection for `subscription` and start connecting.
    ///
    /// Returns as soon as the connection is registered; open or failure is
    /// reported later on the event loop.
    pub fn subscribe(&self, subscription: Subscription) -> Result<ConnectionId, RegistryError> {
        let handle = match self.transport.create(&self.uri) {
            Ok(handle) => handle,
            Err(e) => {
                self.events
                    .handle_log(format!("[ERROR] Connect initialization error: {}", e));
                return Err(RegistryError::Connect(e));
            }
        };

        let connection = {
            let mut state = lock(&self.state);
            let id = ConnectionId(state.next_id);
            state.next_id += 1;
            let connection = Arc::new(Connection::new(
                id,
                handle,
                subscription,
                self.events.clone(),
            ));
            state.connections.insert(id, connection.clone());
            connection
        };

        // Route before starting so the open callback always finds its target.
        lock(&self.routes).insert(handle, connection.clone());
        self.transport
            .start(handle, self.event_tx.clone(), &self.runtime);

        info!(
            "Connection {} subscribing to {} via {}",
            connection.id(),
            connection.subscription().channel(),
            handle
        );
        Ok(connection.id())
    }

    /// Suspend a connection, request a normal close and unregister it.
    ///
    /// If the close request fails the connection stays registered (Suspended).
    pub fn disconnect(&self, id: ConnectionId) -> Result<(), RegistryError> {
        let mut state = lock(&self.state);
        let Some(connection) = state.connections.get(&id).cloned() else {
            self.events
                .handle_log(format!("[ERROR] no connection found with id {}", id));
            return Err(RegistryError::NotFound(id));
        };

        connection.suspend();
        if let Err(e) = self
            .transport
            .close(connection.handle(), CloseCode::Normal, "")
        {
            self.events.handle_log(format!(
                "[ERROR] error occured while closing connection [{}]: {}",
                id, e
            ));
            return Err(RegistryError::Close { id, source: e });
        }

        state.connections.remove(&id);
        info!("Connection {} disconnected", id);
        Ok(())
    }

    /// Snapshot of the registered connections
    pub fn connections(&self) -> BTreeMap<ConnectionId, Arc<Connection>> {
        lock(&self.state).connections.clone()
    }

    /// Close every open or still-connecting connection and stop the event loop.
    ///
    /// Events the transport delivered before the request are still dispatched.
    /// Once this returns no connection callback can fire any more.
    pub fn shutdown(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        let Some(event_loop) = self.event_loop.take() else {
            return;
        };

        // Connecting sockets are closed too so their routes terminate before
        // the grace period runs out.
        let live: Vec<Arc<Connection>> = lock(&self.state)
            .connections
            .values()
            .filter(|c| {
                matches!(
                    c.status(),
                    ConnectionStatus::Open | ConnectionStatus::Connecting
                )
            })
            .cloned()
            .collect();

        for connection in live {
            info!("Closing connection {}", connection.id());
            if let Err(e) = self
                .transport
                .close(connection.handle(), CloseCode::GoingAway, "")
            {
                warn!("Error closing connection {}: {}", connection.id(), e);
                self.events.handle_log(format!(
                    "[ERROR] error closing connection [{}]: {}",
                    connection.id(),
                    e
                ));
            }
        }

        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(self.shutdown_grace);
        }
        if event_loop.join().is_err() {
            error!("Event loop thread panicked");
        }
    }
}

impl Drop for ConnectionRegistry {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Dispatch transport events until shutdown, then drain until every routed
/// connection has terminated or the grace period runs out.
async fn run_event_loop(
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
    routes: RouteTable,
    transport: Arc<dyn Transport>,
    mut shutdown: oneshot::Receiver<Duration>,
) {
    let grace = loop {
        tokio::select! {
            biased;
            event = events.recv() => match event {
                Some(event) => dispatch(&routes, transport.as_ref(), event, false),
                None => return,
            },
            grace = &mut shutdown => {
                // Whatever was queued ahead of the request is dispatched normally.
                while let Ok(event) = events.try_recv() {
                    dispatch(&routes, transport.as_ref(), event, false);
                }
                break grace.unwrap_or_default();
            }
        }
    };

    let deadline = tokio::time::sleep(grace);
    tokio::pin!(deadline);

    while !lock(&routes).is_empty() {
        tokio::select! {
            () = &mut deadline => {
                warn!(
                    "Shutdown grace elapsed with {} connection(s) still pending",
                    lock(&routes).len()
                );
                break;
            }
            event = events.recv() => match event {
                Some(event) => dispatch(&routes, transport.as_ref(), event, true),
                None => break,
            },
        }
    }
}

/// Route one event to its connection. While `closing`, connections that only
/// now finish opening are suspended and closed instead of subscribed.
fn dispatch(routes: &RouteTable, transport: &dyn Transport, event: TransportEvent, closing: bool) {
    let TransportEvent { handle, kind } = event;
    let connection = if kind.is_terminal() {
        lock(routes).remove(&handle)
    } else {
        lock(routes).get(&handle).cloned()
    };

    let Some(connection) = connection else {
        debug!("Discarding {:?} for unrouted {}", kind, handle);
        return;
    };

    match kind {
        TransportEventKind::Open if closing => {
            connection.suspend();
            if let Err(e) = transport.close(handle, CloseCode::GoingAway, "") {
                debug!("Late open on {} could not be closed: {}", handle, e);
            }
        }
        TransportEventKind::Open => connection.on_open(transport),
        TransportEventKind::Fail(reason) => connection.on_fail(&reason),
        TransportEventKind::Close => connection.on_close(),
        TransportEventKind::Message(payload) => connection.on_message(payload),
    }
}
