use thiserror::Error;

use crate::connection::ConnectionId;
use crate::transport::TransportHandle;

/// Errors reported by a [`Transport`](crate::transport::Transport) implementation
#[derive(Debug, Error)]
pub enum TransportError {
    /// The endpoint URI could not be turned into a connection request
    #[error("invalid endpoint uri {uri}: {reason}")]
    InvalidUri { uri: String, reason: String },
    /// No connection object exists for this handle
    #[error("unknown transport handle {0}")]
    UnknownHandle(TransportHandle),
    /// The socket behind this handle is gone (closed, failed or never started)
    #[error("connection {0} is not open")]
    NotOpen(TransportHandle),
    /// TLS configuration could not be built
    #[error("tls setup failed: {0}")]
    Tls(String),
}

/// Errors returned by [`ConnectionRegistry`](crate::registry::ConnectionRegistry) operations
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The transport refused to create a connection object for the endpoint
    #[error("connect initialization error: {0}")]
    Connect(#[source] TransportError),
    /// No registered connection carries this id
    #[error("no connection found with id {0}")]
    NotFound(ConnectionId),
    /// The close request for a registered connection failed; the entry stays registered
    #[error("error closing connection [{id}]: {source}")]
    Close {
        id: ConnectionId,
        #[source]
        source: TransportError,
    },
    /// The event-loop thread or its runtime could not be started
    #[error("failed to start event loop: {0}")]
    EventLoop(#[from] std::io::Error),
}
