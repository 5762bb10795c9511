//! Stream Mux - many channel subscriptions over one streaming endpoint
//!
//! A [`ConnectionRegistry`] opens one transport connection per
//! [`Subscription`], drives all of them from a single event-loop thread and
//! reports what each connection sees to an [`EventHandler`]. The
//! [`EventSink`] handler hands messages and log lines to two
//! [`DeliveryQueue`]s whose writer threads append them to files, so slow
//! disk writes never hold up the event loop.
//!
//! # Example
//!
//! ```no_run
//! use std::fs::File;
//! use std::sync::Arc;
//! use stream_mux::{ConnectionRegistry, EventSink, Subscription, WsTransport};
//! use stream_mux::transport::tls::hardened_client_config;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let sink = Arc::new(EventSink::spawn(
//!         File::create("record.txt")?,
//!         File::create("log.txt")?,
//!     )?);
//!     let transport = Arc::new(WsTransport::new(hardened_client_config()?));
//!     let registry = ConnectionRegistry::new("wss://ws.bitstamp.net", transport, sink.clone())?;
//!
//!     let id = registry.subscribe(Subscription::new("live_trades_btcusd"))?;
//!     println!("subscribed as {}", id);
//!
//!     // Close sockets first, then let the writers drain.
//!     registry.shutdown();
//!     sink.join();
//!     Ok(())
//! }
//! ```

use std::sync::{Mutex, MutexGuard, PoisonError};

mod connection;
mod error;
mod queue;
mod registry;
mod sink;
mod subscription;
pub mod transport;

pub use connection::{Connection, ConnectionId, ConnectionStatus};
pub use error::{RegistryError, TransportError};
pub use queue::DeliveryQueue;
pub use registry::ConnectionRegistry;
pub use sink::{DrainReport, EventHandler, EventSink};
pub use subscription::Subscription;
pub use transport::{
    CloseCode, EventSender, Transport, TransportEvent, TransportEventKind, TransportHandle,
    WsTransport,
};

/// Lock a mutex, recovering the data if a previous holder panicked
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
