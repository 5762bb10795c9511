use std::io::Write;

use crate::queue::DeliveryQueue;

/// Receiver of everything a connection reports.
///
/// Called from the event-loop thread, so implementations must not block.
pub trait EventHandler: Send + Sync {
    /// A payload arrived on a subscribed channel
    fn handle_new_message(&self, payload: String);
    /// An operational line for the diagnostic log
    fn handle_log(&self, text: String);
}

/// Routes messages and logs onto their own delivery queues
pub struct EventSink {
    messages: DeliveryQueue,
    logs: DeliveryQueue,
}

/// Lines written by each queue once the sink has drained
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub messages: u64,
    pub logs: u64,
}

impl EventSink {
    pub fn new(messages: DeliveryQueue, logs: DeliveryQueue) -> Self {
        Self { messages, logs }
    }

    /// Spawn both queues over the given writers
    pub fn spawn<M, L>(record: M, log: L) -> std::io::Result<Self>
    where
        M: Write + Send + 'static,
        L: Write + Send + 'static,
    {
        Ok(Self::new(
            DeliveryQueue::spawn("record", record)?,
            DeliveryQueue::spawn("log", log)?,
        ))
    }

    /// Tell both consumers to drain and exit.
    ///
    /// Only call once no connection callback can fire any more, i.e. after
    /// the registry has shut down.
    pub fn stop(&self) {
        self.logs.stop();
        self.messages.stop();
    }

    /// Stop and wait for both consumers to finish writing
    pub fn join(&self) -> DrainReport {
        self.stop();
        DrainReport {
            messages: self.messages.join(),
            logs: self.logs.join(),
        }
    }
}

impl EventHandler for EventSink {
    fn handle_new_message(&self, payload: String) {
        self.messages.produce(payload);
    }

    fn handle_log(&self, text: String) {
        self.logs.produce(text);
    }
}
