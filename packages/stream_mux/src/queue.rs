use std::io::{BufWriter, Write};
use std::sync::Mutex;
use std::thread::JoinHandle;

use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::lock;

/// Unbounded FIFO from any number of producers to one sink-writing thread.
///
/// Each produced item becomes one line in the sink. Items from a single
/// producer keep their order; nothing is dropped once accepted.
pub struct DeliveryQueue {
    name: String,
    tx: Mutex<Option<mpsc::UnboundedSender<String>>>,
    consumer: Mutex<Option<JoinHandle<u64>>>,
}

impl DeliveryQueue {
    /// Start the consumer thread writing into `sink`
    pub fn spawn<W>(name: impl Into<String>, sink: W) -> std::io::Result<Self>
    where
        W: Write + Send + 'static,
    {
        let name = name.into();
        let (tx, rx) = mpsc::unbounded_channel();
        let thread_name = name.clone();
        let consumer = std::thread::Builder::new()
            .name(format!("{}-writer", name))
            .spawn(move || consume(&thread_name, rx, sink))?;

        Ok(Self {
            name,
            tx: Mutex::new(Some(tx)),
            consumer: Mutex::new(Some(consumer)),
        })
    }

    /// Append an item. Returns false if the queue has been stopped.
    pub fn produce(&self, item: String) -> bool {
        let tx = lock(&self.tx);
        match tx.as_ref() {
            Some(tx) if tx.send(item).is_ok() => true,
            _ => {
                warn!("{} queue is stopped, item rejected", self.name);
                false
            }
        }
    }

    /// Stop accepting items. The consumer drains what is queued, then exits.
    pub fn stop(&self) {
        if lock(&self.tx).take().is_some() {
            debug!("{} queue draining", self.name);
        }
    }

    /// Stop and wait for the consumer; returns the number of lines written.
    pub fn join(&self) -> u64 {
        self.stop();
        let Some(consumer) = lock(&self.consumer).take() else {
            return 0;
        };
        match consumer.join() {
            Ok(written) => written,
            Err(_) => {
                error!("{} writer thread panicked", self.name);
                0
            }
        }
    }

    pub fn is_stopped(&self) -> bool {
        lock(&self.tx).is_none()
    }
}

impl Drop for DeliveryQueue {
    fn drop(&mut self) {
        self.join();
    }
}

fn consume<W: Write>(name: &str, mut rx: mpsc::UnboundedReceiver<String>, sink: W) -> u64 {
    let mut out = BufWriter::new(sink);
    let mut written = 0;

    while let Some(item) = rx.blocking_recv() {
        match writeln!(out, "{}", item) {
            Ok(()) => written += 1,
            Err(e) => error!("{} sink write failed: {}", name, e),
        }
        if rx.is_empty() {
            if let Err(e) = out.flush() {
                error!("{} sink flush failed: {}", name, e);
            }
        }
    }

    if let Err(e) = out.flush() {
        error!("{} sink flush failed: {}", name, e);
    }
    debug!("{} writer exiting after {} lines", name, written);
    written
}

#[cfg(test)]
mod tests {
    use std::fs::File;
    use std::sync::Arc;

    use super::*;

    fn lines(path: &std::path::Path) -> Vec<String> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn writes_in_produce_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        let queue = DeliveryQueue::spawn("test", File::create(&path).unwrap()).unwrap();

        for i in 0..100 {
            assert!(queue.produce(format!("line {i}")));
        }
        assert_eq!(queue.join(), 100);

        let expected: Vec<String> = (0..100).map(|i| format!("line {i}")).collect();
        assert_eq!(lines(&path), expected);
    }

    #[test]
    fn produce_after_stop_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        let queue = DeliveryQueue::spawn("test", File::create(&path).unwrap()).unwrap();

        assert!(queue.produce("kept".into()));
        queue.stop();
        assert!(queue.is_stopped());
        assert!(!queue.produce("dropped".into()));
        assert_eq!(queue.join(), 1);
        assert_eq!(lines(&path), ["kept"]);
    }

    #[test]
    fn concurrent_producers_keep_per_producer_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        let queue = Arc::new(DeliveryQueue::spawn("test", File::create(&path).unwrap()).unwrap());

        let producers: Vec<_> = (0..4)
            .map(|p| {
                let queue = queue.clone();
                std::thread::spawn(move || {
                    for i in 0..250 {
                        queue.produce(format!("{p}:{i}"));
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.join().unwrap();
        }
        assert_eq!(queue.join(), 1000);

        let written = lines(&path);
        assert_eq!(written.len(), 1000);
        for p in 0..4 {
            let seq: Vec<u32> = written
                .iter()
                .filter_map(|l| l.strip_prefix(&format!("{p}:")))
                .map(|n| n.parse().unwrap())
                .collect();
            assert_eq!(seq, (0..250).collect::<Vec<_>>());
        }
    }

    #[test]
    fn join_twice_is_harmless() {
        let queue = DeliveryQueue::spawn("test", std::io::sink()).unwrap();
        queue.produce("x".into());
        assert_eq!(queue.join(), 1);
        assert_eq!(queue.join(), 0);
    }
}
