//! In-memory queue driver backed by bounded channels.
//!
//! Queues are created lazily by whichever of `publish` or `consume` names
//! them first. Nothing survives a restart.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::driver::{Delivery, Driver, dispatch};
use crate::error::{QueueError, QueueResult};
use crate::message::Message;

/// Default per-queue capacity.
pub const DEFAULT_CAPACITY: usize = 100;

/// One named queue.
struct Channel {
    sender: mpsc::Sender<Message>,
    receiver: Arc<Mutex<mpsc::Receiver<Message>>>,
}

impl Channel {
    fn new(capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity);
        Self {
            sender,
            receiver: Arc::new(Mutex::new(receiver)),
        }
    }
}

/// Process-local driver with one bounded FIFO channel per queue name.
///
/// Nothing consumes the dead-letter queue unless the application does.
/// Once it holds `capacity` messages, each further dead-lettering task
/// waits in `publish` until a slot frees up or the shutdown token fires.
pub struct MemoryDriver {
    capacity: usize,
    queues: Mutex<HashMap<String, Channel>>,
    closed: AtomicBool,
}

impl MemoryDriver {
    /// Create a driver whose queues hold at most `capacity` messages each.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        info!(capacity, "Initialized in-memory queue driver");

        Self {
            capacity,
            queues: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Per-queue capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    async fn sender(&self, queue_name: &str) -> QueueResult<mpsc::Sender<Message>> {
        let mut queues = self.queues.lock().await;
        if self.closed.load(Ordering::Acquire) {
            return Err(QueueError::Closed);
        }

        let channel = queues
            .entry(queue_name.to_string())
            .or_insert_with(|| Channel::new(self.capacity));
        Ok(channel.sender.clone())
    }

    async fn receiver(&self, queue_name: &str) -> QueueResult<Arc<Mutex<mpsc::Receiver<Message>>>> {
        let mut queues = self.queues.lock().await;
        if self.closed.load(Ordering::Acquire) {
            return Err(QueueError::Closed);
        }

        let channel = queues
            .entry(queue_name.to_string())
            .or_insert_with(|| Channel::new(self.capacity));
        Ok(channel.receiver.clone())
    }
}

impl Default for MemoryDriver {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[async_trait]
impl Driver for MemoryDriver {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn publish(
        &self,
        queue_name: &str,
        message: Message,
        cancel: &CancellationToken,
    ) -> QueueResult<()> {
        let sender = self.sender(queue_name).await?;

        let message = match sender.try_send(message) {
            Ok(()) => return Ok(()),
            Err(TrySendError::Closed(_)) => return Err(QueueError::Closed),
            Err(TrySendError::Full(message)) => message,
        };

        debug!(queue = queue_name, "Queue full, waiting for capacity");
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(QueueError::Cancelled),
            sent = sender.send(message) => sent.map_err(|_| QueueError::Closed),
        }
    }

    async fn consume(
        &self,
        queue_name: &str,
        delivery: Delivery,
        cancel: &CancellationToken,
    ) -> QueueResult<()> {
        let receiver = self.receiver(queue_name).await?;

        // A second consumer of the same queue waits here until the first one stops.
        let mut receiver = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(QueueError::Cancelled),
            guard = receiver.lock_owned() => guard,
        };

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(QueueError::Cancelled),
                message = receiver.recv() => match message {
                    Some(message) => dispatch(&delivery, queue_name, message),
                    None => return Err(QueueError::Closed),
                },
            }
        }
    }

    async fn pending(&self, queue_name: &str) -> QueueResult<usize> {
        let queues = self.queues.lock().await;
        Ok(queues.get(queue_name).map_or(0, |channel| {
            channel.sender.max_capacity() - channel.sender.capacity()
        }))
    }

    async fn close(&self) -> QueueResult<()> {
        let mut queues = self.queues.lock().await;
        if !self.closed.swap(true, Ordering::AcqRel) {
            // Dropping the senders ends every consume loop once its buffer drains.
            queues.clear();
            info!("Closed in-memory queue driver");
        }
        Ok(())
    }
}
