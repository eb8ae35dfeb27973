//! Process-wide queue handle shared by producers and the dispatcher.

use std::sync::Arc;

use courier_common::{DriverKind, QueueConfig, RedisConfig};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::driver::Driver;
use crate::error::{QueueError, QueueResult};
use crate::memory::MemoryDriver;
use crate::message::Message;
use crate::redis_list::RedisListDriver;

/// Name of the default work queue.
pub const DEFAULT_QUEUE_NAME: &str = "default";
/// Name of the dead-letter queue.
pub const DEAD_LETTER_QUEUE_NAME: &str = "dead_queue";

/// The active driver plus the names and shutdown signal everyone agrees on.
///
/// Built once at startup and cloned into producers and the dispatcher.
/// Cloning is cheap and every clone talks to the same driver.
#[derive(Clone)]
pub struct QueueRegistry {
    driver: Arc<dyn Driver>,
    default_queue: Arc<str>,
    dead_letter_queue: Arc<str>,
    shutdown: CancellationToken,
}

impl QueueRegistry {
    /// Wrap an existing driver with the default queue names.
    #[must_use]
    pub fn new(driver: Arc<dyn Driver>, shutdown: CancellationToken) -> Self {
        Self {
            driver,
            default_queue: Arc::from(DEFAULT_QUEUE_NAME),
            dead_letter_queue: Arc::from(DEAD_LETTER_QUEUE_NAME),
            shutdown,
        }
    }

    /// Override the well-known queue names.
    #[must_use]
    pub fn with_queue_names(mut self, default_queue: &str, dead_letter_queue: &str) -> Self {
        self.default_queue = Arc::from(default_queue);
        self.dead_letter_queue = Arc::from(dead_letter_queue);
        self
    }

    /// Build the driver selected by configuration.
    pub async fn connect(
        config: &QueueConfig,
        redis: Option<&RedisConfig>,
        shutdown: CancellationToken,
    ) -> QueueResult<Self> {
        let driver: Arc<dyn Driver> = match config.driver {
            DriverKind::Memory => Arc::new(MemoryDriver::new(config.capacity)),
            DriverKind::Redis => {
                let redis = redis.ok_or_else(|| {
                    QueueError::Config("the redis driver needs a [redis] section".to_string())
                })?;
                Arc::new(RedisListDriver::connect(redis, config.error_backoff()).await?)
            }
        };

        info!(
            driver = driver.name(),
            default_queue = %config.default_queue,
            dead_letter_queue = %config.dead_letter_queue,
            "Queue initialized"
        );

        Ok(Self::new(driver, shutdown)
            .with_queue_names(&config.default_queue, &config.dead_letter_queue))
    }

    /// Publish a message onto the named queue.
    pub async fn push_queue(&self, message: Message, queue_name: &str) -> QueueResult<()> {
        debug!(
            queue = queue_name,
            message_type = %message.message_type,
            retry_count = message.retry_count,
            "Publishing message"
        );
        self.driver.publish(queue_name, message, &self.shutdown).await
    }

    /// Publish a message onto the default queue.
    pub async fn push(&self, message: Message) -> QueueResult<()> {
        self.push_queue(message, &self.default_queue).await
    }

    /// Messages waiting on the named queue.
    pub async fn pending(&self, queue_name: &str) -> QueueResult<usize> {
        self.driver.pending(queue_name).await
    }

    /// Active driver.
    #[must_use]
    pub fn driver(&self) -> &Arc<dyn Driver> {
        &self.driver
    }

    /// Name of the default work queue.
    #[must_use]
    pub fn default_queue(&self) -> &str {
        &self.default_queue
    }

    /// Name of the dead-letter queue.
    #[must_use]
    pub fn dead_letter_queue(&self) -> &str {
        &self.dead_letter_queue
    }

    /// Cancellation signal governing every publish and consume loop.
    #[must_use]
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// Close the driver.
    pub async fn close(&self) -> QueueResult<()> {
        self.driver.close().await
    }
}

impl std::fmt::Debug for QueueRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueRegistry")
            .field("driver", &self.driver.name())
            .field("default_queue", &self.default_queue)
            .field("dead_letter_queue", &self.dead_letter_queue)
            .finish_non_exhaustive()
    }
}
