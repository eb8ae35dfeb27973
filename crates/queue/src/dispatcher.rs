//! Queue consumer with type routing, retry and dead-lettering.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::driver::delivery;
use crate::error::QueueResult;
use crate::handler::HandlerRegistry;
use crate::message::Message;
use crate::registry::QueueRegistry;
use crate::retry::RetryPolicy;

/// What happened to one dequeued message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The handler succeeded.
    Processed,
    /// The handler failed and the message went back onto its queue.
    Retried {
        /// Retry count carried by the requeued message.
        retry_count: u32,
    },
    /// Retries were exhausted and the message moved to the dead-letter queue.
    DeadLettered,
    /// No handler exists for the message type; the message was discarded.
    Dropped,
}

/// Consumes one queue and routes each message to its handler.
#[derive(Clone)]
pub struct Dispatcher {
    registry: QueueRegistry,
    queue_name: Arc<str>,
    handlers: Arc<HandlerRegistry>,
    policy: RetryPolicy,
}

impl Dispatcher {
    /// Create a dispatcher for `queue_name` with the default retry policy.
    #[must_use]
    pub fn new(registry: QueueRegistry, queue_name: &str, handlers: HandlerRegistry) -> Self {
        Self {
            registry,
            queue_name: Arc::from(queue_name),
            handlers: Arc::new(handlers),
            policy: RetryPolicy::default(),
        }
    }

    /// Replace the retry policy.
    #[must_use]
    pub const fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Queue this dispatcher consumes.
    #[must_use]
    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    /// Retry policy in effect.
    #[must_use]
    pub const fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Consume until the registry's shutdown token fires or the driver fails.
    ///
    /// Each message is processed on its own task; the loop never waits for
    /// a handler to finish before taking the next message.
    pub async fn run(&self) -> QueueResult<()> {
        info!(
            queue = %self.queue_name,
            driver = self.registry.driver().name(),
            message_types = ?self.handlers.message_types(),
            max_retries = self.policy.max_retries,
            "Queue consumer started"
        );

        let dispatcher = self.clone();
        let delivery = delivery(move |message| {
            let dispatcher = dispatcher.clone();
            async move { dispatcher.process(message).await.map(|_| ()) }
        });

        self.registry
            .driver()
            .consume(&self.queue_name, delivery, self.registry.shutdown_token())
            .await
    }

    /// Apply routing and the retry policy to one dequeued message.
    ///
    /// Errors only come from publishing the message onward (requeue or
    /// dead-letter); handler failures are absorbed into [`Outcome::Retried`].
    pub async fn process(&self, mut message: Message) -> QueueResult<Outcome> {
        if self.policy.should_dead_letter(message.retry_count) {
            warn!(
                queue = %self.queue_name,
                dead_letter_queue = self.registry.dead_letter_queue(),
                message_type = %message.message_type,
                retry_count = message.retry_count,
                "Retries exhausted, moving message to dead-letter queue"
            );
            self.registry
                .push_queue(message, self.registry.dead_letter_queue())
                .await?;
            return Ok(Outcome::DeadLettered);
        }

        let Some(handler) = self.handlers.get(&message.message_type) else {
            warn!(
                queue = %self.queue_name,
                message_type = %message.message_type,
                "Unknown message type, dropping message"
            );
            return Ok(Outcome::Dropped);
        };

        debug!(
            queue = %self.queue_name,
            message_type = %message.message_type,
            retry_count = message.retry_count,
            "Routing message to handler"
        );

        match handler.handle(&message).await {
            Ok(()) => {
                debug!(
                    queue = %self.queue_name,
                    message_type = %message.message_type,
                    "Message processed"
                );
                Ok(Outcome::Processed)
            }
            Err(e) => {
                message.retry_count = self.policy.next_retry_count(message.retry_count);
                let retry_count = message.retry_count;
                warn!(
                    queue = %self.queue_name,
                    message_type = %message.message_type,
                    retry_count,
                    error = %e,
                    "Handler failed, requeueing message"
                );
                self.registry.push_queue(message, &self.queue_name).await?;
                Ok(Outcome::Retried { retry_count })
            }
        }
    }
}
