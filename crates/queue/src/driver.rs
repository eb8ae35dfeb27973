//! Queue driver contract.

use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use tracing::error;

use crate::error::QueueResult;
use crate::message::Message;

/// Callback a driver invokes once per dequeued message.
///
/// The driver calls it from its consume loop and runs the returned future
/// on a task of its own, so the loop never waits for a previous message.
pub type Delivery = Arc<dyn Fn(Message) -> BoxFuture<'static, QueueResult<()>> + Send + Sync>;

/// Transport moving messages between producers and consumers.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Append a message to the named queue.
    ///
    /// May wait for capacity or I/O; returns [`QueueError::Cancelled`]
    /// if `cancel` fires first.
    ///
    /// [`QueueError::Cancelled`]: crate::QueueError::Cancelled
    async fn publish(
        &self,
        queue_name: &str,
        message: Message,
        cancel: &CancellationToken,
    ) -> QueueResult<()>;

    /// Dequeue from the named queue until `cancel` fires, handing every
    /// message to `delivery` without waiting for earlier ones to finish.
    ///
    /// Only returns with an error: cancellation, a closed driver or a
    /// transport failure the driver cannot ride out.
    async fn consume(
        &self,
        queue_name: &str,
        delivery: Delivery,
        cancel: &CancellationToken,
    ) -> QueueResult<()>;

    /// Number of messages waiting on the named queue.
    async fn pending(&self, queue_name: &str) -> QueueResult<usize>;

    /// Release transport resources. Calling it twice is harmless.
    async fn close(&self) -> QueueResult<()>;
}

/// Build a [`Delivery`] from an async closure.
pub fn delivery<F, Fut>(f: F) -> Delivery
where
    F: Fn(Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = QueueResult<()>> + Send + 'static,
{
    Arc::new(move |message| f(message).boxed())
}

/// Run one delivery on its own task.
pub(crate) fn dispatch(delivery: &Delivery, queue_name: &str, message: Message) {
    let queue = queue_name.to_string();
    let message_type = message.message_type.clone();
    let future = delivery(message);

    tokio::spawn(async move {
        if let Err(e) = future.await {
            error!(queue = %queue, message_type = %message_type, error = %e, "Message delivery failed");
        }
    });
}
