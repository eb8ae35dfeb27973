//! Queue error types.

use courier_common::AppError;
use fred::error::Error as RedisError;
use thiserror::Error;

/// Queue result type.
pub type QueueResult<T> = Result<T, QueueError>;

/// Errors raised by drivers, the dispatcher and the handler registry.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The caller's cancellation token fired.
    #[error("Operation cancelled")]
    Cancelled,

    /// The driver was closed.
    #[error("Driver closed")]
    Closed,

    /// Transport or command failure reported by Redis.
    #[error("Redis error: {0}")]
    Redis(#[from] RedisError),

    /// A message could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A handler was registered for the empty type.
    #[error("Message type must not be empty")]
    EmptyMessageType,

    /// Two handlers were registered for one type.
    #[error("Handler already registered for message type: {0}")]
    DuplicateHandler(String),

    /// An expected type has no handler.
    #[error("No handler registered for message type: {0}")]
    MissingHandler(String),

    /// Invalid queue configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl QueueError {
    /// Whether this error only reports that the cancellation token fired.
    ///
    /// A Redis `Canceled` error is not a shutdown: fred raises it for
    /// transport failures as well.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<QueueError> for AppError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::Redis(e) => Self::Redis(e.to_string()),
            QueueError::Config(msg) => Self::Config(msg),
            other => Self::Queue(other.to_string()),
        }
    }
}
