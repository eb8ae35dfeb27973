//! Retry policy and dead-letter threshold.

use courier_common::QueueConfig;

/// Default dead-letter threshold.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Retry policy applied by the dispatcher.
///
/// The threshold is checked when a message is dequeued, before its handler
/// runs. A message whose retry count has already passed `max_retries` is
/// dead-lettered without another attempt, so with the default of 3 the
/// handler sees retry counts 0 through 3 and the message reaches the
/// dead-letter queue carrying a count of 4.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Highest retry count that is still handed to a handler.
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl From<&QueueConfig> for RetryPolicy {
    fn from(config: &QueueConfig) -> Self {
        Self {
            max_retries: config.max_retries,
        }
    }
}

impl RetryPolicy {
    /// Create a policy with the given threshold.
    #[must_use]
    pub const fn new(max_retries: u32) -> Self {
        Self { max_retries }
    }

    /// Whether a dequeued message goes straight to the dead-letter queue.
    #[must_use]
    pub const fn should_dead_letter(&self, retry_count: u32) -> bool {
        retry_count > self.max_retries
    }

    /// Retry count to store on a message whose handler just failed.
    #[must_use]
    pub const fn next_retry_count(&self, retry_count: u32) -> u32 {
        retry_count.saturating_add(1)
    }
}
