//! Message handlers and the type-tag routing table.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{QueueError, QueueResult};
use crate::message::Message;

/// Error returned by a failing handler.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Processes messages of one type.
///
/// A message can be delivered more than once and several messages may be
/// handled at the same time, so implementations must tolerate both.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Process one message. An error schedules a retry.
    async fn handle(&self, message: &Message) -> Result<(), HandlerError>;
}

/// Adapter turning an async closure into a [`MessageHandler`].
pub struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> MessageHandler for FnHandler<F>
where
    F: Fn(Message) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    async fn handle(&self, message: &Message) -> Result<(), HandlerError> {
        (self.0)(message.clone()).await
    }
}

/// Wrap an async closure as a handler.
pub const fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(Message) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    FnHandler(f)
}

/// Routing table from message type to handler.
///
/// Registration is checked eagerly: an empty type or a second handler for
/// the same type is rejected instead of being discovered at dispatch time.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn MessageHandler>>,
}

impl HandlerRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the handler for a message type.
    pub fn register<H>(&mut self, message_type: impl Into<String>, handler: H) -> QueueResult<()>
    where
        H: MessageHandler + 'static,
    {
        let message_type = message_type.into();
        if message_type.is_empty() {
            return Err(QueueError::EmptyMessageType);
        }
        if self.handlers.contains_key(&message_type) {
            return Err(QueueError::DuplicateHandler(message_type));
        }

        self.handlers.insert(message_type, Arc::new(handler));
        Ok(())
    }

    /// Register an async closure for a message type.
    pub fn register_fn<F, Fut>(&mut self, message_type: impl Into<String>, f: F) -> QueueResult<()>
    where
        F: Fn(Message) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        self.register(message_type, handler_fn(f))
    }

    /// Fail unless every listed type has a handler.
    pub fn ensure_registered(&self, message_types: &[&str]) -> QueueResult<()> {
        match message_types
            .iter()
            .find(|message_type| !self.handlers.contains_key(**message_type))
        {
            Some(missing) => Err(QueueError::MissingHandler((*missing).to_string())),
            None => Ok(()),
        }
    }

    /// Look up the handler for a message type (exact match).
    #[must_use]
    pub fn get(&self, message_type: &str) -> Option<Arc<dyn MessageHandler>> {
        self.handlers.get(message_type).cloned()
    }

    /// Registered message types, sorted.
    #[must_use]
    pub fn message_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether no handler is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("message_types", &self.message_types())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn registry() -> HandlerRegistry {
        let mut registry = HandlerRegistry::new();
        registry.register_fn("test", |_| async { Ok(()) }).unwrap();
        registry
            .register_fn("fail", |message: Message| async move {
                Err(format!("cannot handle {}", message.message_type).into())
            })
            .unwrap();
        registry
    }

    #[tokio::test]
    async fn test_lookup_and_invoke() {
        let registry = registry();

        let handler = registry.get("test").unwrap();
        assert!(handler.handle(&Message::new("test")).await.is_ok());

        let handler = registry.get("fail").unwrap();
        let err = handler.handle(&Message::new("fail")).await.unwrap_err();
        assert_eq!(err.to_string(), "cannot handle fail");

        assert!(registry.get("TEST").is_none());
        assert_eq!(registry.message_types(), vec!["fail", "test"]);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut registry = registry();
        let result = registry.register_fn("test", |_| async { Ok(()) });
        assert!(matches!(result, Err(QueueError::DuplicateHandler(t)) if t == "test"));
    }

    #[test]
    fn test_empty_type_rejected() {
        let mut registry = HandlerRegistry::new();
        let result = registry.register_fn("", |_| async { Ok(()) });
        assert!(matches!(result, Err(QueueError::EmptyMessageType)));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_ensure_registered() {
        let registry = registry();
        assert!(registry.ensure_registered(&["test", "fail"]).is_ok());

        let result = registry.ensure_registered(&["test", "mail.send"]);
        assert!(matches!(result, Err(QueueError::MissingHandler(t)) if t == "mail.send"));
    }
}
