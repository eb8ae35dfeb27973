//! Application message handlers.

use async_trait::async_trait;
use courier_queue::{HandlerError, HandlerRegistry, Message, MessageHandler, QueueResult};
use tracing::info;

/// Message types this process consumes.
pub mod message_types {
    /// Smoke-test message.
    pub const TEST: &str = "test";

    /// Every type that must have a handler before the consumer starts.
    pub const ALL: &[&str] = &[TEST];
}

/// Build the routing table, failing if any expected type is left unhandled.
pub fn registry() -> QueueResult<HandlerRegistry> {
    let mut handlers = HandlerRegistry::new();
    handlers.register(message_types::TEST, TestHandler)?;

    handlers.ensure_registered(message_types::ALL)?;
    Ok(handlers)
}

struct TestHandler;

#[async_trait]
impl MessageHandler for TestHandler {
    async fn handle(&self, message: &Message) -> Result<(), HandlerError> {
        info!(
            message_type = %message.message_type,
            body = ?message.body,
            headers = ?message.headers,
            "Consumed test message"
        );
        Ok(())
    }
}
