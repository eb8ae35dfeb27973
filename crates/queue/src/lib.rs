//! Message queue layer for courier.
//!
//! This crate decouples producers from the consumer process:
//!
//! - **Messages**: typed envelopes with a body, headers and a retry counter
//! - **Drivers**: pluggable transports (in-memory channels, Redis lists)
//! - **Handlers**: per-type processing functions in a validated routing table
//! - **Dispatcher**: consume loop with requeue-on-failure and a dead-letter queue
//! - **Registry**: the process-wide driver handle shared by producers and consumer

pub mod dispatcher;
pub mod driver;
pub mod error;
pub mod handler;
pub mod memory;
pub mod message;
pub mod redis_list;
pub mod registry;
pub mod retry;

pub use dispatcher::{Dispatcher, Outcome};
pub use driver::{Delivery, Driver, delivery};
pub use error::{QueueError, QueueResult};
pub use handler::{FnHandler, HandlerError, HandlerRegistry, MessageHandler, handler_fn};
pub use memory::MemoryDriver;
pub use message::Message;
pub use redis_list::RedisListDriver;
pub use registry::{DEAD_LETTER_QUEUE_NAME, DEFAULT_QUEUE_NAME, QueueRegistry};
pub use retry::RetryPolicy;
