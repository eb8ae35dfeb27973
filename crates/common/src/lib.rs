//! Common utilities and shared types for courier.
//!
//! This crate provides foundational components used across all courier crates:
//!
//! - **Configuration**: Application settings via [`Config`]
//! - **Error handling**: Unified error types via [`AppError`] and [`AppResult`]
//!
//! # Example
//!
//! ```no_run
//! use courier_common::{AppResult, Config};
//!
//! fn example() -> AppResult<()> {
//!     let config = Config::load()?;
//!     println!("Queue driver: {}", config.queue.driver);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;

pub use config::{Config, DriverKind, LogConfig, LogFormat, QueueConfig, RedisConfig};
pub use error::{AppError, AppResult};
