//! Ambient stack shared by the dispatcher binary and the worker library:
//! configuration loading, error types, structured logging setup, and the
//! retry/backoff helper used by every store operation.

pub mod config;
pub mod error;
pub mod logging;
pub mod retry;

pub use config::{Environment, WorkerConfig};
pub use error::ConfigError;
pub use retry::retry;
