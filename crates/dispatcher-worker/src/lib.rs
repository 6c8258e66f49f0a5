//! Polling worker that claims agent tasks from a shared store, prepares
//! execution context, drives a pluggable `Executor`, streams progress
//! events back through a coalesced bulk write, and finalizes each task's
//! lifecycle.

pub mod context;
pub mod error_summarizer;
pub mod events;
pub mod executor;
pub mod server;
pub mod store;
pub mod types;
pub mod watcher;

pub use context::{ContextPreparationError, ContextPreparer, FeedbackSummarizer, PassthroughFeedbackSummarizer, PreparedContext};
pub use error_summarizer::{ErrorContext, ErrorSummarizer, NoopErrorSummarizer, FALLBACK_FRIENDLY_TEXT};
pub use executor::{ContextData, Executor, ExecutorError, RequestContext};
pub use server::WorkerServer;
pub use store::{FormDefinition, GroupedUsers, StoreAdapter, StoreError};
pub use types::{ClaimDescriptor, Task, TaskStatus};
pub use watcher::CancellationWatcher;
