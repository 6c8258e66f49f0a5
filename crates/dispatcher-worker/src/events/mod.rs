//! Event Translator & Coalescer: turns executor-emitted events into
//! persisted records and batches the ones that aren't final artifacts.

mod coalescer;
mod payload;
mod queue;

pub use coalescer::EventCoalescer;
pub use payload::{extract_payload, Payload};
pub use queue::{EventQueue, ExecutorEvent, PersistedEventRecord, StatusMetadata};
