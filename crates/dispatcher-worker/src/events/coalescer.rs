//! Process-wide event coalescer. One buffer, one mutex, one single-shot
//! timer, shared by every per-task `EventQueue` — the only process-wide
//! mutable state in the whole system. Built as an `Arc`-backed handle
//! rather than a true singleton, so a server can be constructed with
//! its own coalescer in tests.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::store::StoreAdapter;

use super::queue::PersistedEventRecord;

struct State {
    buffer: Vec<PersistedEventRecord>,
    timer: Option<JoinHandle<()>>,
}

struct Inner {
    state: Mutex<State>,
    store: Arc<dyn StoreAdapter>,
    batch: usize,
    delay: Duration,
}

#[derive(Clone)]
pub struct EventCoalescer {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for EventCoalescer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventCoalescer")
            .field("batch", &self.inner.batch)
            .field("delay", &self.inner.delay)
            .finish_non_exhaustive()
    }
}

impl EventCoalescer {
    pub fn new(store: Arc<dyn StoreAdapter>, batch: usize, delay: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    buffer: Vec::new(),
                    timer: None,
                }),
                store,
                batch,
                delay,
            }),
        }
    }

    /// Appends under lock. Triggers an immediate flush once the buffer
    /// reaches `batch`, cancelling any armed timer; otherwise arms a timer
    /// for `delay` if one isn't already running.
    pub async fn enqueue(&self, record: PersistedEventRecord) {
        let should_flush_now = {
            let mut state = self.inner.state.lock().await;
            state.buffer.push(record);
            if state.buffer.len() >= self.inner.batch {
                if let Some(timer) = state.timer.take() {
                    timer.abort();
                }
                true
            } else {
                if state.timer.is_none() {
                    let this = self.clone();
                    state.timer = Some(tokio::spawn(async move {
                        tokio::time::sleep(this.inner.delay).await;
                        this.flush_from_timer().await;
                    }));
                }
                false
            }
        };

        if should_flush_now {
            self.flush().await;
        }
    }

    /// Atomically snapshots and clears the buffer, cancels any pending
    /// timer, and — if the snapshot was non-empty — calls
    /// `record_events_bulk` exactly once. Failures are logged; records
    /// are not retried here. Only call this from outside the timer's own
    /// task — aborting a `JoinHandle` for the task currently running it
    /// would cut the write short the moment it yields.
    pub async fn flush(&self) {
        let batch = {
            let mut state = self.inner.state.lock().await;
            if let Some(timer) = state.timer.take() {
                timer.abort();
            }
            std::mem::take(&mut state.buffer)
        };

        self.write_batch(batch).await;
    }

    /// Entry point for the delay timer's own task. Clears `state.timer`
    /// by dropping the handle rather than aborting it — a task cannot
    /// abort its own handle without losing the write it's about to make.
    async fn flush_from_timer(&self) {
        let batch = {
            let mut state = self.inner.state.lock().await;
            state.timer = None;
            std::mem::take(&mut state.buffer)
        };

        self.write_batch(batch).await;
    }

    async fn write_batch(&self, batch: Vec<PersistedEventRecord>) {
        if batch.is_empty() {
            return;
        }

        if let Err(error) = self.inner.store.record_events_bulk(&batch).await {
            tracing::error!(%error, count = batch.len(), "event batch flush failed; records dropped");
        }
    }
}
