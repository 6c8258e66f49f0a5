//! Cancellation Watcher. Runs concurrently with the executor for one
//! task, polling the task's external status; on `cancelled`/
//! `fb_requested` it cancels the executor and the execute task, then
//! stops the event queue.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::AbortHandle;
use uuid::Uuid;

use crate::events::EventQueue;
use crate::executor::{Executor, RequestContext};
use crate::store::StoreAdapter;
use crate::types::TaskStatus;

pub struct CancellationWatcher {
    store: Arc<dyn StoreAdapter>,
    poll_interval: Duration,
}

impl CancellationWatcher {
    pub fn new(store: Arc<dyn StoreAdapter>, poll_interval: Duration) -> Self {
        Self { store, poll_interval }
    }

    /// Polls `fetch_status` every `poll_interval` until it observes
    /// `cancelled`/`fb_requested`, then: invokes `executor.cancel`
    /// (best-effort), aborts `execute_handle`, and stops `queue`. A
    /// transient error from `fetch_status` is logged and the poll simply
    /// continues — it is not grounds for treating the task as cancelled.
    pub async fn watch(
        &self,
        task_id: Uuid,
        executor: Arc<dyn Executor>,
        context: RequestContext,
        queue: EventQueue,
        execute_handle: AbortHandle,
    ) {
        loop {
            tokio::time::sleep(self.poll_interval).await;

            let raw_status = match self.store.fetch_status(task_id).await {
                Ok(status) => status,
                Err(error) => {
                    tracing::warn!(%task_id, %error, "cancellation watcher: status fetch failed; retrying next tick");
                    continue;
                }
            };

            let is_cancelling = raw_status
                .as_deref()
                .and_then(TaskStatus::parse_loose)
                .map(|status| status.is_cancelling())
                .unwrap_or(false);

            if !is_cancelling {
                continue;
            }

            tracing::info!(%task_id, status = raw_status.as_deref().unwrap_or(""), "externally signalled cancellation observed");

            if let Err(error) = executor.cancel(&context, &queue).await {
                tracing::warn!(%task_id, %error, "executor cancel hook failed");
            }

            execute_handle.abort();
            queue.stop();
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::PreparedContext;
    use crate::events::EventCoalescer;
    use crate::store::{FormDefinition, InMemoryStore};
    use crate::types::Task;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct RecordingExecutor {
        cancelled: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Executor for RecordingExecutor {
        async fn execute(&self, _ctx: &RequestContext, _queue: &EventQueue) -> Result<(), crate::executor::ExecutorError> {
            std::future::pending::<()>().await;
            unreachable!()
        }

        async fn cancel(&self, _ctx: &RequestContext, _queue: &EventQueue) -> Result<(), crate::executor::ExecutorError> {
            self.cancelled.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    fn request_context(task_id: Uuid) -> RequestContext {
        let task = Task {
            id: task_id,
            proc_inst_id: "P1".to_string(),
            root_proc_inst_id: None,
            tenant_id: "X".to_string(),
            activity_name: None,
            tool: None,
            user_id: None,
            agent_orch: "A".to_string(),
            query: None,
            feedback: None,
            output: None,
            draft: None,
            draft_status: crate::types::TaskStatus::InProgress,
            consumer: None,
        };
        let prepared = PreparedContext {
            task_id,
            proc_inst_id: "P1".to_string(),
            agents: vec![],
            participants: vec![],
            tenant_mcp: None,
            form: FormDefinition::freeform(),
            notify_emails: String::new(),
            summarized_feedback: None,
        };
        RequestContext::new(task, prepared)
    }

    #[tokio::test]
    async fn detects_cancellation_and_invokes_executor_cancel() {
        let store = Arc::new(InMemoryStore::default());
        let task_id = Uuid::now_v7();
        store.set_status(task_id, "cancelled");

        let handle: Arc<dyn StoreAdapter> = store;
        let watcher = CancellationWatcher::new(handle.clone(), Duration::from_millis(5));

        let cancelled = Arc::new(AtomicBool::new(false));
        let executor: Arc<dyn Executor> = Arc::new(RecordingExecutor {
            cancelled: cancelled.clone(),
        });

        let coalescer = EventCoalescer::new(handle.clone(), 100, Duration::from_secs(60));
        let queue = EventQueue::new(task_id, "P1".to_string(), handle, coalescer);

        let execute_handle = tokio::spawn(std::future::pending::<()>());
        let abort = execute_handle.abort_handle();

        watcher
            .watch(task_id, executor, request_context(task_id), queue, abort.clone())
            .await;

        assert!(cancelled.load(Ordering::SeqCst));
        assert!(execute_handle.await.unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn fb_requested_is_also_treated_as_cancellation() {
        let store = Arc::new(InMemoryStore::default());
        let task_id = Uuid::now_v7();
        store.set_status(task_id, "fb_requested");

        let handle: Arc<dyn StoreAdapter> = store;
        let watcher = CancellationWatcher::new(handle.clone(), Duration::from_millis(5));
        let cancelled = Arc::new(AtomicBool::new(false));
        let executor: Arc<dyn Executor> = Arc::new(RecordingExecutor {
            cancelled: cancelled.clone(),
        });
        let coalescer = EventCoalescer::new(handle.clone(), 100, Duration::from_secs(60));
        let queue = EventQueue::new(task_id, "P1".to_string(), handle, coalescer);
        let execute_handle = tokio::spawn(std::future::pending::<()>());

        watcher
            .watch(task_id, executor, request_context(task_id), queue, execute_handle.abort_handle())
            .await;

        assert!(cancelled.load(Ordering::SeqCst));
    }
}
