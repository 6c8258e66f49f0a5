//! Worker Server: the polling–claim–execute loop, graceful shutdown, and
//! the single try/except boundary around one task's lifecycle. Grounded
//! on `original_source/processgpt_agent_sdk/server.py`'s `run()` /
//! `_execute_with_cancel_watch()` / `_watch_cancellation()`, translated
//! into `tokio::select!` over `JoinHandle`s.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use dispatcher_shared::config::WorkerConfig;

use crate::context::{ContextPreparationError, ContextPreparer};
use crate::error_summarizer::{ErrorContext, ErrorSummarizer, FALLBACK_FRIENDLY_TEXT};
use crate::events::{EventCoalescer, EventQueue};
use crate::executor::{Executor, ExecutorError, RequestContext};
use crate::store::StoreAdapter;
use crate::types::{ClaimDescriptor, Task};
use crate::watcher::CancellationWatcher;

/// What `process_task`'s internal lifecycle can fail with. Never leaves
/// `process_task` itself — it is fully handled by the boundary below.
enum TaskFailure {
    ContextPreparation(ContextPreparationError),
    Executor(ExecutorError),
}

impl TaskFailure {
    /// `"<ClassName>: <message>"`, unwrapped to the cause rather than the
    /// wrapper: a lookup failure reports the underlying `StoreError`'s
    /// own class and message, not `ContextPreparationError` itself.
    fn raw_error(&self) -> String {
        match self {
            TaskFailure::ContextPreparation(ContextPreparationError::Lookup(e)) => {
                format!("{}: {e}", e.class_name())
            }
            TaskFailure::ContextPreparation(ContextPreparationError::Summarization(message)) => {
                format!("FeedbackSummarizationError: {message}")
            }
            TaskFailure::Executor(e) => format!("ExecutorError: {e}"),
        }
    }

    fn class_name(&self) -> &'static str {
        match self {
            TaskFailure::ContextPreparation(ContextPreparationError::Lookup(e)) => e.class_name(),
            TaskFailure::ContextPreparation(ContextPreparationError::Summarization(_)) => {
                "FeedbackSummarizationError"
            }
            TaskFailure::Executor(_) => "ExecutorError",
        }
    }
}

impl From<ContextPreparationError> for TaskFailure {
    fn from(value: ContextPreparationError) -> Self {
        TaskFailure::ContextPreparation(value)
    }
}

/// The main loop: claim → prepare → run executor with watcher → finalize.
/// Holds the one process-wide `EventCoalescer` and shares it with every
/// per-task `EventQueue` it constructs.
pub struct WorkerServer {
    store: Arc<dyn StoreAdapter>,
    config: WorkerConfig,
    context_preparer: ContextPreparer,
    coalescer: EventCoalescer,
    executor: Arc<dyn Executor>,
    error_summarizer: Arc<dyn ErrorSummarizer>,
    shutdown: CancellationToken,
}

impl WorkerServer {
    pub fn new(
        store: Arc<dyn StoreAdapter>,
        config: WorkerConfig,
        context_preparer: ContextPreparer,
        executor: Arc<dyn Executor>,
        error_summarizer: Arc<dyn ErrorSummarizer>,
    ) -> Self {
        let coalescer = EventCoalescer::new(store.clone(), config.coalesce_batch, config.coalesce_delay());
        Self {
            store,
            config,
            context_preparer,
            coalescer,
            executor,
            error_summarizer,
            shutdown: CancellationToken::new(),
        }
    }

    /// Requests graceful shutdown. Idempotent; safe to call from a signal
    /// handler or another task.
    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    /// Blocks until `stop()` is called or a shutdown signal is received.
    /// Never terminates on a task-level error.
    pub async fn run(&self) {
        self.spawn_signal_handlers();

        tracing::info!(
            consumer = %self.config.consumer_id,
            agent_orch = %self.config.agent_orch,
            "worker starting"
        );

        while !self.shutdown.is_cancelled() {
            let descriptor = ClaimDescriptor {
                agent_orch: self.config.agent_orch.clone(),
                consumer: self.config.consumer_id.clone(),
                env: self.config.environment,
            };

            let claimed = match self.store.claim(&descriptor).await {
                Ok(task) => task,
                Err(error) => {
                    tracing::error!(%error, "claim failed after retries; sleeping before retry");
                    None
                }
            };

            match claimed {
                Some(task) => self.process_task(task).await,
                None => {
                    tokio::select! {
                        _ = tokio::time::sleep(self.config.idle_poll_interval()) => {}
                        _ = self.shutdown.cancelled() => {}
                    }
                }
            }
        }

        tracing::info!("shutdown requested; flushing event coalescer");
        self.coalescer.flush().await;
        tracing::info!("worker stopped");
    }

    /// Installs Ctrl+C/SIGTERM handlers that request shutdown. On
    /// platforms where a handler can't be installed, logs a warning and
    /// silently continues — `stop()` must be used explicitly instead.
    fn spawn_signal_handlers(&self) {
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            let ctrl_c = async {
                if tokio::signal::ctrl_c().await.is_err() {
                    tracing::warn!("failed to install Ctrl+C handler; use stop() explicitly");
                    std::future::pending::<()>().await;
                }
            };

            #[cfg(unix)]
            let terminate = async {
                match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                    Ok(mut signal) => {
                        signal.recv().await;
                    }
                    Err(error) => {
                        tracing::warn!(%error, "failed to install SIGTERM handler; use stop() explicitly");
                        std::future::pending::<()>().await;
                    }
                }
            };
            #[cfg(not(unix))]
            let terminate = std::future::pending::<()>();

            tokio::select! {
                _ = ctrl_c => tracing::info!("received Ctrl+C"),
                _ = terminate => tracing::info!("received SIGTERM"),
            }
            shutdown.cancel();
        });
    }

    /// One task's full lifecycle under a single boundary policy.
    /// Infallible by construction: every failure path terminates inside
    /// this function, so the poll loop never has to decide what a
    /// task-level error means.
    pub async fn process_task(&self, task: Task) {
        let task_id = task.id;
        let proc_inst_id = task.proc_inst_id.clone();
        let agent_orch = task.agent_orch.clone();
        let tool = task.tool.clone();

        tracing::info!(%task_id, %proc_inst_id, "task claimed");

        if let Err(failure) = self.run_task(task).await {
            self.record_failure(task_id, &proc_inst_id, &agent_orch, tool.as_deref(), failure)
                .await;
        }
    }

    /// Prepares context, runs the executor racing the cancellation
    /// watcher, and emits `task_done` on success. `Ok(())` covers both a
    /// clean completion and an externally signalled cancellation — the
    /// latter is not an error.
    async fn run_task(&self, task: Task) -> Result<(), TaskFailure> {
        let prepared = self.context_preparer.prepare(&task).await?;
        let context = RequestContext::new(task.clone(), prepared);
        let queue = EventQueue::new(
            task.id,
            task.proc_inst_id.clone(),
            self.store.clone(),
            self.coalescer.clone(),
        );

        let executor = self.executor.clone();
        let execute_context = context.clone();
        let execute_queue = queue.clone();
        let execute_task = tokio::spawn(async move { executor.execute(&execute_context, &execute_queue).await });
        let execute_abort = execute_task.abort_handle();

        let watcher = CancellationWatcher::new(self.store.clone(), self.config.cancel_poll_interval());
        let watch_executor = self.executor.clone();
        let watch_context = context.clone();
        let watch_queue = queue.clone();
        let watch_task_id = task.id;
        let watch_task = tokio::spawn(async move {
            watcher
                .watch(watch_task_id, watch_executor, watch_context, watch_queue, execute_abort)
                .await
        });
        let watch_abort = watch_task.abort_handle();

        tracing::info!(task_id = %task.id, "executing task");

        tokio::select! {
            result = execute_task => {
                watch_abort.abort();
                match result {
                    Ok(Ok(())) => {
                        queue.task_done().await;
                        Ok(())
                    }
                    Ok(Err(error)) => Err(TaskFailure::Executor(error)),
                    Err(join_error) if join_error.is_cancelled() => Ok(()),
                    Err(join_error) => Err(TaskFailure::Executor(Box::new(join_error))),
                }
            }
            _ = watch_task => {
                // The watcher observed an externally signalled cancellation
                // and already aborted `execute_task` / stopped the queue.
                // No crew_completed, no error event.
                Ok(())
            }
        }
    }

    /// The single failure path: one `event_type=error` record, one
    /// `FAILED` transition. Exceptions from either call are logged but
    /// never mask the original failure, and never propagate further.
    async fn record_failure(
        &self,
        task_id: Uuid,
        proc_inst_id: &str,
        agent_orch: &str,
        tool: Option<&str>,
        failure: TaskFailure,
    ) {
        tracing::error!(%task_id, %proc_inst_id, class = failure.class_name(), "task failed; recording error and marking FAILED");

        let error_context = ErrorContext {
            task_id,
            proc_inst_id: proc_inst_id.to_string(),
            agent_orch: agent_orch.to_string(),
            tool: tool.map(str::to_string),
        };
        let raw_error = failure.raw_error();
        let friendly = self
            .error_summarizer
            .summarize(failure.class_name(), &raw_error, &error_context)
            .await
            .unwrap_or_else(|| FALLBACK_FRIENDLY_TEXT.to_string());

        let record = crate::events::PersistedEventRecord {
            id: Uuid::now_v7(),
            job_id: Some("TASK_ERROR".to_string()),
            todo_id: task_id,
            proc_inst_id: proc_inst_id.to_string(),
            crew_type: Some("agent".to_string()),
            event_type: Some("error".to_string()),
            data: serde_json::json!({
                "name": "시스템 오류 알림",
                "goal": "오류 원인과 대처 안내를 전달합니다.",
                "agent_profile": "/images/chat-icon.png",
                "friendly": friendly,
                "raw_error": raw_error,
            }),
            status: None,
        };

        if let Err(error) = self.store.record_event(record).await {
            tracing::error!(%task_id, %error, "failed to record error event");
        }

        if let Err(error) = self.store.mark_failed(task_id).await {
            tracing::error!(%task_id, %error, "failed to mark task FAILED");
        }
    }
}
