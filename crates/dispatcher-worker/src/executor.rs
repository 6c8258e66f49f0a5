//! Executor contract consumed by the worker. The executor itself is an
//! external collaborator — business logic the worker never inspects —
//! so this module only defines the boundary: what the worker hands the
//! executor, and what it expects back.

use async_trait::async_trait;

use crate::context::PreparedContext;
use crate::events::EventQueue;
use crate::types::Task;

/// Opaque executor failure. The executor is user-supplied, so its error
/// type is erased at the boundary rather than modeled as a `dispatcher`
/// enum variant.
pub type ExecutorError = Box<dyn std::error::Error + Send + Sync>;

/// Read-only view the worker hands to `Executor::execute`/`cancel`:
/// `get_user_input()` and `context_data()` over the raw claimed row plus
/// the `PreparedContext` built before execution.
#[derive(Debug, Clone)]
pub struct RequestContext {
    row: Task,
    extras: PreparedContext,
}

/// `context_data()`'s return shape: `row` is the raw claimed `Task`,
/// `extras` is everything the Context Preparer derived.
#[derive(Debug, Clone, Copy)]
pub struct ContextData<'a> {
    pub row: &'a Task,
    pub extras: &'a PreparedContext,
}

impl RequestContext {
    pub fn new(row: Task, extras: PreparedContext) -> Self {
        Self { row, extras }
    }

    /// The task's `query`, trimmed. Empty string if absent.
    pub fn get_user_input(&self) -> &str {
        self.row.query.as_deref().unwrap_or("").trim()
    }

    pub fn context_data(&self) -> ContextData<'_> {
        ContextData {
            row: &self.row,
            extras: &self.extras,
        }
    }

    pub fn task(&self) -> &Task {
        &self.row
    }

    pub fn prepared(&self) -> &PreparedContext {
        &self.extras
    }
}

/// A pluggable task executor. `execute` performs the work, emitting events
/// on `queue`; `cancel` is a best-effort cooperative cancel invoked by the
/// watcher when it observes an externally signalled cancellation.
/// Neither method is expected to be infallible — errors
/// from either are logged by the caller and never propagated as a panic.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, context: &RequestContext, queue: &EventQueue) -> Result<(), ExecutorError>;

    async fn cancel(&self, context: &RequestContext, queue: &EventQueue) -> Result<(), ExecutorError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FormDefinition;
    use uuid::Uuid;

    fn sample_task(query: Option<&str>) -> Task {
        Task {
            id: Uuid::now_v7(),
            proc_inst_id: "P1".to_string(),
            root_proc_inst_id: None,
            tenant_id: "X".to_string(),
            activity_name: None,
            tool: None,
            user_id: None,
            agent_orch: "A".to_string(),
            query: query.map(str::to_string),
            feedback: None,
            output: None,
            draft: None,
            draft_status: crate::types::TaskStatus::InProgress,
            consumer: None,
        }
    }

    fn sample_context(query: Option<&str>) -> RequestContext {
        let task = sample_task(query);
        let prepared = PreparedContext {
            task_id: task.id,
            proc_inst_id: task.proc_inst_id.clone(),
            agents: vec![],
            participants: vec![],
            tenant_mcp: None,
            form: FormDefinition::freeform(),
            notify_emails: String::new(),
            summarized_feedback: None,
        };
        RequestContext::new(task, prepared)
    }

    #[test]
    fn get_user_input_trims_and_defaults_to_empty() {
        assert_eq!(sample_context(Some("  hello  ")).get_user_input(), "hello");
        assert_eq!(sample_context(None).get_user_input(), "");
    }

    #[test]
    fn context_data_exposes_row_and_extras() {
        let ctx = sample_context(Some("q"));
        let data = ctx.context_data();
        assert_eq!(data.row.id, ctx.task().id);
        assert_eq!(data.extras.proc_inst_id, "P1");
    }
}
