//! Context Preparer. Fans out the auxiliary lookups an executor needs
//! before `execute` is ever called and packs them into an immutable
//! `PreparedContext`.

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::store::{FormDefinition, StoreAdapter, StoreError};
use crate::types::Task;

/// Derived, immutable-after-build bundle consumed by the executor. Lives
/// for exactly one `execute` call.
#[derive(Debug, Clone)]
pub struct PreparedContext {
    pub task_id: Uuid,
    /// `root_proc_inst_id ?? proc_inst_id` — the id every lookup here was
    /// resolved against.
    pub proc_inst_id: String,
    pub agents: Vec<String>,
    pub participants: Vec<String>,
    pub tenant_mcp: Option<serde_json::Value>,
    pub form: FormDefinition,
    /// CSV of participant emails for the effective process.
    pub notify_emails: String,
    /// `None` when the task carried no (non-empty) `feedback`; `Some` is
    /// always the summarizer's output, never the raw feedback text.
    pub summarized_feedback: Option<String>,
}

/// Wraps whatever caused context preparation to abort. The executor is
/// never invoked when this is returned.
#[derive(Debug, thiserror::Error)]
pub enum ContextPreparationError {
    #[error("context lookup failed: {0}")]
    Lookup(#[from] StoreError),

    #[error("feedback summarization failed: {0}")]
    Summarization(String),
}

/// A pluggable "LLM call" that condenses prior feedback plus prior
/// output/draft into a single string.
#[async_trait]
pub trait FeedbackSummarizer: Send + Sync {
    async fn summarize(
        &self,
        feedback: &str,
        prior_output: Option<&serde_json::Value>,
    ) -> Result<String, String>;
}

/// Default summarizer used until a real one is wired in: passes the
/// trimmed feedback text through unchanged. A production deployment is
/// expected to inject an LLM-backed implementation instead.
#[derive(Debug, Default)]
pub struct PassthroughFeedbackSummarizer;

#[async_trait]
impl FeedbackSummarizer for PassthroughFeedbackSummarizer {
    async fn summarize(
        &self,
        feedback: &str,
        _prior_output: Option<&serde_json::Value>,
    ) -> Result<String, String> {
        Ok(feedback.trim().to_string())
    }
}

pub struct ContextPreparer {
    store: Arc<dyn StoreAdapter>,
    feedback_summarizer: Arc<dyn FeedbackSummarizer>,
}

impl ContextPreparer {
    pub fn new(store: Arc<dyn StoreAdapter>, feedback_summarizer: Arc<dyn FeedbackSummarizer>) -> Self {
        Self {
            store,
            feedback_summarizer,
        }
    }

    /// Fans the four lookups out concurrently against the task's effective
    /// process id, then (if the task carries feedback) summarizes it. A
    /// failure from any of the four propagates immediately as
    /// `ContextPreparationError` — `try_join!` short-circuits on the first
    /// error. The "on failure" defaults a lookup might fall back to (an
    /// empty CSV, a freeform form definition) are what the store adapter
    /// itself returns when a row is simply absent, not a fallback this
    /// call site applies over a retries-exhausted error.
    pub async fn prepare(&self, task: &Task) -> Result<PreparedContext, ContextPreparationError> {
        let effective_proc_inst_id = task.effective_proc_inst_id().to_string();
        let tool = task.tool.clone().unwrap_or_default();
        let tenant_id = task.tenant_id.clone();
        let user_ids = task.user_ids();

        let (notify_emails, tenant_mcp, form, grouped) = tokio::try_join!(
            self.store.fetch_notify_emails(&effective_proc_inst_id),
            self.store.fetch_tenant_mcp(&tenant_id),
            self.store.fetch_form_def(&tool, &tenant_id),
            self.store.fetch_users_grouped(&user_ids),
        )?;

        let summarized_feedback = match task.feedback.as_deref().map(str::trim) {
            Some(feedback) if !feedback.is_empty() => {
                let prior_output = task.output.as_ref().or(task.draft.as_ref());
                let summary = self
                    .feedback_summarizer
                    .summarize(feedback, prior_output)
                    .await
                    .map_err(ContextPreparationError::Summarization)?;
                Some(summary)
            }
            _ => None,
        };

        Ok(PreparedContext {
            task_id: task.id,
            proc_inst_id: effective_proc_inst_id,
            agents: grouped.agents,
            participants: grouped.humans,
            tenant_mcp,
            form,
            notify_emails,
            summarized_feedback,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use crate::types::TaskStatus;

    fn task_with(feedback: Option<&str>, tool: Option<&str>) -> Task {
        Task {
            id: Uuid::now_v7(),
            proc_inst_id: "P1".to_string(),
            root_proc_inst_id: Some("ROOT".to_string()),
            tenant_id: "X".to_string(),
            activity_name: None,
            tool: tool.map(str::to_string),
            user_id: Some("U1,U2".to_string()),
            agent_orch: "A".to_string(),
            query: Some("hello".to_string()),
            feedback: feedback.map(str::to_string),
            output: None,
            draft: None,
            draft_status: TaskStatus::InProgress,
            consumer: None,
        }
    }

    #[tokio::test]
    async fn prepare_resolves_against_effective_proc_inst_id() {
        let store = Arc::new(InMemoryStore::default());
        store.set_notify_emails("ROOT", "a@x.com,b@x.com");
        let preparer = ContextPreparer::new(store, Arc::new(PassthroughFeedbackSummarizer));

        let prepared = preparer.prepare(&task_with(None, None)).await.unwrap();
        assert_eq!(prepared.proc_inst_id, "ROOT");
        assert_eq!(prepared.notify_emails, "a@x.com,b@x.com");
        assert!(prepared.summarized_feedback.is_none());
    }

    #[tokio::test]
    async fn missing_form_def_falls_back_to_freeform() {
        let store = Arc::new(InMemoryStore::default());
        let preparer = ContextPreparer::new(store, Arc::new(PassthroughFeedbackSummarizer));

        let prepared = preparer
            .prepare(&task_with(None, Some("formHandler:unknown")))
            .await
            .unwrap();
        assert_eq!(prepared.form.form_id, "freeform");
    }

    #[tokio::test]
    async fn non_empty_feedback_is_summarized() {
        let store = Arc::new(InMemoryStore::default());
        let preparer = ContextPreparer::new(store, Arc::new(PassthroughFeedbackSummarizer));

        let prepared = preparer
            .prepare(&task_with(Some("  please redo the summary  "), None))
            .await
            .unwrap();
        assert_eq!(prepared.summarized_feedback.as_deref(), Some("please redo the summary"));
    }

    #[tokio::test]
    async fn blank_feedback_is_treated_as_absent() {
        let store = Arc::new(InMemoryStore::default());
        let preparer = ContextPreparer::new(store, Arc::new(PassthroughFeedbackSummarizer));

        let prepared = preparer.prepare(&task_with(Some("   "), None)).await.unwrap();
        assert!(prepared.summarized_feedback.is_none());
    }

    #[tokio::test]
    async fn exhausted_retries_on_any_lookup_abort_preparation() {
        let store = Arc::new(InMemoryStore::default());
        store.fail_form_def_calls(10);
        let preparer = ContextPreparer::new(store, Arc::new(PassthroughFeedbackSummarizer));

        let result = preparer.prepare(&task_with(None, None)).await;
        assert!(matches!(result, Err(ContextPreparationError::Lookup(_))));
    }
}
