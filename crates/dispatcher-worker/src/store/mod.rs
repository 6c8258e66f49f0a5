//! Store Adapter: the only I/O surface the rest of the crate talks to.

mod error;
#[cfg(any(test, feature = "test-utils"))]
pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use error::StoreError;
#[cfg(any(test, feature = "test-utils"))]
pub use memory::InMemoryStore;

use async_trait::async_trait;
use uuid::Uuid;

use crate::events::PersistedEventRecord;
use crate::types::{ClaimDescriptor, Task};

/// Participating users split into agents vs. humans (`fetchUsersGrouped`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupedUsers {
    pub agents: Vec<String>,
    pub humans: Vec<String>,
}

/// `(form_id, fields, html)` — the result of a form definition lookup.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FormDefinition {
    pub form_id: String,
    pub fields: serde_json::Value,
    pub html: Option<String>,
}

impl FormDefinition {
    /// `{id:"freeform", fields:[{key:"freeform", type:"textarea"}],
    /// html:null}` — the default used when no `form_def` row is found.
    /// This is a success-path default the store adapter returns, not a
    /// retry fallback this call site applies.
    pub fn freeform() -> Self {
        Self {
            form_id: "freeform".to_string(),
            fields: serde_json::json!([{"key": "freeform", "type": "textarea"}]),
            html: None,
        }
    }
}

/// Typed operations the worker needs from the external store. Every
/// concrete implementation is expected to wrap its own raw I/O with
/// `dispatcher_shared::retry` internally — the trait itself just returns
/// the outcome after whatever retries happened.
#[async_trait]
pub trait StoreAdapter: Send + Sync {
    /// Atomically claims at most one pending task for `agent_orch`,
    /// stamping `consumer` and transitioning `draft_status` to
    /// `in_progress`.
    async fn claim(&self, descriptor: &ClaimDescriptor) -> Result<Option<Task>, StoreError>;

    /// Raw status string for the cancellation watcher
    /// (`todolist.draft_status select`).
    async fn fetch_status(&self, task_id: Uuid) -> Result<Option<String>, StoreError>;

    /// CSV of participant emails for the effective process id. Empty
    /// string if none found — a legitimate empty result, not a failure.
    async fn fetch_notify_emails(&self, proc_inst_id: &str) -> Result<String, StoreError>;

    /// Tenant MCP/tool config, `None` if the tenant has none configured.
    async fn fetch_tenant_mcp(&self, tenant_id: &str) -> Result<Option<serde_json::Value>, StoreError>;

    /// Form definition by `(tool, tenant_id)`. Returns
    /// `FormDefinition::freeform()` when no row matches.
    async fn fetch_form_def(&self, tool: &str, tenant_id: &str) -> Result<FormDefinition, StoreError>;

    /// Participating users split into agents/humans.
    async fn fetch_users_grouped(&self, user_ids: &[String]) -> Result<GroupedUsers, StoreError>;

    /// `final=true` transitions `draft_status` to `completed`.
    async fn save_task_result(
        &self,
        task_id: Uuid,
        payload: serde_json::Value,
        r#final: bool,
    ) -> Result<(), StoreError>;

    /// Single-event write (used by the failure-path handler; never
    /// coalesced).
    async fn record_event(&self, record: PersistedEventRecord) -> Result<(), StoreError>;

    /// Bulk write used by the coalescer; called at most once per flush.
    async fn record_events_bulk(&self, records: &[PersistedEventRecord]) -> Result<(), StoreError>;

    /// Sets `draft_status=FAILED, consumer=null`.
    async fn mark_failed(&self, task_id: Uuid) -> Result<(), StoreError>;
}
