//! An in-memory `StoreAdapter` used by unit/integration tests across the
//! crate (coalescer, event queue, context preparer, worker server). Mirrors
//! the "in-memory provider" test helper pattern
//! `tasker-shared::messaging::client`'s test module uses
//! (`MessagingProvider::new_in_memory()`).

use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use crate::events::PersistedEventRecord;
use crate::types::{ClaimDescriptor, Task};

use super::{FormDefinition, GroupedUsers, StoreAdapter, StoreError};

#[derive(Debug, Default)]
pub struct InMemoryStore {
    inner: Mutex<State>,
}

#[derive(Debug, Default)]
struct State {
    pending: Vec<Task>,
    statuses: std::collections::HashMap<Uuid, String>,
    notify_emails: std::collections::HashMap<String, String>,
    tenant_mcp: std::collections::HashMap<String, serde_json::Value>,
    form_defs: std::collections::HashMap<(String, String), FormDefinition>,
    grouped_users: GroupedUsers,
    saved_results: Vec<(Uuid, serde_json::Value, bool)>,
    recorded_events: Vec<PersistedEventRecord>,
    bulk_flushes: Vec<Vec<PersistedEventRecord>>,
    failed: Vec<Uuid>,
    fail_next_form_def: u32,
}

impl InMemoryStore {
    pub fn push_pending(&self, task: Task) {
        let mut state = self.inner.lock().unwrap();
        state.statuses.insert(task.id, "in_progress".to_string());
        state.pending.push(task);
    }

    pub fn set_status(&self, task_id: Uuid, status: &str) {
        self.inner.lock().unwrap().statuses.insert(task_id, status.to_string());
    }

    pub fn set_notify_emails(&self, proc_inst_id: &str, emails: &str) {
        self.inner
            .lock()
            .unwrap()
            .notify_emails
            .insert(proc_inst_id.to_string(), emails.to_string());
    }

    pub fn set_form_def(&self, tool: &str, tenant_id: &str, def: FormDefinition) {
        self.inner
            .lock()
            .unwrap()
            .form_defs
            .insert((tool.to_string(), tenant_id.to_string()), def);
    }

    /// Every `fetch_form_def` call fails until this counter reaches zero —
    /// used to exercise context preparation aborting once retries exhaust.
    pub fn fail_form_def_calls(&self, times: u32) {
        self.inner.lock().unwrap().fail_next_form_def = times;
    }

    pub fn recorded(&self) -> Vec<PersistedEventRecord> {
        self.inner.lock().unwrap().recorded_events.clone()
    }

    pub fn bulk_flushes(&self) -> Vec<Vec<PersistedEventRecord>> {
        self.inner.lock().unwrap().bulk_flushes.clone()
    }

    pub fn saved_results(&self) -> Vec<(Uuid, serde_json::Value, bool)> {
        self.inner.lock().unwrap().saved_results.clone()
    }

    pub fn failed_tasks(&self) -> Vec<Uuid> {
        self.inner.lock().unwrap().failed.clone()
    }

    pub fn status_of(&self, task_id: Uuid) -> Option<String> {
        self.inner.lock().unwrap().statuses.get(&task_id).cloned()
    }
}

#[async_trait]
impl StoreAdapter for InMemoryStore {
    async fn claim(&self, descriptor: &ClaimDescriptor) -> Result<Option<Task>, StoreError> {
        let mut state = self.inner.lock().unwrap();
        let idx = state
            .pending
            .iter()
            .position(|t| t.agent_orch == descriptor.agent_orch);
        Ok(idx.map(|i| {
            let mut task = state.pending.remove(i);
            task.consumer = Some(descriptor.consumer.clone());
            task
        }))
    }

    async fn fetch_status(&self, task_id: Uuid) -> Result<Option<String>, StoreError> {
        Ok(self.inner.lock().unwrap().statuses.get(&task_id).cloned())
    }

    async fn fetch_notify_emails(&self, proc_inst_id: &str) -> Result<String, StoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .notify_emails
            .get(proc_inst_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn fetch_tenant_mcp(&self, tenant_id: &str) -> Result<Option<serde_json::Value>, StoreError> {
        Ok(self.inner.lock().unwrap().tenant_mcp.get(tenant_id).cloned())
    }

    async fn fetch_form_def(&self, tool: &str, tenant_id: &str) -> Result<FormDefinition, StoreError> {
        {
            let mut state = self.inner.lock().unwrap();
            if state.fail_next_form_def > 0 {
                state.fail_next_form_def -= 1;
                return Err(StoreError::invalid_row("simulated transient failure"));
            }
        }
        let stripped = tool.strip_prefix("formHandler:").unwrap_or(tool);
        Ok(self
            .inner
            .lock()
            .unwrap()
            .form_defs
            .get(&(stripped.to_string(), tenant_id.to_string()))
            .cloned()
            .unwrap_or_else(FormDefinition::freeform))
    }

    async fn fetch_users_grouped(&self, _user_ids: &[String]) -> Result<GroupedUsers, StoreError> {
        Ok(self.inner.lock().unwrap().grouped_users.clone())
    }

    async fn save_task_result(
        &self,
        task_id: Uuid,
        payload: serde_json::Value,
        r#final: bool,
    ) -> Result<(), StoreError> {
        let mut state = self.inner.lock().unwrap();
        if r#final {
            state.statuses.insert(task_id, "completed".to_string());
        }
        state.saved_results.push((task_id, payload, r#final));
        Ok(())
    }

    async fn record_event(&self, record: PersistedEventRecord) -> Result<(), StoreError> {
        self.inner.lock().unwrap().recorded_events.push(record);
        Ok(())
    }

    async fn record_events_bulk(&self, records: &[PersistedEventRecord]) -> Result<(), StoreError> {
        let mut state = self.inner.lock().unwrap();
        state.recorded_events.extend_from_slice(records);
        state.bulk_flushes.push(records.to_vec());
        Ok(())
    }

    async fn mark_failed(&self, task_id: Uuid) -> Result<(), StoreError> {
        let mut state = self.inner.lock().unwrap();
        state.statuses.insert(task_id, "failed".to_string());
        state.failed.push(task_id);
        Ok(())
    }
}
