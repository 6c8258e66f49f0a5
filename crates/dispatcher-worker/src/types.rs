//! Core data model: the claimed unit of work and the descriptor used to
//! ask the store for one.

use dispatcher_shared::config::Environment;
use uuid::Uuid;

/// One claimed unit of work. Fields mirror the `todolist` row; empty JSON
/// containers (`[]`/`{}`) are normalized to `None` by the store adapter
/// at fetch time, so downstream code never has to special-case that.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub proc_inst_id: String,
    pub root_proc_inst_id: Option<String>,
    pub tenant_id: String,
    pub activity_name: Option<String>,
    pub tool: Option<String>,
    /// Comma-separated list of participant ids.
    pub user_id: Option<String>,
    pub agent_orch: String,
    pub query: Option<String>,
    pub feedback: Option<String>,
    pub output: Option<serde_json::Value>,
    pub draft: Option<serde_json::Value>,
    pub draft_status: TaskStatus,
    pub consumer: Option<String>,
}

impl Task {
    /// `root_proc_inst_id ?? proc_inst_id` — used for every Context
    /// Preparer lookup. Event records use `proc_inst_id` directly instead.
    pub fn effective_proc_inst_id(&self) -> &str {
        self.root_proc_inst_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .unwrap_or(&self.proc_inst_id)
    }

    /// Participant ids split on commas, trimmed, empty entries dropped.
    pub fn user_ids(&self) -> Vec<String> {
        self.user_id
            .as_deref()
            .unwrap_or("")
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Cancelled,
    FbRequested,
    Completed,
    Failed,
}

impl TaskStatus {
    /// True for the two statuses the cancellation watcher treats as an
    /// externally signalled cancel.
    pub fn is_cancelling(&self) -> bool {
        matches!(self, TaskStatus::Cancelled | TaskStatus::FbRequested)
    }

    /// Parses the raw, possibly-differently-cased status string the store
    /// returns from `fetchStatus`, normalizing the way the original's
    /// `_watch_cancellation` does (`strip().lower()`).
    pub fn parse_loose(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "pending" => Some(TaskStatus::Pending),
            "in_progress" => Some(TaskStatus::InProgress),
            "cancelled" | "canceled" => Some(TaskStatus::Cancelled),
            "fb_requested" => Some(TaskStatus::FbRequested),
            "completed" => Some(TaskStatus::Completed),
            "failed" => Some(TaskStatus::Failed),
            _ => None,
        }
    }
}

/// `{ agent_orch, consumer, limit=1, env }` sent to the store's claim RPC.
#[derive(Debug, Clone)]
pub struct ClaimDescriptor {
    pub agent_orch: String,
    pub consumer: String,
    pub env: Environment,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_task() -> Task {
        Task {
            id: Uuid::nil(),
            proc_inst_id: "P1".to_string(),
            root_proc_inst_id: None,
            tenant_id: "X".to_string(),
            activity_name: None,
            tool: None,
            user_id: Some("U1, U2 ,".to_string()),
            agent_orch: "A".to_string(),
            query: None,
            feedback: None,
            output: None,
            draft: None,
            draft_status: TaskStatus::InProgress,
            consumer: None,
        }
    }

    #[test]
    fn effective_proc_inst_id_falls_back_to_own_id() {
        let task = base_task();
        assert_eq!(task.effective_proc_inst_id(), "P1");
    }

    #[test]
    fn effective_proc_inst_id_prefers_root_when_present() {
        let mut task = base_task();
        task.root_proc_inst_id = Some("ROOT".to_string());
        assert_eq!(task.effective_proc_inst_id(), "ROOT");
    }

    #[test]
    fn user_ids_splits_trims_and_drops_empties() {
        let task = base_task();
        assert_eq!(task.user_ids(), vec!["U1".to_string(), "U2".to_string()]);
    }

    #[test]
    fn task_status_parse_loose_normalizes_case_and_whitespace() {
        assert_eq!(TaskStatus::parse_loose("  Cancelled "), Some(TaskStatus::Cancelled));
        assert_eq!(TaskStatus::parse_loose("FB_REQUESTED"), Some(TaskStatus::FbRequested));
        assert_eq!(TaskStatus::parse_loose("nonsense"), None);
    }

    #[test]
    fn is_cancelling_covers_both_statuses() {
        assert!(TaskStatus::Cancelled.is_cancelling());
        assert!(TaskStatus::FbRequested.is_cancelling());
        assert!(!TaskStatus::InProgress.is_cancelling());
    }
}
