//! Per-task event queue. Classifies executor-emitted events: artifacts
//! become `saveResult` calls (not coalesced), status updates become
//! buffered `PersistedEventRecord`s pushed onto the process-wide
//! coalescer.

use std::sync::Arc;

use uuid::Uuid;

use crate::store::StoreAdapter;

use super::coalescer::EventCoalescer;
use super::payload::{extract_payload, Payload};

/// Metadata carried on a `StatusUpdate`.
#[derive(Debug, Clone, Default)]
pub struct StatusMetadata {
    pub crew_type: Option<String>,
    pub event_type: Option<String>,
    pub status: Option<String>,
    pub job_id: Option<String>,
}

/// What an `Executor` hands to `EventQueue::enqueue`.
#[derive(Debug, Clone)]
pub enum ExecutorEvent {
    ArtifactUpdate {
        r#final: bool,
        artifact: Option<Payload>,
    },
    StatusUpdate {
        state: String,
        message: Option<Payload>,
        metadata: StatusMetadata,
    },
}

/// The store schema the coalescer (and the failure path) writes.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct PersistedEventRecord {
    pub id: Uuid,
    pub job_id: Option<String>,
    pub todo_id: Uuid,
    pub proc_inst_id: String,
    pub crew_type: Option<String>,
    pub event_type: Option<String>,
    pub data: serde_json::Value,
    pub status: Option<String>,
}

/// `state == "input-required"` is the one state the queue special-cases:
/// it forces `event_type = "human_asked"` regardless of what the
/// executor put in `metadata.event_type`.
const INPUT_REQUIRED_STATE: &str = "input-required";

#[derive(Clone)]
pub struct EventQueue {
    task_id: Uuid,
    /// The task's own `proc_inst_id` (not the effective one) — event
    /// records use this directly.
    proc_inst_id: String,
    store: Arc<dyn StoreAdapter>,
    coalescer: EventCoalescer,
}

impl std::fmt::Debug for EventQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventQueue")
            .field("task_id", &self.task_id)
            .field("proc_inst_id", &self.proc_inst_id)
            .finish_non_exhaustive()
    }
}

impl EventQueue {
    pub fn new(
        task_id: Uuid,
        proc_inst_id: String,
        store: Arc<dyn StoreAdapter>,
        coalescer: EventCoalescer,
    ) -> Self {
        Self {
            task_id,
            proc_inst_id,
            store,
            coalescer,
        }
    }

    /// Classifies and routes one executor event. Artifact saves run in the
    /// background (they are not part of the ordering guarantee the
    /// coalescer offers); status updates are awaited directly so that,
    /// within one producer, `enqueue` calls stay sequentially consistent
    /// relative to the coalescer.
    pub async fn enqueue(&self, event: ExecutorEvent) {
        match event {
            ExecutorEvent::ArtifactUpdate { r#final, artifact } => {
                let payload = extract_payload(artifact, None);
                let store = self.store.clone();
                let task_id = self.task_id;
                tokio::spawn(async move {
                    if let Err(error) = store.save_task_result(task_id, payload, r#final).await {
                        tracing::error!(%task_id, %error, "failed to save artifact result");
                    }
                });
            }
            ExecutorEvent::StatusUpdate {
                state,
                message,
                metadata,
            } => {
                let event_type = if state == INPUT_REQUIRED_STATE {
                    Some("human_asked".to_string())
                } else {
                    metadata.event_type
                };
                let record = PersistedEventRecord {
                    id: Uuid::now_v7(),
                    job_id: metadata.job_id,
                    todo_id: self.task_id,
                    proc_inst_id: self.proc_inst_id.clone(),
                    crew_type: metadata.crew_type,
                    event_type,
                    data: extract_payload(None, message),
                    status: metadata.status.filter(|s| !s.is_empty()),
                };
                self.coalescer.enqueue(record).await;
            }
        }
    }

    /// Emits the synthetic `crew_completed` sentinel after the executor
    /// returns successfully.
    pub async fn task_done(&self) {
        let record = PersistedEventRecord {
            id: Uuid::now_v7(),
            job_id: Some("CREW_FINISHED".to_string()),
            todo_id: self.task_id,
            proc_inst_id: self.proc_inst_id.clone(),
            crew_type: Some("crew".to_string()),
            event_type: Some("crew_completed".to_string()),
            data: serde_json::Value::Null,
            status: None,
        };
        self.coalescer.enqueue(record).await;
    }

    /// Releases any resources the queue holds. Currently a no-op beyond
    /// documenting the call site the cancellation watcher and the normal
    /// completion path both go through.
    pub fn stop(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    #[tokio::test]
    async fn status_update_with_input_required_overrides_event_type() {
        let store = Arc::new(InMemoryStore::default());
        let handle: Arc<dyn StoreAdapter> = store.clone();
        let coalescer = EventCoalescer::new(handle.clone(), 100, std::time::Duration::from_secs(60));
        let queue = EventQueue::new(Uuid::now_v7(), "P1".to_string(), handle, coalescer.clone());

        queue
            .enqueue(ExecutorEvent::StatusUpdate {
                state: "input-required".to_string(),
                message: None,
                metadata: StatusMetadata {
                    event_type: Some("anything".to_string()),
                    ..Default::default()
                },
            })
            .await;
        coalescer.flush().await;

        let recorded = store.recorded();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].event_type.as_deref(), Some("human_asked"));
    }

    #[tokio::test]
    async fn task_done_emits_crew_completed_sentinel() {
        let store = Arc::new(InMemoryStore::default());
        let handle: Arc<dyn StoreAdapter> = store.clone();
        let coalescer = EventCoalescer::new(handle.clone(), 100, std::time::Duration::from_secs(60));
        let queue = EventQueue::new(Uuid::now_v7(), "P1".to_string(), handle, coalescer.clone());

        queue.task_done().await;
        coalescer.flush().await;

        let recorded = store.recorded();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].job_id.as_deref(), Some("CREW_FINISHED"));
        assert_eq!(recorded[0].event_type.as_deref(), Some("crew_completed"));
        assert_eq!(recorded[0].crew_type.as_deref(), Some("crew"));
    }
}
