//! Postgres-backed `StoreAdapter`: a `PgPool` wrapped by a thin struct,
//! one `async fn` per RPC, `sqlx::query!`-style parameter binding.

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use dispatcher_shared::retry;

use crate::events::PersistedEventRecord;
use crate::types::{ClaimDescriptor, Task, TaskStatus};

use super::{FormDefinition, GroupedUsers, StoreAdapter, StoreError};

/// Migrator for the schema `PostgresStore` assumes. Used by
/// `#[sqlx::test(migrator = "...")]` in the `test-db`-gated
/// integration suite, and available for callers bootstrapping a fresh
/// database at deploy time.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!();

/// How many times a raw query is retried, and the base backoff delay,
/// before a lookup gives up and surfaces `StoreError` to the caller.
#[derive(Debug, Clone, Copy)]
pub struct PostgresRetryPolicy {
    pub attempts: u32,
    pub base_delay: std::time::Duration,
}

impl Default for PostgresRetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: std::time::Duration::from_millis(800),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
    policy: PostgresRetryPolicy,
}

impl PostgresStore {
    pub async fn connect(database_url: &str, policy: PostgresRetryPolicy) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self { pool, policy })
    }

    pub fn from_pool(pool: PgPool, policy: PostgresRetryPolicy) -> Self {
        Self { pool, policy }
    }

    async fn retried<T, F, Fut>(&self, name: &str, op: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, StoreError>>,
    {
        retry(op, name, self.policy.attempts, self.policy.base_delay, None)
            .await
            .ok_or_else(|| StoreError::invalid_row(format!("{name}: retries exhausted")))
    }
}

#[async_trait]
impl StoreAdapter for PostgresStore {
    async fn claim(&self, descriptor: &ClaimDescriptor) -> Result<Option<Task>, StoreError> {
        self.retried("claim", || async {
            let row = sqlx::query(
                r#"
                UPDATE todolist
                SET draft_status = 'in_progress', consumer = $2
                WHERE id = (
                    SELECT id FROM todolist
                    WHERE agent_orch = $1 AND draft_status = 'pending'
                    ORDER BY created_at
                    FOR UPDATE SKIP LOCKED
                    LIMIT 1
                )
                RETURNING id, proc_inst_id, root_proc_inst_id, tenant_id, activity_name,
                          tool, user_id, agent_orch, query, feedback, output, draft,
                          draft_status, consumer
                "#,
            )
            .bind(&descriptor.agent_orch)
            .bind(&descriptor.consumer)
            .fetch_optional(&self.pool)
            .await?;

            row.map(row_to_task).transpose()
        })
        .await
    }

    async fn fetch_status(&self, task_id: Uuid) -> Result<Option<String>, StoreError> {
        self.retried("fetch_status", || async {
            let row = sqlx::query("SELECT draft_status FROM todolist WHERE id = $1")
                .bind(task_id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row.map(|r| r.get::<String, _>("draft_status")))
        })
        .await
    }

    async fn fetch_notify_emails(&self, proc_inst_id: &str) -> Result<String, StoreError> {
        self.retried("fetch_notify_emails", || async {
            let rows = sqlx::query(
                r#"
                SELECT u.email FROM users u
                JOIN todolist t ON t.user_id LIKE '%' || u.id || '%'
                WHERE COALESCE(t.root_proc_inst_id, t.proc_inst_id) = $1 AND u.email IS NOT NULL
                "#,
            )
            .bind(proc_inst_id)
            .fetch_all(&self.pool)
            .await?;
            let emails: Vec<String> = rows.iter().map(|r| r.get::<String, _>("email")).collect();
            Ok(emails.join(","))
        })
        .await
    }

    async fn fetch_tenant_mcp(&self, tenant_id: &str) -> Result<Option<serde_json::Value>, StoreError> {
        self.retried("fetch_tenant_mcp", || async {
            let row = sqlx::query("SELECT mcp FROM tenants WHERE id = $1")
                .bind(tenant_id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row.map(|r| r.get::<serde_json::Value, _>("mcp")))
        })
        .await
    }

    async fn fetch_form_def(&self, tool: &str, tenant_id: &str) -> Result<FormDefinition, StoreError> {
        self.retried("fetch_form_def", || async {
            let stripped = tool.strip_prefix("formHandler:").unwrap_or(tool);
            let row = sqlx::query(
                "SELECT id, fields_json, html FROM form_def WHERE id = $1 AND tenant_id = $2",
            )
            .bind(stripped)
            .bind(tenant_id)
            .fetch_optional(&self.pool)
            .await?;

            Ok(match row {
                Some(r) => FormDefinition {
                    form_id: r.get::<String, _>("id"),
                    fields: r.get::<serde_json::Value, _>("fields_json"),
                    html: r.get::<Option<String>, _>("html"),
                },
                None => FormDefinition::freeform(),
            })
        })
        .await
    }

    async fn fetch_users_grouped(&self, user_ids: &[String]) -> Result<GroupedUsers, StoreError> {
        if user_ids.is_empty() {
            return Ok(GroupedUsers::default());
        }
        self.retried("fetch_users_grouped", || async {
            let rows = sqlx::query("SELECT id, is_agent FROM users WHERE id = ANY($1)")
                .bind(user_ids)
                .fetch_all(&self.pool)
                .await?;
            let mut grouped = GroupedUsers::default();
            for row in rows {
                let id: String = row.get("id");
                let is_agent: bool = row.get("is_agent");
                if is_agent {
                    grouped.agents.push(id);
                } else {
                    grouped.humans.push(id);
                }
            }
            Ok(grouped)
        })
        .await
    }

    async fn save_task_result(
        &self,
        task_id: Uuid,
        payload: serde_json::Value,
        r#final: bool,
    ) -> Result<(), StoreError> {
        self.retried("save_task_result", || async {
            let status = if r#final { "completed" } else { "in_progress" };
            sqlx::query("UPDATE todolist SET output = $2, draft_status = $3 WHERE id = $1")
                .bind(task_id)
                .bind(&payload)
                .bind(status)
                .execute(&self.pool)
                .await?;
            Ok(())
        })
        .await
    }

    async fn record_event(&self, record: PersistedEventRecord) -> Result<(), StoreError> {
        self.retried("record_event", || {
            let record = record.clone();
            async move {
                sqlx::query(
                    r#"
                    INSERT INTO events (id, job_id, todo_id, proc_inst_id, crew_type, event_type, data, status)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                    "#,
                )
                .bind(record.id)
                .bind(&record.job_id)
                .bind(record.todo_id)
                .bind(&record.proc_inst_id)
                .bind(&record.crew_type)
                .bind(&record.event_type)
                .bind(&record.data)
                .bind(&record.status)
                .execute(&self.pool)
                .await?;
                Ok(())
            }
        })
        .await
    }

    async fn record_events_bulk(&self, records: &[PersistedEventRecord]) -> Result<(), StoreError> {
        if records.is_empty() {
            return Ok(());
        }
        self.retried("record_events_bulk", || async {
            let mut tx = self.pool.begin().await?;
            for record in records {
                sqlx::query(
                    r#"
                    INSERT INTO events (id, job_id, todo_id, proc_inst_id, crew_type, event_type, data, status)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                    "#,
                )
                .bind(record.id)
                .bind(&record.job_id)
                .bind(record.todo_id)
                .bind(&record.proc_inst_id)
                .bind(&record.crew_type)
                .bind(&record.event_type)
                .bind(&record.data)
                .bind(&record.status)
                .execute(&mut *tx)
                .await?;
            }
            tx.commit().await?;
            Ok(())
        })
        .await
    }

    async fn mark_failed(&self, task_id: Uuid) -> Result<(), StoreError> {
        self.retried("mark_failed", || async {
            sqlx::query("UPDATE todolist SET draft_status = 'failed', consumer = NULL WHERE id = $1")
                .bind(task_id)
                .execute(&self.pool)
                .await?;
            Ok(())
        })
        .await
    }
}

fn row_to_task(row: sqlx::postgres::PgRow) -> Result<Task, StoreError> {
    let draft_status_raw: String = row.get("draft_status");
    let draft_status = TaskStatus::parse_loose(&draft_status_raw)
        .ok_or_else(|| StoreError::invalid_row(format!("unknown draft_status: {draft_status_raw}")))?;

    Ok(Task {
        id: row.get("id"),
        proc_inst_id: row.get("proc_inst_id"),
        root_proc_inst_id: row.get("root_proc_inst_id"),
        tenant_id: row.get("tenant_id"),
        activity_name: row.get("activity_name"),
        tool: row.get("tool"),
        user_id: row.get("user_id"),
        agent_orch: row.get("agent_orch"),
        query: row.get("query"),
        feedback: row.get("feedback"),
        output: normalize_empty_json(row.get("output")),
        draft: normalize_empty_json(row.get("draft")),
        draft_status,
        consumer: row.get("consumer"),
    })
}

/// Empty JSON containers in `output`/`draft` normalize to absent.
fn normalize_empty_json(value: Option<serde_json::Value>) -> Option<serde_json::Value> {
    value.filter(|v| {
        !matches!(v, serde_json::Value::Array(a) if a.is_empty())
            && !matches!(v, serde_json::Value::Object(o) if o.is_empty())
    })
}
