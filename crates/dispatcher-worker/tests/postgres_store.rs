//! Integration tests for `PostgresStore` against a real, migrated scratch
//! database. Grounded on `tasker-orchestration/tests/services/
//! decision_point_tests.rs`'s `#[sqlx::test(migrator = ...)]` pattern:
//! `sqlx::test` spins up and migrates a throwaway database per test, so
//! these need no manual setup/teardown beyond a reachable `DATABASE_URL`.
//!
//! Run with `cargo test -p dispatcher-worker --features test-db`.

#![cfg(feature = "test-db")]

use sqlx::PgPool;
use uuid::Uuid;

use dispatcher_worker::store::postgres::{PostgresRetryPolicy, PostgresStore};
use dispatcher_worker::types::{ClaimDescriptor, TaskStatus};
use dispatcher_worker::{FormDefinition, StoreAdapter};
use dispatcher_shared::config::Environment;

fn store(pool: PgPool) -> PostgresStore {
    PostgresStore::from_pool(pool, PostgresRetryPolicy::default())
}

async fn seed_task(pool: &PgPool, agent_orch: &str) -> Uuid {
    let id = Uuid::now_v7();
    sqlx::query(
        "INSERT INTO todolist (id, proc_inst_id, tenant_id, agent_orch, query, draft_status) \
         VALUES ($1, 'P1', 'tenant-x', $2, 'hello', 'pending')",
    )
    .bind(id)
    .bind(agent_orch)
    .execute(pool)
    .await
    .unwrap();
    id
}

#[sqlx::test(migrator = "dispatcher_worker::store::postgres::MIGRATOR")]
async fn claim_stamps_consumer_and_transitions_to_in_progress(pool: PgPool) {
    let task_id = seed_task(&pool, "pool-a").await;
    let store = store(pool.clone());

    let claimed = store
        .claim(&ClaimDescriptor {
            agent_orch: "pool-a".to_string(),
            consumer: "worker-1".to_string(),
            env: Environment::Dev,
        })
        .await
        .unwrap()
        .expect("a pending task should be claimed");

    assert_eq!(claimed.id, task_id);
    assert_eq!(claimed.consumer.as_deref(), Some("worker-1"));
    assert_eq!(claimed.draft_status, TaskStatus::InProgress);
}

#[sqlx::test(migrator = "dispatcher_worker::store::postgres::MIGRATOR")]
async fn claim_is_single_delivery_across_concurrent_callers(pool: PgPool) {
    seed_task(&pool, "pool-a").await;
    let store_a = store(pool.clone());
    let store_b = store(pool.clone());

    let descriptor = |consumer: &str| ClaimDescriptor {
        agent_orch: "pool-a".to_string(),
        consumer: consumer.to_string(),
        env: Environment::Dev,
    };

    let (first, second) = tokio::join!(store_a.claim(&descriptor("worker-1")), store_b.claim(&descriptor("worker-2")));

    let claims: Vec<_> = [first.unwrap(), second.unwrap()].into_iter().flatten().collect();
    assert_eq!(claims.len(), 1, "the pending row must be claimed by exactly one caller");
}

#[sqlx::test(migrator = "dispatcher_worker::store::postgres::MIGRATOR")]
async fn claim_on_an_empty_queue_returns_none(pool: PgPool) {
    let store = store(pool);
    let claimed = store
        .claim(&ClaimDescriptor {
            agent_orch: "pool-a".to_string(),
            consumer: "worker-1".to_string(),
            env: Environment::Dev,
        })
        .await
        .unwrap();
    assert!(claimed.is_none());
}

#[sqlx::test(migrator = "dispatcher_worker::store::postgres::MIGRATOR")]
async fn save_task_result_with_final_transitions_to_completed(pool: PgPool) {
    let task_id = seed_task(&pool, "pool-a").await;
    let store = store(pool.clone());

    store
        .save_task_result(task_id, serde_json::json!({"ok": true}), true)
        .await
        .unwrap();

    let status = store.fetch_status(task_id).await.unwrap();
    assert_eq!(status.as_deref(), Some("completed"));
}

#[sqlx::test(migrator = "dispatcher_worker::store::postgres::MIGRATOR")]
async fn mark_failed_clears_consumer_and_sets_status(pool: PgPool) {
    let task_id = seed_task(&pool, "pool-a").await;
    let store = store(pool.clone());
    store
        .claim(&ClaimDescriptor {
            agent_orch: "pool-a".to_string(),
            consumer: "worker-1".to_string(),
            env: Environment::Dev,
        })
        .await
        .unwrap();

    store.mark_failed(task_id).await.unwrap();

    let row: (String, Option<String>) =
        sqlx::query_as("SELECT draft_status, consumer FROM todolist WHERE id = $1")
            .bind(task_id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(row.0, "failed");
    assert!(row.1.is_none());
}

#[sqlx::test(migrator = "dispatcher_worker::store::postgres::MIGRATOR")]
async fn fetch_form_def_falls_back_to_freeform_when_missing(pool: PgPool) {
    let store = store(pool);
    let form = store.fetch_form_def("formHandler:unknown", "tenant-x").await.unwrap();
    assert_eq!(form, FormDefinition::freeform());
}

#[sqlx::test(migrator = "dispatcher_worker::store::postgres::MIGRATOR")]
async fn fetch_form_def_strips_the_form_handler_prefix(pool: PgPool) {
    sqlx::query("INSERT INTO form_def (id, tenant_id, fields_json, html) VALUES ($1, $2, $3, $4)")
        .bind("survey")
        .bind("tenant-x")
        .bind(serde_json::json!([{"key": "rating", "type": "number"}]))
        .bind(Option::<String>::None)
        .execute(&pool)
        .await
        .unwrap();

    let store = store(pool);
    let form = store.fetch_form_def("formHandler:survey", "tenant-x").await.unwrap();
    assert_eq!(form.form_id, "survey");
}

#[sqlx::test(migrator = "dispatcher_worker::store::postgres::MIGRATOR")]
async fn record_events_bulk_writes_every_record_in_one_transaction(pool: PgPool) {
    let task_id = seed_task(&pool, "pool-a").await;
    let store = store(pool.clone());

    let records = vec![
        dispatcher_worker::events::PersistedEventRecord {
            id: Uuid::now_v7(),
            job_id: Some("J1".to_string()),
            todo_id: task_id,
            proc_inst_id: "P1".to_string(),
            crew_type: Some("crew".to_string()),
            event_type: Some("progress".to_string()),
            data: serde_json::json!({"pct": 50}),
            status: None,
        },
        dispatcher_worker::events::PersistedEventRecord {
            id: Uuid::now_v7(),
            job_id: Some("CREW_FINISHED".to_string()),
            todo_id: task_id,
            proc_inst_id: "P1".to_string(),
            crew_type: Some("crew".to_string()),
            event_type: Some("crew_completed".to_string()),
            data: serde_json::Value::Null,
            status: None,
        },
    ];

    store.record_events_bulk(&records).await.unwrap();

    let count: i64 = sqlx::query_scalar("SELECT count(*) FROM events WHERE todo_id = $1")
        .bind(task_id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 2);
}
