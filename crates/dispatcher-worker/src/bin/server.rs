//! Standalone entrypoint for running `dispatcher-worker` against Postgres:
//! init logging, bootstrap the system, log a short banner, then run until
//! a shutdown signal.

use std::sync::Arc;

use dispatcher_shared::config::WorkerConfig;
use dispatcher_worker::context::{ContextPreparer, PassthroughFeedbackSummarizer};
use dispatcher_worker::error_summarizer::NoopErrorSummarizer;
use dispatcher_worker::server::WorkerServer;
use dispatcher_worker::store::postgres::{PostgresRetryPolicy, PostgresStore};
use dispatcher_worker::Executor;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dispatcher_shared::logging::init();

    info_banner();

    let config = WorkerConfig::from_env()?;
    let policy = PostgresRetryPolicy {
        attempts: config.retry.attempts,
        base_delay: config.retry.base_delay(),
    };
    let store = Arc::new(PostgresStore::connect(&config.database_url, policy).await?);
    let store_handle: Arc<dyn dispatcher_worker::StoreAdapter> = store;

    let context_preparer = ContextPreparer::new(store_handle.clone(), Arc::new(PassthroughFeedbackSummarizer));

    let executor: Arc<dyn Executor> = load_executor()?;

    let server = WorkerServer::new(
        store_handle,
        config,
        context_preparer,
        executor,
        Arc::new(NoopErrorSummarizer),
    );

    server.run().await;

    Ok(())
}

fn info_banner() {
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "dispatcher-worker starting"
    );
}

/// Executor loading is deployment-specific (tool/plugin loaders) — this
/// binary exists to prove the wiring compiles and runs, not to ship a
/// concrete business executor.
fn load_executor() -> Result<Arc<dyn Executor>, Box<dyn std::error::Error>> {
    Err("no Executor implementation registered; link one in before deploying this binary".into())
}
