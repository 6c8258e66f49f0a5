//! CLI wiring for the dispatcher. No business logic lives here — this crate
//! parses arguments and environment, then hands off to `dispatcher_worker`
//! and `dispatcher_shared`, the way `tasker-ctl` wires `tasker-client` and
//! `tasker-shared` together behind a `clap` front door.

use std::sync::Arc;

use clap::{Parser, Subcommand};

use dispatcher_shared::config::WorkerConfig;
use dispatcher_worker::context::{ContextPreparer, PassthroughFeedbackSummarizer};
use dispatcher_worker::error_summarizer::NoopErrorSummarizer;
use dispatcher_worker::store::postgres::{PostgresRetryPolicy, PostgresStore, MIGRATOR};
use dispatcher_worker::{Executor, StoreAdapter, WorkerServer};

#[derive(Debug, Parser)]
#[command(name = "dispatcher-core", version, about = "Agent task dispatcher")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Runs the claim–execute–finalize loop until a shutdown signal arrives.
    /// Configuration is read entirely from the environment; see
    /// `dispatcher_shared::config::WorkerConfig::from_env`.
    Run,
    /// Applies the schema `PostgresStore` assumes to the database at
    /// `--database-url`.
    Migrate {
        #[arg(long, env = "DATABASE_URL")]
        database_url: String,
    },
}

/// Loads a `.env` file if one is present (ignored if absent — production
/// deployments set the environment directly) and installs the shared
/// tracing subscriber.
pub fn bootstrap() {
    let _ = dotenvy::dotenv();
    dispatcher_shared::logging::init();
}

pub async fn dispatch(cli: Cli) -> Result<(), anyhow::Error> {
    match cli.command {
        Command::Run => run().await,
        Command::Migrate { database_url } => migrate(&database_url).await,
    }
}

async fn run() -> Result<(), anyhow::Error> {
    let config = WorkerConfig::from_env()?;
    let policy = PostgresRetryPolicy {
        attempts: config.retry.attempts,
        base_delay: config.retry.base_delay(),
    };
    let store = Arc::new(PostgresStore::connect(&config.database_url, policy).await?);
    let store: Arc<dyn StoreAdapter> = store;

    let context_preparer = ContextPreparer::new(store.clone(), Arc::new(PassthroughFeedbackSummarizer));
    let executor: Arc<dyn Executor> = load_executor()?;

    let server = WorkerServer::new(store, config, context_preparer, executor, Arc::new(NoopErrorSummarizer));
    server.run().await;
    Ok(())
}

async fn migrate(database_url: &str) -> Result<(), anyhow::Error> {
    let pool = sqlx::PgPool::connect(database_url).await?;
    MIGRATOR.run(&pool).await?;
    tracing::info!("migrations applied");
    Ok(())
}

/// Executor wiring is deployment-specific: the executor is an external
/// collaborator the worker drives but never constructs. This binary
/// exists to prove the CLI, config, and store wiring compile and run; a
/// real deployment links a concrete `Executor` in before shipping.
fn load_executor() -> Result<Arc<dyn Executor>, anyhow::Error> {
    Err(anyhow::anyhow!(
        "no Executor implementation registered; link one in before deploying this binary"
    ))
}
