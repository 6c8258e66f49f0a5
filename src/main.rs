use clap::Parser;
use dispatcher_core::Cli;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    dispatcher_core::bootstrap();
    dispatcher_core::dispatch(Cli::parse()).await
}
