use clap::Parser;
use nft_ledger_pipeline::orchestrator::{self, Cli};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    if let Err(e) = orchestrator::run(cli).await {
        tracing::error!(error = %e, "command failed");
        std::process::exit(1);
    }
    Ok(())
}
