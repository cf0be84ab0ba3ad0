use clap::Parser;
use relaycache::{config, server};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = config::Cli::parse();
    let cfg = config::load(&cli)?;

    server::run(cfg).await
}
