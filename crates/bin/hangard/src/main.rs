use std::sync::Arc;

use clap::Parser as _;
use common::{BoxError, config::Config};

mod server;

#[derive(Debug, clap::Parser)]
struct Args {
    /// The configuration file to use. Defines the repository root directory
    /// and the Flight listen address.
    #[arg(long, env = "HANGARD_CONFIG")]
    config: Option<String>,

    /// Overrides the repository root directory from the config file.
    #[arg(long, env = "HANGARD_REPOSITORY")]
    repository: Option<String>,
}

#[tokio::main]
async fn main() {
    match main_inner().await {
        Ok(()) => {}
        Err(e) => {
            // Manually print the error so we can control the format.
            eprintln!("Exiting with error: {e}");
            std::process::exit(1);
        }
    }
}

async fn main_inner() -> Result<(), BoxError> {
    let Args { config, repository } = Args::parse();

    init_logging();

    let config = Arc::new(Config::load(config, repository)?);
    tracing::info!(
        "repository root is {}",
        config.repository.root().display()
    );

    let (addr, server) = server::run(config).await?;
    tracing::info!("Serving Arrow Flight RPC at {addr}");
    server.await
}

fn init_logging() {
    use std::io::IsTerminal as _;

    use tracing_subscriber::EnvFilter;

    let env_filter =
        EnvFilter::try_from_env("HANGARD_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .init();
}
