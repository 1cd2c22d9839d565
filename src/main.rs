//! Libris - a developer-first library catalog service

use clap::Parser;
use libris::{Result, Server, ServerArgs, ServerConfig};
use std::process::ExitCode;
use tracing::warn;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn main() -> ExitCode {
    if let Err(e) = run() {
        eprintln!("libris failed to start: {e}");
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

#[tokio::main]
async fn run() -> Result<()> {
    let args = ServerArgs::parse();
    let config = ServerConfig::from_args(&args)?;

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    if config.uses_default_secret() {
        warn!("using the built-in development JWT secret; set LIBRIS_JWT_SECRET in production");
    }

    Server::new(config).run().await
}
