//! `mfe-gateway` entry point.

mod cli;

use clap::Parser;

use crate::cli::GatewayCli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries `query` output.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let code = GatewayCli::parse().run().await?;
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
