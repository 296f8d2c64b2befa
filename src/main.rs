use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use ssh_orch::cli::{Cli, run_document};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // stdout carries the report, logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    // Commands run sequentially on one thread
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    let report = runtime
        .block_on(run_document(&cli))
        .with_context(|| format!("Failed to run {}", cli.document.display()))?;

    if !report.is_success() {
        bail!("{} command(s) failed", report.failures.len());
    }

    Ok(())
}
