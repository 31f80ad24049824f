//! cvm-inventory - Ansible dynamic inventory script for TencentCloud CVM
//!
//! Prints exactly one JSON document on stdout. Logs go to stderr.

use anyhow::{Context, Result};
use cvm_inventory::cli::Cli;
use cvm_inventory::config::Settings;
use cvm_inventory::directory::LazySnapshotDirectory;
use cvm_inventory::query::InventoryQuery;
use std::io::Write;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    let output = match run(&cli).await {
        Ok(output) => output,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(e.exit_code());
        }
    };

    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{output}").context("failed to write inventory")?;
    Ok(())
}

async fn run(cli: &Cli) -> cvm_inventory::Result<String> {
    let settings = Settings::load(cli.config.as_deref())?;

    // read only if the cache cannot answer
    let snapshot = cli.snapshot.clone().or_else(|| settings.snapshot_path.clone());
    let directory = LazySnapshotDirectory::new(snapshot);

    let mut query = InventoryQuery::new(&settings, &directory);
    query.run(&cli.request(), cli.refresh_cache).await
}

/// Initialize logging based on verbosity level
fn init_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(verbosity >= 3),
        )
        .with(env_filter)
        .init();
}
