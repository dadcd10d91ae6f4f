use anyhow::Result;
use clap::Parser;

use signalpost_daemon::cli::CollectorCli;
use signalpost_daemon::logging;
use signalpost_daemon::orchestrator::Orchestrator;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = CollectorCli::parse();

    // Logging must come up before anything else; the level/format are
    // read straight from the config file since the core is not built yet.
    let settings = logging::settings_from_config_file(cli.config.as_deref());
    logging::init_tracing(&settings)?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "signalpost starting");

    let orchestrator = Orchestrator::build(&cli).await?;
    orchestrator.run().await?;

    tracing::info!("signalpost shut down cleanly");
    Ok(())
}
