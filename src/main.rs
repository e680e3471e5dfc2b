//! Main entry point for the match-harvester CLI

use clap::Parser;
use match_harvester::cli::harvest::execute_harvest;
use match_harvester::cli::{Cli, Commands};
use match_harvester::harvest::StageKind;
use match_harvester::shutdown::{self, SharedShutdown, ShutdownCoordinator};
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Initialize tracing; `LOG_FORMAT=json` switches to JSON lines. Logs go to stderr so stdout
/// carries only command output.
fn init_tracing() {
    let json_format = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("match_harvester=info"));

    if json_format {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();

    let shutdown = ShutdownCoordinator::shared();
    shutdown::install_ctrl_c_handler(shutdown.clone());

    if let Err(e) = dispatch(&cli, shutdown).await {
        error!("Command failed: {:#}", e);
        std::process::exit(1);
    }
}

async fn dispatch(cli: &Cli, shutdown: SharedShutdown) -> anyhow::Result<()> {
    match &cli.command {
        Commands::Run { reindex } => {
            execute_harvest(cli, &StageKind::ALL, *reindex, shutdown).await?
        }
        Commands::Identities => {
            execute_harvest(cli, &[StageKind::Identities], false, shutdown).await?
        }
        Commands::MatchIds { reindex } => {
            execute_harvest(cli, &[StageKind::MatchIds], *reindex, shutdown).await?
        }
        Commands::MatchDetails => {
            execute_harvest(cli, &[StageKind::MatchDetails], false, shutdown).await?
        }
        Commands::Verify(verify) => verify.execute(cli)?,
        Commands::Export(export) => export.execute(cli)?,
    }
    Ok(())
}
