//! GenSX checkpoint CLI entry point.
//!
//! Binary name: `gensx`
//!
//! Parses CLI arguments, initializes tracing and the local checkpoint
//! store, then dispatches to the command handler.

mod cli;
mod state;

use anyhow::anyhow;
use clap::Parser;
use clap_complete::generate;

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    gensx_observe::tracing_setup::init_tracing(cli.log_filter(), cli.otel)
        .map_err(|e| anyhow!("failed to initialize tracing: {e}"))?;

    let result = run(cli).await;
    gensx_observe::tracing_setup::shutdown_tracing();
    result
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    // Shell completions don't need app state
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "gensx", &mut std::io::stdout());
        return Ok(());
    }

    let state = AppState::init().await?;
    tracing::debug!(
        data_dir = %state.data_dir.display(),
        sink = %state.config.checkpoints.sink,
        checkpoints_enabled = state.config.checkpoints.enabled,
        "configuration loaded"
    );

    let outcome = match cli.command {
        Commands::Checkpoints { action } => {
            cli::checkpoint::handle_checkpoint_command(action, &state.checkpoints, cli.json, cli.quiet)
                .await
        }
        Commands::Completions { .. } => unreachable!("handled above"),
    };

    // Close connections before exit
    state.db_pool.writer.close().await;
    state.db_pool.reader.close().await;
    outcome
}
