//! CLI command definitions for the `gensx` binary.
//!
//! Uses clap derive macros for argument parsing. Commands follow a
//! noun-verb pattern (e.g., `gensx checkpoints list`).

pub mod checkpoint;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

/// Inspect and manage GenSX workflow checkpoints.
#[derive(Parser)]
#[command(name = "gensx", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Export tracing spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true, env = "GENSX_OTEL")]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Stored checkpoints (list, show, export, delete).
    #[command(alias = "cp")]
    Checkpoints {
        #[command(subcommand)]
        action: checkpoint::CheckpointCommand,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

impl Cli {
    /// Default log filter for the chosen verbosity.
    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 if self.quiet => "error",
            0 => "warn",
            1 => "info,gensx_core=debug,gensx_infra=debug",
            _ => "trace",
        }
    }
}
