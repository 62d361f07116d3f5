//! Checkpoint CLI subcommands.
//!
//! Lists, shows, exports and deletes checkpoints held by a
//! [`CheckpointRepository`]. An exported tree can be handed back to the
//! runtime as replay input.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Subcommand;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use uuid::Uuid;

use gensx_core::repository::CheckpointRepository;
use gensx_types::checkpoint::{CheckpointSnapshot, CheckpointSummary};
use gensx_types::node::{ExecutionNode, ExecutionStatus};

/// Checkpoint subcommands.
#[derive(Subcommand)]
pub enum CheckpointCommand {
    /// List stored checkpoints, newest first.
    #[command(alias = "ls")]
    List {
        /// Only checkpoints of this workflow.
        #[arg(long, short)]
        workflow: Option<String>,

        /// Maximum number of rows.
        #[arg(long, short, default_value = "20")]
        limit: u32,
    },

    /// Show the execution tree of a checkpoint.
    Show {
        /// Execution ID.
        execution_id: Uuid,
    },

    /// Write the execution tree as JSON (usable as replay input).
    Export {
        /// Execution ID.
        execution_id: Uuid,

        /// Output file (defaults to stdout).
        #[arg(long, short)]
        out: Option<PathBuf>,
    },

    /// Delete a checkpoint.
    #[command(alias = "rm")]
    Delete {
        /// Execution ID.
        execution_id: Uuid,
    },
}

/// Handle a checkpoint subcommand.
pub async fn handle_checkpoint_command<R: CheckpointRepository>(
    cmd: CheckpointCommand,
    repo: &R,
    json: bool,
    quiet: bool,
) -> Result<()> {
    match cmd {
        CheckpointCommand::List { workflow, limit } => {
            list_checkpoints(repo, workflow.as_deref(), limit, json).await
        }
        CheckpointCommand::Show { execution_id } => show_checkpoint(repo, &execution_id, json).await,
        CheckpointCommand::Export { execution_id, out } => {
            export_checkpoint(repo, &execution_id, out.as_deref(), quiet).await
        }
        CheckpointCommand::Delete { execution_id } => {
            delete_checkpoint(repo, &execution_id, json, quiet).await
        }
    }
}

async fn load<R: CheckpointRepository>(repo: &R, execution_id: &Uuid) -> Result<CheckpointSnapshot> {
    repo.get_checkpoint(execution_id)
        .await
        .context("Failed to load checkpoint")?
        .with_context(|| format!("No checkpoint for execution '{execution_id}'"))
}

/// List checkpoints in a table.
async fn list_checkpoints<R: CheckpointRepository>(
    repo: &R,
    workflow: Option<&str>,
    limit: u32,
    json: bool,
) -> Result<()> {
    let summaries = repo
        .list_checkpoints(workflow, limit)
        .await
        .context("Failed to list checkpoints")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
        return Ok(());
    }

    if summaries.is_empty() {
        println!();
        match workflow {
            Some(name) => println!(
                "  {} No checkpoints for workflow '{}'.",
                style("i").blue().bold(),
                style(name).cyan(),
            ),
            None => println!("  {} No checkpoints stored yet.", style("i").blue().bold()),
        }
        println!();
        return Ok(());
    }

    println!();
    println!("{}", summary_table(&summaries));
    println!();
    Ok(())
}

fn summary_table(summaries: &[CheckpointSummary]) -> Table {
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec![
        Cell::new("Execution").fg(Color::White),
        Cell::new("Workflow").fg(Color::White),
        Cell::new("Status").fg(Color::White),
        Cell::new("Nodes").fg(Color::White),
        Cell::new("Seq").fg(Color::White),
        Cell::new("Updated").fg(Color::White),
    ]);

    for summary in summaries {
        table.add_row(vec![
            Cell::new(summary.execution_id).fg(Color::DarkGrey),
            Cell::new(&summary.workflow_name).fg(Color::Cyan),
            Cell::new(summary.status).fg(status_color(summary.status)),
            Cell::new(summary.node_count),
            Cell::new(summary.sequence),
            Cell::new(format_timestamp(&summary.updated_at)).fg(Color::DarkGrey),
        ]);
    }
    table
}

/// Print the execution tree with status marks and durations.
async fn show_checkpoint<R: CheckpointRepository>(repo: &R, execution_id: &Uuid, json: bool) -> Result<()> {
    let snapshot = load(repo, execution_id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} {} ({} nodes, sequence {}, updated {})",
        style("Workflow").bold(),
        style(&snapshot.workflow_name).cyan().bold(),
        snapshot.node_count(),
        snapshot.sequence,
        format_timestamp(&snapshot.created_at),
    );
    println!();
    for (status, line) in tree_lines(&snapshot.tree) {
        let line = match status {
            ExecutionStatus::Completed => style(line).green(),
            ExecutionStatus::Failed => style(line).red(),
            ExecutionStatus::Running => style(line).yellow(),
        };
        println!("  {line}");
    }
    println!();
    Ok(())
}

async fn export_checkpoint<R: CheckpointRepository>(
    repo: &R,
    execution_id: &Uuid,
    out: Option<&Path>,
    quiet: bool,
) -> Result<()> {
    let snapshot = load(repo, execution_id).await?;
    let body = serde_json::to_string_pretty(&snapshot.tree)?;

    match out {
        Some(path) => {
            tokio::fs::write(path, &body)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            if !quiet {
                println!(
                    "  {} Exported {} to {}",
                    style("ok").green(),
                    style(execution_id).cyan(),
                    style(path.display()).cyan(),
                );
            }
        }
        None => println!("{body}"),
    }
    Ok(())
}

async fn delete_checkpoint<R: CheckpointRepository>(
    repo: &R,
    execution_id: &Uuid,
    json: bool,
    quiet: bool,
) -> Result<()> {
    let deleted = repo
        .delete_checkpoint(execution_id)
        .await
        .context("Failed to delete checkpoint")?;

    if json {
        let result = serde_json::json!({
            "execution_id": execution_id,
            "deleted": deleted,
        });
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else if !deleted {
        anyhow::bail!("No checkpoint for execution '{execution_id}'");
    } else if !quiet {
        println!(
            "  {} Deleted checkpoint {}",
            style("ok").green(),
            style(execution_id).cyan(),
        );
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Rendering helpers
// ---------------------------------------------------------------------------

fn status_mark(status: ExecutionStatus) -> &'static str {
    match status {
        ExecutionStatus::Completed => "✓",
        ExecutionStatus::Failed => "✗",
        ExecutionStatus::Running => "…",
    }
}

fn status_color(status: ExecutionStatus) -> Color {
    match status {
        ExecutionStatus::Completed => Color::Green,
        ExecutionStatus::Failed => Color::Red,
        ExecutionStatus::Running => Color::Yellow,
    }
}

fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S").to_string()
}

fn node_label(node: &ExecutionNode) -> String {
    let status = node.status();
    let timing = match node.duration_ms() {
        Some(ms) => format!("{ms} ms"),
        None => "running".to_string(),
    };
    let mut label = format!("{} {} ({timing})", status_mark(status), node.component_name);
    if let Some(error) = &node.error {
        label.push_str(": ");
        label.push_str(error);
    }
    label
}

/// One line per node, drawn with box connectors, paired with its status.
pub fn tree_lines(root: &ExecutionNode) -> Vec<(ExecutionStatus, String)> {
    let mut lines = vec![(root.status(), node_label(root))];
    push_children(root, "", &mut lines);
    lines
}

fn push_children(node: &ExecutionNode, prefix: &str, lines: &mut Vec<(ExecutionStatus, String)>) {
    let count = node.children.len();
    for (i, child) in node.children.iter().enumerate() {
        let last = i + 1 == count;
        let connector = if last { "└─ " } else { "├─ " };
        lines.push((child.status(), format!("{prefix}{connector}{}", node_label(child))));
        let nested = format!("{prefix}{}", if last { "   " } else { "│  " });
        push_children(child, &nested, lines);
    }
}
