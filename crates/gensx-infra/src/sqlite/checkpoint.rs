//! SQLite checkpoint store.
//!
//! Implements both `CheckpointSink` (write side, called by the checkpoint
//! manager) and `CheckpointRepository` (read side, used by the CLI and to
//! fetch replay input) from `gensx-core`. One row per execution holds the
//! newest snapshot; the tree is stored as a JSON blob.

use chrono::{DateTime, SecondsFormat, Utc};
use gensx_core::checkpoint::CheckpointSink;
use gensx_core::repository::CheckpointRepository;
use gensx_types::checkpoint::{CheckpointSnapshot, CheckpointSummary};
use gensx_types::error::{RepositoryError, SinkError};
use gensx_types::node::{ExecutionNode, ExecutionStatus};
use sqlx::Row;
use uuid::Uuid;

use super::pool::DatabasePool;

/// SQLite-backed checkpoint store.
#[derive(Debug, Clone)]
pub struct SqliteCheckpointStore {
    pool: DatabasePool,
}

impl SqliteCheckpointStore {
    /// Create a new store backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// Upsert `snapshot` unless a snapshot with an equal or higher sequence
    /// is already stored for the execution.
    ///
    /// Returns `true` when the row was written.
    pub async fn save(&self, snapshot: &CheckpointSnapshot) -> Result<bool, RepositoryError> {
        let tree = serde_json::to_string(&snapshot.tree)
            .map_err(|e| RepositoryError::Query(format!("serialize tree: {e}")))?;
        let sequence = i64::try_from(snapshot.sequence)
            .map_err(|_| RepositoryError::Query(format!("sequence out of range: {}", snapshot.sequence)))?;
        let node_count = i64::try_from(snapshot.node_count()).unwrap_or(i64::MAX);
        let captured_at = format_datetime(&snapshot.created_at);

        let result = sqlx::query(
            r#"INSERT INTO checkpoints
                 (execution_id, workflow_name, sequence, status, node_count, tree, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(execution_id) DO UPDATE SET
                 workflow_name = excluded.workflow_name,
                 sequence = excluded.sequence,
                 status = excluded.status,
                 node_count = excluded.node_count,
                 tree = excluded.tree,
                 updated_at = excluded.updated_at
               WHERE excluded.sequence > checkpoints.sequence"#,
        )
        .bind(snapshot.execution_id.to_string())
        .bind(&snapshot.workflow_name)
        .bind(sequence)
        .bind(snapshot.status().to_string())
        .bind(node_count)
        .bind(&tree)
        .bind(&captured_at)
        .bind(&captured_at)
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }
}

// ---------------------------------------------------------------------------
// Internal row types
// ---------------------------------------------------------------------------

struct SnapshotRow {
    execution_id: String,
    workflow_name: String,
    sequence: i64,
    tree: String,
    updated_at: String,
}

impl SnapshotRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            execution_id: row.try_get("execution_id")?,
            workflow_name: row.try_get("workflow_name")?,
            sequence: row.try_get("sequence")?,
            tree: row.try_get("tree")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_snapshot(self) -> Result<CheckpointSnapshot, RepositoryError> {
        let tree: ExecutionNode = serde_json::from_str(&self.tree)
            .map_err(|e| RepositoryError::Query(format!("invalid checkpoint tree JSON: {e}")))?;

        Ok(CheckpointSnapshot {
            execution_id: parse_uuid(&self.execution_id)?,
            workflow_name: self.workflow_name,
            sequence: parse_sequence(self.sequence)?,
            created_at: parse_datetime(&self.updated_at)?,
            tree,
        })
    }
}

struct SummaryRow {
    execution_id: String,
    workflow_name: String,
    sequence: i64,
    status: String,
    node_count: i64,
    updated_at: String,
}

impl SummaryRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            execution_id: row.try_get("execution_id")?,
            workflow_name: row.try_get("workflow_name")?,
            sequence: row.try_get("sequence")?,
            status: row.try_get("status")?,
            node_count: row.try_get("node_count")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_summary(self) -> Result<CheckpointSummary, RepositoryError> {
        let status: ExecutionStatus = self
            .status
            .parse()
            .map_err(|_| RepositoryError::Query(format!("invalid status: {}", self.status)))?;

        Ok(CheckpointSummary {
            execution_id: parse_uuid(&self.execution_id)?,
            workflow_name: self.workflow_name,
            sequence: parse_sequence(self.sequence)?,
            status,
            node_count: u64::try_from(self.node_count).unwrap_or(0),
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

fn parse_uuid(s: &str) -> Result<Uuid, RepositoryError> {
    s.parse::<Uuid>()
        .map_err(|e| RepositoryError::Query(format!("invalid UUID: {e}")))
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

fn parse_sequence(value: i64) -> Result<u64, RepositoryError> {
    u64::try_from(value).map_err(|_| RepositoryError::Query(format!("invalid sequence: {value}")))
}

/// Fixed-width, full-precision timestamps: `ORDER BY updated_at` sorts
/// chronologically and a stored snapshot reads back unchanged.
fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

// ---------------------------------------------------------------------------
// Ports
// ---------------------------------------------------------------------------

impl CheckpointSink for SqliteCheckpointStore {
    async fn send(&self, snapshot: &CheckpointSnapshot) -> Result<(), SinkError> {
        let written = self.save(snapshot).await?;
        if !written {
            tracing::debug!(
                execution_id = %snapshot.execution_id,
                sequence = snapshot.sequence,
                "stale checkpoint ignored"
            );
        }
        Ok(())
    }
}

impl CheckpointRepository for SqliteCheckpointStore {
    async fn get_checkpoint(
        &self,
        execution_id: &Uuid,
    ) -> Result<Option<CheckpointSnapshot>, RepositoryError> {
        let row = sqlx::query(
            "SELECT execution_id, workflow_name, sequence, tree, updated_at FROM checkpoints WHERE execution_id = ?",
        )
        .bind(execution_id.to_string())
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        match row {
            Some(row) => {
                let r = SnapshotRow::from_row(&row)
                    .map_err(|e| RepositoryError::Query(e.to_string()))?;
                Ok(Some(r.into_snapshot()?))
            }
            None => Ok(None),
        }
    }

    async fn latest_for_workflow(
        &self,
        workflow_name: &str,
    ) -> Result<Option<CheckpointSnapshot>, RepositoryError> {
        let row = sqlx::query(
            r#"SELECT execution_id, workflow_name, sequence, tree, updated_at
               FROM checkpoints
               WHERE workflow_name = ?
               ORDER BY updated_at DESC, rowid DESC
               LIMIT 1"#,
        )
        .bind(workflow_name)
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        match row {
            Some(row) => {
                let r = SnapshotRow::from_row(&row)
                    .map_err(|e| RepositoryError::Query(e.to_string()))?;
                Ok(Some(r.into_snapshot()?))
            }
            None => Ok(None),
        }
    }

    async fn list_checkpoints(
        &self,
        workflow_name: Option<&str>,
        limit: u32,
    ) -> Result<Vec<CheckpointSummary>, RepositoryError> {
        let rows = sqlx::query(
            r#"SELECT execution_id, workflow_name, sequence, status, node_count, updated_at
               FROM checkpoints
               WHERE (? IS NULL OR workflow_name = ?)
               ORDER BY updated_at DESC, rowid DESC
               LIMIT ?"#,
        )
        .bind(workflow_name)
        .bind(workflow_name)
        .bind(i64::from(limit))
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        rows.iter()
            .map(|row| {
                SummaryRow::from_row(row)
                    .map_err(|e| RepositoryError::Query(e.to_string()))?
                    .into_summary()
            })
            .collect()
    }

    async fn delete_checkpoint(&self, execution_id: &Uuid) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM checkpoints WHERE execution_id = ?")
            .bind(execution_id.to_string())
            .execute(&self.pool.writer)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }
}
