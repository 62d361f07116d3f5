//! Checkpoint repository trait definition.
//!
//! Read and maintenance side of persisted checkpoints. Writing goes through
//! [`CheckpointSink`](crate::checkpoint::CheckpointSink); a store usually
//! implements both.

use gensx_types::checkpoint::{CheckpointSnapshot, CheckpointSummary};
use gensx_types::error::RepositoryError;
use uuid::Uuid;

/// Repository trait for stored checkpoints, one per execution.
///
/// Uses native async fn in traits (Rust 2024 edition, no async_trait macro).
pub trait CheckpointRepository: Send + Sync {
    /// Latest snapshot of an execution.
    fn get_checkpoint(
        &self,
        execution_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<CheckpointSnapshot>, RepositoryError>> + Send;

    /// Most recently updated snapshot for a workflow name, if any. This is
    /// the usual source of a replay checkpoint.
    fn latest_for_workflow(
        &self,
        workflow_name: &str,
    ) -> impl std::future::Future<Output = Result<Option<CheckpointSnapshot>, RepositoryError>> + Send;

    /// Summaries ordered by last update, newest first.
    fn list_checkpoints(
        &self,
        workflow_name: Option<&str>,
        limit: u32,
    ) -> impl std::future::Future<Output = Result<Vec<CheckpointSummary>, RepositoryError>> + Send;

    /// Delete an execution's checkpoint. Returns `true` if it existed.
    fn delete_checkpoint(
        &self,
        execution_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;
}
