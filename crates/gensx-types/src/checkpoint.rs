//! Checkpoint snapshot types.
//!
//! A [`CheckpointSnapshot`] is the full execution tree of one workflow
//! execution at a point in time, as handed to a persistence sink. A
//! [`CheckpointSummary`] is the listing row a checkpoint store returns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::node::{ExecutionNode, ExecutionStatus};

/// Full snapshot of an execution tree.
///
/// `sequence` grows by one per flush of the same execution, so a store can
/// keep the newest snapshot even if writes arrive out of order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointSnapshot {
    pub execution_id: Uuid,
    pub workflow_name: String,
    pub sequence: u64,
    pub created_at: DateTime<Utc>,
    pub tree: ExecutionNode,
}

impl CheckpointSnapshot {
    pub fn status(&self) -> ExecutionStatus {
        self.tree.status()
    }

    /// Root plus every descendant.
    pub fn node_count(&self) -> usize {
        1 + self.tree.descendant_count()
    }
}

/// One row of a checkpoint listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointSummary {
    pub execution_id: Uuid,
    pub workflow_name: String,
    pub sequence: u64,
    pub status: ExecutionStatus,
    pub node_count: u64,
    pub updated_at: DateTime<Utc>,
}

impl From<&CheckpointSnapshot> for CheckpointSummary {
    fn from(snapshot: &CheckpointSnapshot) -> Self {
        Self {
            execution_id: snapshot.execution_id,
            workflow_name: snapshot.workflow_name.clone(),
            sequence: snapshot.sequence,
            status: snapshot.status(),
            node_count: snapshot.node_count() as u64,
            updated_at: snapshot.created_at,
        }
    }
}
