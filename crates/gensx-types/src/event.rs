//! Event types for the GenSX execution event bus.
//!
//! `ExecutionEvent` is broadcast while a workflow runs. All variants are
//! Clone + Send + Sync for use with tokio broadcast channels.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Events emitted during a workflow execution.
///
/// Consumed by subscribers such as progress displays, log shippers and tests.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutionEvent {
    /// The root node of a workflow execution was created.
    WorkflowStarted {
        execution_id: Uuid,
        workflow_name: String,
        node_id: String,
    },

    /// The workflow function returned successfully.
    WorkflowCompleted {
        execution_id: Uuid,
        workflow_name: String,
        duration_ms: u64,
    },

    /// The workflow function returned an error.
    WorkflowFailed {
        execution_id: Uuid,
        workflow_name: String,
        error: String,
    },

    /// A component node was opened and its work function is about to run.
    NodeStarted {
        execution_id: Uuid,
        node_id: String,
        component_name: String,
        parent_id: Option<String>,
    },

    /// A component work function returned successfully.
    NodeCompleted {
        execution_id: Uuid,
        node_id: String,
        component_name: String,
        duration_ms: u64,
    },

    /// A component work function returned an error.
    NodeFailed {
        execution_id: Uuid,
        node_id: String,
        component_name: String,
        error: String,
    },

    /// A component was satisfied from a prior checkpoint without running.
    NodeReplayed {
        execution_id: Uuid,
        node_id: String,
        component_name: String,
        /// Number of cached descendants copied along with the node.
        descendants: usize,
    },

    /// A snapshot was accepted by the persistence sink.
    CheckpointFlushed {
        execution_id: Uuid,
        sequence: u64,
        node_count: usize,
    },

    /// The persistence sink rejected a snapshot.
    CheckpointFailed {
        execution_id: Uuid,
        sequence: u64,
        error: String,
    },
}

impl ExecutionEvent {
    /// The execution every event belongs to.
    pub fn execution_id(&self) -> Uuid {
        match self {
            ExecutionEvent::WorkflowStarted { execution_id, .. }
            | ExecutionEvent::WorkflowCompleted { execution_id, .. }
            | ExecutionEvent::WorkflowFailed { execution_id, .. }
            | ExecutionEvent::NodeStarted { execution_id, .. }
            | ExecutionEvent::NodeCompleted { execution_id, .. }
            | ExecutionEvent::NodeFailed { execution_id, .. }
            | ExecutionEvent::NodeReplayed { execution_id, .. }
            | ExecutionEvent::CheckpointFlushed { execution_id, .. }
            | ExecutionEvent::CheckpointFailed { execution_id, .. } => *execution_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_started_serde_roundtrip() {
        let event = ExecutionEvent::NodeStarted {
            execution_id: Uuid::now_v7(),
            node_id: "Fetch:0011223344556677".to_string(),
            component_name: "Fetch".to_string(),
            parent_id: Some("Workflow:8899aabbccddeeff".to_string()),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"node_started\""));
        let parsed: ExecutionEvent = serde_json::from_str(&json).unwrap();
        assert!(matches!(parsed, ExecutionEvent::NodeStarted { ref component_name, .. } if component_name == "Fetch"));
    }

    #[test]
    fn test_checkpoint_failed_serde_roundtrip() {
        let event = ExecutionEvent::CheckpointFailed {
            execution_id: Uuid::now_v7(),
            sequence: 4,
            error: "connection refused".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"checkpoint_failed\""));
        let parsed: ExecutionEvent = serde_json::from_str(&json).unwrap();
        assert!(matches!(parsed, ExecutionEvent::CheckpointFailed { sequence: 4, .. }));
    }

    #[test]
    fn test_execution_id_accessor() {
        let id = Uuid::now_v7();
        let event = ExecutionEvent::NodeReplayed {
            execution_id: id,
            node_id: "A:1".to_string(),
            component_name: "A".to_string(),
            descendants: 2,
        };
        assert_eq!(event.execution_id(), id);
    }
}
