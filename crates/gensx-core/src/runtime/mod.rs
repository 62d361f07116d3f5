//! Component invocation runtime.
//!
//! A workflow execution owns one [`ExecutionShared`]: the checkpoint manager,
//! the replay index, the event bus and the per-parent ordinal counters. The
//! "current node" is not global state; it travels with each branch of the
//! computation as a [`NodeContext`] value, so concurrently running siblings
//! can never observe each other's position in the tree.

mod component;
mod context;
mod workflow;


use std::time::Instant;

use chrono::Utc;
use dashmap::DashMap;
use gensx_types::event::ExecutionEvent;
use gensx_types::node::NodePatch;
use serde::Serialize;
use uuid::Uuid;

use crate::checkpoint::CheckpointManager;
use crate::error::ExecutionError;
use crate::event::EventBus;
use crate::replay::ReplayIndex;

pub use component::{Component, InvokeOptions};
pub use context::NodeContext;
pub use workflow::{RunOptions, WorkflowExecution, WorkflowRuntime};

/// State shared by every node of one workflow execution.
pub(crate) struct ExecutionShared {
    pub(crate) execution_id: Uuid,
    pub(crate) workflow_name: String,
    pub(crate) checkpoints: CheckpointManager,
    pub(crate) replay: ReplayIndex,
    pub(crate) events: EventBus,
    /// (parent id, component name) -> next ordinal.
    ordinals: DashMap<(String, String), usize>,
}

impl ExecutionShared {
    pub(crate) fn new(
        execution_id: Uuid,
        workflow_name: String,
        checkpoints: CheckpointManager,
        replay: ReplayIndex,
        events: EventBus,
    ) -> Self {
        Self {
            execution_id,
            workflow_name,
            checkpoints,
            replay,
            events,
            ordinals: DashMap::new(),
        }
    }

    /// Allocate the next ordinal of `component_name` under `parent_id` and
    /// run `register` with it.
    ///
    /// The counter entry stays locked while `register` runs, so same-named
    /// siblings enter the tree in ordinal order even when they start on
    /// different worker threads. `register` must not allocate ordinals
    /// itself.
    pub(crate) fn register_child<T>(
        &self,
        parent_id: &str,
        component_name: &str,
        register: impl FnOnce(usize) -> T,
    ) -> T {
        let mut slot = self
            .ordinals
            .entry((parent_id.to_string(), component_name.to_string()))
            .or_insert(0);
        let ordinal = *slot;
        *slot += 1;
        register(ordinal)
    }
}

/// Whether a settling node is the workflow root or a component below it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NodeRole {
    Workflow,
    Component,
}

pub(crate) fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Record the outcome of a work function on its node and translate it for
/// the caller.
pub(crate) fn settle<O: Serialize>(
    shared: &ExecutionShared,
    node_id: &str,
    component: &str,
    started: Instant,
    role: NodeRole,
    result: anyhow::Result<O>,
) -> Result<O, ExecutionError> {
    let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

    let (outcome, error) = match result {
        Ok(output) => match serde_json::to_value(&output) {
            Ok(value) => {
                shared
                    .checkpoints
                    .update_node(node_id, NodePatch::completed(value, now_ms()));
                (Ok(output), None)
            }
            Err(err) => {
                let message = format!("failed to serialize output: {err}");
                shared
                    .checkpoints
                    .update_node(node_id, NodePatch::failed(&message, now_ms()));
                let error = ExecutionError::Serialization {
                    component: component.to_string(),
                    what: "output",
                    message: err.to_string(),
                };
                (Err(error), Some(message))
            }
        },
        Err(source) => {
            let message = format!("{source:#}");
            shared
                .checkpoints
                .update_node(node_id, NodePatch::failed(&message, now_ms()));
            let error = ExecutionError::Component {
                component: component.to_string(),
                node_id: node_id.to_string(),
                source,
            };
            (Err(error), Some(message))
        }
    };

    let execution_id = shared.execution_id;
    let event = match (role, error) {
        (NodeRole::Workflow, None) => {
            tracing::info!(
                execution_id = %execution_id,
                workflow = %shared.workflow_name,
                duration_ms,
                "workflow completed"
            );
            ExecutionEvent::WorkflowCompleted {
                execution_id,
                workflow_name: shared.workflow_name.clone(),
                duration_ms,
            }
        }
        (NodeRole::Workflow, Some(error)) => {
            tracing::info!(
                execution_id = %execution_id,
                workflow = %shared.workflow_name,
                error = %error,
                "workflow failed"
            );
            ExecutionEvent::WorkflowFailed {
                execution_id,
                workflow_name: shared.workflow_name.clone(),
                error,
            }
        }
        (NodeRole::Component, None) => {
            tracing::debug!(
                execution_id = %execution_id,
                node_id,
                component,
                duration_ms,
                "component completed"
            );
            ExecutionEvent::NodeCompleted {
                execution_id,
                node_id: node_id.to_string(),
                component_name: component.to_string(),
                duration_ms,
            }
        }
        (NodeRole::Component, Some(error)) => {
            tracing::debug!(
                execution_id = %execution_id,
                node_id,
                component,
                error = %error,
                "component failed"
            );
            ExecutionEvent::NodeFailed {
                execution_id,
                node_id: node_id.to_string(),
                component_name: component.to_string(),
                error,
            }
        }
    };
    shared.events.publish(event);

    outcome
}
