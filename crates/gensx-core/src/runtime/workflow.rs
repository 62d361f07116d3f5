use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use gensx_types::config::CheckpointConfig;
use gensx_types::event::ExecutionEvent;
use gensx_types::node::{ExecutionNode, create_node_id};
use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use super::component::Component;
use super::context::NodeContext;
use super::{ExecutionShared, NodeRole, now_ms, settle};
use crate::checkpoint::redact::mask_props;
use crate::checkpoint::{BoxCheckpointSink, CheckpointManager};
use crate::error::ExecutionError;
use crate::event::EventBus;
use crate::replay::ReplayIndex;

// ---------------------------------------------------------------------------
// RunOptions
// ---------------------------------------------------------------------------

/// Options for one workflow execution.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Prior execution tree to replay completed components from.
    pub checkpoint: Option<ExecutionNode>,
    /// Defaults to a fresh UUID v7.
    pub execution_id: Option<Uuid>,
    /// Top-level workflow prop keys to mask.
    pub secret_props: Vec<String>,
    /// Metadata attached to the root node.
    pub metadata: Map<String, Value>,
    /// Await the final checkpoint flush before `run` returns.
    pub wait_for_checkpoints: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            checkpoint: None,
            execution_id: None,
            secret_props: Vec::new(),
            metadata: Map::new(),
            wait_for_checkpoints: true,
        }
    }
}

impl RunOptions {
    pub fn replaying(checkpoint: ExecutionNode) -> Self {
        Self {
            checkpoint: Some(checkpoint),
            ..Self::default()
        }
    }

    pub fn with_execution_id(mut self, execution_id: Uuid) -> Self {
        self.execution_id = Some(execution_id);
        self
    }

    pub fn secret_prop(mut self, key: impl Into<String>) -> Self {
        self.secret_props.push(key.into());
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Return as soon as the workflow function settles; persistence
    /// continues in the background.
    pub fn detached(mut self) -> Self {
        self.wait_for_checkpoints = false;
        self
    }
}

// ---------------------------------------------------------------------------
// WorkflowRuntime
// ---------------------------------------------------------------------------

/// Entry point for running workflows.
///
/// Holds what is shared between executions: checkpoint settings, the sink
/// snapshots go to, and the event bus lifecycle events are published on.
#[derive(Debug, Clone)]
pub struct WorkflowRuntime {
    config: CheckpointConfig,
    sink: BoxCheckpointSink,
    events: EventBus,
}

impl WorkflowRuntime {
    pub fn new(config: CheckpointConfig, sink: BoxCheckpointSink) -> Self {
        Self {
            config,
            sink,
            events: EventBus::default(),
        }
    }

    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn config(&self) -> &CheckpointConfig {
        &self.config
    }

    /// Prepare an execution of `workflow_name` without starting it.
    pub fn execution(&self, workflow_name: impl Into<String>, options: RunOptions) -> WorkflowExecution {
        let workflow_name = workflow_name.into();
        let execution_id = options.execution_id.unwrap_or_else(Uuid::now_v7);
        let root_id = create_node_id(&workflow_name, None, 0);

        let checkpoints = CheckpointManager::new(
            execution_id,
            workflow_name.clone(),
            &self.config,
            self.sink.clone(),
            Some(self.events.clone()),
        );
        let replay = ReplayIndex::from_checkpoint(options.checkpoint.as_ref(), &root_id);
        let shared = ExecutionShared::new(
            execution_id,
            workflow_name,
            checkpoints,
            replay,
            self.events.clone(),
        );

        WorkflowExecution {
            shared: Arc::new(shared),
            root_id,
            started: AtomicBool::new(false),
            secret_props: options.secret_props,
            metadata: options.metadata,
            wait_for_checkpoints: options.wait_for_checkpoints,
        }
    }

    /// Run `f` as the workflow `workflow_name`.
    pub async fn run<P, O, F, Fut>(
        &self,
        workflow_name: &str,
        props: P,
        options: RunOptions,
        f: F,
    ) -> Result<O, ExecutionError>
    where
        P: Serialize,
        O: Serialize,
        F: FnOnce(NodeContext, P) -> Fut,
        Fut: Future<Output = anyhow::Result<O>>,
    {
        self.execution(workflow_name, options).run(props, f).await
    }

    /// Run a [`Component`] as the workflow root.
    pub async fn run_component<C: Component>(
        &self,
        component: &C,
        props: C::Props,
        options: RunOptions,
    ) -> Result<C::Output, ExecutionError> {
        self.execution(component.name(), options)
            .run(props, |ctx, props| component.run(ctx, props))
            .await
    }
}

// ---------------------------------------------------------------------------
// WorkflowExecution
// ---------------------------------------------------------------------------

/// One prepared workflow execution.
///
/// The handle outlives the run, so callers can inspect the recorded tree of
/// a failed execution or wait for its checkpoints.
pub struct WorkflowExecution {
    shared: Arc<ExecutionShared>,
    root_id: String,
    started: AtomicBool,
    secret_props: Vec<String>,
    metadata: Map<String, Value>,
    wait_for_checkpoints: bool,
}

impl WorkflowExecution {
    pub fn execution_id(&self) -> Uuid {
        self.shared.execution_id
    }

    pub fn workflow_name(&self) -> &str {
        &self.shared.workflow_name
    }

    pub fn root_id(&self) -> &str {
        &self.root_id
    }

    pub fn checkpoints(&self) -> &CheckpointManager {
        &self.shared.checkpoints
    }

    /// Current in-memory tree; `None` with checkpointing disabled.
    pub fn checkpoint_tree(&self) -> Option<ExecutionNode> {
        self.shared.checkpoints.checkpoint_tree()
    }

    pub async fn wait_for_pending_updates(&self) {
        self.shared.checkpoints.wait_for_pending_updates().await;
    }

    /// Create the root node, run `f` under it, and settle the root.
    ///
    /// The root always executes, even when a checkpoint was supplied; only
    /// components below it are replayed. An execution runs at most once.
    pub async fn run<P, O, F, Fut>(&self, props: P, f: F) -> Result<O, ExecutionError>
    where
        P: Serialize,
        O: Serialize,
        F: FnOnce(NodeContext, P) -> Fut,
        Fut: Future<Output = anyhow::Result<O>>,
    {
        let shared = &self.shared;
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(ExecutionError::AlreadyStarted(shared.execution_id));
        }

        let props_value =
            serde_json::to_value(&props).map_err(|err| ExecutionError::Serialization {
                component: shared.workflow_name.clone(),
                what: "props",
                message: err.to_string(),
            })?;
        let (recorded_props, secrets) = mask_props(&props_value, &self.secret_props);
        shared.checkpoints.register_secrets(secrets);

        let mut root = ExecutionNode::new(
            &self.root_id,
            &shared.workflow_name,
            None,
            recorded_props,
            now_ms(),
        );
        root.metadata = self.metadata.clone();
        shared.checkpoints.add_node(root, None);
        shared.events.publish(ExecutionEvent::WorkflowStarted {
            execution_id: shared.execution_id,
            workflow_name: shared.workflow_name.clone(),
            node_id: self.root_id.clone(),
        });
        tracing::info!(
            execution_id = %shared.execution_id,
            workflow = %shared.workflow_name,
            replay_entries = shared.replay.len(),
            "workflow started"
        );

        let started = Instant::now();
        let ctx = NodeContext::new(Arc::clone(shared), self.root_id.clone());
        let result = f(ctx, props).await;
        let outcome = settle(
            shared,
            &self.root_id,
            &shared.workflow_name,
            started,
            NodeRole::Workflow,
            result,
        );

        if self.wait_for_checkpoints {
            shared.checkpoints.wait_for_pending_updates().await;
        }
        outcome
    }
}

impl std::fmt::Debug for WorkflowExecution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowExecution")
            .field("execution_id", &self.shared.execution_id)
            .field("workflow_name", &self.shared.workflow_name)
            .field("root_id", &self.root_id)
            .finish()
    }
}
