use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use gensx_types::event::ExecutionEvent;
use gensx_types::node::{ExecutionNode, NodePatch, create_node_id};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use uuid::Uuid;

use super::component::{Component, InvokeOptions};
use super::{ExecutionShared, NodeRole, now_ms, settle};
use crate::checkpoint::redact::mask_props;
use crate::error::ExecutionError;
use crate::replay::{ReplayDecision, ReplayKey};

/// Handle on the node currently executing.
///
/// Every work function receives the context of its own node; invocations
/// made through it become children of that node. Cloning is cheap, so a
/// context can be moved into spawned tasks or shared by concurrent branches.
#[derive(Clone)]
pub struct NodeContext {
    shared: Arc<ExecutionShared>,
    node_id: String,
}

impl NodeContext {
    pub(crate) fn new(shared: Arc<ExecutionShared>, node_id: String) -> Self {
        Self { shared, node_id }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn execution_id(&self) -> Uuid {
        self.shared.execution_id
    }

    pub fn workflow_name(&self) -> &str {
        &self.shared.workflow_name
    }

    /// Attach a metadata entry to the running node.
    pub fn add_metadata(&self, key: impl Into<String>, value: Value) {
        self.shared
            .checkpoints
            .update_node(&self.node_id, NodePatch::metadata(key, value));
    }

    /// Run `f` as a child component named `name`.
    pub async fn invoke<P, O, F, Fut>(&self, name: &str, props: P, f: F) -> Result<O, ExecutionError>
    where
        P: Serialize,
        O: Serialize + DeserializeOwned,
        F: FnOnce(NodeContext, P) -> Fut,
        Fut: Future<Output = anyhow::Result<O>>,
    {
        self.invoke_with(name, InvokeOptions::default(), props, f).await
    }

    /// Run `f` as a child component, with per-invocation options.
    ///
    /// If a prior checkpoint holds a fully resolved node at the same
    /// position, `f` is not called and the cached output is returned.
    pub async fn invoke_with<P, O, F, Fut>(
        &self,
        name: &str,
        options: InvokeOptions,
        props: P,
        f: F,
    ) -> Result<O, ExecutionError>
    where
        P: Serialize,
        O: Serialize + DeserializeOwned,
        F: FnOnce(NodeContext, P) -> Fut,
        Fut: Future<Output = anyhow::Result<O>>,
    {
        let InvokeOptions {
            name: display_name,
            secret_props,
            metadata,
        } = options;
        let component = display_name.unwrap_or_else(|| name.to_string());
        let shared = &self.shared;

        let props_value =
            serde_json::to_value(&props).map_err(|err| ExecutionError::Serialization {
                component: component.clone(),
                what: "props",
                message: err.to_string(),
            })?;

        let slot = shared.register_child(&self.node_id, &component, |ordinal| {
            let node_id = create_node_id(&component, Some(&self.node_id), ordinal);
            if let Some(output) = self.try_replay::<O>(&component, ordinal, &node_id) {
                return ChildSlot::Replayed(output);
            }

            let (recorded_props, secrets) = mask_props(&props_value, &secret_props);
            shared.checkpoints.register_secrets(secrets);
            let mut node = ExecutionNode::new(
                &node_id,
                &component,
                None,
                recorded_props,
                now_ms(),
            );
            node.metadata = metadata;
            shared.checkpoints.add_node(node, Some(&self.node_id));
            ChildSlot::Started(node_id)
        });
        let node_id = match slot {
            ChildSlot::Replayed(output) => return Ok(output),
            ChildSlot::Started(node_id) => node_id,
        };

        shared.events.publish(ExecutionEvent::NodeStarted {
            execution_id: shared.execution_id,
            node_id: node_id.clone(),
            component_name: component.clone(),
            parent_id: Some(self.node_id.clone()),
        });
        tracing::debug!(
            execution_id = %shared.execution_id,
            node_id = %node_id,
            component = %component,
            "component started"
        );

        let started = Instant::now();
        let child = NodeContext::new(Arc::clone(shared), node_id.clone());
        let result = f(child, props).await;
        settle(shared, &node_id, &component, started, NodeRole::Component, result)
    }

    /// Run a [`Component`] as a child of this node.
    pub async fn call<C: Component>(
        &self,
        component: &C,
        props: C::Props,
    ) -> Result<C::Output, ExecutionError> {
        self.call_with(component, InvokeOptions::default(), props)
            .await
    }

    pub async fn call_with<C: Component>(
        &self,
        component: &C,
        options: InvokeOptions,
        props: C::Props,
    ) -> Result<C::Output, ExecutionError> {
        self.invoke_with(component.name(), options, props, |ctx, props| {
            component.run(ctx, props)
        })
        .await
    }

    /// Graft the cached subtree for this position, if the checkpoint has a
    /// reusable one whose output decodes as `O`.
    fn try_replay<O: DeserializeOwned>(
        &self,
        component: &str,
        ordinal: usize,
        node_id: &str,
    ) -> Option<O> {
        let shared = &self.shared;
        if shared.replay.is_empty() {
            return None;
        }

        let key = ReplayKey::new(&self.node_id, component, ordinal);
        let prior = match shared.replay.decide(&key) {
            ReplayDecision::Reuse(prior) => prior,
            ReplayDecision::Execute(reason) => {
                tracing::trace!(
                    execution_id = %shared.execution_id,
                    component,
                    ordinal,
                    reason = %reason,
                    "replay miss"
                );
                return None;
            }
        };

        let cached = prior.output.clone().unwrap_or(Value::Null);
        let output = match serde_json::from_value::<O>(cached) {
            Ok(output) => output,
            Err(err) => {
                tracing::warn!(
                    execution_id = %shared.execution_id,
                    component,
                    error = %err,
                    "cached output does not decode, executing instead"
                );
                return None;
            }
        };

        let node = prior.rebased(node_id, Some(self.node_id.clone()));
        let descendants = node.descendant_count();
        shared.checkpoints.add_node(node, Some(&self.node_id));
        shared.events.publish(ExecutionEvent::NodeReplayed {
            execution_id: shared.execution_id,
            node_id: node_id.to_string(),
            component_name: component.to_string(),
            descendants,
        });
        tracing::debug!(
            execution_id = %shared.execution_id,
            node_id,
            component,
            descendants,
            "component replayed from checkpoint"
        );
        Some(output)
    }
}

/// Where a child invocation landed once registered.
enum ChildSlot<O> {
    Replayed(O),
    Started(String),
}

impl std::fmt::Debug for NodeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeContext")
            .field("execution_id", &self.shared.execution_id)
            .field("node_id", &self.node_id)
            .finish()
    }
}
