use std::future::Future;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use super::context::NodeContext;

/// A named, reusable unit of work.
///
/// Closures passed to [`NodeContext::invoke`] cover one-off steps; this
/// trait is for components shared between workflows.
///
/// `Output` must deserialize because a replayed invocation returns the
/// cached output recorded by an earlier run.
///
/// Uses native async fn in traits (Rust 2024 edition, no async_trait macro).
pub trait Component: Send + Sync {
    type Props: Serialize + Send;
    type Output: Serialize + DeserializeOwned + Send;

    /// Display name, also the replay identity of the component.
    fn name(&self) -> &str;

    fn run(
        &self,
        ctx: NodeContext,
        props: Self::Props,
    ) -> impl Future<Output = anyhow::Result<Self::Output>> + Send;
}

/// Per-invocation options.
#[derive(Debug, Clone, Default)]
pub struct InvokeOptions {
    /// Overrides the component name for display and replay matching.
    pub name: Option<String>,
    /// Top-level prop keys whose values are masked in the recorded node and
    /// scrubbed from persisted snapshots.
    pub secret_props: Vec<String>,
    pub metadata: Map<String, Value>,
}

impl InvokeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn secret_prop(mut self, key: impl Into<String>) -> Self {
        self.secret_props.push(key.into());
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}
