//! In-memory execution tree with debounced, asynchronous persistence.
//!
//! The manager owns the live tree of one workflow execution. Mutations
//! (`add_node`, `update_node`) are synchronous critical sections that never
//! wait on I/O; each one bumps a revision counter. The first revision after a
//! quiet period arms a single flush task, which sleeps for the debounce
//! window, captures the whole tree, and sends it to the sink. The task keeps
//! looping while newer revisions exist, so sends are strictly sequential and
//! a newer snapshot always follows an older one.
//!
//! Callers that need durability wait on [`CheckpointManager::wait_for_pending_updates`],
//! which resolves once every revision scheduled before the call was flushed.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use gensx_types::checkpoint::CheckpointSnapshot;
use gensx_types::config::CheckpointConfig;
use gensx_types::error::SinkError;
use gensx_types::event::ExecutionEvent;
use gensx_types::node::{ExecutionNode, NodePatch};
use tokio::sync::watch;
use uuid::Uuid;

use super::redact::SecretRedactor;
use super::sink::{BoxCheckpointSink, NoopSink};
use crate::event::EventBus;

// ---------------------------------------------------------------------------
// CheckpointManager
// ---------------------------------------------------------------------------

/// Tracks one execution's tree and persists snapshots of it.
///
/// Cloning is cheap; clones share the same tree and flush task.
#[derive(Clone)]
pub struct CheckpointManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    execution_id: Uuid,
    workflow_name: String,
    enabled: bool,
    flush_interval: Duration,
    sink: BoxCheckpointSink,
    events: Option<EventBus>,
    redactor: SecretRedactor,
    state: Mutex<TreeState>,
    flushed: watch::Sender<u64>,
}

#[derive(Default)]
struct TreeState {
    root_id: Option<String>,
    nodes: HashMap<String, NodeRecord>,
    /// Parent id -> ids of nodes that arrived before that parent.
    orphans: HashMap<String, Vec<String>>,
    revision: u64,
    flushed_revision: u64,
    flush_armed: bool,
    sequence: u64,
}

struct NodeRecord {
    /// Stored without children; `children` below is authoritative.
    node: ExecutionNode,
    children: Vec<String>,
}

impl CheckpointManager {
    /// Create a manager for one execution.
    pub fn new(
        execution_id: Uuid,
        workflow_name: impl Into<String>,
        config: &CheckpointConfig,
        sink: BoxCheckpointSink,
        events: Option<EventBus>,
    ) -> Self {
        let (flushed, _) = watch::channel(0);
        Self {
            inner: Arc::new(ManagerInner {
                execution_id,
                workflow_name: workflow_name.into(),
                enabled: config.enabled,
                flush_interval: config.flush_interval(),
                sink,
                events,
                redactor: SecretRedactor::new(),
                state: Mutex::new(TreeState::default()),
                flushed,
            }),
        }
    }

    /// A manager that records nothing and never touches a sink.
    pub fn disabled(execution_id: Uuid, workflow_name: impl Into<String>) -> Self {
        Self::new(
            execution_id,
            workflow_name,
            &CheckpointConfig::disabled(),
            BoxCheckpointSink::new(NoopSink),
            None,
        )
    }

    pub fn execution_id(&self) -> Uuid {
        self.inner.execution_id
    }

    pub fn workflow_name(&self) -> &str {
        &self.inner.workflow_name
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled
    }

    /// Scrub these strings from every snapshot sent from now on.
    pub fn register_secrets(&self, secrets: Vec<String>) {
        if self.inner.enabled && !secrets.is_empty() {
            self.inner.redactor.register(secrets);
        }
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    /// Insert `node` (and any children it already carries) under `parent_id`,
    /// or as the root when `parent_id` is `None`.
    ///
    /// A node whose parent is not known yet is buffered and attached, in
    /// arrival order, once the parent is added.
    pub fn add_node(&self, mut node: ExecutionNode, parent_id: Option<&str>) {
        if !self.inner.enabled {
            return;
        }
        node.parent_id = parent_id.map(str::to_string);

        let arm = {
            let mut state = self.inner.lock_state();
            if !state.insert(node) {
                return;
            }
            state.mark_dirty()
        };
        if arm {
            self.spawn_flush();
        }
    }

    /// Merge `patch` into a running node.
    ///
    /// An error replaces any output; the end time is clamped to the start
    /// time. Updates to unknown or already settled nodes are ignored.
    pub fn update_node(&self, id: &str, patch: NodePatch) {
        if !self.inner.enabled {
            return;
        }

        let arm = {
            let mut state = self.inner.lock_state();
            let Some(record) = state.nodes.get_mut(id) else {
                tracing::warn!(
                    execution_id = %self.inner.execution_id,
                    node_id = id,
                    "update for unknown node ignored"
                );
                return;
            };
            if record.node.is_terminal() {
                tracing::warn!(
                    execution_id = %self.inner.execution_id,
                    node_id = id,
                    "update for settled node ignored"
                );
                return;
            }
            apply_patch(&mut record.node, patch);
            state.mark_dirty()
        };
        if arm {
            self.spawn_flush();
        }
    }

    /// Request a flush of the current tree.
    ///
    /// Writes are coalesced: many calls inside one debounce window produce a
    /// single snapshot.
    pub fn schedule_write(&self) {
        if !self.inner.enabled {
            return;
        }
        let arm = self.inner.lock_state().mark_dirty();
        if arm {
            self.spawn_flush();
        }
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// The current in-memory tree, before secret scrubbing.
    pub fn checkpoint_tree(&self) -> Option<ExecutionNode> {
        if !self.inner.enabled {
            return None;
        }
        self.inner.lock_state().build_tree()
    }

    /// Resolve once every write scheduled before this call has been flushed,
    /// whether or not the sink accepted it.
    pub async fn wait_for_pending_updates(&self) {
        if !self.inner.enabled {
            return;
        }
        let target = self.inner.lock_state().revision;
        let mut flushed = self.inner.flushed.subscribe();
        let _ = flushed.wait_for(|revision| *revision >= target).await;
    }

    // -----------------------------------------------------------------------
    // Flushing
    // -----------------------------------------------------------------------

    fn spawn_flush(&self) {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(flush_loop(Arc::clone(&self.inner)));
            }
            Err(_) => {
                tracing::warn!(
                    execution_id = %self.inner.execution_id,
                    "no async runtime available, checkpoint flush skipped"
                );
                let revision = {
                    let mut state = self.inner.lock_state();
                    state.flush_armed = false;
                    state.flushed_revision = state.revision;
                    state.revision
                };
                self.inner.flushed.send_replace(revision);
            }
        }
    }
}

impl std::fmt::Debug for CheckpointManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckpointManager")
            .field("execution_id", &self.inner.execution_id)
            .field("workflow_name", &self.inner.workflow_name)
            .field("enabled", &self.inner.enabled)
            .finish()
    }
}

/// Sequential flush task. Exactly one runs per manager at a time.
async fn flush_loop(inner: Arc<ManagerInner>) {
    loop {
        tokio::time::sleep(inner.flush_interval).await;

        let (snapshot, revision) = {
            let mut state = inner.lock_state();
            if state.flushed_revision >= state.revision {
                state.flush_armed = false;
                return;
            }
            let revision = state.revision;
            let snapshot = state.build_tree().map(|tree| {
                state.sequence += 1;
                CheckpointSnapshot {
                    execution_id: inner.execution_id,
                    workflow_name: inner.workflow_name.clone(),
                    sequence: state.sequence,
                    created_at: Utc::now(),
                    tree,
                }
            });
            (snapshot, revision)
        };

        if let Some(mut snapshot) = snapshot {
            inner.redactor.redact_tree(&mut snapshot.tree);
            inner.deliver(snapshot).await;
        }

        inner.lock_state().flushed_revision = revision;
        inner.flushed.send_replace(revision);
    }
}

impl ManagerInner {
    fn lock_state(&self) -> MutexGuard<'_, TreeState> {
        // Every critical section leaves the tree consistent.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Send one snapshot. The send runs in its own task, so a panicking
    /// sink counts as a failed flush and the loop keeps its bookkeeping.
    async fn deliver(&self, snapshot: CheckpointSnapshot) {
        let sequence = snapshot.sequence;
        let node_count = snapshot.node_count();
        let sink = self.sink.clone();
        let sent = tokio::spawn(async move { sink.send(&snapshot).await })
            .await
            .unwrap_or_else(|err| Err(SinkError::Transport(format!("sink task failed: {err}"))));

        match sent {
            Ok(()) => {
                tracing::debug!(
                    execution_id = %self.execution_id,
                    sequence,
                    nodes = node_count,
                    "checkpoint flushed"
                );
                self.publish(ExecutionEvent::CheckpointFlushed {
                    execution_id: self.execution_id,
                    sequence,
                    node_count,
                });
            }
            Err(err) => {
                tracing::warn!(
                    execution_id = %self.execution_id,
                    sequence,
                    error = %err,
                    "checkpoint flush failed"
                );
                self.publish(ExecutionEvent::CheckpointFailed {
                    execution_id: self.execution_id,
                    sequence,
                    error: err.to_string(),
                });
            }
        }
    }

    fn publish(&self, event: ExecutionEvent) {
        if let Some(events) = &self.events {
            events.publish(event);
        }
    }
}

// ---------------------------------------------------------------------------
// Tree state
// ---------------------------------------------------------------------------

impl TreeState {
    /// Returns true when the first unflushed revision was just recorded and
    /// a flush task must be started.
    fn mark_dirty(&mut self) -> bool {
        self.revision += 1;
        if self.flush_armed {
            false
        } else {
            self.flush_armed = true;
            true
        }
    }

    fn insert(&mut self, node: ExecutionNode) -> bool {
        let id = node.id.clone();
        if self.nodes.contains_key(&id) {
            tracing::warn!(node_id = %id, "duplicate node id ignored");
            return false;
        }

        match node.parent_id.clone() {
            None => {
                if let Some(root_id) = &self.root_id {
                    tracing::warn!(node_id = %id, root_id = %root_id, "second root node ignored");
                    return false;
                }
                self.root_id = Some(id);
            }
            Some(parent_id) => match self.nodes.get_mut(&parent_id) {
                Some(parent) => parent.children.push(id),
                None => {
                    tracing::debug!(node_id = %id, parent_id = %parent_id, "buffering orphan node");
                    self.orphans.entry(parent_id).or_default().push(id);
                }
            },
        }

        self.flatten(node);
        true
    }

    /// Store `node` and its carried subtree as flat records.
    fn flatten(&mut self, mut node: ExecutionNode) {
        let id = node.id.clone();
        let carried = std::mem::take(&mut node.children);
        let mut children: Vec<String> = carried.iter().map(|child| child.id.clone()).collect();
        if let Some(waiting) = self.orphans.remove(&id) {
            children.extend(waiting);
        }
        self.nodes.insert(id.clone(), NodeRecord { node, children });

        for mut child in carried {
            if self.nodes.contains_key(&child.id) {
                tracing::warn!(node_id = %child.id, "duplicate node id ignored");
                continue;
            }
            child.parent_id = Some(id.clone());
            self.flatten(child);
        }
    }

    fn build_tree(&self) -> Option<ExecutionNode> {
        self.root_id.as_deref().and_then(|root| self.build(root))
    }

    fn build(&self, id: &str) -> Option<ExecutionNode> {
        let record = self.nodes.get(id)?;
        let mut node = record.node.clone();
        node.children = record
            .children
            .iter()
            .filter_map(|child| self.build(child))
            .collect();
        Some(node)
    }
}

fn apply_patch(node: &mut ExecutionNode, patch: NodePatch) {
    let settles = patch.is_terminal();
    if let Some(error) = patch.error {
        node.error = Some(error);
        node.output = None;
    } else if let Some(output) = patch.output {
        node.output = Some(output);
    }

    let end_time = match patch.end_time {
        Some(end) => Some(end),
        None if settles => Some(Utc::now().timestamp_millis()),
        None => None,
    };
    if let Some(end) = end_time {
        node.end_time = Some(end.max(node.start_time));
    }

    node.metadata.extend(patch.metadata);
}
