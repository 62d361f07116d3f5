//! Replay resolution against a prior checkpoint.
//!
//! A prior execution tree is indexed once per execution by
//! `(parent id, component name, ordinal)`. The prior tree is first rebased
//! onto the current run's root id, so its descendant ids are re-derived with
//! the same scheme the current run uses; trees with hand-written or foreign
//! ids therefore still line up structurally.
//!
//! A prior node is reused only if it settled successfully and its whole
//! subtree did too. Anything else (absent, failed, half-finished) executes
//! normally, and its children get their own chance to be reused.

use std::collections::HashMap;
use std::fmt;

use gensx_types::node::ExecutionNode;

/// Structural position of a component invocation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReplayKey {
    pub parent_id: String,
    pub component_name: String,
    pub ordinal: usize,
}

impl ReplayKey {
    pub fn new(parent_id: impl Into<String>, component_name: impl Into<String>, ordinal: usize) -> Self {
        Self {
            parent_id: parent_id.into(),
            component_name: component_name.into(),
            ordinal,
        }
    }
}

/// Why a component has to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissReason {
    NotInCheckpoint,
    PreviouslyFailed,
    /// The prior node or one of its descendants never settled successfully.
    Incomplete,
}

impl fmt::Display for MissReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MissReason::NotInCheckpoint => write!(f, "not in checkpoint"),
            MissReason::PreviouslyFailed => write!(f, "previously failed"),
            MissReason::Incomplete => write!(f, "incomplete"),
        }
    }
}

#[derive(Debug, PartialEq)]
pub enum ReplayDecision<'a> {
    /// Skip the work function and graft this cached subtree.
    Reuse(&'a ExecutionNode),
    Execute(MissReason),
}

/// Lookup table over a prior execution tree.
#[derive(Debug, Default)]
pub struct ReplayIndex {
    entries: HashMap<ReplayKey, ExecutionNode>,
}

impl ReplayIndex {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Index `checkpoint` as if its root had id `root_id`.
    ///
    /// The checkpoint's root itself is never indexed; workflows always run.
    pub fn from_checkpoint(checkpoint: Option<&ExecutionNode>, root_id: &str) -> Self {
        let Some(tree) = checkpoint else {
            return Self::empty();
        };
        let rebased = tree.rebased(root_id, None);
        let mut entries = HashMap::with_capacity(rebased.descendant_count());
        index_children(&rebased, &mut entries);
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn decide(&self, key: &ReplayKey) -> ReplayDecision<'_> {
        match self.entries.get(key) {
            None => ReplayDecision::Execute(MissReason::NotInCheckpoint),
            Some(prior) if prior.error.is_some() => {
                ReplayDecision::Execute(MissReason::PreviouslyFailed)
            }
            Some(prior) if prior.is_fully_resolved() => ReplayDecision::Reuse(prior),
            Some(_) => ReplayDecision::Execute(MissReason::Incomplete),
        }
    }
}

fn index_children(node: &ExecutionNode, entries: &mut HashMap<ReplayKey, ExecutionNode>) {
    for (child, ordinal) in node.children.iter().zip(node.child_ordinals()) {
        let key = ReplayKey::new(&node.id, &child.component_name, ordinal);
        entries.insert(key, child.clone());
        index_children(child, entries);
    }
}
