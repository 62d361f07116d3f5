//! Execution tree node model and deterministic node ids.
//!
//! Every component invocation in a workflow becomes one [`ExecutionNode`].
//! Nodes form a single-rooted tree ordered by invocation start. The JSON
//! shape uses camelCase keys so a tree can be handed back to the engine as a
//! replay checkpoint or shipped to the hosted API unchanged.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Number of hex characters of the SHA-256 digest kept in a node id.
const NODE_ID_HASH_LEN: usize = 16;

// ---------------------------------------------------------------------------
// Node ids
// ---------------------------------------------------------------------------

/// Derive the id of a node from its structural position.
///
/// The id is a pure function of the parent id, the component name and the
/// ordinal (index among same-named siblings under that parent, in start
/// order). Two runs that invoke the same components in the same order
/// therefore produce identical ids, which is what replay matching relies on.
///
/// Format: `"{component_name}:{16 hex chars}"`.
pub fn create_node_id(component_name: &str, parent_id: Option<&str>, ordinal: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(parent_id.unwrap_or_default().as_bytes());
    hasher.update([0u8]);
    hasher.update(component_name.as_bytes());
    hasher.update([0u8]);
    hasher.update(ordinal.to_le_bytes());
    let digest = format!("{:x}", hasher.finalize());
    format!("{component_name}:{}", &digest[..NODE_ID_HASH_LEN])
}

// ---------------------------------------------------------------------------
// ExecutionNode
// ---------------------------------------------------------------------------

/// One executed unit of work and its position in the execution tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionNode {
    pub id: String,
    pub component_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Epoch milliseconds.
    pub start_time: i64,
    /// Epoch milliseconds, set when the node settles.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<i64>,
    #[serde(default)]
    pub props: Value,
    /// Present only on success. `Some(Value::Null)` is a legitimate output
    /// and survives a JSON round trip.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_present"
    )]
    pub output: Option<Value>,
    /// Present only on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub children: Vec<ExecutionNode>,
}

/// A present key always yields `Some`, including an explicit `null`.
fn deserialize_present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl ExecutionNode {
    /// A freshly started node with no output, error or children.
    pub fn new(
        id: impl Into<String>,
        component_name: impl Into<String>,
        parent_id: Option<String>,
        props: Value,
        start_time: i64,
    ) -> Self {
        Self {
            id: id.into(),
            component_name: component_name.into(),
            parent_id,
            start_time,
            end_time: None,
            props,
            output: None,
            error: None,
            metadata: Map::new(),
            children: Vec::new(),
        }
    }

    /// True once the node has settled with either an output or an error.
    pub fn is_terminal(&self) -> bool {
        self.output.is_some() || self.error.is_some()
    }

    /// True when the node settled with an output and no error.
    pub fn is_successful(&self) -> bool {
        self.output.is_some() && self.error.is_none()
    }

    /// True when this node and every descendant settled successfully.
    pub fn is_fully_resolved(&self) -> bool {
        self.is_successful() && self.children.iter().all(ExecutionNode::is_fully_resolved)
    }

    pub fn status(&self) -> ExecutionStatus {
        if self.error.is_some() {
            ExecutionStatus::Failed
        } else if self.output.is_some() {
            ExecutionStatus::Completed
        } else {
            ExecutionStatus::Running
        }
    }

    /// Wall-clock duration in milliseconds, if the node has settled.
    pub fn duration_ms(&self) -> Option<i64> {
        self.end_time.map(|end| end - self.start_time)
    }

    /// Number of nodes below this one.
    pub fn descendant_count(&self) -> usize {
        self.children
            .iter()
            .map(|child| 1 + child.descendant_count())
            .sum()
    }

    /// All nodes below this one, in pre-order.
    pub fn descendants(&self) -> Vec<&ExecutionNode> {
        let mut out = Vec::with_capacity(self.descendant_count());
        let mut stack: Vec<&ExecutionNode> = self.children.iter().rev().collect();
        while let Some(node) = stack.pop() {
            out.push(node);
            stack.extend(node.children.iter().rev());
        }
        out
    }

    /// Find a node by id in this subtree (including self).
    pub fn find(&self, id: &str) -> Option<&ExecutionNode> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(id))
    }

    /// Ordinal of each child among its same-named siblings, by position.
    ///
    /// A child whose id was derived with [`create_node_id`] under this node
    /// keeps the ordinal encoded in that id, wherever it sits in `children`.
    /// Children with any other id take the lowest free ordinals of their
    /// name, in position order.
    pub fn child_ordinals(&self) -> Vec<usize> {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for child in &self.children {
            *counts.entry(child.component_name.as_str()).or_insert(0) += 1;
        }
        let mut derived: HashMap<String, usize> = HashMap::new();
        for (name, count) in &counts {
            for ordinal in 0..*count {
                derived.insert(create_node_id(name, Some(&self.id), ordinal), ordinal);
            }
        }

        let mut taken: HashSet<(&str, usize)> = HashSet::new();
        let recorded: Vec<Option<usize>> = self
            .children
            .iter()
            .map(|child| {
                let name = child.component_name.as_str();
                derived
                    .get(&child.id)
                    .copied()
                    .filter(|ordinal| taken.insert((name, *ordinal)))
            })
            .collect();

        let mut next_free: HashMap<&str, usize> = HashMap::new();
        self.children
            .iter()
            .zip(recorded)
            .map(|(child, recorded)| match recorded {
                Some(ordinal) => ordinal,
                None => {
                    let name = child.component_name.as_str();
                    let next = next_free.entry(name).or_insert(0);
                    while taken.contains(&(name, *next)) {
                        *next += 1;
                    }
                    taken.insert((name, *next));
                    *next
                }
            })
            .collect()
    }

    /// Copy this subtree under a new id and parent.
    ///
    /// Descendant ids are re-derived with [`create_node_id`] from each
    /// child's ordinal (see [`ExecutionNode::child_ordinals`]), so the copy
    /// obeys the same id scheme as nodes created in the current run.
    pub fn rebased(&self, id: impl Into<String>, parent_id: Option<String>) -> ExecutionNode {
        let id = id.into();
        let children = self
            .children
            .iter()
            .zip(self.child_ordinals())
            .map(|(child, ordinal)| {
                let child_id = create_node_id(&child.component_name, Some(&id), ordinal);
                child.rebased(child_id, Some(id.clone()))
            })
            .collect();

        ExecutionNode {
            id,
            component_name: self.component_name.clone(),
            parent_id,
            start_time: self.start_time,
            end_time: self.end_time,
            props: self.props.clone(),
            output: self.output.clone(),
            error: self.error.clone(),
            metadata: self.metadata.clone(),
            children,
        }
    }
}

// ---------------------------------------------------------------------------
// NodePatch
// ---------------------------------------------------------------------------

/// Mergeable fields applied to an existing node by the checkpoint manager.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodePatch {
    pub output: Option<Value>,
    pub error: Option<String>,
    pub end_time: Option<i64>,
    pub metadata: Map<String, Value>,
}

impl NodePatch {
    pub fn completed(output: Value, end_time: i64) -> Self {
        Self {
            output: Some(output),
            end_time: Some(end_time),
            ..Self::default()
        }
    }

    pub fn failed(error: impl Into<String>, end_time: i64) -> Self {
        Self {
            error: Some(error.into()),
            end_time: Some(end_time),
            ..Self::default()
        }
    }

    pub fn metadata(key: impl Into<String>, value: Value) -> Self {
        let mut metadata = Map::new();
        metadata.insert(key.into(), value);
        Self {
            metadata,
            ..Self::default()
        }
    }

    /// True when the patch settles the node.
    pub fn is_terminal(&self) -> bool {
        self.output.is_some() || self.error.is_some()
    }
}

// ---------------------------------------------------------------------------
// ExecutionStatus
// ---------------------------------------------------------------------------

/// Lifecycle state of a node (or of a whole execution, read off its root).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Running,
    Completed,
    Failed,
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionStatus::Running => write!(f, "running"),
            ExecutionStatus::Completed => write!(f, "completed"),
            ExecutionStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for ExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(ExecutionStatus::Running),
            "completed" => Ok(ExecutionStatus::Completed),
            "failed" => Ok(ExecutionStatus::Failed),
            other => Err(format!("invalid execution status: '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn leaf(name: &str, parent: &str, ordinal: usize, output: Value) -> ExecutionNode {
        let mut node = ExecutionNode::new(
            create_node_id(name, Some(parent), ordinal),
            name,
            Some(parent.to_string()),
            json!({}),
            100,
        );
        node.output = Some(output);
        node.end_time = Some(110);
        node
    }

    fn sample_tree() -> ExecutionNode {
        let root_id = create_node_id("Workflow", None, 0);
        let mut root = ExecutionNode::new(&root_id, "Workflow", None, json!({"input": "x"}), 100);
        root.children.push(leaf("A", &root_id, 0, json!("a")));
        root.children.push(leaf("A", &root_id, 1, json!("a2")));
        root.children.push(leaf("B", &root_id, 0, json!(null)));
        root
    }

    #[test]
    fn node_id_is_deterministic() {
        let a = create_node_id("Summarize", Some("parent"), 0);
        let b = create_node_id("Summarize", Some("parent"), 0);
        assert_eq!(a, b);
        assert!(a.starts_with("Summarize:"));
        assert_eq!(a.len(), "Summarize:".len() + NODE_ID_HASH_LEN);
    }

    #[test]
    fn node_id_distinguishes_ordinal_parent_and_name() {
        let base = create_node_id("A", Some("p"), 0);
        assert_ne!(base, create_node_id("A", Some("p"), 1));
        assert_ne!(base, create_node_id("A", Some("q"), 0));
        assert_ne!(base, create_node_id("B", Some("p"), 0));
        assert_ne!(base, create_node_id("A", None, 0));
    }

    #[test]
    fn descendant_count_and_preorder() {
        let mut tree = sample_tree();
        let first_id = tree.children[0].id.clone();
        tree.children[0]
            .children
            .push(leaf("Inner", &first_id, 0, json!(1)));

        assert_eq!(tree.descendant_count(), 4);
        let names: Vec<&str> = tree
            .descendants()
            .iter()
            .map(|n| n.component_name.as_str())
            .collect();
        assert_eq!(names, vec!["A", "Inner", "A", "B"]);
    }

    #[test]
    fn fully_resolved_requires_every_descendant() {
        let mut tree = sample_tree();
        tree.output = Some(json!("done"));
        assert!(tree.is_fully_resolved());

        tree.children[1].output = None;
        tree.children[1].error = Some("boom".to_string());
        assert!(!tree.is_fully_resolved());
        assert_eq!(tree.children[1].status(), ExecutionStatus::Failed);
    }

    #[test]
    fn null_output_round_trips_through_json() {
        let tree = sample_tree();
        let json = serde_json::to_string(&tree).unwrap();
        assert!(json.contains("\"componentName\""));
        assert!(json.contains("\"output\":null"));

        let back: ExecutionNode = serde_json::from_str(&json).unwrap();
        assert_eq!(back, tree);
        assert_eq!(back.children[2].output, Some(Value::Null));
        assert!(back.children[2].is_successful());
        // Root never settled; absent output stays absent.
        assert_eq!(back.output, None);
    }

    #[test]
    fn rebased_rederives_descendant_ids() {
        let tree = sample_tree();
        let moved = tree.children[0].rebased("new-a", Some("new-parent".to_string()));
        assert_eq!(moved.id, "new-a");
        assert_eq!(moved.parent_id.as_deref(), Some("new-parent"));
        assert_eq!(moved.output, Some(json!("a")));

        let canonical = ExecutionNode {
            id: "handmade-root".to_string(),
            ..sample_tree()
        }
        .rebased(create_node_id("Workflow", None, 0), None);
        assert_eq!(canonical.parent_id, None);
        assert_eq!(canonical.children[1].id, create_node_id("A", Some(&canonical.id), 1));
        assert!(
            canonical
                .children
                .iter()
                .all(|c| c.parent_id.as_deref() == Some(canonical.id.as_str()))
        );
    }

    #[test]
    fn child_ordinals_follow_recorded_ids_not_positions() {
        let root_id = create_node_id("Workflow", None, 0);
        let mut root = ExecutionNode::new(&root_id, "Workflow", None, json!({}), 100);
        root.children = vec![
            leaf("Leaf", &root_id, 2, json!(2)),
            leaf("Leaf", &root_id, 0, json!(0)),
            ExecutionNode::new("handmade", "Leaf", None, json!({}), 100),
            leaf("Other", &root_id, 0, json!("o")),
        ];

        assert_eq!(root.child_ordinals(), vec![2, 0, 1, 0]);

        let moved = root.rebased("new-root", None);
        assert_eq!(moved.children[0].id, create_node_id("Leaf", Some("new-root"), 2));
        assert_eq!(moved.children[0].output, Some(json!(2)));
        assert_eq!(moved.children[2].id, create_node_id("Leaf", Some("new-root"), 1));
        assert_eq!(moved.child_ordinals(), vec![2, 0, 1, 0]);
    }

    #[test]
    fn duplicate_recorded_ids_do_not_share_an_ordinal() {
        let root_id = create_node_id("Workflow", None, 0);
        let mut root = ExecutionNode::new(&root_id, "Workflow", None, json!({}), 100);
        root.children = vec![
            leaf("Leaf", &root_id, 0, json!("first")),
            leaf("Leaf", &root_id, 0, json!("second")),
        ];
        assert_eq!(root.child_ordinals(), vec![0, 1]);
    }

    #[test]
    fn find_locates_nested_nodes() {
        let tree = sample_tree();
        let target = tree.children[2].id.clone();
        assert_eq!(tree.find(&target).map(|n| n.component_name.as_str()), Some("B"));
        assert!(tree.find("missing").is_none());
    }

    #[test]
    fn status_round_trips_through_str() {
        for status in [
            ExecutionStatus::Running,
            ExecutionStatus::Completed,
            ExecutionStatus::Failed,
        ] {
            assert_eq!(status.to_string().parse::<ExecutionStatus>().unwrap(), status);
        }
        assert!("paused".parse::<ExecutionStatus>().is_err());
    }
}
