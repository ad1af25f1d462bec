//! Introspectable node tree descriptors.
//!
//! A descriptor captures the shape of a workflow (node kinds, labels, and nested
//! branches) so that tooling can render it without executing anything.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind tag for every node variant the engine provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Step,
    Group,
    Nodes,
    Workflow,
    Conditional,
    FeatureEnabled,
    Switch,
    ForEach,
    ParallelForEach,
    TryExcept,
    TryUntil,
    CaptureErrors,
    WithContext,
    SetVar,
    SetGlobalVar,
    DefaultVar,
    Append,
    LogMessage,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = serde_json::to_value(self).ok();
        let label = value.as_ref().and_then(|value| value.as_str()).unwrap_or("node");
        f.write_str(label)
    }
}

/// A labelled sequence of child nodes (for example the `true` arm of a conditional).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchDescriptor {
    /// Branch label; empty for a plain child sequence.
    pub label: String,
    pub nodes: Vec<NodeDescriptor>,
}

/// Shape of a node and its descendants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDescriptor {
    pub kind: NodeKind,
    /// Declared name or label (unformatted; may contain `{placeholders}`).
    pub name: String,
    /// `None` for leaves; `Some` (possibly empty) for composites.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branches: Option<Vec<BranchDescriptor>>,
}

impl NodeDescriptor {
    /// Descriptor for a node without children.
    pub fn leaf(kind: NodeKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            branches: None,
        }
    }

    /// Descriptor for a composite node.
    pub fn composite(kind: NodeKind, name: impl Into<String>, branches: Vec<BranchDescriptor>) -> Self {
        Self {
            kind,
            name: name.into(),
            branches: Some(branches),
        }
    }

    /// Classifies the node for outlines: `leaf`, `collection` (single unlabelled
    /// sequence), or `multi-branch`.
    pub fn shape(&self) -> &'static str {
        match &self.branches {
            None => "leaf",
            Some(branches) if branches.len() == 1 && branches[0].label.is_empty() => "collection",
            Some(_) => "multi-branch",
        }
    }

    /// Total number of nodes in this subtree, including `self`.
    pub fn count(&self) -> usize {
        1 + self
            .branches
            .iter()
            .flatten()
            .flat_map(|branch| branch.nodes.iter())
            .map(NodeDescriptor::count)
            .sum::<usize>()
    }
}
