//! The node protocol.
//!
//! A node is the single unit of execution: it receives the [`Context`], may read
//! and write variables, may log, and either returns `Ok(())` or a structured
//! [`FlowError`]. Leaves (steps, variable nodes) and composites implement the
//! same trait; composites run their children through [`call_node`] so every
//! visited node leaves a trace entry and every failure is tagged with the node
//! that raised it.

use std::{borrow::Cow, fmt::Write as _, sync::Arc};

use scopeflow_types::{BranchDescriptor, NodeDescriptor, NodeKind};

use crate::{
    context::Context,
    errors::{FlowError, FlowResult},
};

/// Shared, immutable handle to a node. Trees are built once and may be executed
/// many times.
pub type NodeRef = Arc<dyn Node>;

/// A labelled child sequence exposed for introspection.
pub struct Branch<'a> {
    /// Empty for a composite's plain child sequence.
    pub label: Cow<'a, str>,
    pub nodes: Cow<'a, [NodeRef]>,
}

impl<'a> Branch<'a> {
    pub fn new(label: impl Into<Cow<'a, str>>, nodes: impl Into<Cow<'a, [NodeRef]>>) -> Self {
        Self {
            label: label.into(),
            nodes: nodes.into(),
        }
    }

    /// An unlabelled sequence.
    pub fn plain(nodes: impl Into<Cow<'a, [NodeRef]>>) -> Self {
        Self::new("", nodes)
    }
}

/// Executable unit of a workflow.
pub trait Node: Send + Sync {
    fn kind(&self) -> NodeKind;

    /// Declared name; may contain `{placeholders}` formatted at execution time.
    fn name(&self) -> String;

    /// Runs the node against `context`.
    fn execute(&self, context: &mut Context) -> FlowResult<()>;

    /// Child sequences, or `None` for leaves.
    fn branches(&self) -> Option<Vec<Branch<'_>>> {
        None
    }

    /// Describes this node and its descendants without executing anything.
    fn descriptor(&self) -> NodeDescriptor {
        match self.branches() {
            None => NodeDescriptor::leaf(self.kind(), self.name()),
            Some(branches) => {
                let branches = branches
                    .into_iter()
                    .map(|branch| BranchDescriptor {
                        label: branch.label.into_owned(),
                        nodes: branch.nodes.iter().map(|child| child.descriptor()).collect(),
                    })
                    .collect();
                NodeDescriptor::composite(self.kind(), self.name(), branches)
            }
        }
    }
}

/// Wraps a concrete node into a [`NodeRef`].
pub fn node<N: Node + 'static>(node: N) -> NodeRef {
    Arc::new(node)
}

/// Builds a `Vec<NodeRef>` from concrete nodes.
///
/// ```rust
/// use scopeflow_engine::{nodes, LogMessage, SetVar};
/// use serde_json::json;
///
/// let body = nodes![SetVar::value("greeting", json!("hello")), LogMessage::info("{greeting}")];
/// assert_eq!(body.len(), 2);
/// ```
#[macro_export]
macro_rules! nodes {
    () => {
        ::std::vec::Vec::<$crate::NodeRef>::new()
    };
    ($($node:expr),+ $(,)?) => {
        ::std::vec![$($crate::node($node)),+]
    };
}

/// Executes one node, recording it in the trace and tagging errors with its label.
pub fn call_node(node: &dyn Node, context: &mut Context) -> FlowResult<()> {
    let name = node.name();
    let label = context.try_format(&name).unwrap_or(name);
    context.trace(label.clone());
    node.execute(context).map_err(|error| annotate(error, label, context))
}

fn annotate(error: FlowError, label: String, context: &mut Context) -> FlowError {
    if !error.is_skip() {
        context.capture_trace(false);
    }
    error.with_node(label)
}

/// Executes a sequence in order, stopping at the first error.
pub fn call_nodes(nodes: &[NodeRef], context: &mut Context) -> FlowResult<()> {
    for child in nodes {
        call_node(child.as_ref(), context)?;
    }
    Ok(())
}

/// Describes a node tree.
pub fn describe(node: &dyn Node) -> NodeDescriptor {
    node.descriptor()
}

/// Renders an indented outline of a node tree.
///
/// ```rust
/// use scopeflow_engine::{nodes, outline, Conditional, LogMessage, Workflow};
///
/// let workflow = Workflow::new("Release")
///     .then(Conditional::variable("dry_run").when_true(nodes![LogMessage::info("dry run")]));
/// assert_eq!(
///     outline(&workflow),
///     "Release - collection\n  Condition `dry_run` - multi-branch\n    [true]\n      Log `dry run` - leaf\n    [false]\n"
/// );
/// ```
pub fn outline(node: &dyn Node) -> String {
    let mut rendered = String::new();
    render_outline(&node.descriptor(), 0, &mut rendered);
    rendered
}

fn render_outline(descriptor: &NodeDescriptor, depth: usize, out: &mut String) {
    let indent = "  ".repeat(depth);
    let _ = writeln!(out, "{indent}{} - {}", descriptor.name, descriptor.shape());
    for branch in descriptor.branches.iter().flatten() {
        let mut child_depth = depth + 1;
        if !branch.label.is_empty() {
            let _ = writeln!(out, "{indent}  [{}]", branch.label);
            child_depth += 1;
        }
        for child in &branch.nodes {
            render_outline(child, child_depth, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Append, Group};
    use serde_json::json;

    #[test]
    fn call_node_tags_errors_with_formatted_label() {
        struct Failing;
        impl Node for Failing {
            fn kind(&self) -> NodeKind {
                NodeKind::Step
            }
            fn name(&self) -> String {
                "Fail for {who}".into()
            }
            fn execute(&self, _context: &mut Context) -> FlowResult<()> {
                Err(FlowError::runtime("nope"))
            }
        }

        let mut context = Context::new();
        context.bind("who", json!("Ada"));
        let error = call_node(&Failing, &mut context).unwrap_err();
        assert_eq!(error.node(), Some("Fail for Ada"));
        assert_eq!(context.flow_trace().unwrap().labels(), vec!["Fail for Ada"]);
    }

    #[test]
    fn descriptor_walks_children() {
        let group = Group::new(nodes![Append::new("log", "a"), Append::new("log", "b")]).named("Pair");
        let descriptor = describe(&group);
        assert_eq!(descriptor.kind, NodeKind::Group);
        assert_eq!(descriptor.name, "Pair");
        assert_eq!(descriptor.count(), 3);
        assert_eq!(outline(&group), "Pair - collection\n  Append `a` to `log` - leaf\n  Append `b` to `log` - leaf\n");
    }
}
