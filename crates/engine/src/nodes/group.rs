//! Plain sequencing composites.
//!
//! [`Group`] and [`Nodes`] run their children in order in the caller's scope.
//! Both accept an `and_finally` sequence that runs after the main sequence on
//! every path, and a log level applied while their children run.

use scopeflow_types::{NodeKind, TraceLevel};

use crate::{
    context::Context,
    errors::FlowResult,
    node::{Branch, Node, NodeRef, call_nodes, node},
};

/// Runs `finally` after a main sequence has finished, whatever its outcome.
pub(crate) fn run_finally(finally: &[NodeRef], context: &mut Context) -> FlowResult<()> {
    if finally.is_empty() {
        return Ok(());
    }
    context.debug("Finally");
    call_nodes(finally, context)
}

/// Runs `nodes`, then `finally` regardless of the outcome.
///
/// An error raised by `finally` replaces the outcome of `nodes`.
pub(crate) fn run_with_finally(nodes: &[NodeRef], finally: &[NodeRef], context: &mut Context) -> FlowResult<()> {
    let outcome = call_nodes(nodes, context);
    run_finally(finally, context)?;
    outcome
}

/// An ordered block of nodes sharing the caller's scope.
#[derive(Clone, Default)]
pub struct Group {
    name: Option<String>,
    nodes: Vec<NodeRef>,
    finally: Vec<NodeRef>,
    log_level: Option<TraceLevel>,
}

impl Group {
    pub fn new(nodes: Vec<NodeRef>) -> Self {
        Self {
            nodes,
            ..Self::default()
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Appends one child.
    pub fn then<N: Node + 'static>(mut self, child: N) -> Self {
        self.nodes.push(node(child));
        self
    }

    /// Appends several children.
    pub fn nodes(mut self, nodes: Vec<NodeRef>) -> Self {
        self.nodes.extend(nodes);
        self
    }

    /// Nodes run after the main sequence whether it succeeded or failed.
    pub fn and_finally(mut self, nodes: Vec<NodeRef>) -> Self {
        self.finally = nodes;
        self
    }

    /// Minimum log level while the children run.
    pub fn log_level(mut self, level: TraceLevel) -> Self {
        self.log_level = Some(level);
        self
    }

    fn run(&self, context: &mut Context) -> FlowResult<()> {
        let mut context = context.override_log_level(self.log_level);
        run_with_finally(&self.nodes, &self.finally, &mut context)
    }

    /// Main and finally nodes as one unlabelled sequence.
    fn sequence(&self) -> Branch<'_> {
        if self.finally.is_empty() {
            Branch::plain(self.nodes.as_slice())
        } else {
            Branch::plain(self.nodes.iter().chain(&self.finally).cloned().collect::<Vec<_>>())
        }
    }
}

impl Node for Group {
    fn kind(&self) -> NodeKind {
        NodeKind::Group
    }

    fn name(&self) -> String {
        self.name.clone().unwrap_or_else(|| "Group".to_string())
    }

    fn execute(&self, context: &mut Context) -> FlowResult<()> {
        self.run(context)
    }

    fn branches(&self) -> Option<Vec<Branch<'_>>> {
        Some(vec![self.sequence()])
    }
}

/// The base sequencing composite; identical to [`Group`] apart from its kind.
#[derive(Clone, Default)]
pub struct Nodes {
    inner: Group,
}

impl Nodes {
    pub fn new(nodes: Vec<NodeRef>) -> Self {
        Self { inner: Group::new(nodes) }
    }

    pub fn then<N: Node + 'static>(mut self, child: N) -> Self {
        self.inner = self.inner.then(child);
        self
    }

    pub fn and_finally(mut self, nodes: Vec<NodeRef>) -> Self {
        self.inner = self.inner.and_finally(nodes);
        self
    }

    pub fn log_level(mut self, level: TraceLevel) -> Self {
        self.inner = self.inner.log_level(level);
        self
    }
}

impl Node for Nodes {
    fn kind(&self) -> NodeKind {
        NodeKind::Nodes
    }

    fn name(&self) -> String {
        "Nodes".to_string()
    }

    fn execute(&self, context: &mut Context) -> FlowResult<()> {
        self.inner.run(context)
    }

    fn branches(&self) -> Option<Vec<Branch<'_>>> {
        Some(vec![self.inner.sequence()])
    }
}
