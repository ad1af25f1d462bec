//! Composite wrapping its children between `enter` and `exit` hooks.

use scopeflow_types::NodeKind;

use crate::{
    context::Context,
    errors::{FlowError, FlowResult},
    node::{Branch, Node, NodeRef, call_nodes, node},
};

/// Setup and teardown around a block of nodes.
pub trait ContextHook: Send + Sync {
    /// Runs before the children; an error here skips both the children and `exit`.
    fn enter(&self, context: &mut Context) -> FlowResult<()>;

    /// Runs after the children on every path. `error` is the children's failure, if any.
    fn exit(&self, context: &mut Context, error: Option<&FlowError>) -> FlowResult<()>;
}

/// Runs its children between a hook's `enter` and `exit`.
///
/// The children's error is returned after `exit`, unless `exit` itself fails.
pub struct WithContext<H> {
    name: String,
    hook: H,
    nodes: Vec<NodeRef>,
}

impl<H: ContextHook> WithContext<H> {
    pub fn new(hook: H) -> Self {
        Self {
            name: "With context".to_string(),
            hook,
            nodes: Vec::new(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn then<N: Node + 'static>(mut self, child: N) -> Self {
        self.nodes.push(node(child));
        self
    }

    pub fn nodes(mut self, nodes: Vec<NodeRef>) -> Self {
        self.nodes.extend(nodes);
        self
    }
}

impl<H: ContextHook> Node for WithContext<H> {
    fn kind(&self) -> NodeKind {
        NodeKind::WithContext
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn execute(&self, context: &mut Context) -> FlowResult<()> {
        self.hook.enter(context)?;
        let outcome = call_nodes(&self.nodes, context);
        self.hook.exit(context, outcome.as_ref().err())?;
        outcome
    }

    fn branches(&self) -> Option<Vec<Branch<'_>>> {
        Some(vec![Branch::plain(self.nodes.as_slice())])
    }
}
