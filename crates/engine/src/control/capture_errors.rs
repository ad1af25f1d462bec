//! Collects child errors into a list variable instead of propagating them.

use serde_json::Value;

use scopeflow_types::NodeKind;

use crate::{
    context::Context,
    control::may_intercept,
    errors::{ErrorKind, FlowError, FlowResult},
    node::{Branch, Node, NodeRef, call_node, node},
    nodes::variables::json_type,
};

/// Runs children in the caller's scope, appending each captured error record
/// to `target`.
///
/// `target` is created as an empty list in the current scope when unbound. By
/// default the first captured error ends the block; with `try_all` every child
/// runs.
#[derive(Clone)]
pub struct CaptureErrors {
    target: String,
    nodes: Vec<NodeRef>,
    try_all: bool,
    only: Vec<ErrorKind>,
}

impl CaptureErrors {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            nodes: Vec::new(),
            try_all: false,
            only: Vec::new(),
        }
    }

    pub fn nodes(mut self, nodes: Vec<NodeRef>) -> Self {
        self.nodes.extend(nodes);
        self
    }

    pub fn then<N: Node + 'static>(mut self, child: N) -> Self {
        self.nodes.push(node(child));
        self
    }

    /// Keep running the remaining children after a captured error.
    pub fn try_all(mut self, try_all: bool) -> Self {
        self.try_all = try_all;
        self
    }

    /// Captures only `kind` and its descendants; anything else propagates.
    pub fn only(mut self, kind: ErrorKind) -> Self {
        self.only.push(kind);
        self
    }

    fn captures(&self, error: &FlowError, context: &Context) -> bool {
        may_intercept(error, context) && (self.only.is_empty() || self.only.iter().any(|kind| error.is_a(kind)))
    }

    fn record(&self, error: &FlowError, context: &mut Context) -> FlowResult<()> {
        let record = error.record().to_value();
        context.update(&self.target, |value| match value {
            Value::Array(items) => {
                items.push(record);
                Ok(())
            }
            other => Err(FlowError::variable_type(format!(
                "cannot capture errors into `{}`: expected array, found {}",
                self.target,
                json_type(other)
            ))),
        })?
    }
}

impl Node for CaptureErrors {
    fn kind(&self) -> NodeKind {
        NodeKind::CaptureErrors
    }

    fn name(&self) -> String {
        format!("Capture errors into `{}`", self.target)
    }

    fn execute(&self, context: &mut Context) -> FlowResult<()> {
        context.info(self.name());
        if !context.contains(&self.target) {
            context.bind(self.target.clone(), Value::Array(Vec::new()));
        }

        for child in &self.nodes {
            match call_node(child.as_ref(), context) {
                Ok(()) => {}
                Err(error) if self.captures(&error, context) => {
                    context.warn(format!("Captured {error}"));
                    context.clear_flow_trace();
                    self.record(&error, context)?;
                    if !self.try_all {
                        break;
                    }
                }
                Err(error) => return Err(error),
            }
        }
        Ok(())
    }

    fn branches(&self) -> Option<Vec<Branch<'_>>> {
        Some(vec![Branch::plain(self.nodes.as_slice())])
    }
}
