//! Two-way branching on a variable or predicate.

use std::sync::Arc;

use serde_json::Value;

use scopeflow_types::NodeKind;
use scopeflow_util::is_truthy;

use crate::{
    context::Context,
    errors::FlowResult,
    node::{Branch, Node, NodeRef, call_nodes},
};

type PredicateFn = dyn Fn(&Context) -> bool + Send + Sync;

/// Test evaluated by a [`Conditional`].
#[derive(Clone)]
pub enum Condition {
    /// Truthiness of a context variable; an unbound variable is false.
    Variable(String),
    Predicate(Arc<PredicateFn>),
}

impl Condition {
    fn evaluate(&self, context: &Context) -> bool {
        match self {
            Condition::Variable(name) => context.get(name).is_some_and(|value| is_truthy(&value)),
            Condition::Predicate(predicate) => predicate(context),
        }
    }
}

/// Runs exactly one of two branches in the caller's scope.
///
/// ```rust
/// use scopeflow_engine::{nodes, testing::call_node, Append, If};
/// use serde_json::json;
///
/// let node = If::predicate(|context| context.get("errors").is_some_and(|errors| errors != json!([])))
///     .when_true(nodes![Append::new("summary", "failed")])
///     .when_false(nodes![Append::new("summary", "passed")]);
/// let context = call_node(&node, [("errors", json!([]))]).unwrap();
/// assert_eq!(context.get("summary"), Some(json!(["passed"])));
/// ```
#[derive(Clone)]
pub struct Conditional {
    condition: Condition,
    when_true: Vec<NodeRef>,
    when_false: Vec<NodeRef>,
}

/// Alias reading naturally in workflow definitions.
pub type If = Conditional;

impl Conditional {
    pub fn new(condition: Condition) -> Self {
        Self {
            condition,
            when_true: Vec::new(),
            when_false: Vec::new(),
        }
    }

    /// Branches on the truthiness of the variable `name`.
    pub fn variable(name: impl Into<String>) -> Self {
        Self::new(Condition::Variable(name.into()))
    }

    pub fn predicate<F>(predicate: F) -> Self
    where
        F: Fn(&Context) -> bool + Send + Sync + 'static,
    {
        Self::new(Condition::Predicate(Arc::new(predicate)))
    }

    pub fn when_true(mut self, nodes: Vec<NodeRef>) -> Self {
        self.when_true = nodes;
        self
    }

    pub fn when_false(mut self, nodes: Vec<NodeRef>) -> Self {
        self.when_false = nodes;
        self
    }
}

impl Node for Conditional {
    fn kind(&self) -> NodeKind {
        NodeKind::Conditional
    }

    fn name(&self) -> String {
        match &self.condition {
            Condition::Variable(name) => format!("Condition `{name}`"),
            Condition::Predicate(_) => "Conditional branch".to_string(),
        }
    }

    fn execute(&self, context: &mut Context) -> FlowResult<()> {
        let outcome = self.condition.evaluate(context);
        context.info(format!("Condition is {outcome}"));
        context.set_trace_args([("condition", Value::Bool(outcome))]);

        let branch = if outcome { &self.when_true } else { &self.when_false };
        call_nodes(branch, context)
    }

    fn branches(&self) -> Option<Vec<Branch<'_>>> {
        Some(vec![
            Branch::new("true", self.when_true.as_slice()),
            Branch::new("false", self.when_false.as_slice()),
        ])
    }
}
