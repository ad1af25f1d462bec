//! Multi-way branching on a selector value.

use std::sync::Arc;

use serde_json::Value;

use scopeflow_types::NodeKind;
use scopeflow_util::display_value;

use crate::{
    context::Context,
    errors::FlowResult,
    node::{Branch, Node, NodeRef, call_nodes},
};

type SelectorFn = dyn Fn(&Context) -> Value + Send + Sync;

/// Produces the value a [`Switch`] dispatches on.
#[derive(Clone)]
pub enum Selector {
    /// Value of a context variable; an unbound variable selects `null`.
    Variable(String),
    Function(Arc<SelectorFn>),
}

impl Selector {
    fn select(&self, context: &Context) -> Value {
        match self {
            Selector::Variable(name) => context.get(name).unwrap_or(Value::Null),
            Selector::Function(select) => select(context),
        }
    }
}

/// Runs the first case equal to the selected value, or the default branch.
#[derive(Clone)]
pub struct Switch {
    selector: Selector,
    cases: Vec<(Value, Vec<NodeRef>)>,
    default: Option<Vec<NodeRef>>,
}

impl Switch {
    pub fn new(selector: Selector) -> Self {
        Self {
            selector,
            cases: Vec::new(),
            default: None,
        }
    }

    pub fn variable(name: impl Into<String>) -> Self {
        Self::new(Selector::Variable(name.into()))
    }

    pub fn function<F>(select: F) -> Self
    where
        F: Fn(&Context) -> Value + Send + Sync + 'static,
    {
        Self::new(Selector::Function(Arc::new(select)))
    }

    /// Registers a case; earlier registrations win when values repeat.
    ///
    /// Numbers match by numeric value, so a case of `1.0` matches a selected `1`.
    pub fn case(mut self, value: impl Into<Value>, nodes: Vec<NodeRef>) -> Self {
        self.cases.push((value.into(), nodes));
        self
    }

    pub fn default(mut self, nodes: Vec<NodeRef>) -> Self {
        self.default = Some(nodes);
        self
    }
}

impl Node for Switch {
    fn kind(&self) -> NodeKind {
        NodeKind::Switch
    }

    fn name(&self) -> String {
        let cases: Vec<String> = self.cases.iter().map(|(value, _)| display_value(value)).collect();
        format!("Switch into {}", cases.join(", "))
    }

    fn execute(&self, context: &mut Context) -> FlowResult<()> {
        let value = self.selector.select(context);
        let shown = display_value(&value);

        let branch = match self.cases.iter().find(|(case, _)| values_match(case, &value)) {
            Some((_, nodes)) => {
                context.info(format!("Switch {shown} matched branch"));
                nodes
            }
            None => match &self.default {
                Some(nodes) => {
                    context.info(format!("Switch {shown} -> default"));
                    nodes
                }
                None => {
                    context.info(format!("Switch {shown} not matched"));
                    return Ok(());
                }
            },
        };

        context.set_trace_args([("switch", value)]);
        call_nodes(branch, context)
    }

    fn branches(&self) -> Option<Vec<Branch<'_>>> {
        let mut branches: Vec<Branch<'_>> = self
            .cases
            .iter()
            .map(|(value, nodes)| Branch::new(display_value(value), nodes.as_slice()))
            .collect();
        if let Some(nodes) = &self.default {
            branches.push(Branch::new("*DEFAULT*", nodes.as_slice()));
        }
        Some(branches)
    }
}

fn values_match(case: &Value, value: &Value) -> bool {
    match (case, value) {
        (Value::Number(left), Value::Number(right)) => left == right || left.as_f64() == right.as_f64(),
        _ => case == value,
    }
}
