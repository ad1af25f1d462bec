//! Ordered iteration over a list variable.
//!
//! Each element is bound (or unpacked) into a fresh scope before the loop body
//! runs, so loop variables and anything the body binds are gone once the
//! iteration ends. There is no `break`: a body that needs to stop early raises
//! an error.

use serde_json::Value;

use scopeflow_types::NodeKind;

use crate::{
    context::Context,
    errors::{FlowError, FlowResult},
    node::{Branch, Node, NodeRef, call_nodes, node},
    nodes::variables::json_type,
};

/// Splits a comma separated target list (`"name, age"`) into names.
pub(crate) fn parse_targets(targets: &str) -> Vec<String> {
    targets
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(String::from)
        .collect()
}

pub(crate) fn targets_label(targets: &[String]) -> String {
    let names: Vec<String> = targets.iter().map(|name| format!("`{name}`")).collect();
    match names.as_slice() {
        [single] => single.clone(),
        _ => format!("({})", names.join(", ")),
    }
}

/// Binds `item` to `targets`, unpacking arrays when there are several targets.
pub(crate) fn unpack(targets: &[String], item: Value) -> FlowResult<Vec<(String, Value)>> {
    if let [single] = targets {
        return Ok(vec![(single.clone(), item)]);
    }
    match item {
        Value::Array(values) if values.len() == targets.len() => Ok(targets.iter().cloned().zip(values).collect()),
        Value::Array(values) => Err(FlowError::variable_type(format!(
            "expected {} values to unpack into {}, found {}",
            targets.len(),
            targets_label(targets),
            values.len()
        ))),
        other => Err(FlowError::variable_type(format!(
            "cannot unpack {} into {}",
            json_type(&other),
            targets_label(targets)
        ))),
    }
}

/// Reads the list a loop iterates over.
pub(crate) fn source_items(context: &Context, in_var: &str) -> FlowResult<Vec<Value>> {
    match context.get(in_var) {
        Some(Value::Array(items)) => Ok(items),
        Some(other) => Err(FlowError::runtime(format!(
            "Variable `{in_var}` is not iterable (found {})",
            json_type(&other)
        ))),
        None => Err(FlowError::missing_variable(format!("Variable `{in_var}` not found in context"))),
    }
}

/// Runs a body once per element of a list variable.
///
/// ```rust
/// use scopeflow_engine::{nodes, testing::call_node, Append, ForEach};
/// use serde_json::json;
///
/// let roll = ForEach::new("name, age", "students")
///     .body(nodes![Append::new("lines", "{name} is {age}")]);
/// let context = call_node(&roll, [("students", json!([["Ada", 36], ["Alan", 41]])), ("lines", json!([]))]).unwrap();
/// assert_eq!(context.get("lines"), Some(json!(["Ada is 36", "Alan is 41"])));
/// ```
#[derive(Clone)]
pub struct ForEach {
    targets: Vec<String>,
    in_var: String,
    nodes: Vec<NodeRef>,
    loop_label: Option<String>,
}

impl ForEach {
    /// `targets` is one name or a comma separated list to unpack each element into.
    pub fn new(targets: &str, in_var: impl Into<String>) -> Self {
        Self {
            targets: parse_targets(targets),
            in_var: in_var.into(),
            nodes: Vec::new(),
            loop_label: None,
        }
    }

    /// Per-iteration label, formatted inside the iteration scope.
    pub fn loop_label(mut self, label: impl Into<String>) -> Self {
        self.loop_label = Some(label.into());
        self
    }

    pub fn body(mut self, nodes: Vec<NodeRef>) -> Self {
        self.nodes = nodes;
        self
    }

    pub fn then<N: Node + 'static>(mut self, child: N) -> Self {
        self.nodes.push(node(child));
        self
    }
}

impl Node for ForEach {
    fn kind(&self) -> NodeKind {
        NodeKind::ForEach
    }

    fn name(&self) -> String {
        format!("For {} in `{}`", targets_label(&self.targets), self.in_var)
    }

    fn execute(&self, context: &mut Context) -> FlowResult<()> {
        if self.targets.is_empty() {
            return Err(FlowError::setup(format!("loop over `{}` has no target variables", self.in_var)));
        }
        context.info(self.name());

        let items = source_items(context, &self.in_var)?;
        let total = items.len();
        for (index, item) in items.into_iter().enumerate() {
            let bindings = unpack(&self.targets, item)?;
            context.set_trace_args(bindings.clone());

            let mut scope = context.enter_scope();
            scope.bind_many(bindings);
            let label = match &self.loop_label {
                Some(template) => scope.format(template),
                None => format!("Iteration {} of {total}", index + 1),
            };
            scope.info(label.clone());
            scope.trace(label);
            call_nodes(&self.nodes, &mut scope)?;
        }
        Ok(())
    }

    fn branches(&self) -> Option<Vec<Branch<'_>>> {
        Some(vec![Branch::new("loop", self.nodes.as_slice())])
    }
}
