//! Leaf nodes that assign variables or emit log messages.

use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;

use scopeflow_types::{NodeKind, TraceLevel};
use scopeflow_util::human_join;

use crate::{
    context::Context,
    errors::{FlowError, FlowResult},
    node::Node,
};

type ComputeFn = dyn Fn(&Context) -> Value + Send + Sync;

/// Source of an assigned value.
#[derive(Clone)]
pub enum VarSource {
    Literal(Value),
    /// Evaluated against the context when the node runs.
    Computed(Arc<ComputeFn>),
}

impl VarSource {
    fn evaluate(&self, context: &Context) -> Value {
        match self {
            VarSource::Literal(value) => value.clone(),
            VarSource::Computed(compute) => compute(context),
        }
    }
}

#[derive(Clone, Default)]
struct Assignments(IndexMap<String, VarSource>);

impl Assignments {
    fn insert(&mut self, name: String, source: VarSource) {
        self.0.insert(name, source);
    }

    fn names(&self) -> String {
        let names: Vec<String> = self.0.keys().map(|name| format!("`{name}`")).collect();
        human_join(&names, "and")
    }

    /// Evaluates every source before anything is bound.
    fn evaluate(&self, context: &Context, only_unbound: bool) -> Vec<(String, Value)> {
        self.0
            .iter()
            .filter(|(name, _)| !only_unbound || !context.contains(name))
            .map(|(name, source)| (name.clone(), source.evaluate(context)))
            .collect()
    }
}

macro_rules! assignment_builders {
    ($node:ident) => {
        impl $node {
            pub fn new() -> Self {
                Self::default()
            }

            /// Node assigning a single literal value.
            pub fn value(name: impl Into<String>, value: Value) -> Self {
                Self::new().set(name, value)
            }

            /// Node assigning each `(name, value)` pair.
            pub fn values<I, K>(values: I) -> Self
            where
                I: IntoIterator<Item = (K, Value)>,
                K: Into<String>,
            {
                values.into_iter().fold(Self::new(), |node, (name, value)| node.set(name, value))
            }

            pub fn set(mut self, name: impl Into<String>, value: Value) -> Self {
                self.values.insert(name.into(), VarSource::Literal(value));
                self
            }

            /// Assigns the result of `compute`, evaluated when the node runs.
            pub fn compute<F>(mut self, name: impl Into<String>, compute: F) -> Self
            where
                F: Fn(&Context) -> Value + Send + Sync + 'static,
            {
                self.values.insert(name.into(), VarSource::Computed(Arc::new(compute)));
                self
            }
        }
    };
}

/// Binds values into the innermost scope.
#[derive(Clone, Default)]
pub struct SetVar {
    values: Assignments,
}

assignment_builders!(SetVar);

impl Node for SetVar {
    fn kind(&self) -> NodeKind {
        NodeKind::SetVar
    }

    fn name(&self) -> String {
        format!("Set value(s) for {}", self.values.names())
    }

    fn execute(&self, context: &mut Context) -> FlowResult<()> {
        context.info(self.name());
        let values = self.values.evaluate(context, false);
        context.bind_many(values);
        Ok(())
    }
}

/// Binds values into every scope, so they outlive the current one.
#[derive(Clone, Default)]
pub struct SetGlobalVar {
    values: Assignments,
}

assignment_builders!(SetGlobalVar);

impl Node for SetGlobalVar {
    fn kind(&self) -> NodeKind {
        NodeKind::SetGlobalVar
    }

    fn name(&self) -> String {
        format!("Set global value(s) for {}", self.values.names())
    }

    fn execute(&self, context: &mut Context) -> FlowResult<()> {
        context.info(self.name());
        for (name, value) in self.values.evaluate(context, false) {
            context.bind_global(name, value);
        }
        Ok(())
    }
}

/// Binds values only for names that do not resolve yet.
#[derive(Clone, Default)]
pub struct DefaultVar {
    values: Assignments,
}

assignment_builders!(DefaultVar);

impl Node for DefaultVar {
    fn kind(&self) -> NodeKind {
        NodeKind::DefaultVar
    }

    fn name(&self) -> String {
        format!("Default value(s) for {}", self.values.names())
    }

    fn execute(&self, context: &mut Context) -> FlowResult<()> {
        context.info(self.name());
        let values = self.values.evaluate(context, true);
        context.bind_many(values);
        Ok(())
    }
}

/// Formats a message and appends it to a list variable.
///
/// The list is created in the innermost scope when `target` is unbound; an
/// existing list is extended in place, so outer scopes see the new entry.
#[derive(Debug, Clone)]
pub struct Append {
    target: String,
    message: String,
}

impl Append {
    pub fn new(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            message: message.into(),
        }
    }
}

impl Node for Append {
    fn kind(&self) -> NodeKind {
        NodeKind::Append
    }

    fn name(&self) -> String {
        format!("Append `{}` to `{}`", self.message, self.target)
    }

    fn execute(&self, context: &mut Context) -> FlowResult<()> {
        let message = Value::String(context.format(&self.message));
        if !context.contains(&self.target) {
            context.bind(self.target.clone(), Value::Array(vec![message]));
            return Ok(());
        }
        context.update(&self.target, |value| match value {
            Value::Array(items) => {
                items.push(message);
                Ok(())
            }
            other => Err(FlowError::variable_type(format!(
                "cannot append to `{}`: expected array, found {}",
                self.target,
                json_type(other)
            ))),
        })?
    }
}

pub(crate) fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Formats a message and logs it at a fixed level.
#[derive(Debug, Clone)]
pub struct LogMessage {
    level: TraceLevel,
    message: String,
}

impl LogMessage {
    pub fn new(level: TraceLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }

    pub fn debug(message: impl Into<String>) -> Self {
        Self::new(TraceLevel::Debug, message)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(TraceLevel::Info, message)
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Self::new(TraceLevel::Warn, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(TraceLevel::Error, message)
    }
}

impl Node for LogMessage {
    fn kind(&self) -> NodeKind {
        NodeKind::LogMessage
    }

    fn name(&self) -> String {
        format!("Log `{}`", self.message)
    }

    fn execute(&self, context: &mut Context) -> FlowResult<()> {
        let message = context.format(&self.message);
        context.log(self.level, message);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Workflow, nodes, testing::call_node};
    use serde_json::json;

    #[test]
    fn set_var_evaluates_before_binding() {
        let node = SetVar::value("a", json!(1)).compute("b", |context| json!(context.get("a").is_some()));
        let context = call_node(&node, Vec::<(&str, Value)>::new()).unwrap();
        assert_eq!(context.get("a"), Some(json!(1)));
        assert_eq!(context.get("b"), Some(json!(false)));
    }

    #[test]
    fn default_var_keeps_existing_values() {
        let node = DefaultVar::values([("name", json!("default")), ("other", json!(2))]);
        let context = call_node(&node, [("name", json!("given"))]).unwrap();
        assert_eq!(context.get("name"), Some(json!("given")));
        assert_eq!(context.get("other"), Some(json!(2)));
    }

    #[test]
    fn global_var_escapes_nested_workflow() {
        let workflow = Workflow::new("outer").nested(nodes![SetGlobalVar::value("flag", json!(true)), SetVar::value("local", json!(1))]);
        let mut context = Context::new();
        crate::call_node(&workflow, &mut context).unwrap();
        assert_eq!(context.get("flag"), Some(json!(true)));
        assert!(!context.contains("local"));
    }

    #[test]
    fn append_creates_then_extends() {
        let node = Append::new("messages", "hello {who}");
        let mut context = Context::new();
        context.bind("who", json!("world"));
        crate::call_node(&node, &mut context).unwrap();
        crate::call_node(&node, &mut context).unwrap();
        assert_eq!(context.get("messages"), Some(json!(["hello world", "hello world"])));
    }

    #[test]
    fn append_rejects_non_lists() {
        let error = call_node(&Append::new("messages", "x"), [("messages", json!("text"))]).unwrap_err();
        assert!(error.is_a(&crate::ErrorKind::variable_type()));
    }

    #[test]
    fn log_message_formats_at_level() {
        let context = call_node(&LogMessage::warn("count is {count}"), [("count", json!(3))]).unwrap();
        let records = context.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].level, TraceLevel::Warn);
        assert_eq!(records[0].message, "count is 3");
    }
}
