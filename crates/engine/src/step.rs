//! Leaf nodes wrapping a computation with declared variable bindings.
//!
//! A [`Step`] resolves its declared inputs from the context, calls its
//! computation with them, and binds the declared outputs into the innermost
//! scope. The computation returns `anyhow::Result`; errors that are not already
//! a [`FlowError`] surface as `StepFailedError` carrying the original as cause.

use std::sync::Arc;

use anyhow::{Context as _, anyhow};
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde_json::Value;

use scopeflow_types::NodeKind;
use scopeflow_util::human_join;

use crate::{
    context::Context,
    errors::{ErrorKind, FlowError, FlowResult},
    node::Node,
};

type StepFn = dyn Fn(&Context, &StepArgs) -> anyhow::Result<StepOutput> + Send + Sync;

/// Value returned by a step computation.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum StepOutput {
    #[default]
    Nothing,
    Value(Value),
    /// Positional values for a step with several outputs.
    Tuple(Vec<Value>),
    /// Values keyed by output role.
    Named(IndexMap<String, Value>),
}

impl From<()> for StepOutput {
    fn from(_: ()) -> Self {
        StepOutput::Nothing
    }
}

impl From<Value> for StepOutput {
    fn from(value: Value) -> Self {
        StepOutput::Value(value)
    }
}

impl From<IndexMap<String, Value>> for StepOutput {
    fn from(values: IndexMap<String, Value>) -> Self {
        StepOutput::Named(values)
    }
}

/// Resolved inputs handed to a step computation, keyed by role.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepArgs {
    values: IndexMap<String, Value>,
}

impl StepArgs {
    pub fn get(&self, role: &str) -> Option<&Value> {
        self.values.get(role)
    }

    pub fn contains(&self, role: &str) -> bool {
        self.values.contains_key(role)
    }

    /// Returns the input bound to `role` or an error naming it.
    pub fn require(&self, role: &str) -> anyhow::Result<&Value> {
        self.values.get(role).ok_or_else(|| anyhow!("input `{role}` was not provided"))
    }

    /// Deserializes the input bound to `role`.
    pub fn get_as<T: DeserializeOwned>(&self, role: &str) -> anyhow::Result<T> {
        let value = self.require(role)?;
        serde_json::from_value(value.clone()).with_context(|| format!("input `{role}` has an unexpected shape"))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[derive(Debug, Clone)]
struct InputBinding {
    context_name: String,
    role: String,
    default: Option<Value>,
    optional: bool,
}

#[derive(Debug, Clone)]
struct OutputBinding {
    role: String,
    context_name: String,
}

/// A leaf node around a computation.
///
/// ```rust
/// use scopeflow_engine::{testing::call_node, Step};
/// use serde_json::json;
///
/// let double = Step::new("Double {n}", |args| Ok(json!(args.get_as::<i64>("n")? * 2)))
///     .input("n")
///     .output("doubled");
/// let context = call_node(&double, [("n", json!(21))]).unwrap();
/// assert_eq!(context.get("doubled"), Some(json!(42)));
/// ```
#[derive(Clone)]
pub struct Step {
    name: String,
    inputs: Vec<InputBinding>,
    outputs: Vec<OutputBinding>,
    ignored: Vec<ErrorKind>,
    func: Arc<StepFn>,
}

impl Step {
    pub fn new<F, R>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&StepArgs) -> anyhow::Result<R> + Send + Sync + 'static,
        R: Into<StepOutput>,
    {
        Self::with_context(name, move |_context, args| func(args))
    }

    /// A step whose computation also receives read access to the context.
    pub fn with_context<F, R>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&Context, &StepArgs) -> anyhow::Result<R> + Send + Sync + 'static,
        R: Into<StepOutput>,
    {
        Self {
            name: name.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            ignored: Vec::new(),
            func: Arc::new(move |context, args| func(context, args).map(Into::into)),
        }
    }

    fn with_input(mut self, binding: InputBinding) -> Self {
        self.inputs.push(binding);
        self
    }

    /// Required input read from the variable of the same name.
    pub fn input(self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.input_as(name.clone(), name)
    }

    /// Required input read from `context_name` and passed as `role`.
    pub fn input_as(self, context_name: impl Into<String>, role: impl Into<String>) -> Self {
        self.with_input(InputBinding {
            context_name: context_name.into(),
            role: role.into(),
            default: None,
            optional: false,
        })
    }

    /// Input that falls back to `default` when the variable is unbound.
    pub fn input_or(self, name: impl Into<String>, default: Value) -> Self {
        let name = name.into();
        self.with_input(InputBinding {
            context_name: name.clone(),
            role: name,
            default: Some(default),
            optional: false,
        })
    }

    /// Input omitted from the arguments when the variable is unbound.
    pub fn optional_input(self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.with_input(InputBinding {
            context_name: name.clone(),
            role: name,
            default: None,
            optional: true,
        })
    }

    /// Binds the result to the variable `name`.
    pub fn output(self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.output_as(name.clone(), name)
    }

    /// Binds the result value for `role` to `context_name`.
    pub fn output_as(mut self, role: impl Into<String>, context_name: impl Into<String>) -> Self {
        self.outputs.push(OutputBinding {
            role: role.into(),
            context_name: context_name.into(),
        });
        self
    }

    /// Swallows errors of `kind` (and its descendants) with a warning.
    pub fn ignore(mut self, kind: ErrorKind) -> Self {
        self.ignored.push(kind);
        self
    }

    fn resolve_inputs(&self, context: &Context, label: &str) -> FlowResult<StepArgs> {
        let mut values = IndexMap::new();
        let mut missing = Vec::new();
        for binding in &self.inputs {
            match (context.get(&binding.context_name), &binding.default) {
                (Some(value), _) => {
                    values.insert(binding.role.clone(), value);
                }
                (None, Some(default)) => {
                    values.insert(binding.role.clone(), default.clone());
                }
                (None, None) if binding.optional => {}
                (None, None) => missing.push(format!("`{}`", binding.context_name)),
            }
        }

        if missing.is_empty() {
            return Ok(StepArgs { values });
        }
        let noun = if missing.len() == 1 { "variable" } else { "variables" };
        Err(FlowError::missing_variable(format!(
            "Step `{label}` is missing required {noun} {}",
            human_join(&missing, "and")
        )))
    }

    fn handle_failure(&self, error: anyhow::Error, context: &Context, label: &str) -> FlowResult<()> {
        let error = match error.downcast::<FlowError>() {
            Ok(flow_error) => flow_error,
            Err(other) => FlowError::step_failed(format!("Step `{label}` failed: {other}")).with_cause(other),
        };

        if error.is_skip() {
            context.warn(format!("Skipping step `{label}`: {}", error.message()));
            return Ok(());
        }
        if error.is_fatal() {
            context.error(format!("Fatal error in step `{label}`: {}", error.message()));
            return Err(error);
        }
        if self.ignored.iter().any(|kind| error.is_a(kind)) {
            context.warn(format!("Ignoring {error}"));
            return Ok(());
        }
        Err(error)
    }

    fn bind_outputs(&self, output: StepOutput, context: &mut Context, label: &str) -> FlowResult<()> {
        match self.outputs.as_slice() {
            [] => Ok(()),
            [single] => {
                let value = match output {
                    StepOutput::Nothing => Value::Null,
                    StepOutput::Value(value) => value,
                    StepOutput::Tuple(values) => Value::Array(values),
                    StepOutput::Named(values) => Value::Object(values.into_iter().collect()),
                };
                context.bind(single.context_name.clone(), value);
                Ok(())
            }
            many => match output {
                StepOutput::Tuple(values) | StepOutput::Value(Value::Array(values)) if values.len() == many.len() => {
                    for (binding, value) in many.iter().zip(values) {
                        context.bind(binding.context_name.clone(), value);
                    }
                    Ok(())
                }
                StepOutput::Named(values) => bind_named(many, |role| values.get(role).cloned(), context, label),
                StepOutput::Value(Value::Object(values)) => bind_named(many, |role| values.get(role).cloned(), context, label),
                other => Err(FlowError::variable_type(format!(
                    "Step `{label}` declares {} outputs but returned {}",
                    many.len(),
                    describe_output(&other)
                ))),
            },
        }
    }
}

fn bind_named<F>(bindings: &[OutputBinding], lookup: F, context: &mut Context, label: &str) -> FlowResult<()>
where
    F: Fn(&str) -> Option<Value>,
{
    let mut resolved = Vec::with_capacity(bindings.len());
    for binding in bindings {
        let value = lookup(&binding.role).ok_or_else(|| {
            FlowError::variable_type(format!("Step `{label}` did not return a value for output `{}`", binding.role))
        })?;
        resolved.push((binding.context_name.clone(), value));
    }
    context.bind_many(resolved);
    Ok(())
}

fn describe_output(output: &StepOutput) -> String {
    match output {
        StepOutput::Nothing => "nothing".into(),
        StepOutput::Tuple(values) => format!("{} values", values.len()),
        StepOutput::Value(Value::Array(values)) => format!("{} values", values.len()),
        StepOutput::Value(_) => "a single value".into(),
        StepOutput::Named(values) => format!("{} named values", values.len()),
    }
}

impl Node for Step {
    fn kind(&self) -> NodeKind {
        NodeKind::Step
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn execute(&self, context: &mut Context) -> FlowResult<()> {
        let label = context.format(&self.name);
        context.info(format!("Step `{label}`"));

        let args = self.resolve_inputs(context, &label)?;
        match (self.func)(context, &args) {
            Ok(output) => self.bind_outputs(output, context, &label),
            Err(error) => self.handle_failure(error, context, &label),
        }
    }
}

/// Ready-made steps.
pub mod steps {
    use super::*;

    /// Fails with `StepFailedError`; `message` is formatted against the context.
    pub fn failed(message: impl Into<String>) -> Step {
        let message = message.into();
        Step::with_context(format!("Failed: {message}"), move |context, _| -> anyhow::Result<()> {
            Err(FlowError::step_failed(context.format(&message)).into())
        })
    }

    /// Fails with `FatalError`; `message` is formatted against the context.
    pub fn fatal(message: impl Into<String>) -> Step {
        let message = message.into();
        Step::with_context(format!("Fatal: {message}"), move |context, _| -> anyhow::Result<()> {
            Err(FlowError::fatal(context.format(&message)).into())
        })
    }

    /// Copies the value of `source` into `target`.
    pub fn alias(source: impl Into<String>, target: impl Into<String>) -> Step {
        let source = source.into();
        let target = target.into();
        Step::new(format!("Alias `{source}` as `{target}`"), |args| Ok(args.require("value")?.clone()))
            .input_as(source, "value")
            .output(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{skip_step, testing::call_node};
    use indexmap::indexmap;
    use serde_json::json;

    #[test]
    fn missing_inputs_are_listed_together() {
        let step = Step::new("Join", |_| Ok(())).input("first").input("second");
        let error = call_node(&step, [("unrelated", json!(1))]).unwrap_err();
        assert!(error.is_a(&ErrorKind::missing_variable()));
        assert_eq!(error.message(), "Step `Join` is missing required variables `first` and `second`");
    }

    #[test]
    fn defaults_and_optional_inputs() {
        let step = Step::new("Collect", |args| Ok(json!({"keys": args.iter().map(|(k, _)| k.clone()).collect::<Vec<_>>()})))
            .input_or("limit", json!(10))
            .optional_input("filter")
            .output("seen");
        let context = call_node(&step, Vec::<(&str, Value)>::new()).unwrap();
        assert_eq!(context.get("seen"), Some(json!({"keys": ["limit"]})));
    }

    #[test]
    fn input_roles_rename_variables() {
        let step = Step::new("Greet", |args| Ok(json!(format!("hi {}", args.get_as::<String>("who")?))))
            .input_as("user_name", "who")
            .output_as("greeting", "message");
        let context = call_node(&step, [("user_name", json!("Ada"))]).unwrap();
        assert_eq!(context.get("message"), Some(json!("hi Ada")));
    }

    #[test]
    fn tuple_outputs_bind_by_position() {
        let step = Step::new("Split", |_| Ok(StepOutput::Tuple(vec![json!("a"), json!("b")])))
            .output("left")
            .output("right");
        let context = call_node(&step, Vec::<(&str, Value)>::new()).unwrap();
        assert_eq!(context.get("left"), Some(json!("a")));
        assert_eq!(context.get("right"), Some(json!("b")));
    }

    #[test]
    fn named_outputs_bind_by_role() {
        let step = Step::new("Stats", |_| Ok(indexmap! { "max".to_string() => json!(9), "min".to_string() => json!(1) }))
            .output_as("min", "lowest")
            .output_as("max", "highest");
        let context = call_node(&step, Vec::<(&str, Value)>::new()).unwrap();
        assert_eq!(context.get("lowest"), Some(json!(1)));
        assert_eq!(context.get("highest"), Some(json!(9)));
    }

    #[test]
    fn output_arity_mismatch_is_a_type_error() {
        let step = Step::new("Split", |_| Ok(json!([1, 2, 3]))).output("a").output("b");
        let error = call_node(&step, Vec::<(&str, Value)>::new()).unwrap_err();
        assert!(error.is_a(&ErrorKind::variable_type()));
    }

    #[test]
    fn foreign_errors_become_step_failures_with_cause() {
        let step = Step::new("Read", |_| -> anyhow::Result<()> { Err(anyhow!("disk on fire")) }).output("data");
        let error = call_node(&step, Vec::<(&str, Value)>::new()).unwrap_err();
        assert!(error.is_a(&ErrorKind::step_failed()));
        assert_eq!(error.causes(), vec!["disk on fire".to_string()]);
        assert_eq!(error.node(), Some("Read"));
    }

    #[test]
    fn skip_binds_nothing_and_succeeds() {
        let step = Step::new("Maybe", |_| -> anyhow::Result<Value> { Err(skip_step("not today")) }).output("result");
        let context = call_node(&step, Vec::<(&str, Value)>::new()).unwrap();
        assert!(!context.contains("result"));
    }

    #[test]
    fn ignored_kinds_are_swallowed() {
        let flaky = ErrorKind::define("FlakyError", &ErrorKind::step_failed());
        let raised = flaky.clone();
        let step = Step::new("Flaky", move |_| -> anyhow::Result<()> { Err(FlowError::new(raised.clone(), "again").into()) })
            .ignore(ErrorKind::step_failed());
        assert!(call_node(&step, Vec::<(&str, Value)>::new()).is_ok());
    }

    #[test]
    fn ignore_never_swallows_fatal_errors() {
        let step = steps::fatal("halt").ignore(ErrorKind::runtime());
        let error = call_node(&step, Vec::<(&str, Value)>::new()).unwrap_err();
        assert!(error.is_fatal());
        assert_eq!(error.message(), "halt");
    }

    #[test]
    fn builtin_steps() {
        let error = call_node(&steps::failed("bad {thing}"), [("thing", json!("input"))]).unwrap_err();
        assert!(error.is_a(&ErrorKind::step_failed()));
        assert_eq!(error.message(), "bad input");

        let error = call_node(&steps::fatal("stop"), Vec::<(&str, Value)>::new()).unwrap_err();
        assert!(error.is_fatal());

        let context = call_node(&steps::alias("original", "copy"), [("original", json!([1]))]).unwrap();
        assert_eq!(context.get("copy"), Some(json!([1])));
    }
}
