//! Scope-isolating composite with a declared variable contract.
//!
//! A [`Workflow`] pushes a new scope for its children, binds its declared
//! defaults for names the caller left unbound, and then checks its required
//! variables before any child runs. Bindings made inside the workflow vanish
//! when it returns; in-place updates of inherited values do not.

use indexmap::IndexMap;
use serde_json::Value;

use scopeflow_types::{NodeKind, TraceLevel, ValueType, VariableSpec, WorkflowContract, check_value_type};
use scopeflow_util::human_join;

use crate::{
    context::Context,
    errors::{FlowError, FlowResult},
    node::{Branch, Node, NodeRef, node},
    nodes::{group::run_with_finally, variables::SetVar},
};

/// Named, scope-isolated sequence of nodes.
///
/// ```rust
/// use scopeflow_engine::{Append, Workflow};
/// use serde_json::json;
///
/// let workflow = Workflow::new("Greeter")
///     .required_var("who")
///     .default_var("greeting", json!("Hello"))
///     .then(Append::new("lines", "{greeting} {who}"));
///
/// let context = workflow.run([("who", json!("Ada")), ("lines", json!([]))]).unwrap();
/// assert_eq!(context.get("lines"), Some(json!(["Hello Ada"])));
/// assert!(!context.contains("greeting"));
/// ```
#[derive(Clone)]
pub struct Workflow {
    name: String,
    description: Option<String>,
    required: Vec<VariableSpec>,
    defaults: IndexMap<String, Value>,
    nodes: Vec<NodeRef>,
    finally: Vec<NodeRef>,
    log_level: Option<TraceLevel>,
}

impl Workflow {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            required: Vec::new(),
            defaults: IndexMap::new(),
            nodes: Vec::new(),
            finally: Vec::new(),
            log_level: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Declares a variable that must resolve before the children run.
    pub fn required_var(self, name: impl Into<String>) -> Self {
        self.required_var_typed(name, ValueType::Any)
    }

    pub fn required_vars<I, S>(self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        names.into_iter().fold(self, Workflow::required_var)
    }

    /// Declares a required variable whose value must have the given JSON type.
    pub fn required_var_typed(mut self, name: impl Into<String>, value_type: ValueType) -> Self {
        self.required.push(VariableSpec::typed(name, value_type));
        self
    }

    /// Value bound in the workflow scope when the caller has not bound `name`.
    pub fn default_var(mut self, name: impl Into<String>, value: Value) -> Self {
        self.defaults.insert(name.into(), value);
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

    /// Appends `nodes` wrapped in their own scope.
    pub fn nested(self, nodes: Vec<NodeRef>) -> Self {
        self.then(Workflow::new("Nested").nodes(nodes))
    }

    /// Appends a node binding each `(name, value)` pair.
    pub fn set_vars<I, K>(self, values: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        self.then(SetVar::values(values))
    }

    pub fn and_finally(mut self, nodes: Vec<NodeRef>) -> Self {
        self.finally = nodes;
        self
    }

    pub fn log_level(mut self, level: TraceLevel) -> Self {
        self.log_level = Some(level);
        self
    }

    /// The declared contract, available without executing.
    pub fn contract(&self) -> WorkflowContract {
        WorkflowContract {
            name: self.name.clone(),
            description: self.description.clone(),
            required: self.required.clone(),
            defaults: self.defaults.clone(),
        }
    }

    /// Executes this workflow as the root of a new context.
    pub fn run<I, K>(&self, initial: I) -> FlowResult<Context>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        crate::execute(self, initial)
    }

    fn check_required(&self, context: &Context, label: &str) -> FlowResult<()> {
        let missing: Vec<String> = self
            .required
            .iter()
            .filter(|spec| !context.contains(&spec.name))
            .map(|spec| format!("`{}`", spec.name))
            .collect();
        if !missing.is_empty() {
            let noun = if missing.len() == 1 { "variable" } else { "variables" };
            return Err(FlowError::missing_variable(format!(
                "Workflow `{label}` requires {noun} {}",
                human_join(&missing, "and")
            )));
        }

        let mismatches: Vec<String> = self
            .required
            .iter()
            .filter(|spec| spec.value_type != ValueType::Any)
            .filter_map(|spec| {
                let value = context.get(&spec.name)?;
                check_value_type(&value, spec.value_type)
                    .err()
                    .map(|reason| format!("`{}` {reason}", spec.name))
            })
            .collect();
        if !mismatches.is_empty() {
            return Err(FlowError::variable_type(format!(
                "Workflow `{label}` received invalid variables: {}",
                mismatches.join("; ")
            )));
        }
        Ok(())
    }
}

impl Node for Workflow {
    fn kind(&self) -> NodeKind {
        NodeKind::Workflow
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn execute(&self, context: &mut Context) -> FlowResult<()> {
        let label = context.format(&self.name);
        context.info(format!("Workflow: `{label}`"));
        if let Some(description) = &self.description {
            context.debug(description.clone());
        }

        let mut scope = context.enter_scope();
        for (name, value) in &self.defaults {
            if !scope.contains(name) {
                scope.bind(name.clone(), value.clone());
            }
        }
        self.check_required(&scope, &label)?;

        let mut scope = scope.override_log_level(self.log_level);
        run_with_finally(&self.nodes, &self.finally, &mut scope)
    }

    fn branches(&self) -> Option<Vec<Branch<'_>>> {
        if self.finally.is_empty() {
            Some(vec![Branch::plain(self.nodes.as_slice())])
        } else {
            Some(vec![Branch::plain(self.nodes.iter().chain(&self.finally).cloned().collect::<Vec<_>>())])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Append, ErrorKind, nodes, steps};
    use serde_json::json;

    #[test]
    fn required_variables_are_checked_before_children() {
        let workflow = Workflow::new("Copy files")
            .required_vars(["source", "target"])
            .then(Append::new("calls", "ran"));
        let error = workflow.run([("calls", json!([]))]).unwrap_err();
        assert!(error.is_a(&ErrorKind::missing_variable()));
        assert_eq!(error.message(), "Workflow `Copy files` requires variables `source` and `target`");
    }

    #[test]
    fn defaults_satisfy_requirements() {
        let workflow = Workflow::new("Count").default_var("limit", json!(5)).required_var("limit");
        assert!(workflow.run(Vec::<(&str, Value)>::new()).is_ok());
    }

    #[test]
    fn typed_requirements_reject_wrong_shapes() {
        let workflow = Workflow::new("Sum").required_var_typed("values", ValueType::Array);
        let error = workflow.run([("values", json!("1,2,3"))]).unwrap_err();
        assert!(error.is_a(&ErrorKind::variable_type()));
        assert!(error.message().contains("`values` expected array"));
    }

    #[test]
    fn writes_stay_inside_the_workflow() {
        let inner = Workflow::new("inner").set_vars([("scratch", json!(1))]).then(Append::new("log", "inner"));
        let outer = Workflow::new("outer").then(inner).then(Append::new("log", "outer"));
        let context = outer.run([("log", json!([]))]).unwrap();
        assert_eq!(context.get("log"), Some(json!(["inner", "outer"])));
        assert!(!context.contains("scratch"));
    }

    #[test]
    fn finally_runs_inside_the_workflow_scope() {
        let workflow = Workflow::new("guarded")
            .then(SetVar::value("temp", json!("file")))
            .then(steps::failed("boom"))
            .and_finally(nodes![Append::new("cleaned", "{temp}")]);
        let mut context = Context::new();
        context.bind("cleaned", json!([]));
        let error = crate::call_node(&workflow, &mut context).unwrap_err();
        assert_eq!(error.message(), "boom");
        assert_eq!(context.get("cleaned"), Some(json!(["file"])));
    }

    #[test]
    fn contract_lists_declarations() {
        let contract = Workflow::new("Deploy")
            .description("Ship it")
            .required_var_typed("version", ValueType::String)
            .default_var("region", json!("eu"))
            .contract();
        assert_eq!(contract.name, "Deploy");
        assert_eq!(contract.required, vec![VariableSpec::typed("version", ValueType::String)]);
        assert_eq!(contract.defaults["region"], json!("eu"));
        let serialized = serde_json::to_value(&contract).unwrap();
        assert_eq!(serialized["required"][0]["value_type"], "string");
    }
}
