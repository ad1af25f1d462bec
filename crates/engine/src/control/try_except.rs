//! Error interception with ordered, ancestry-aware handler matching.
//!
//! Handlers are scanned in registration order and the first whose kind is the
//! raised kind or one of its ancestors wins. Registering a base kind before a
//! more specific one therefore shadows the specific handler, exactly like
//! ordered `except` clauses.

use scopeflow_types::NodeKind;

use crate::{
    context::Context,
    control::may_intercept,
    errors::{ErrorKind, FlowError, FlowResult},
    node::{Branch, Node, NodeRef, call_nodes},
    nodes::group::run_finally,
};

/// Variable bound in a handler's scope holding the caught error record.
pub const ERROR_VAR: &str = "error";

/// Runs a sequence, dispatching failures to registered handlers.
///
/// ```rust
/// use scopeflow_engine::{nodes, steps, testing::call_node, Append, ErrorKind, TryExcept};
/// use serde_json::json;
///
/// let node = TryExcept::new(nodes![steps::failed("disk full")])
///     .except_on(ErrorKind::step_failed(), nodes![Append::new("log", "recovered from {error.message}")])
///     .and_finally(nodes![Append::new("log", "done")]);
/// let context = call_node(&node, [("log", json!([]))]).unwrap();
/// assert_eq!(context.get("log"), Some(json!(["recovered from disk full", "done"])));
/// ```
#[derive(Clone)]
pub struct TryExcept {
    nodes: Vec<NodeRef>,
    handlers: Vec<(ErrorKind, Vec<NodeRef>)>,
    finally: Vec<NodeRef>,
}

impl TryExcept {
    pub fn new(nodes: Vec<NodeRef>) -> Self {
        Self {
            nodes,
            handlers: Vec::new(),
            finally: Vec::new(),
        }
    }

    /// Registers a handler for `kind` and its descendants.
    pub fn except_on(mut self, kind: ErrorKind, nodes: Vec<NodeRef>) -> Self {
        self.handlers.push((kind, nodes));
        self
    }

    /// Nodes run exactly once after the body and any handler.
    pub fn and_finally(mut self, nodes: Vec<NodeRef>) -> Self {
        self.finally = nodes;
        self
    }

    fn handler_for(&self, error: &FlowError) -> Option<&[NodeRef]> {
        self.handlers
            .iter()
            .find(|(kind, _)| error.is_a(kind))
            .map(|(_, nodes)| nodes.as_slice())
    }

    fn recover(&self, error: FlowError, context: &mut Context) -> FlowResult<()> {
        if !may_intercept(&error, context) {
            return Err(error);
        }
        let Some(handler) = self.handler_for(&error) else {
            return Err(error);
        };

        context.info(format!("Caught {}", error.kind()));
        context.clear_flow_trace();
        let mut scope = context.enter_scope();
        scope.bind(ERROR_VAR, error.record().to_value());
        call_nodes(handler, &mut scope)
    }
}

impl Node for TryExcept {
    fn kind(&self) -> NodeKind {
        NodeKind::TryExcept
    }

    fn name(&self) -> String {
        "Try/Except".to_string()
    }

    fn execute(&self, context: &mut Context) -> FlowResult<()> {
        let outcome = match call_nodes(&self.nodes, context) {
            Ok(()) => Ok(()),
            Err(error) => self.recover(error, context),
        };
        run_finally(&self.finally, context)?;
        outcome
    }

    fn branches(&self) -> Option<Vec<Branch<'_>>> {
        let mut branches = vec![Branch::new("try", self.nodes.as_slice())];
        branches.extend(
            self.handlers
                .iter()
                .map(|(kind, nodes)| Branch::new(format!("except {kind}"), nodes.as_slice())),
        );
        if !self.finally.is_empty() {
            branches.push(Branch::new("finally", self.finally.as_slice()));
        }
        Some(branches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Append, Step, nodes, steps, testing::call_node};
    use scopeflow_types::ErrorRecord;
    use scopeflow_util::{EngineConfig, FatalPolicy};
    use serde_json::{Value, json};

    fn no_vars() -> Vec<(&'static str, Value)> {
        Vec::new()
    }

    #[test]
    fn unmatched_errors_propagate_after_finally() {
        let node = TryExcept::new(nodes![steps::failed("boom")])
            .except_on(ErrorKind::missing_variable(), nodes![Append::new("calls", "handler")])
            .and_finally(nodes![Append::new("calls", "finally")]);
        let mut context = Context::new();
        let error = crate::call_node(&node, &mut context).unwrap_err();
        assert_eq!(error.message(), "boom");
        assert_eq!(context.get("calls"), Some(json!(["finally"])));
    }

    #[test]
    fn handler_sees_error_record_in_its_own_scope() {
        let node = TryExcept::new(nodes![steps::failed("bad input")]).except_on(
            ErrorKind::runtime(),
            nodes![Step::new("Inspect", |args| Ok(args.require("error")?.clone())).input("error").output("seen")],
        );
        let context = call_node(&node, no_vars()).unwrap();
        assert!(!context.contains(ERROR_VAR));
        assert!(!context.contains("seen"));
    }

    #[test]
    fn error_record_describes_the_failure() {
        let node = TryExcept::new(nodes![steps::failed("bad input")]).except_on(
            ErrorKind::runtime(),
            nodes![
                Step::new("Keep", |args| {
                    let record: ErrorRecord = args.get_as("error")?;
                    Ok(json!([record.kind, record.message, record.node]))
                })
                .input("error")
                .output("kept"),
                Append::new("log", "{kept}")
            ],
        );
        let context = call_node(&node, [("log", json!([]))]).unwrap();
        assert_eq!(context.get("log"), Some(json!([r#"["StepFailedError","bad input","Failed: bad input"]"#])));
    }

    #[test]
    fn fatal_errors_respect_policy() {
        let node = TryExcept::new(nodes![steps::fatal("halt")]).except_on(ErrorKind::runtime(), nodes![]);
        assert!(call_node(&node, no_vars()).is_ok());

        let config = EngineConfig {
            fatal_policy: FatalPolicy::Propagate,
            ..EngineConfig::default()
        };
        let error = crate::testing::call_node_with(config, &node, no_vars()).unwrap_err();
        assert!(error.is_fatal());
    }

    #[test]
    fn handler_failure_still_runs_finally() {
        let node = TryExcept::new(nodes![steps::failed("first")])
            .except_on(ErrorKind::step_failed(), nodes![steps::failed("second")])
            .and_finally(nodes![Append::new("calls", "finally")]);
        let mut context = Context::new();
        let error = crate::call_node(&node, &mut context).unwrap_err();
        assert_eq!(error.message(), "second");
        assert_eq!(context.get("calls"), Some(json!(["finally"])));
    }
}
