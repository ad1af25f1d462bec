//! Tries candidate sequences in order until one succeeds.

use scopeflow_types::NodeKind;

use crate::{
    context::Context,
    control::may_intercept,
    errors::{ErrorKind, FlowError, FlowResult},
    node::{Branch, Node, NodeRef, call_nodes},
};

/// What happens when every candidate failed and no default is registered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExhaustedPolicy {
    /// Return the last candidate's error.
    #[default]
    Propagate,
    /// Log the last error and continue.
    Report,
}

/// Runs candidates in order, stopping at the first that completes.
///
/// ```rust
/// use scopeflow_engine::{nodes, steps, testing::call_node, Append, TryUntil};
/// use serde_json::json;
///
/// let node = TryUntil::new()
///     .candidate(nodes![steps::failed("primary down")])
///     .candidate(nodes![Append::new("used", "replica")])
///     .candidate(nodes![Append::new("used", "cache")]);
/// let context = call_node(&node, [("used", json!([]))]).unwrap();
/// assert_eq!(context.get("used"), Some(json!(["replica"])));
/// ```
#[derive(Clone, Default)]
pub struct TryUntil {
    candidates: Vec<Vec<NodeRef>>,
    catching: Vec<ErrorKind>,
    default: Option<Vec<NodeRef>>,
    on_exhausted: ExhaustedPolicy,
}

impl TryUntil {
    pub fn new() -> Self {
        <Self as Default>::default()
    }

    pub fn candidate(mut self, nodes: Vec<NodeRef>) -> Self {
        self.candidates.push(nodes);
        self
    }

    /// Restricts which errors move on to the next candidate; others propagate at once.
    /// With no restriction every error does.
    pub fn catching(mut self, kind: ErrorKind) -> Self {
        self.catching.push(kind);
        self
    }

    /// Fallback run when every candidate failed; its errors propagate.
    pub fn default(mut self, nodes: Vec<NodeRef>) -> Self {
        self.default = Some(nodes);
        self
    }

    pub fn on_exhausted(mut self, policy: ExhaustedPolicy) -> Self {
        self.on_exhausted = policy;
        self
    }

    fn catches(&self, error: &FlowError, context: &Context) -> bool {
        may_intercept(error, context) && (self.catching.is_empty() || self.catching.iter().any(|kind| error.is_a(kind)))
    }
}

impl Node for TryUntil {
    fn kind(&self) -> NodeKind {
        NodeKind::TryUntil
    }

    fn name(&self) -> String {
        if self.catching.is_empty() {
            return "Try until a candidate succeeds".to_string();
        }
        let kinds: Vec<&str> = self.catching.iter().map(ErrorKind::name).collect();
        format!("Try until a candidate does not raise {}", kinds.join(" or "))
    }

    fn execute(&self, context: &mut Context) -> FlowResult<()> {
        let total = self.candidates.len();
        let mut last_error = None;
        for (index, candidate) in self.candidates.iter().enumerate() {
            match call_nodes(candidate, context) {
                Ok(()) => {
                    context.clear_flow_trace();
                    return Ok(());
                }
                Err(error) if self.catches(&error, context) => {
                    context.info(format!("Candidate {} of {total} failed: {error}", index + 1));
                    last_error = Some(error);
                }
                Err(error) => return Err(error),
            }
        }

        let Some(error) = last_error else {
            return Ok(());
        };
        context.clear_flow_trace();
        if let Some(default) = &self.default {
            context.info("All candidates failed; running default");
            return call_nodes(default, context);
        }
        match self.on_exhausted {
            ExhaustedPolicy::Propagate => Err(error),
            ExhaustedPolicy::Report => {
                context.error(format!("All candidates failed; last error: {error}"));
                Ok(())
            }
        }
    }

    fn branches(&self) -> Option<Vec<Branch<'_>>> {
        let mut branches: Vec<Branch<'_>> = self
            .candidates
            .iter()
            .enumerate()
            .map(|(index, nodes)| Branch::new(format!("candidate {}", index + 1), nodes.as_slice()))
            .collect();
        if let Some(nodes) = &self.default {
            branches.push(Branch::new("default", nodes.as_slice()));
        }
        Some(branches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Append, nodes, steps, testing::call_node};
    use scopeflow_types::TraceLevel;
    use serde_json::{Value, json};

    fn failing_pair() -> TryUntil {
        TryUntil::new()
            .candidate(nodes![Append::new("calls", "first"), steps::failed("first failed")])
            .candidate(nodes![Append::new("calls", "second"), steps::failed("second failed")])
    }

    #[test]
    fn exhausted_candidates_propagate_last_error() {
        let mut context = Context::new();
        let error = crate::call_node(&failing_pair(), &mut context).unwrap_err();
        assert_eq!(error.message(), "second failed");
        assert_eq!(context.get("calls"), Some(json!(["first", "second"])));
    }

    #[test]
    fn report_policy_logs_instead() {
        let node = failing_pair().on_exhausted(ExhaustedPolicy::Report);
        let context = call_node(&node, Vec::<(&str, Value)>::new()).unwrap();
        assert!(context.records().iter().any(|record| record.level == TraceLevel::Error
            && record.message.starts_with("All candidates failed")));
    }

    #[test]
    fn default_runs_when_all_fail() {
        let node = failing_pair().default(nodes![Append::new("calls", "default")]);
        let context = call_node(&node, Vec::<(&str, Value)>::new()).unwrap();
        assert_eq!(context.get("calls"), Some(json!(["first", "second", "default"])));
    }

    #[test]
    fn uncaught_kinds_stop_immediately() {
        let node = TryUntil::new()
            .catching(ErrorKind::missing_variable())
            .candidate(nodes![steps::failed("not retried")])
            .candidate(nodes![Append::new("calls", "second")]);
        let mut context = Context::new();
        let error = crate::call_node(&node, &mut context).unwrap_err();
        assert!(error.is_a(&ErrorKind::step_failed()));
        assert!(!context.contains("calls"));
        assert_eq!(node.name(), "Try until a candidate does not raise MissingVariableError");
    }
}
