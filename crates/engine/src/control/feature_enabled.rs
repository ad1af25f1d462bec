//! Branching on a configured feature flag.

use serde_json::Value;

use scopeflow_types::NodeKind;

use crate::{
    context::Context,
    errors::FlowResult,
    node::{Branch, Node, NodeRef, call_nodes},
};

/// Runs one of two branches depending on a feature flag from
/// [`EngineConfig::feature_flags`](scopeflow_util::EngineConfig::feature_flags).
///
/// A flag missing from the configuration takes the node's default.
///
/// ```rust
/// use scopeflow_engine::{nodes, testing::call_node_with, Append, FeatureEnabled};
/// use scopeflow_util::EngineConfig;
/// use serde_json::json;
///
/// let mut config = EngineConfig::default();
/// config.feature_flags.insert("fast-path".into(), true);
/// let node = FeatureEnabled::new("fast-path")
///     .when_true(nodes![Append::new("route", "fast")])
///     .when_false(nodes![Append::new("route", "slow")]);
/// let context = call_node_with(config, &node, Vec::<(&str, serde_json::Value)>::new()).unwrap();
/// assert_eq!(context.get("route"), Some(json!(["fast"])));
/// ```
#[derive(Clone)]
pub struct FeatureEnabled {
    flag: String,
    default: bool,
    when_true: Vec<NodeRef>,
    when_false: Vec<NodeRef>,
}

impl FeatureEnabled {
    pub fn new(flag: impl Into<String>) -> Self {
        Self {
            flag: flag.into(),
            default: false,
            when_true: Vec::new(),
            when_false: Vec::new(),
        }
    }

    /// State assumed when the flag is not configured.
    pub fn default_state(mut self, enabled: bool) -> Self {
        self.default = enabled;
        self
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

impl Node for FeatureEnabled {
    fn kind(&self) -> NodeKind {
        NodeKind::FeatureEnabled
    }

    fn name(&self) -> String {
        format!("Feature flag: {}", self.flag)
    }

    fn execute(&self, context: &mut Context) -> FlowResult<()> {
        let enabled = context.config().feature_enabled(&self.flag, self.default);
        let state = if enabled { "enabled" } else { "disabled" };
        context.info(format!("Feature flag `{}` is {state}", self.flag));

        let branch = if enabled { &self.when_true } else { &self.when_false };
        if branch.is_empty() {
            return Ok(());
        }
        context.set_trace_args([("condition", Value::Bool(enabled))]);
        call_nodes(branch, context)
    }

    fn branches(&self) -> Option<Vec<Branch<'_>>> {
        Some(vec![
            Branch::new("true", self.when_true.as_slice()),
            Branch::new("false", self.when_false.as_slice()),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Append, describe, nodes, steps, testing::call_node_with};
    use scopeflow_util::EngineConfig;
    use serde_json::json;

    fn flagged(flag: &str) -> FeatureEnabled {
        FeatureEnabled::new(flag)
            .when_true(nodes![Append::new("calls", "on")])
            .when_false(nodes![Append::new("calls", "off")])
    }

    fn config_with(flag: &str, enabled: bool) -> EngineConfig {
        let mut config = EngineConfig::default();
        config.feature_flags.insert(flag.to_string(), enabled);
        config
    }

    fn no_vars() -> Vec<(&'static str, Value)> {
        Vec::new()
    }

    #[test]
    fn configured_flag_selects_branch() {
        let context = call_node_with(config_with("beta", true), &flagged("beta"), no_vars()).unwrap();
        assert_eq!(context.get("calls"), Some(json!(["on"])));
        assert!(context.records().iter().any(|record| record.message == "Feature flag `beta` is enabled"));

        let context = call_node_with(config_with("beta", false), &flagged("beta"), no_vars()).unwrap();
        assert_eq!(context.get("calls"), Some(json!(["off"])));
    }

    #[test]
    fn unconfigured_flag_uses_default() {
        let context = call_node_with(EngineConfig::default(), &flagged("beta"), no_vars()).unwrap();
        assert_eq!(context.get("calls"), Some(json!(["off"])));

        let node = flagged("beta").default_state(true);
        let context = call_node_with(EngineConfig::default(), &node, no_vars()).unwrap();
        assert_eq!(context.get("calls"), Some(json!(["on"])));
    }

    #[test]
    fn configured_flag_overrides_default() {
        let node = flagged("beta").default_state(true);
        let context = call_node_with(config_with("beta", false), &node, no_vars()).unwrap();
        assert_eq!(context.get("calls"), Some(json!(["off"])));
    }

    #[test]
    fn condition_is_recorded_in_trace() {
        let node = FeatureEnabled::new("beta").when_true(nodes![steps::failed("stop")]);
        let mut context = Context::with_config(config_with("beta", true));
        assert!(crate::call_node(&node, &mut context).is_err());
        let trace = context.flow_trace().unwrap();
        assert_eq!(trace.scopes[0].entries[0].args["condition"], json!(true));
    }

    #[test]
    fn describes_as_two_way_branch() {
        let descriptor = describe(&flagged("beta"));
        assert_eq!(descriptor.kind, NodeKind::FeatureEnabled);
        assert_eq!(descriptor.name, "Feature flag: beta");
        assert_eq!(descriptor.shape(), "multi-branch");
    }
}
