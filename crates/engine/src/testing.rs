//! Helpers for exercising single nodes in tests.

use serde_json::Value;

use scopeflow_util::EngineConfig;

use crate::{context::Context, errors::FlowResult, node::Node};

/// Runs `node` in a fresh context seeded with `variables`, using the default
/// configuration, and returns the context for assertions.
///
/// ```rust
/// use scopeflow_engine::{testing::call_node, SetVar};
/// use serde_json::json;
///
/// let context = call_node(&SetVar::value("answer", json!(42)), [("question", json!("?"))]).unwrap();
/// assert_eq!(context.get("answer"), Some(json!(42)));
/// ```
pub fn call_node<I, K>(node: &dyn Node, variables: I) -> FlowResult<Context>
where
    I: IntoIterator<Item = (K, Value)>,
    K: Into<String>,
{
    call_node_with(EngineConfig::default(), node, variables)
}

/// Like [`call_node`] with an explicit configuration.
pub fn call_node_with<I, K>(config: EngineConfig, node: &dyn Node, variables: I) -> FlowResult<Context>
where
    I: IntoIterator<Item = (K, Value)>,
    K: Into<String>,
{
    crate::execute_with(config, node, variables)
}
