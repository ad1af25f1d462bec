//! Declared workflow contracts.
//!
//! A workflow may declare variables it requires from its caller and defaults it
//! supplies when the caller leaves them unbound. The contract is available
//! before execution so that front ends can validate input and render help text.
//! Entries keep declaration order (via `IndexMap`).

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

pub mod validation;

pub use validation::check_value_type;

/// JSON-level type expectation for a context variable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    /// No constraint.
    #[default]
    Any,
    Null,
    Bool,
    /// Any JSON number.
    Number,
    /// A JSON number without a fractional part.
    Integer,
    String,
    Array,
    Object,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ValueType::Any => "any",
            ValueType::Null => "null",
            ValueType::Bool => "bool",
            ValueType::Number => "number",
            ValueType::Integer => "integer",
            ValueType::String => "string",
            ValueType::Array => "array",
            ValueType::Object => "object",
        };
        f.write_str(label)
    }
}

/// A required variable and its expected type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableSpec {
    pub name: String,
    #[serde(default)]
    pub value_type: ValueType,
}

impl VariableSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value_type: ValueType::Any,
        }
    }

    pub fn typed(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            value_type,
        }
    }
}

/// Pre-execution contract of a workflow.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowContract {
    /// Workflow name.
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Variables that must resolve in the caller's scope (after defaults apply).
    #[serde(default)]
    pub required: Vec<VariableSpec>,
    /// Values bound when the caller has not provided the name.
    #[serde(default)]
    pub defaults: IndexMap<String, Value>,
}

impl WorkflowContract {
    /// Names of required variables that neither `provided` nor the defaults cover.
    pub fn unsatisfied<'a>(&'a self, provided: &serde_json::Map<String, Value>) -> Vec<&'a str> {
        self.required
            .iter()
            .filter(|spec| !provided.contains_key(&spec.name) && !self.defaults.contains_key(&spec.name))
            .map(|spec| spec.name.as_str())
            .collect()
    }
}
