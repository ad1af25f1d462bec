//! Execution trace captured for error diagnostics.
//!
//! Each scope keeps the labels of the nodes visited while it was innermost,
//! along with the arguments a branching node chose (condition value, switch
//! value, loop variables). When an error escapes a node the context snapshots
//! every scope so the failure can be reported with the full path that led to it.

use std::fmt;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

use scopeflow_util::display_value;

/// A visited node and the arguments it recorded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceEntry {
    pub label: String,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub args: IndexMap<String, Value>,
}

impl TraceEntry {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            args: IndexMap::new(),
        }
    }
}

impl fmt::Display for TraceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)?;
        if !self.args.is_empty() {
            let args: Vec<String> = self.args.iter().map(|(key, value)| format!("{key}={value}")).collect();
            write!(f, " ({})", args.join(", "))?;
        }
        Ok(())
    }
}

/// Variables and visited nodes of one scope at the time of capture.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScopeSnapshot {
    pub depth: usize,
    pub variables: IndexMap<String, Value>,
    pub entries: Vec<TraceEntry>,
}

/// Snapshot of every scope, outermost first.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FlowTrace {
    pub scopes: Vec<ScopeSnapshot>,
}

impl FlowTrace {
    /// Labels of every visited node, outermost scope first.
    pub fn labels(&self) -> Vec<&str> {
        self.scopes
            .iter()
            .flat_map(|scope| scope.entries.iter().map(|entry| entry.label.as_str()))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.iter().all(|scope| scope.entries.is_empty())
    }
}

impl fmt::Display for FlowTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Flow trace (most recent node last):")?;
        for scope in &self.scopes {
            let indent = "  ".repeat(scope.depth);
            writeln!(f, "{indent}Scope {}:", scope.depth)?;
            for (name, value) in &scope.variables {
                writeln!(f, "{indent}  | {name} = {}", display_value(value))?;
            }
            for entry in &scope.entries {
                writeln!(f, "{indent}  > {entry}")?;
            }
        }
        Ok(())
    }
}
