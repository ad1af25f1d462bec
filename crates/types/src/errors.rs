//! Serializable error snapshots.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Snapshot of a raised workflow error, suitable for storing in a context variable.
///
/// `lineage` lists the error kind's ancestry from the root down to `kind`, so a
/// consumer can test membership in a family of errors without access to the
/// engine's kind registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    /// Name of the error kind (for example `StepFailedError`).
    pub kind: String,
    /// Kind names from the root of the hierarchy down to `kind`.
    #[serde(default)]
    pub lineage: Vec<String>,
    /// Human-readable message.
    pub message: String,
    /// Label of the node that raised the error, when known.
    #[serde(default)]
    pub node: Option<String>,
    /// Rendered messages of the cause chain, outermost first.
    #[serde(default)]
    pub causes: Vec<String>,
}

impl ErrorRecord {
    /// Returns true when this record's kind is `kind_name` or descends from it.
    pub fn is_a(&self, kind_name: &str) -> bool {
        self.kind == kind_name || self.lineage.iter().any(|ancestor| ancestor == kind_name)
    }

    /// Converts the record into a JSON value.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Reads a record back from a JSON value produced by [`ErrorRecord::to_value`].
    pub fn from_value(value: &Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> ErrorRecord {
        ErrorRecord {
            kind: "StepFailedError".into(),
            lineage: vec!["WorkflowRuntimeError".into(), "StepFailedError".into()],
            message: "disk full".into(),
            node: Some("Write report".into()),
            causes: vec!["No space left on device".into()],
        }
    }

    #[test]
    fn is_a_matches_self_and_ancestors() {
        let record = record();
        assert!(record.is_a("StepFailedError"));
        assert!(record.is_a("WorkflowRuntimeError"));
        assert!(!record.is_a("FatalError"));
    }

    #[test]
    fn from_value_tolerates_missing_optional_fields() {
        let value = serde_json::json!({"kind": "FatalError", "message": "stop"});
        let record = ErrorRecord::from_value(&value).expect("record");
        assert_eq!(record.kind, "FatalError");
        assert!(record.lineage.is_empty());
        assert!(record.node.is_none());
    }

    #[test]
    fn value_carries_node_label() {
        let value = record().to_value();
        assert_eq!(value["node"], "Write report");
        assert_eq!(value["causes"][0], "No space left on device");
    }
}
