//! Plain data shared between the scopeflow engine and its collaborators.
//!
//! Nothing in this crate executes a workflow. The types here are what a CLI, a
//! documentation generator, or a worker process sees: serializable snapshots of
//! errors, node trees, workflow contracts, and log records.

pub mod describe;
pub mod errors;
pub mod records;
pub mod workflow;

pub use describe::{BranchDescriptor, NodeDescriptor, NodeKind};
pub use errors::ErrorRecord;
pub use records::{LogRecord, TraceLevel};
pub use workflow::{ValueType, VariableSpec, WorkflowContract, check_value_type};
