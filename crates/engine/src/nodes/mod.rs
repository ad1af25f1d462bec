//! Composite and auxiliary nodes: sequencing, workflows, variable assignment,
//! logging, and hook-wrapped blocks.

pub mod group;
pub mod variables;
pub mod with_context;
pub mod workflow;

pub use group::{Group, Nodes};
pub use variables::{Append, DefaultVar, LogMessage, SetGlobalVar, SetVar};
pub use with_context::{ContextHook, WithContext};
pub use workflow::Workflow;
