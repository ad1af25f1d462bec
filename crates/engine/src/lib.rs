//! # Scopeflow Engine
//!
//! An in-process workflow-composition engine. A workflow is a tree of nodes
//! executed depth-first against a single [`Context`]: a stack of variable
//! scopes with structured logging and failure tracing.
//!
//! ## Key Features
//!
//! - **Scoped variables**: reads search innermost-to-outermost, writes land in
//!   the innermost scope, scopes are popped on every exit path
//! - **Steps**: leaf computations with declared input and output bindings
//! - **Control flow**: conditionals, switches, loops, ordered error handlers,
//!   fallback chains, and error capture
//! - **Error kinds**: an explicit, extensible hierarchy matched by ancestry
//! - **Introspection**: node trees and workflow contracts are inspectable
//!   without executing anything
//!
//! ## Usage
//!
//! ```rust
//! use scopeflow_engine::{nodes, Append, ErrorKind, ForEach, Step, TryExcept, Workflow};
//! use serde_json::json;
//!
//! let parse = Step::new("Parse {line}", |args| {
//!     let line: String = args.get_as("line")?;
//!     Ok(json!(line.trim().parse::<i64>()?))
//! })
//! .input("line")
//! .output("number");
//!
//! let workflow = Workflow::new("Sum lines")
//!     .required_var("lines")
//!     .then(ForEach::new("line", "lines").body(nodes![
//!         TryExcept::new(nodes![parse, Append::new("parsed", "{number}")])
//!             .except_on(ErrorKind::step_failed(), nodes![Append::new("rejected", "{line}")]),
//!     ]));
//!
//! let context = workflow.run([
//!     ("lines", json!(["1", "x", " 3"])),
//!     ("parsed", json!([])),
//!     ("rejected", json!([])),
//! ])?;
//! assert_eq!(context.get("parsed"), Some(json!(["1", "3"])));
//! assert_eq!(context.get("rejected"), Some(json!(["x"])));
//! # Ok::<(), scopeflow_engine::FlowError>(())
//! ```
//!
//! ## Architecture
//!
//! - **`context`**: scope stack, variable resolution, logging, trace capture
//! - **`node`**: the node protocol, sequencing helpers, introspection
//! - **`step`**: leaf computations and ready-made steps
//! - **`nodes`**: groups, workflows, variable and log nodes, hook blocks
//! - **`control`**: conditional, switch, loop, and error-recovery nodes
//! - **`parallel`**: optional fan-out of loop iterations to a worker pool
//! - **`errors`**: error kinds and the structured [`FlowError`]

use serde_json::Value;
use tracing::{debug, warn};

use scopeflow_util::EngineConfig;

pub mod context;
pub mod control;
pub mod errors;
pub mod node;
pub mod nodes;
pub mod parallel;
pub mod step;
pub mod testing;
pub mod trace;

pub use context::{Context, LogLevelGuard, ScopeGuard};
pub use control::{
    CaptureErrors, Condition, Conditional, ExhaustedPolicy, FeatureEnabled, ForEach, If, Selector, Switch, TryExcept, TryUntil,
};
pub use errors::{ErrorKind, FlowError, FlowResult, skip_step};
pub use node::{Branch, Node, NodeRef, call_node, call_nodes, describe, node, outline};
pub use nodes::{Append, ContextHook, DefaultVar, Group, LogMessage, Nodes, SetGlobalVar, SetVar, WithContext, Workflow};
pub use parallel::{InlinePool, ParallelForEach, TokioPool, WorkerJob, WorkerPool, WorkerTask};
pub use step::{Step, StepArgs, StepOutput, steps};
pub use trace::{FlowTrace, ScopeSnapshot, TraceEntry};

pub use scopeflow_types::{ErrorRecord, LogRecord, NodeDescriptor, NodeKind, TraceLevel, ValueType, WorkflowContract};
pub use scopeflow_util::FatalPolicy;

/// Executes `root` against a fresh context seeded with `bindings`.
///
/// Configuration is loaded with [`EngineConfig::load`].
///
/// # Errors
/// Returns the error that reached the root, carrying its kind, message,
/// originating node, cause chain and the trace captured at the failure point.
pub fn execute<I, K>(root: &dyn Node, bindings: I) -> FlowResult<Context>
where
    I: IntoIterator<Item = (K, Value)>,
    K: Into<String>,
{
    execute_with(EngineConfig::load(), root, bindings)
}

/// Executes `root` with an explicit configuration.
pub fn execute_with<I, K>(config: EngineConfig, root: &dyn Node, bindings: I) -> FlowResult<Context>
where
    I: IntoIterator<Item = (K, Value)>,
    K: Into<String>,
{
    let mut context = Context::with_config(config);
    context.bind_many(bindings);
    debug!(root = %root.name(), kind = %root.kind(), "executing node tree");

    match call_node(root, &mut context) {
        Ok(()) => Ok(context),
        Err(error) => {
            warn!(kind = %error.kind(), node = error.node().unwrap_or_default(), "workflow failed: {}", error.message());
            let trace = context.take_flow_trace();
            Err(error.with_trace(trace))
        }
    }
}
