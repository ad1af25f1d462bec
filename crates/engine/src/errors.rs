//! Error taxonomy for workflow execution.
//!
//! Every error raised while executing a node tree is a [`FlowError`]. Errors are
//! classified by an [`ErrorKind`]: a tag in an explicit, single-rooted hierarchy.
//! Handler matching (`TryExcept`, `TryUntil`, `CaptureErrors`) walks this
//! hierarchy with [`ErrorKind::is_a`]; it never consults Rust types.
//!
//! Built-in kinds are direct children of [`ErrorKind::runtime`]:
//!
//! - `MissingVariableError`: a required variable could not be resolved
//! - `VariableTypeError`: a variable holds a value of the wrong shape
//! - `WorkflowSetupError`: a node was configured inconsistently
//! - `StepFailedError`: a step computation failed; wraps the original error
//! - `SkipStepError`: cooperative short-circuit of the current step
//! - `FatalError`: raised by authors to force termination
//!
//! Callers add their own kinds with [`ErrorKind::define`].

use std::{
    error::Error as StdError,
    fmt,
    hash::{Hash, Hasher},
    sync::Arc,
};

use once_cell::sync::Lazy;
use scopeflow_types::ErrorRecord;
use thiserror::Error;

use crate::trace::FlowTrace;

/// Result alias used throughout the engine.
pub type FlowResult<T> = Result<T, FlowError>;

type BoxedCause = Box<dyn StdError + Send + Sync + 'static>;

struct KindInner {
    name: String,
    parent: Option<ErrorKind>,
}

/// A classification tag in the error hierarchy.
///
/// Kinds compare by lineage: two kinds are equal when their names and the
/// names of all their ancestors are equal.
#[derive(Clone)]
pub struct ErrorKind(Arc<KindInner>);

static RUNTIME: Lazy<ErrorKind> = Lazy::new(|| ErrorKind::root("WorkflowRuntimeError"));
static MISSING_VARIABLE: Lazy<ErrorKind> = Lazy::new(|| ErrorKind::define("MissingVariableError", &RUNTIME));
static VARIABLE_TYPE: Lazy<ErrorKind> = Lazy::new(|| ErrorKind::define("VariableTypeError", &RUNTIME));
static SETUP: Lazy<ErrorKind> = Lazy::new(|| ErrorKind::define("WorkflowSetupError", &RUNTIME));
static STEP_FAILED: Lazy<ErrorKind> = Lazy::new(|| ErrorKind::define("StepFailedError", &RUNTIME));
static SKIP_STEP: Lazy<ErrorKind> = Lazy::new(|| ErrorKind::define("SkipStepError", &RUNTIME));
static FATAL: Lazy<ErrorKind> = Lazy::new(|| ErrorKind::define("FatalError", &RUNTIME));

impl ErrorKind {
    fn root(name: &str) -> Self {
        Self(Arc::new(KindInner {
            name: name.to_string(),
            parent: None,
        }))
    }

    /// Defines a new kind as a child of `parent`.
    ///
    /// ```rust
    /// use scopeflow_engine::ErrorKind;
    ///
    /// let quota = ErrorKind::define("QuotaExceeded", &ErrorKind::step_failed());
    /// assert!(quota.is_a(&ErrorKind::step_failed()));
    /// assert!(quota.is_a(&ErrorKind::runtime()));
    /// assert!(!ErrorKind::step_failed().is_a(&quota));
    /// ```
    pub fn define(name: impl Into<String>, parent: &ErrorKind) -> Self {
        Self(Arc::new(KindInner {
            name: name.into(),
            parent: Some(parent.clone()),
        }))
    }

    /// Root of the hierarchy; every workflow error is a `WorkflowRuntimeError`.
    pub fn runtime() -> Self {
        RUNTIME.clone()
    }

    pub fn missing_variable() -> Self {
        MISSING_VARIABLE.clone()
    }

    pub fn variable_type() -> Self {
        VARIABLE_TYPE.clone()
    }

    pub fn setup() -> Self {
        SETUP.clone()
    }

    pub fn step_failed() -> Self {
        STEP_FAILED.clone()
    }

    pub fn skip_step() -> Self {
        SKIP_STEP.clone()
    }

    pub fn fatal() -> Self {
        FATAL.clone()
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn parent(&self) -> Option<&ErrorKind> {
        self.0.parent.as_ref()
    }

    /// Iterates from this kind up to the root.
    pub fn ancestry(&self) -> impl Iterator<Item = &ErrorKind> {
        std::iter::successors(Some(self), |kind| kind.parent())
    }

    /// Returns true when `self` equals `ancestor` or descends from it.
    pub fn is_a(&self, ancestor: &ErrorKind) -> bool {
        self.ancestry().any(|kind| kind == ancestor)
    }

    /// Kind names from the root down to this kind.
    pub fn lineage(&self) -> Vec<String> {
        let mut names: Vec<String> = self.ancestry().map(|kind| kind.name().to_string()).collect();
        names.reverse();
        names
    }
}

impl PartialEq for ErrorKind {
    fn eq(&self, other: &Self) -> bool {
        if Arc::ptr_eq(&self.0, &other.0) {
            return true;
        }
        self.name() == other.name() && self.parent() == other.parent()
    }
}

impl Eq for ErrorKind {}

impl Hash for ErrorKind {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for kind in self.ancestry() {
            kind.name().hash(state);
        }
    }
}

impl fmt::Debug for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.lineage().join("::"))
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A structured workflow error.
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct FlowError {
    kind: ErrorKind,
    message: String,
    node: Option<String>,
    #[source]
    cause: Option<BoxedCause>,
    trace: Option<FlowTrace>,
}

impl FlowError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            node: None,
            cause: None,
            trace: None,
        }
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::runtime(), message)
    }

    pub fn missing_variable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::missing_variable(), message)
    }

    pub fn variable_type(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::variable_type(), message)
    }

    pub fn setup(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::setup(), message)
    }

    pub fn step_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::step_failed(), message)
    }

    pub fn skip(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::skip_step(), message)
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::fatal(), message)
    }

    /// Attaches the underlying error that caused this one.
    pub fn with_cause(mut self, cause: impl Into<BoxedCause>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    /// Records the originating node; the innermost label wins.
    pub fn with_node(mut self, label: impl Into<String>) -> Self {
        if self.node.is_none() {
            self.node = Some(label.into());
        }
        self
    }

    pub(crate) fn with_trace(mut self, trace: Option<FlowTrace>) -> Self {
        if self.trace.is_none() {
            self.trace = trace;
        }
        self
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn node(&self) -> Option<&str> {
        self.node.as_deref()
    }

    /// Trace captured at the point of failure; present on errors returned by `execute`.
    pub fn trace(&self) -> Option<&FlowTrace> {
        self.trace.as_ref()
    }

    pub fn is_a(&self, kind: &ErrorKind) -> bool {
        self.kind.is_a(kind)
    }

    pub fn is_skip(&self) -> bool {
        self.is_a(&SKIP_STEP)
    }

    pub fn is_fatal(&self) -> bool {
        self.is_a(&FATAL)
    }

    /// Rendered messages of the cause chain, outermost first.
    pub fn causes(&self) -> Vec<String> {
        std::iter::successors(self.source(), |&error| error.source())
            .map(ToString::to_string)
            .collect()
    }

    /// Serializable snapshot of this error.
    pub fn record(&self) -> ErrorRecord {
        ErrorRecord {
            kind: self.kind.name().to_string(),
            lineage: self.kind.lineage(),
            message: self.message.clone(),
            node: self.node.clone(),
            causes: self.causes(),
        }
    }

    /// Full report: kind, message, node, cause chain and the captured trace.
    pub fn report(&self) -> String {
        let mut report = self.to_string();
        if let Some(node) = &self.node {
            report.push_str(&format!("\n  in node `{node}`"));
        }
        for cause in self.causes() {
            report.push_str(&format!("\n  caused by: {cause}"));
        }
        if let Some(trace) = &self.trace {
            report.push('\n');
            report.push_str(&trace.to_string());
        }
        report
    }
}

/// Builds the error a step computation returns to skip the rest of itself.
///
/// ```rust
/// use scopeflow_engine::{skip_step, Step, StepOutput};
///
/// let step = Step::new("Maybe publish", |args| {
///     if args.get("draft").and_then(|v| v.as_bool()).unwrap_or(false) {
///         return Err(skip_step("draft documents are not published"));
///     }
///     Ok(StepOutput::Nothing)
/// })
/// .optional_input("draft");
/// # let _ = step;
/// ```
pub fn skip_step(message: impl Into<String>) -> anyhow::Error {
    FlowError::skip(message).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn builtin_kinds_descend_from_runtime() {
        for kind in [
            ErrorKind::missing_variable(),
            ErrorKind::variable_type(),
            ErrorKind::setup(),
            ErrorKind::step_failed(),
            ErrorKind::skip_step(),
            ErrorKind::fatal(),
        ] {
            assert!(kind.is_a(&ErrorKind::runtime()), "{kind:?}");
            assert_eq!(kind.parent(), Some(&ErrorKind::runtime()));
        }
        assert!(ErrorKind::runtime().parent().is_none());
    }

    #[test]
    fn siblings_do_not_match() {
        assert!(!ErrorKind::fatal().is_a(&ErrorKind::step_failed()));
        assert!(!ErrorKind::runtime().is_a(&ErrorKind::fatal()));
    }

    #[test]
    fn user_kinds_compare_by_lineage() {
        let first = ErrorKind::define("Timeout", &ErrorKind::step_failed());
        let second = ErrorKind::define("Timeout", &ErrorKind::step_failed());
        let elsewhere = ErrorKind::define("Timeout", &ErrorKind::fatal());

        assert_eq!(first, second);
        assert_ne!(first, elsewhere);

        let set: HashSet<ErrorKind> = [first, second, elsewhere].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn lineage_runs_root_first() {
        let network = ErrorKind::define("NetworkError", &ErrorKind::step_failed());
        let dns = ErrorKind::define("DnsError", &network);
        assert_eq!(dns.lineage(), vec!["WorkflowRuntimeError", "StepFailedError", "NetworkError", "DnsError"]);
        assert_eq!(format!("{dns:?}"), "WorkflowRuntimeError::StepFailedError::NetworkError::DnsError");
    }

    #[test]
    fn record_captures_cause_chain() {
        let io = std::io::Error::other("disk full");
        let error = FlowError::step_failed("write failed")
            .with_cause(io)
            .with_node("Write report")
            .with_node("Outer group");

        let record = error.record();
        assert_eq!(record.kind, "StepFailedError");
        assert_eq!(record.node.as_deref(), Some("Write report"));
        assert_eq!(record.causes, vec!["disk full".to_string()]);
        assert!(record.is_a("WorkflowRuntimeError"));
        assert_eq!(error.to_string(), "StepFailedError: write failed");
    }

    #[test]
    fn skip_step_round_trips_through_anyhow() {
        let error = skip_step("nothing to do");
        let recovered = error.downcast::<FlowError>().expect("flow error");
        assert!(recovered.is_skip());
        assert_eq!(recovered.message(), "nothing to do");
    }

    #[test]
    fn report_includes_node_and_causes() {
        let error = FlowError::fatal("stop").with_node("Guard").with_cause(std::io::Error::other("root cause"));
        let report = error.report();
        assert!(report.contains("FatalError: stop"));
        assert!(report.contains("in node `Guard`"));
        assert!(report.contains("caused by: root cause"));
    }
}
