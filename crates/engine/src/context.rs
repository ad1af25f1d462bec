//! Scoped variable store threaded through every node.
//!
//! A [`Context`] holds a stack of scopes. Reads search from the innermost scope
//! outwards; writes always land in the innermost scope. Pushing a scope copies
//! the *bindings* of the current innermost scope, not the values: each binding
//! is a shared cell, so in-place mutation through [`Context::update`] stays
//! visible after the inner scope is discarded while new names bound inside it
//! do not.
//!
//! Scopes are pushed through [`Context::enter_scope`], which returns a guard that
//! pops back to the previous depth when dropped, on success and error paths
//! alike.

use std::{
    cell::RefCell,
    ops::{Deref, DerefMut},
    rc::Rc,
};

use chrono::Utc;
use indexmap::IndexMap;
use serde_json::Value;
use tracing::{debug, error, info, trace, warn};

use scopeflow_types::{LogRecord, TraceLevel};
use scopeflow_util::{EngineConfig, TemplateError, format_template, mask_sensitive};

use crate::{
    errors::{FlowError, FlowResult},
    trace::{FlowTrace, ScopeSnapshot, TraceEntry},
};

type Cell = Rc<RefCell<Value>>;

#[derive(Debug, Default)]
struct Scope {
    variables: IndexMap<String, Cell>,
    trace: Vec<TraceEntry>,
}

/// The scoped variable store and logging facility for one execution.
#[derive(Debug)]
pub struct Context {
    scopes: Vec<Scope>,
    config: EngineConfig,
    log_level: Option<TraceLevel>,
    records: RefCell<Vec<LogRecord>>,
    flow_trace: Option<FlowTrace>,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    /// Creates a context with a single empty root scope and default configuration.
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            scopes: vec![Scope::default()],
            log_level: config.default_log_level,
            config,
            records: RefCell::new(Vec::new()),
            flow_trace: None,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Number of scopes currently pushed; the root scope counts as one.
    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    fn cell(&self, name: &str) -> Option<&Cell> {
        self.scopes.iter().rev().find_map(|scope| scope.variables.get(name))
    }

    fn innermost(&mut self) -> &mut Scope {
        if self.scopes.is_empty() {
            self.scopes.push(Scope::default());
        }
        let last = self.scopes.len() - 1;
        &mut self.scopes[last]
    }

    /// Resolves `name` innermost-to-outermost.
    ///
    /// # Errors
    /// `MissingVariableError` when no scope binds `name`.
    pub fn resolve(&self, name: &str) -> FlowResult<Value> {
        self.get(name)
            .ok_or_else(|| FlowError::missing_variable(format!("variable `{name}` is not defined")))
    }

    /// Non-failing lookup.
    pub fn get(&self, name: &str) -> Option<Value> {
        self.cell(name).map(|cell| cell.borrow().clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.cell(name).is_some()
    }

    /// Binds `name` in the innermost scope, shadowing any outer binding.
    pub fn bind(&mut self, name: impl Into<String>, value: Value) {
        self.innermost().variables.insert(name.into(), Rc::new(RefCell::new(value)));
    }

    pub fn bind_many<I, K>(&mut self, bindings: I)
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        for (name, value) in bindings {
            self.bind(name, value);
        }
    }

    /// Binds `name` in every scope, sharing one value cell between them.
    pub fn bind_global(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        let cell: Cell = Rc::new(RefCell::new(value));
        for scope in &mut self.scopes {
            scope.variables.insert(name.clone(), Rc::clone(&cell));
        }
    }

    /// Mutates the value bound to `name` in place.
    ///
    /// The change is visible through every scope sharing the binding, including
    /// outer scopes after the current one is popped.
    ///
    /// ```rust
    /// use scopeflow_engine::Context;
    /// use serde_json::json;
    ///
    /// let mut context = Context::new();
    /// context.bind("seen", json!([]));
    /// {
    ///     let inner = context.enter_scope();
    ///     inner.update("seen", |value| value.as_array_mut().map(|items| items.push(json!(1)))).unwrap();
    /// }
    /// assert_eq!(context.get("seen"), Some(json!([1])));
    /// ```
    ///
    /// # Errors
    /// `MissingVariableError` when no scope binds `name`.
    pub fn update<R>(&self, name: &str, mutate: impl FnOnce(&mut Value) -> R) -> FlowResult<R> {
        let cell = self
            .cell(name)
            .ok_or_else(|| FlowError::missing_variable(format!("variable `{name}` is not defined")))?;
        let mut value = cell.borrow_mut();
        Ok(mutate(&mut *value))
    }

    /// All visible variables, innermost binding winning.
    pub fn variables(&self) -> IndexMap<String, Value> {
        let mut visible = IndexMap::new();
        for scope in &self.scopes {
            for (name, cell) in &scope.variables {
                visible.insert(name.clone(), cell.borrow().clone());
            }
        }
        visible
    }

    /// Pushes a new innermost scope that starts with the current bindings.
    ///
    /// Prefer [`Context::enter_scope`], which pops automatically.
    pub fn push_scope(&mut self) {
        let variables = self
            .scopes
            .last()
            .map(|scope| scope.variables.iter().map(|(name, cell)| (name.clone(), Rc::clone(cell))).collect())
            .unwrap_or_default();
        self.scopes.push(Scope {
            variables,
            trace: Vec::new(),
        });
    }

    /// Pops the innermost scope.
    ///
    /// # Errors
    /// `WorkflowSetupError` when only the root scope remains.
    pub fn pop_scope(&mut self) -> FlowResult<()> {
        if self.scopes.len() <= 1 {
            return Err(FlowError::setup("cannot pop the root scope"));
        }
        self.scopes.pop();
        Ok(())
    }

    /// Pushes a scope and returns a guard that pops it when dropped.
    pub fn enter_scope(&mut self) -> ScopeGuard<'_> {
        let depth = self.depth();
        self.push_scope();
        ScopeGuard { context: self, depth }
    }

    /// Runs `body` inside a fresh scope.
    pub fn with_scope<R>(&mut self, body: impl FnOnce(&mut Context) -> R) -> R {
        let mut scope = self.enter_scope();
        body(&mut scope)
    }

    /// Substitutes `{name}` placeholders, failing on unresolved names.
    pub fn try_format(&self, template: &str) -> Result<String, TemplateError> {
        format_template(template, |name| self.get(name))
    }

    /// Substitutes `{name}` placeholders.
    ///
    /// An unresolvable placeholder is logged as a warning and the template is
    /// returned unchanged.
    pub fn format(&self, template: &str) -> String {
        match self.try_format(template) {
            Ok(rendered) => rendered,
            Err(error) => {
                self.log(TraceLevel::Warn, format!("Unable to format `{template}`: {error}"));
                template.to_string()
            }
        }
    }

    /// Emits a log record indented by the current depth.
    pub fn log(&self, level: TraceLevel, message: impl Into<String>) {
        if self.log_level.is_some_and(|threshold| level < threshold) {
            return;
        }
        let message = message.into();
        let depth = self.depth();
        let indented = format!("{}{}", "  ".repeat(depth), message);
        match level {
            TraceLevel::Trace => trace!(target: "scopeflow", depth, "{indented}"),
            TraceLevel::Debug => debug!(target: "scopeflow", depth, "{indented}"),
            TraceLevel::Info => info!(target: "scopeflow", depth, "{indented}"),
            TraceLevel::Warn => warn!(target: "scopeflow", depth, "{indented}"),
            TraceLevel::Error => error!(target: "scopeflow", depth, "{indented}"),
        }
        if self.config.capture_records {
            self.records.borrow_mut().push(LogRecord {
                depth,
                level,
                message,
                at: Utc::now(),
            });
        }
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.log(TraceLevel::Debug, message);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(TraceLevel::Info, message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.log(TraceLevel::Warn, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.log(TraceLevel::Error, message);
    }

    /// Captured log records, oldest first.
    pub fn records(&self) -> Vec<LogRecord> {
        self.records.borrow().clone()
    }

    pub fn log_level(&self) -> Option<TraceLevel> {
        self.log_level
    }

    /// Applies a minimum log level until the returned guard is dropped.
    pub fn override_log_level(&mut self, level: Option<TraceLevel>) -> LogLevelGuard<'_> {
        let previous = self.log_level;
        if level.is_some() {
            self.log_level = level;
        }
        LogLevelGuard { context: self, previous }
    }

    /// Records a visited node in the innermost scope.
    pub fn trace(&mut self, label: impl Into<String>) {
        self.innermost().trace.push(TraceEntry::new(label));
    }

    /// Attaches arguments to the most recently traced node of the innermost scope.
    pub fn set_trace_args<I, K>(&mut self, args: I)
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        if let Some(entry) = self.innermost().trace.last_mut() {
            entry.args.extend(args.into_iter().map(|(key, value)| (key.into(), value)));
        }
    }

    /// Snapshots every scope for error reporting.
    ///
    /// An existing capture is kept unless `force` is set, so the snapshot reflects
    /// the innermost failure point.
    pub fn capture_trace(&mut self, force: bool) {
        if !self.config.capture_trace || (self.flow_trace.is_some() && !force) {
            return;
        }
        let sensitive_words = &self.config.sensitive_words;
        let scopes = self
            .scopes
            .iter()
            .enumerate()
            .map(|(index, scope)| ScopeSnapshot {
                depth: index + 1,
                variables: scope
                    .variables
                    .iter()
                    .map(|(name, cell)| (name.clone(), mask_sensitive(name, &cell.borrow(), sensitive_words)))
                    .collect(),
                entries: scope.trace.clone(),
            })
            .collect();
        self.flow_trace = Some(FlowTrace { scopes });
    }

    pub fn flow_trace(&self) -> Option<&FlowTrace> {
        self.flow_trace.as_ref()
    }

    pub fn take_flow_trace(&mut self) -> Option<FlowTrace> {
        self.flow_trace.take()
    }

    /// Forgets a captured trace once its error has been handled.
    pub fn clear_flow_trace(&mut self) {
        self.flow_trace = None;
    }
}

/// Pops the scope pushed by [`Context::enter_scope`] when dropped.
pub struct ScopeGuard<'a> {
    context: &'a mut Context,
    depth: usize,
}

impl Deref for ScopeGuard<'_> {
    type Target = Context;

    fn deref(&self) -> &Context {
        self.context
    }
}

impl DerefMut for ScopeGuard<'_> {
    fn deref_mut(&mut self) -> &mut Context {
        self.context
    }
}

impl Drop for ScopeGuard<'_> {
    fn drop(&mut self) {
        self.context.scopes.truncate(self.depth.max(1));
    }
}

/// Restores the previous log level when dropped.
pub struct LogLevelGuard<'a> {
    context: &'a mut Context,
    previous: Option<TraceLevel>,
}

impl Deref for LogLevelGuard<'_> {
    type Target = Context;

    fn deref(&self) -> &Context {
        self.context
    }
}

impl DerefMut for LogLevelGuard<'_> {
    fn deref_mut(&mut self) -> &mut Context {
        self.context
    }
}

impl Drop for LogLevelGuard<'_> {
    fn drop(&mut self) {
        self.context.log_level = self.previous;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn resolve_searches_innermost_first() {
        let mut context = Context::new();
        context.bind("name", json!("outer"));
        let mut inner = context.enter_scope();
        assert_eq!(inner.resolve("name").unwrap(), json!("outer"));
        inner.bind("name", json!("inner"));
        assert_eq!(inner.resolve("name").unwrap(), json!("inner"));
        drop(inner);
        assert_eq!(context.resolve("name").unwrap(), json!("outer"));
    }

    #[test]
    fn missing_variable_is_reported() {
        let context = Context::new();
        let error = context.resolve("absent").unwrap_err();
        assert!(error.is_a(&crate::ErrorKind::missing_variable()));
        assert!(error.message().contains("absent"));
    }

    #[test]
    fn new_bindings_vanish_with_their_scope() {
        let mut context = Context::new();
        context.with_scope(|scope| scope.bind("temporary", json!(1)));
        assert!(!context.contains("temporary"));
        assert_eq!(context.depth(), 1);
    }

    #[test]
    fn in_place_updates_survive_scope_pop() {
        let mut context = Context::new();
        context.bind("items", json!([]));
        context.with_scope(|scope| {
            scope
                .update("items", |value| {
                    if let Value::Array(items) = value {
                        items.push(json!("a"));
                    }
                })
                .unwrap();
        });
        assert_eq!(context.get("items"), Some(json!(["a"])));
    }

    #[test]
    fn bind_global_reaches_every_scope() {
        let mut context = Context::new();
        {
            let mut inner = context.enter_scope();
            inner.bind_global("shared", json!(true));
        }
        assert_eq!(context.get("shared"), Some(json!(true)));
    }

    #[test]
    fn guard_pops_even_when_body_fails() {
        let mut context = Context::new();
        let result: FlowResult<()> = context.with_scope(|scope| {
            scope.push_scope();
            Err(FlowError::runtime("boom"))
        });
        assert!(result.is_err());
        assert_eq!(context.depth(), 1);
    }

    #[test]
    fn root_scope_cannot_be_popped() {
        let mut context = Context::new();
        assert!(context.pop_scope().is_err());
    }

    #[test]
    fn format_falls_back_to_template() {
        let mut context = Context::new();
        context.bind("user", json!({"name": "Ada"}));
        assert_eq!(context.format("Hi {user.name}"), "Hi Ada");
        assert_eq!(context.format("Hi {nobody}"), "Hi {nobody}");
        let warnings: Vec<_> = context.records().into_iter().filter(|record| record.level == TraceLevel::Warn).collect();
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn log_records_carry_depth() {
        let mut context = Context::new();
        context.info("top");
        context.with_scope(|scope| scope.info("nested"));
        let records = context.records();
        assert_eq!(records[0].depth, 1);
        assert_eq!(records[1].depth, 2);
        assert_eq!(records[1].indented(), "    nested");
    }

    #[test]
    fn log_level_override_is_restored() {
        let mut context = Context::new();
        {
            let guard = context.override_log_level(Some(TraceLevel::Warn));
            guard.info("hidden");
            guard.warn("shown");
        }
        context.info("visible again");
        let messages: Vec<_> = context.records().into_iter().map(|record| record.message).collect();
        assert_eq!(messages, vec!["shown", "visible again"]);
    }

    #[test]
    fn capture_trace_masks_sensitive_values() {
        let mut context = Context::new();
        context.bind("api_token", json!("abc"));
        context.trace("Step `login`");
        context.set_trace_args([("attempt", json!(1))]);
        context.capture_trace(false);

        let trace = context.flow_trace().unwrap();
        assert_eq!(trace.scopes[0].variables["api_token"], json!("****"));
        assert_eq!(trace.scopes[0].entries[0].args["attempt"], json!(1));
    }

    #[test]
    fn capture_trace_keeps_innermost_snapshot() {
        let mut context = Context::new();
        context.trace("first");
        context.capture_trace(false);
        context.trace("second");
        context.capture_trace(false);
        assert_eq!(context.flow_trace().unwrap().labels(), vec!["first"]);
        context.capture_trace(true);
        assert_eq!(context.flow_trace().unwrap().labels(), vec!["first", "second"]);
    }

    #[test]
    fn records_can_be_disabled() {
        let config = EngineConfig {
            capture_records: false,
            ..EngineConfig::default()
        };
        let context = Context::with_config(config);
        context.info("dropped");
        assert!(context.records().is_empty());
    }
}
