//! Loop whose iterations run on a worker pool.

use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;

use scopeflow_types::NodeKind;

use crate::{
    context::Context,
    control::for_each::{parse_targets, source_items, targets_label, unpack},
    errors::{FlowError, FlowResult},
    node::{Branch, Node, NodeRef, call_nodes, node},
    parallel::pool::{TokioPool, WorkerJob, WorkerPool, WorkerTask},
};

#[derive(Clone)]
struct Collect {
    result_var: String,
    into_var: String,
}

/// Runs a body for every element of a list, each in an isolated worker context.
///
/// A worker context starts with copies of the declared shared variables and the
/// unpacked element; nothing else of the caller's context is visible and
/// nothing a worker binds flows back, except the declared result variable
/// which is gathered, in input order, into a list in the caller's scope.
///
/// ```rust
/// use scopeflow_engine::{nodes, testing::call_node, InlinePool, ParallelForEach, Step};
/// use serde_json::json;
///
/// let square = Step::new("Square", |args| Ok(json!(args.get_as::<i64>("n")?.pow(2)))).input("n").output("square");
/// let node = ParallelForEach::new("n", "numbers")
///     .body(nodes![square])
///     .collect("square", "squares")
///     .pool(InlinePool);
/// let context = call_node(&node, [("numbers", json!([1, 2, 3]))]).unwrap();
/// assert_eq!(context.get("squares"), Some(json!([1, 4, 9])));
/// ```
#[derive(Clone)]
pub struct ParallelForEach {
    targets: Vec<String>,
    in_var: String,
    shared: Vec<String>,
    collect: Option<Collect>,
    nodes: Vec<NodeRef>,
    pool: Arc<dyn WorkerPool>,
}

impl ParallelForEach {
    /// `targets` is one name or a comma separated list to unpack each element into.
    pub fn new(targets: &str, in_var: impl Into<String>) -> Self {
        Self {
            targets: parse_targets(targets),
            in_var: in_var.into(),
            shared: Vec::new(),
            collect: None,
            nodes: Vec::new(),
            pool: Arc::new(TokioPool::default()),
        }
    }

    /// Copies the variable `name` into every worker context.
    pub fn share(mut self, name: impl Into<String>) -> Self {
        self.shared.push(name.into());
        self
    }

    /// Gathers each worker's `result_var` into the list `into_var`.
    pub fn collect(mut self, result_var: impl Into<String>, into_var: impl Into<String>) -> Self {
        self.collect = Some(Collect {
            result_var: result_var.into(),
            into_var: into_var.into(),
        });
        self
    }

    pub fn body(mut self, nodes: Vec<NodeRef>) -> Self {
        self.nodes = nodes;
        self
    }

    pub fn then<N: Node + 'static>(mut self, child: N) -> Self {
        self.nodes.push(node(child));
        self
    }

    pub fn pool<P: WorkerPool + 'static>(mut self, pool: P) -> Self {
        self.pool = Arc::new(pool);
        self
    }

    fn jobs(&self, context: &Context) -> FlowResult<Vec<WorkerJob>> {
        let mut shared = IndexMap::new();
        for name in &self.shared {
            shared.insert(name.clone(), context.resolve(name)?);
        }

        source_items(context, &self.in_var)?
            .into_iter()
            .enumerate()
            .map(|(index, item)| -> FlowResult<WorkerJob> {
                let mut variables = shared.clone();
                variables.extend(unpack(&self.targets, item)?);
                Ok(WorkerJob { index, variables })
            })
            .collect()
    }

    fn task(&self, context: &Context) -> WorkerTask {
        let nodes = self.nodes.clone();
        let collect = self.collect.clone();
        let config = context.config().clone();
        Arc::new(move |job: WorkerJob| {
            let mut worker = Context::with_config(config.clone());
            worker.bind_many(job.variables);
            call_nodes(&nodes, &mut worker)?;
            match &collect {
                Some(collect) => worker.resolve(&collect.result_var).map_err(|_| {
                    FlowError::missing_variable(format!(
                        "worker {} did not bind result variable `{}`",
                        job.index, collect.result_var
                    ))
                }),
                None => Ok(Value::Null),
            }
        })
    }
}

impl Node for ParallelForEach {
    fn kind(&self) -> NodeKind {
        NodeKind::ParallelForEach
    }

    fn name(&self) -> String {
        format!("Parallel for {} in `{}`", targets_label(&self.targets), self.in_var)
    }

    fn execute(&self, context: &mut Context) -> FlowResult<()> {
        if self.targets.is_empty() {
            return Err(FlowError::setup(format!("loop over `{}` has no target variables", self.in_var)));
        }
        context.info(self.name());

        let jobs = self.jobs(context)?;
        let job_count = jobs.len();
        let results = self.pool.run(jobs, self.task(context));
        if results.len() != job_count {
            return Err(FlowError::runtime(format!(
                "worker pool returned {} results for {job_count} jobs",
                results.len()
            )));
        }

        let values = results.into_iter().collect::<FlowResult<Vec<Value>>>()?;
        if let Some(collect) = &self.collect {
            context.bind(collect.into_var.clone(), Value::Array(values));
        }
        Ok(())
    }

    fn branches(&self) -> Option<Vec<Branch<'_>>> {
        Some(vec![Branch::new("loop", self.nodes.as_slice())])
    }
}
