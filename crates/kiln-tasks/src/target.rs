//! Target definitions

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::context::ExecutionContext;
use crate::parameter::Parameter;
use crate::process::ExecError;

/// Boxed future returned by target callbacks. Targets run on a single
/// thread, so the futures need not be `Send`.
pub type LocalFuture<T> = Pin<Box<dyn Future<Output = T> + 'static>>;

/// Outcome of a single action
pub type ActionResult = Result<(), ActionError>;

type ListFn = Arc<dyn Fn(ExecutionContext) -> LocalFuture<Vec<Option<String>>> + Send + Sync>;
type GuardFn = Arc<dyn Fn(ExecutionContext) -> LocalFuture<bool> + Send + Sync>;
type ActionFn = Arc<dyn Fn(ExecutionContext) -> LocalFuture<ActionResult> + Send + Sync>;

/// A list that is either fixed or computed from the execution context.
///
/// Computed lists may contain `None` placeholders; they are dropped on
/// resolution.
#[derive(Clone)]
pub enum DynamicList {
    Static(Vec<String>),
    Computed(ListFn),
}

impl DynamicList {
    /// A list produced from the context when the target is resolved
    pub fn computed<F, Fut>(f: F) -> Self
    where
        F: Fn(ExecutionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Vec<Option<String>>> + 'static,
    {
        Self::Computed(Arc::new(move |ctx| Box::pin(f(ctx))))
    }

    /// Check if the list depends on the context
    pub fn is_computed(&self) -> bool {
        matches!(self, Self::Computed(_))
    }

    /// Produce the concrete entries for a context
    pub async fn resolve(&self, ctx: &ExecutionContext) -> Vec<String> {
        match self {
            Self::Static(items) => items.clone(),
            Self::Computed(f) => f(ctx.clone()).await.into_iter().flatten().collect(),
        }
    }

    /// Static entries, empty for computed lists
    pub fn static_entries(&self) -> &[String] {
        match self {
            Self::Static(items) => items,
            Self::Computed(_) => &[],
        }
    }
}

impl Default for DynamicList {
    fn default() -> Self {
        Self::Static(Vec::new())
    }
}

impl fmt::Debug for DynamicList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(items) => f.debug_tuple("Static").field(items).finish(),
            Self::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

/// A named unit of build work
#[derive(Clone)]
pub struct Target {
    name: String,
    depends_on: DynamicList,
    inputs: DynamicList,
    outputs: DynamicList,
    only_when: Option<GuardFn>,
    executes: Vec<ActionFn>,
    parameters: Vec<Parameter>,
}

impl Target {
    /// Create a target with no dependencies, files or actions
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            depends_on: DynamicList::default(),
            inputs: DynamicList::default(),
            outputs: DynamicList::default(),
            only_when: None,
            executes: Vec::new(),
            parameters: Vec::new(),
        }
    }

    /// Add a dependency by target name.
    ///
    /// Replaces a computed dependency list.
    pub fn with_depends_on(mut self, dep: impl Into<String>) -> Self {
        match &mut self.depends_on {
            DynamicList::Static(items) => items.push(dep.into()),
            DynamicList::Computed(_) => self.depends_on = DynamicList::Static(vec![dep.into()]),
        }
        self
    }

    /// Compute dependencies from the context
    pub fn with_depends_on_fn<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(ExecutionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Vec<Option<String>>> + 'static,
    {
        self.depends_on = DynamicList::computed(f);
        self
    }

    /// Replace the dependency list
    pub fn with_dependencies(mut self, list: DynamicList) -> Self {
        self.depends_on = list;
        self
    }

    /// Set static input paths or globs
    pub fn with_inputs<I, S>(mut self, inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inputs = DynamicList::Static(inputs.into_iter().map(Into::into).collect());
        self
    }

    /// Set static output paths
    pub fn with_outputs<I, S>(mut self, outputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.outputs = DynamicList::Static(outputs.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_inputs_list(mut self, list: DynamicList) -> Self {
        self.inputs = list;
        self
    }

    pub fn with_outputs_list(mut self, list: DynamicList) -> Self {
        self.outputs = list;
        self
    }

    /// Only run the actions when the guard resolves to `true`
    pub fn with_only_when<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(ExecutionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = bool> + 'static,
    {
        self.only_when = Some(Arc::new(move |ctx| Box::pin(f(ctx))));
        self
    }

    /// Append an action; actions run in declaration order
    pub fn with_action<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(ExecutionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ActionResult> + 'static,
    {
        self.executes.push(Arc::new(move |ctx| Box::pin(f(ctx))));
        self
    }

    /// Accept this parameter in the target's own task scope
    pub fn with_parameter(mut self, parameter: Parameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// Get the target name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the dependency list
    pub fn depends_on(&self) -> &DynamicList {
        &self.depends_on
    }

    /// Get the input list
    pub fn inputs(&self) -> &DynamicList {
        &self.inputs
    }

    /// Get the output list
    pub fn outputs(&self) -> &DynamicList {
        &self.outputs
    }

    /// Get the task-scope parameters
    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    /// Check if an only-when guard is set
    pub fn has_guard(&self) -> bool {
        self.only_when.is_some()
    }

    /// Get the number of actions
    pub fn action_count(&self) -> usize {
        self.executes.len()
    }

    /// Evaluate the guard; targets without one always run
    pub fn check_guard(&self, ctx: &ExecutionContext) -> LocalFuture<bool> {
        match &self.only_when {
            Some(guard) => guard(ctx.clone()),
            None => Box::pin(async { true }),
        }
    }

    /// Start the action at `index`
    pub fn action(&self, index: usize, ctx: &ExecutionContext) -> Option<LocalFuture<ActionResult>> {
        self.executes.get(index).map(|action| action(ctx.clone()))
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Target")
            .field("name", &self.name)
            .field("depends_on", &self.depends_on)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .field("only_when", &self.only_when.is_some())
            .field("executes", &self.executes.len())
            .field("parameters", &self.parameters)
            .finish()
    }
}

/// Errors raised by a target action
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    /// A spawned command failed
    #[error(transparent)]
    Exec(#[from] ExecError),

    /// The action panicked
    #[error("action panicked: {0}")]
    Panicked(String),

    /// Free-form failure
    #[error("{0}")]
    Failed(String),

    /// Any other error
    #[error(transparent)]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl ActionError {
    /// Fail with a plain message
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }

    /// Wrap any error
    pub fn other<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Other(Box::new(err))
    }

    /// Exit code when the failure came from a non-zero process exit
    pub fn exit_code(&self) -> Option<Option<i32>> {
        match self {
            Self::Exec(ExecError::Exit { code }) => Some(*code),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ActionError {
    fn from(err: std::io::Error) -> Self {
        Self::other(err)
    }
}
