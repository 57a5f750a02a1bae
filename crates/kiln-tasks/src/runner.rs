//! Top-level entry point: from raw arguments to a finished run

use std::sync::Arc;

use tracing::{info, instrument};

use crate::args::{parse_global, segment, EnvSource, ParameterMap, Segments, TaskArgs};
use crate::graph::{GraphError, Plan, TargetGraph};
use crate::parameter::ParameterRegistry;
use crate::reporter::{TaskReporter, TracingReporter};
use crate::scheduler::{RunSummary, Scheduler};

/// Runs targets of a graph on request
pub struct Runner {
    graph: TargetGraph,
    parameters: ParameterRegistry,
    reporter: Arc<dyn TaskReporter>,
}

impl Runner {
    /// Create a runner that reports through tracing
    pub fn new(graph: TargetGraph, parameters: ParameterRegistry) -> Self {
        Self {
            graph,
            parameters,
            reporter: Arc::new(TracingReporter),
        }
    }

    /// Set the reporter for task events
    pub fn with_reporter(mut self, reporter: Arc<dyn TaskReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Get the target graph
    pub fn graph(&self) -> &TargetGraph {
        &self.graph
    }

    /// Get the global parameters
    pub fn parameters(&self) -> &ParameterRegistry {
        &self.parameters
    }

    /// Pick the targets to run: the named tasks, or the default target
    pub fn select(&self, segments: &Segments) -> Result<Vec<TaskArgs>, RunError> {
        if segments.tasks.is_empty() {
            return match self.graph.default_target() {
                Some(default) => Ok(vec![TaskArgs {
                    name: default.to_string(),
                    args: Vec::new(),
                }]),
                None => Err(RunError::NoDefaultTarget {
                    available: self.graph.names().to_vec(),
                }),
            };
        }
        for task in &segments.tasks {
            if !self.graph.contains(&task.name) {
                return Err(RunError::UnknownTarget {
                    name: task.name.clone(),
                    available: self.graph.names().to_vec(),
                });
            }
        }
        Ok(segments.tasks.clone())
    }

    /// Resolve the dependency closure for the given arguments without running it
    #[instrument(skip_all)]
    pub async fn plan<I, S>(&self, args: I, env: &dyn EnvSource) -> Result<Plan, RunError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments = segment(args);
        let global = Arc::new(parse_global(&segments.global, self.parameters.all(), env));
        self.plan_segments(&segments, global).await
    }

    async fn plan_segments(
        &self,
        segments: &Segments,
        global: Arc<ParameterMap>,
    ) -> Result<Plan, RunError> {
        let requested = self.select(segments)?;
        let names: Vec<&str> = requested.iter().map(|t| t.name.as_str()).collect();
        info!(targets = ?names, "resolving targets");
        Ok(Plan::resolve(&self.graph, &requested, global).await?)
    }

    /// Parse arguments, resolve the closure and execute it
    #[instrument(skip_all)]
    pub async fn run<I, S>(&self, args: I, env: &dyn EnvSource) -> Result<RunSummary, RunError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let plan = self.plan(args, env).await?;
        Ok(Scheduler::new(self.reporter.clone()).execute(&plan).await)
    }
}

/// Errors that stop a run before any target starts
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("Task '{name}' was not found")]
    UnknownTarget { name: String, available: Vec<String> },

    #[error("No task was provided in arguments")]
    NoDefaultTarget { available: Vec<String> },

    #[error(transparent)]
    Graph(#[from] GraphError),
}

impl RunError {
    /// Declared targets, when the error is about picking one
    pub fn available(&self) -> &[String] {
        match self {
            Self::UnknownTarget { available, .. } | Self::NoDefaultTarget { available } => available,
            Self::Graph(_) => &[],
        }
    }
}
