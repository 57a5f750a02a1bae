//! Kiln Tasks - Target scheduling engine
//!
//! This crate resolves command line arguments into typed parameters,
//! computes the dependency closure of the requested targets, and runs each
//! target once on a single-threaded scheduler, skipping work whose outputs
//! are newer than their inputs.

pub mod args;
pub mod context;
pub mod fs;
pub mod graph;
pub mod parameter;
pub mod process;
pub mod reporter;
pub mod runner;
pub mod scheduler;
pub mod target;

pub use args::{segment, EnvSource, ParameterMap, ProcessEnv, Segments, TaskArgs};
pub use context::{ExecutionContext, ParameterValue};
pub use fs::{needs_rebuild, File, RebuildReason};
pub use graph::{GraphError, Plan, PlanNode, TargetGraph};
pub use parameter::{Parameter, ParameterError, ParameterRegistry, ParameterType, Value};
pub use process::{exec, shell, ExecError, ExecOptions, ExecOutput, Supervisor};
pub use reporter::{CollectingReporter, ReporterSet, TaskEvent, TaskReporter, TracingReporter};
pub use runner::{RunError, Runner};
pub use scheduler::{RunSummary, Scheduler, TaskResult, TaskStatus, WorkerState};
pub use target::{ActionError, ActionResult, DynamicList, LocalFuture, Target};
