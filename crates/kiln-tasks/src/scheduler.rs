//! Scheduler and workers
//!
//! Every node of a resolved [`Plan`] gets one worker, spawned as a local
//! task on a single thread. A worker sleeps on its inbox until each of its
//! direct dependencies has signalled finish or failure, then runs its guard,
//! freshness check and actions. Workers only make progress at await points,
//! so a CPU-bound action holds up every other worker until it yields.

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::task::LocalSet;
use tracing::{debug, error, warn};

use crate::context::ExecutionContext;
use crate::fs::{expand_all, needs_rebuild, File};
use crate::graph::Plan;
use crate::reporter::{TaskEvent, TaskReporter};
use crate::target::{ActionError, DynamicList, LocalFuture, Target};

/// Final status of one target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    /// Actions ran and succeeded
    Success,
    /// Finished without running actions (guard unmet or up to date)
    Skipped(String),
    /// The target or one of its dependencies failed
    Failed(String),
}

impl TaskStatus {
    /// Check if this status represents success
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success | Self::Skipped(_))
    }
}

/// Result of a single target
#[derive(Debug, Clone)]
pub struct TaskResult {
    pub target: String,
    pub status: TaskStatus,
    pub duration: Duration,
}

/// Aggregate outcome of a run
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Per-target results in dependency order
    pub results: Vec<TaskResult>,
    pub duration: Duration,
}

impl RunSummary {
    /// Check if no target failed
    pub fn success(&self) -> bool {
        self.results.iter().all(|r| r.status.is_success())
    }

    /// `0` when every target succeeded, `1` otherwise
    pub fn exit_code(&self) -> i32 {
        if self.success() {
            0
        } else {
            1
        }
    }

    /// Get the failed targets
    pub fn failed(&self) -> Vec<&TaskResult> {
        self.results
            .iter()
            .filter(|r| matches!(r.status, TaskStatus::Failed(_)))
            .collect()
    }

    /// Count skipped targets
    pub fn skipped(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r.status, TaskStatus::Skipped(_)))
            .count()
    }

    /// Get the result of a target
    pub fn get(&self, target: &str) -> Option<&TaskResult> {
        self.results.iter().find(|r| r.target == target)
    }
}

/// Lifecycle of a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    AwaitingDependencies,
    GuardCheck,
    FreshnessCheck,
    Running,
    Finished,
    Failed,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::AwaitingDependencies => "awaiting dependencies",
            Self::GuardCheck => "guard check",
            Self::FreshnessCheck => "freshness check",
            Self::Running => "running",
            Self::Finished => "finished",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Sent once by a worker to each dependent when it reaches a terminal state
#[derive(Debug, Clone)]
struct Completion {
    target: String,
    failed: bool,
}

/// Drives one target through its lifecycle
struct Worker {
    target: Arc<Target>,
    context: ExecutionContext,
    state: WorkerState,
    pending: HashSet<String>,
    has_failed: bool,
    inbox: UnboundedReceiver<Completion>,
    dependents: Vec<UnboundedSender<Completion>>,
    reporter: Arc<dyn TaskReporter>,
}

impl Worker {
    fn name(&self) -> &str {
        self.target.name()
    }

    fn transition(&mut self, next: WorkerState) {
        debug!(target = %self.target.name(), from = %self.state, to = %next, "worker state");
        self.state = next;
    }

    async fn run(mut self) -> TaskResult {
        debug!(target = %self.name(), pending = self.pending.len(), "waiting for dependencies");
        while !self.pending.is_empty() {
            match self.inbox.recv().await {
                Some(completion) => {
                    if self.pending.remove(&completion.target) && completion.failed {
                        self.has_failed = true;
                    }
                }
                None => {
                    // Every dependency is gone without reporting
                    self.has_failed = true;
                    break;
                }
            }
        }
        // Durations cover this target's own work only
        let started = Instant::now();
        if self.has_failed {
            return self.fail(started, "dependency failed".to_string());
        }

        self.transition(WorkerState::GuardCheck);
        if self.target.has_guard() {
            match isolate(self.target.check_guard(&self.context)).await {
                Ok(true) => debug!(target = %self.name(), "needs rebuild based on guard"),
                Ok(false) => return self.skip(started, "condition unmet"),
                Err(panic) => return self.fail(started, format!("guard panicked: {}", panic)),
            }
        }

        self.transition(WorkerState::FreshnessCheck);
        let inputs = match self.resolve_files(self.target.inputs().clone()).await {
            Ok(files) => files,
            Err(panic) => return self.fail(started, format!("inputs panicked: {}", panic)),
        };
        let outputs = match self.resolve_files(self.target.outputs().clone()).await {
            Ok(files) => files,
            Err(panic) => return self.fail(started, format!("outputs panicked: {}", panic)),
        };
        if inputs.is_empty() {
            debug!(target = %self.name(), "nothing to compare");
        } else {
            match needs_rebuild(&inputs, &outputs) {
                None => return self.skip(started, "up to date"),
                Some(reason) => debug!(target = %self.name(), %reason, "needs rebuild"),
            }
        }

        self.transition(WorkerState::Running);
        let action_count = self.target.action_count();
        if action_count > 0 {
            self.reporter.report(&TaskEvent::Started {
                target: self.name().to_string(),
            });
        }
        for index in 0..action_count {
            let Some(action) = self.target.action(index, &self.context) else {
                break;
            };
            match isolate(action).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    let message = describe_action_error(&err);
                    if err.exit_code().is_none() {
                        error!(target = %self.name(), error = ?err, "unhandled action error");
                    }
                    return self.fail(started, message);
                }
                Err(panic) => return self.fail(started, ActionError::Panicked(panic).to_string()),
            }
        }

        for file in &outputs {
            if let Err(e) = file.touch() {
                warn!(target = %self.name(), path = %file.path().display(), error = %e, "failed to touch output");
            }
        }
        self.finish(started)
    }

    async fn resolve_files(&self, list: DynamicList) -> Result<Vec<File>, String> {
        let ctx = self.context.clone();
        let specs = isolate(Box::pin(async move { list.resolve(&ctx).await })).await?;
        Ok(expand_all(&specs))
    }

    fn finish(mut self, started: Instant) -> TaskResult {
        self.transition(WorkerState::Finished);
        let duration = started.elapsed();
        self.reporter.report(&TaskEvent::Completed {
            target: self.name().to_string(),
            duration,
        });
        self.signal(false);
        self.result(TaskStatus::Success, duration)
    }

    fn skip(mut self, started: Instant, reason: &str) -> TaskResult {
        self.transition(WorkerState::Finished);
        self.reporter.report(&TaskEvent::Skipped {
            target: self.name().to_string(),
            reason: reason.to_string(),
        });
        self.signal(false);
        self.result(TaskStatus::Skipped(reason.to_string()), started.elapsed())
    }

    fn fail(mut self, started: Instant, error: String) -> TaskResult {
        self.transition(WorkerState::Failed);
        let duration = started.elapsed();
        self.reporter.report(&TaskEvent::Failed {
            target: self.name().to_string(),
            duration,
            error: error.clone(),
        });
        self.signal(true);
        self.result(TaskStatus::Failed(error), duration)
    }

    fn signal(&mut self, failed: bool) {
        let target = self.target.name().to_string();
        for dependent in self.dependents.drain(..) {
            let _ = dependent.send(Completion {
                target: target.clone(),
                failed,
            });
        }
    }

    fn result(&self, status: TaskStatus, duration: Duration) -> TaskResult {
        TaskResult {
            target: self.name().to_string(),
            status,
            duration,
        }
    }
}

fn describe_action_error(err: &ActionError) -> String {
    match err.exit_code() {
        Some(Some(code)) => format!("exit code: {}", code),
        Some(None) => "terminated by signal".to_string(),
        None => err.to_string(),
    }
}

/// Run a callback as its own local task so a panic stays contained
async fn isolate<T: 'static>(fut: LocalFuture<T>) -> Result<T, String> {
    match tokio::task::spawn_local(fut).await {
        Ok(value) => Ok(value),
        Err(e) if e.is_panic() => Err(panic_message(e.into_panic())),
        Err(e) => Err(e.to_string()),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Runs every worker of a plan to a terminal state
pub struct Scheduler {
    reporter: Arc<dyn TaskReporter>,
}

impl Scheduler {
    /// Create a scheduler reporting to `reporter`
    pub fn new(reporter: Arc<dyn TaskReporter>) -> Self {
        Self { reporter }
    }

    /// Execute all targets of the plan.
    ///
    /// Never stops early: independent branches run to completion even when
    /// another branch fails.
    pub async fn execute(&self, plan: &Plan) -> RunSummary {
        let local = LocalSet::new();
        local.run_until(self.execute_local(plan)).await
    }

    async fn execute_local(&self, plan: &Plan) -> RunSummary {
        let start = Instant::now();

        let order: Vec<&String> = plan.waves().iter().flatten().collect();
        let mut senders: HashMap<&str, UnboundedSender<Completion>> = HashMap::new();
        let mut inboxes: HashMap<&str, UnboundedReceiver<Completion>> = HashMap::new();
        for name in &order {
            let (tx, rx) = unbounded_channel();
            senders.insert(name.as_str(), tx);
            inboxes.insert(name.as_str(), rx);
        }

        let mut handles = Vec::new();
        for name in &order {
            let (Some(node), Some(inbox)) = (plan.get(name), inboxes.remove(name.as_str())) else {
                continue;
            };
            let dependents = node
                .dependents
                .iter()
                .filter_map(|d| senders.get(d.as_str()).cloned())
                .collect();
            let worker = Worker {
                target: node.target.clone(),
                context: node.context.clone(),
                state: WorkerState::AwaitingDependencies,
                pending: node.dependencies.iter().cloned().collect(),
                has_failed: false,
                inbox,
                dependents,
                reporter: self.reporter.clone(),
            };
            debug!(target = %name, "worker ready");
            handles.push(((*name).clone(), tokio::task::spawn_local(worker.run())));
        }
        // Only workers hold senders from here on, so an inbox closes once
        // every dependency is gone.
        drop(senders);

        let mut results = Vec::with_capacity(handles.len());
        for (name, handle) in handles {
            match handle.await {
                Ok(result) => results.push(result),
                Err(e) => {
                    error!(target = %name, error = %e, "worker aborted");
                    results.push(TaskResult {
                        target: name,
                        status: TaskStatus::Failed(format!("worker aborted: {}", e)),
                        duration: Duration::ZERO,
                    });
                }
            }
        }

        let summary = RunSummary {
            results,
            duration: start.elapsed(),
        };
        let failed = summary.failed().len();
        let skipped = summary.skipped();
        self.reporter.report(&TaskEvent::AllCompleted {
            total: summary.results.len(),
            succeeded: summary.results.len() - failed,
            failed,
            skipped,
            duration: summary.duration,
        });
        summary
    }
}
