//! Target execution reporting

use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Events emitted while a run progresses
#[derive(Debug, Clone, PartialEq)]
pub enum TaskEvent {
    /// A target's actions are starting
    Started { target: String },
    /// A target finished without running its actions
    Skipped { target: String, reason: String },
    /// A target's actions completed successfully
    Completed { target: String, duration: Duration },
    /// A target failed, either itself or through a dependency
    Failed {
        target: String,
        duration: Duration,
        error: String,
    },
    /// Every worker reached a terminal state
    AllCompleted {
        total: usize,
        succeeded: usize,
        failed: usize,
        skipped: usize,
        duration: Duration,
    },
}

impl TaskEvent {
    /// Target the event is about, if any
    pub fn target(&self) -> Option<&str> {
        match self {
            Self::Started { target }
            | Self::Skipped { target, .. }
            | Self::Completed { target, .. }
            | Self::Failed { target, .. } => Some(target),
            Self::AllCompleted { .. } => None,
        }
    }
}

/// Trait for reporting run progress
pub trait TaskReporter: Send + Sync {
    /// Handle an event
    fn report(&self, event: &TaskEvent);
}

/// Reporter that logs through tracing
#[derive(Debug, Default)]
pub struct TracingReporter;

impl TaskReporter for TracingReporter {
    fn report(&self, event: &TaskEvent) {
        match event {
            TaskEvent::Started { target } => {
                tracing::info!("Starting '{}'", target);
            }
            TaskEvent::Skipped { target, reason } => {
                tracing::info!("Skipping '{}' ({})", target, reason);
            }
            TaskEvent::Completed { target, duration } => {
                tracing::info!("Finished '{}' in {:.1}s", target, duration.as_secs_f64());
            }
            TaskEvent::Failed {
                target,
                duration,
                error,
            } => {
                tracing::error!(
                    "Target '{}' failed in {:.1}s: {}",
                    target,
                    duration.as_secs_f64(),
                    error
                );
            }
            TaskEvent::AllCompleted {
                total,
                succeeded,
                failed,
                skipped,
                duration,
            } => {
                if *failed == 0 {
                    tracing::info!("Done in {:.1}s", duration.as_secs_f64());
                }
                tracing::debug!(total, succeeded, failed, skipped, "run complete");
            }
        }
    }
}

/// Reporter that collects events for later inspection (useful for testing)
#[derive(Debug, Default)]
pub struct CollectingReporter {
    events: Mutex<Vec<TaskEvent>>,
}

impl CollectingReporter {
    /// Get all collected events
    pub fn events(&self) -> Vec<TaskEvent> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Names of targets whose actions started, in order
    pub fn started(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                TaskEvent::Started { target } => Some(target),
                _ => None,
            })
            .collect()
    }
}

impl TaskReporter for CollectingReporter {
    fn report(&self, event: &TaskEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event.clone());
    }
}

/// Fans events out to several reporters
#[derive(Default)]
pub struct ReporterSet {
    reporters: Vec<Arc<dyn TaskReporter>>,
}

impl ReporterSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a reporter; events go to every reporter in order
    pub fn register(&mut self, reporter: Arc<dyn TaskReporter>) {
        self.reporters.push(reporter);
    }

    pub fn len(&self) -> usize {
        self.reporters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reporters.is_empty()
    }
}

impl TaskReporter for ReporterSet {
    fn report(&self, event: &TaskEvent) {
        for reporter in &self.reporters {
            reporter.report(event);
        }
    }
}
