//! Due-Task Dispatch Cycle
//!
//! One sweep: fetch due tasks, then for each task (concurrently, bounded)
//! compute the next trigger, notify the owner, apply the outcome and save.
//! Failures are collected per task and never abort the batch; only a failed
//! due-task query is returned as an error.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::application::constants::{
    DEFAULT_LOOKAHEAD, DEFAULT_MAX_CONCURRENT_NOTIFICATIONS, NEXT_TRIGGER_NUDGE_SECS,
};
use crate::application::cron::compute_next_trigger;
use crate::application::ShutdownToken;
use crate::domain::{FireOutcome, ScheduledTask, ScheduledTaskId, TaskDueEvent};
use crate::error::Result;
use crate::port::{IdProvider, Notifier, ScheduledTaskRepository, TimeProvider};

/// Dispatch tuning
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Tasks due before `now + lookahead` are dispatched
    pub lookahead: chrono::Duration,
    /// Maximum notify+persist sequences in flight
    pub max_concurrent_notifications: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            lookahead: chrono::Duration::seconds(DEFAULT_LOOKAHEAD.as_secs() as i64),
            max_concurrent_notifications: DEFAULT_MAX_CONCURRENT_NOTIFICATIONS,
        }
    }
}

/// Why a task did not complete its fire attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Notifier returned an error (recorded on the task, task stays due)
    Notify,
    /// Saving the updated task failed
    Persist,
    /// Sweep was shut down before the task finished
    Cancelled,
}

/// One per-task failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFailure {
    pub task_id: ScheduledTaskId,
    pub kind: FailureKind,
    pub message: String,
}

/// Sweep result
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Due tasks returned by the query
    pub attempted: usize,
    /// Tasks that were both delivered and saved
    pub succeeded: usize,
    pub failures: Vec<TaskFailure>,
}

impl SweepReport {
    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }

    /// Tasks with at least one failure (a task can fail both notify and persist)
    pub fn failed_task_count(&self) -> usize {
        self.failures
            .iter()
            .map(|f| f.task_id.as_str())
            .collect::<HashSet<_>>()
            .len()
    }

    pub fn failures_of(&self, kind: FailureKind) -> impl Iterator<Item = &TaskFailure> {
        self.failures.iter().filter(move |f| f.kind == kind)
    }
}

#[derive(Debug, Default)]
struct TaskOutcome {
    succeeded: bool,
    failures: Vec<TaskFailure>,
}

impl TaskOutcome {
    fn cancelled(task_id: &str) -> Self {
        Self {
            succeeded: false,
            failures: vec![TaskFailure {
                task_id: task_id.to_string(),
                kind: FailureKind::Cancelled,
                message: format!("Dispatch of scheduled task {} cancelled by shutdown", task_id),
            }],
        }
    }
}

/// Runs one sweep over due tasks
pub struct DispatchCycle {
    repository: Arc<dyn ScheduledTaskRepository>,
    notifier: Arc<dyn Notifier>,
    id_provider: Arc<dyn IdProvider>,
    time_provider: Arc<dyn TimeProvider>,
    config: DispatchConfig,
}

impl DispatchCycle {
    pub fn new(
        repository: Arc<dyn ScheduledTaskRepository>,
        notifier: Arc<dyn Notifier>,
        id_provider: Arc<dyn IdProvider>,
        time_provider: Arc<dyn TimeProvider>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            repository,
            notifier,
            id_provider,
            time_provider,
            config,
        }
    }

    /// Run one sweep as of `now`
    ///
    /// # Errors
    /// Only a failed due-task query. Per-task failures land in the report.
    pub async fn run_once(&self, now: DateTime<Utc>, shutdown: &ShutdownToken) -> Result<SweepReport> {
        let horizon = now + self.config.lookahead;

        let due = self.repository.find_due(horizon).await.map_err(|e| {
            error!(horizon = %horizon, error = %e, "Failed to query due scheduled tasks");
            e
        })?;

        if due.is_empty() {
            debug!(horizon = %horizon, "No scheduled tasks due");
            return Ok(SweepReport::default());
        }

        info!(count = due.len(), horizon = %horizon, "Dispatching due scheduled tasks");

        let attempted = due.len();
        let outcomes: Vec<TaskOutcome> = stream::iter(due)
            .map(|task| self.dispatch_task(task, now, shutdown.clone()))
            .buffer_unordered(self.config.max_concurrent_notifications.max(1))
            .collect()
            .await;

        let mut report = SweepReport {
            attempted,
            ..SweepReport::default()
        };
        for outcome in outcomes {
            if outcome.succeeded {
                report.succeeded += 1;
            }
            report.failures.extend(outcome.failures);
        }

        Ok(report)
    }

    async fn dispatch_task(
        &self,
        mut task: ScheduledTask,
        now: DateTime<Utc>,
        mut shutdown: ShutdownToken,
    ) -> TaskOutcome {
        if shutdown.is_shutdown() {
            return TaskOutcome::cancelled(&task.id);
        }

        let next_trigger_time = if task.is_recurring {
            Some(compute_next_trigger(
                &task,
                now + chrono::Duration::seconds(NEXT_TRIGGER_NUDGE_SECS),
                false,
            ))
        } else {
            None
        };
        let event = TaskDueEvent::for_task(self.id_provider.generate_id(), &task, next_trigger_time);

        let notified = tokio::select! {
            biased;
            _ = shutdown.wait() => return TaskOutcome::cancelled(&task.id),
            result = self.notifier.notify(&task, &event) => result,
        };

        let mut outcome = TaskOutcome::default();
        let fired_at = self.time_provider.now();

        match notified {
            Ok(()) => {
                info!(
                    task_id = %task.id,
                    application_id = %task.application_id,
                    event_id = %event.event_id,
                    trigger_time = %task.next_trigger_time,
                    "Scheduled task triggered"
                );
                task.apply_fire_outcome(fired_at, FireOutcome::Delivered { next_trigger_time });
            }
            Err(e) => {
                let message = format!(
                    "Failed to successfully trigger scheduled task {}, error: {}",
                    task.id, e
                );
                warn!(
                    task_id = %task.id,
                    application_id = %task.application_id,
                    error = %e,
                    "Failed to trigger scheduled task"
                );
                task.apply_fire_outcome(
                    fired_at,
                    FireOutcome::Failed {
                        error: e.to_string(),
                    },
                );
                outcome.failures.push(TaskFailure {
                    task_id: task.id.clone(),
                    kind: FailureKind::Notify,
                    message,
                });
            }
        }

        // The notify outcome is already final, so the save always runs
        match self.repository.save(&task).await {
            Ok(()) => {
                debug!(
                    task_id = %task.id,
                    is_enabled = task.is_enabled,
                    next_trigger_time = %task.next_trigger_time,
                    "Scheduled task updated"
                );
                outcome.succeeded = outcome.failures.is_empty();
            }
            Err(e) => {
                error!(task_id = %task.id, error = %e, "Unable to update scheduled task");
                outcome.failures.push(TaskFailure {
                    task_id: task.id.clone(),
                    kind: FailureKind::Persist,
                    message: format!("Unable to update scheduled task {}, error: {}", task.id, e),
                });
            }
        }

        outcome
    }
}
