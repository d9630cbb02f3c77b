//! RPC Request/Response Types
//!
//! Defines the JSON-RPC method parameters and results.

use cadence_core::application::{SweepReport, TaskFailure};
use cadence_core::domain::{is_never, ExtraValues, ScheduledTask};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// schedule.add.v1 - Register a one-off or recurring task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddScheduleRequest {
    pub application_id: String,
    pub reply_address: String,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_recurring: bool,
    #[serde(default)]
    pub cron_expression: Option<String>,
    #[serde(default)]
    pub utc_offset_minutes: Option<i32>,
    #[serde(default)]
    pub extra_values: ExtraValues,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddScheduleResponse {
    pub task_id: String,
    pub next_trigger_time: DateTime<Utc>,
    pub is_recurring: bool,
}

/// schedule.get.v1 - Inspect a task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetScheduleRequest {
    pub task_id: String,
}

/// Task as shown to operators. The "never" sentinel is rendered as null.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskView {
    pub task_id: String,
    pub application_id: String,
    pub reply_address: String,
    pub state: String,
    pub is_enabled: bool,
    pub next_trigger_time: Option<DateTime<Utc>>,
    pub is_recurring: bool,
    pub cron_expression: Option<String>,
    pub utc_offset_minutes: Option<i32>,
    pub extra_values: ExtraValues,
    pub previous_triggered_time: Option<DateTime<Utc>>,
    pub previous_trigger_was_successful: bool,
    pub previous_error: Option<String>,
    pub total_success_count: u32,
    pub consecutive_success_count: u32,
    pub total_failure_count: u32,
    pub consecutive_failure_count: u32,
    pub created_on: DateTime<Utc>,
}

fn unless_never(t: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if is_never(t) {
        None
    } else {
        Some(t)
    }
}

impl From<ScheduledTask> for TaskView {
    fn from(task: ScheduledTask) -> Self {
        let state = task.state().to_string();
        let (cron_expression, utc_offset_minutes) = match task.recurring_settings {
            Some(s) => (Some(s.cron_expression), Some(s.utc_offset_minutes)),
            None => (None, None),
        };
        let m = task.metadata;

        Self {
            task_id: task.id,
            application_id: task.application_id.to_string(),
            reply_address: task.reply_address,
            state,
            is_enabled: task.is_enabled,
            next_trigger_time: unless_never(task.next_trigger_time),
            is_recurring: task.is_recurring,
            cron_expression,
            utc_offset_minutes,
            extra_values: task.extra_values,
            previous_triggered_time: unless_never(m.previous_triggered_time),
            previous_trigger_was_successful: m.previous_trigger_was_successful,
            previous_error: m.previous_error,
            total_success_count: m.total_success_count,
            consecutive_success_count: m.consecutive_success_count,
            total_failure_count: m.total_failure_count,
            consecutive_failure_count: m.consecutive_failure_count,
            created_on: task.created_on,
        }
    }
}

/// sweep.run.v1 - Run one sweep now
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SweepRequest {
    // No parameters needed
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepResponse {
    pub attempted: usize,
    pub succeeded: usize,
    /// Distinct tasks with at least one failure
    pub failed: usize,
    pub failures: Vec<TaskFailure>,
}

impl From<SweepReport> for SweepResponse {
    fn from(report: SweepReport) -> Self {
        Self {
            attempted: report.attempted,
            succeeded: report.succeeded,
            failed: report.failed_task_count(),
            failures: report.failures,
        }
    }
}
