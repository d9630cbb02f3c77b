// Scheduled Task Domain Model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::error::{DomainError, Result};

/// Scheduled task ID (UUID v4)
pub type ScheduledTaskId = String;

/// Application-defined context passed through to the due-task payload
pub type ExtraValues = BTreeMap<String, Option<String>>;

/// Sentinel for "never successfully computed" (Unix epoch)
pub fn never() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

/// True for the sentinel and anything before it
pub fn is_never(time: DateTime<Utc>) -> bool {
    time <= never()
}

/// Owning client application
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApplicationId(String);

impl ApplicationId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Cron settings of a recurring task.
///
/// The cron fields are matched in a fixed-offset "local" time where
/// `local = utc + utc_offset_minutes`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurringSettings {
    pub cron_expression: String,
    pub utc_offset_minutes: i32,
}

impl RecurringSettings {
    pub fn new(cron_expression: impl Into<String>, utc_offset_minutes: i32) -> Self {
        Self {
            cron_expression: cron_expression.into(),
            utc_offset_minutes,
        }
    }
}

/// Trigger outcome history, mutated only by the state machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskMetadata {
    pub previous_triggered_time: DateTime<Utc>,
    pub previous_trigger_was_successful: bool,
    pub previous_error: Option<String>,

    pub total_success_count: u32,
    pub consecutive_success_count: u32,
    pub total_failure_count: u32,
    pub consecutive_failure_count: u32,
}

impl Default for TaskMetadata {
    fn default() -> Self {
        Self {
            previous_triggered_time: never(),
            previous_trigger_was_successful: false,
            previous_error: None,
            total_success_count: 0,
            consecutive_success_count: 0,
            total_failure_count: 0,
            consecutive_failure_count: 0,
        }
    }
}

/// Derived lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    EnabledPending,
    EnabledFired,
    Disabled,
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskState::EnabledPending => write!(f, "ENABLED_PENDING"),
            TaskState::EnabledFired => write!(f, "ENABLED_FIRED"),
            TaskState::Disabled => write!(f, "DISABLED"),
        }
    }
}

/// Result of one fire attempt, as seen by the state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FireOutcome {
    /// The notifier accepted the event. `next_trigger_time` is the value
    /// computed before notifying (recurring tasks only).
    Delivered {
        next_trigger_time: Option<DateTime<Utc>>,
    },
    /// The notifier failed with this message
    Failed { error: String },
}

/// Scheduled Task Entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledTask {
    pub id: ScheduledTaskId,
    pub application_id: ApplicationId,
    pub reply_address: String,

    pub is_enabled: bool,
    pub next_trigger_time: DateTime<Utc>,

    pub is_recurring: bool,
    pub recurring_settings: Option<RecurringSettings>,

    pub extra_values: ExtraValues,
    pub metadata: TaskMetadata,

    pub created_on: DateTime<Utc>,
}

impl ScheduledTask {
    /// Create a new enabled task
    ///
    /// `is_recurring` follows from `recurring_settings`, so the
    /// "settings iff recurring" invariant holds by construction.
    /// `next_trigger_time` starts at the sentinel; the caller seeds it.
    pub fn new(
        id: impl Into<String>,
        created_on: DateTime<Utc>,
        application_id: ApplicationId,
        reply_address: impl Into<String>,
        recurring_settings: Option<RecurringSettings>,
        extra_values: ExtraValues,
    ) -> Self {
        Self {
            id: id.into(),
            application_id,
            reply_address: reply_address.into(),
            is_enabled: true,
            next_trigger_time: never(),
            is_recurring: recurring_settings.is_some(),
            recurring_settings,
            extra_values,
            metadata: TaskMetadata::default(),
            created_on,
        }
    }

    /// Create a one-off test task due at `at` (for tests only)
    ///
    /// Uses a simple counter for deterministic test IDs (task-1, task-2, ...).
    pub fn new_test_one_off(application_id: &str, at: DateTime<Utc>) -> Self {
        let mut task = Self::new(
            next_test_id(),
            at,
            ApplicationId::new(application_id),
            format!("http://localhost/{}", application_id),
            None,
            ExtraValues::new(),
        );
        task.next_trigger_time = at;
        task
    }

    /// Create a recurring test task with an explicit next trigger (for tests only)
    pub fn new_test_recurring(
        application_id: &str,
        cron_expression: &str,
        utc_offset_minutes: i32,
        next_trigger_time: DateTime<Utc>,
    ) -> Self {
        let mut task = Self::new(
            next_test_id(),
            next_trigger_time,
            ApplicationId::new(application_id),
            format!("http://localhost/{}", application_id),
            Some(RecurringSettings::new(cron_expression, utc_offset_minutes)),
            ExtraValues::new(),
        );
        task.next_trigger_time = next_trigger_time;
        task
    }

    pub fn state(&self) -> TaskState {
        if !self.is_enabled {
            TaskState::Disabled
        } else if is_never(self.metadata.previous_triggered_time) {
            TaskState::EnabledPending
        } else {
            TaskState::EnabledFired
        }
    }

    /// Check the structural invariants (used when rehydrating from storage)
    pub fn check_invariants(&self) -> Result<()> {
        if self.is_recurring != self.recurring_settings.is_some() {
            return Err(DomainError::ValidationError(format!(
                "task {}: is_recurring={} but recurring_settings present={}",
                self.id,
                self.is_recurring,
                self.recurring_settings.is_some()
            )));
        }
        if self.metadata.consecutive_success_count > 0
            && self.metadata.consecutive_failure_count > 0
        {
            return Err(DomainError::ValidationError(format!(
                "task {}: consecutive success and failure counts are both positive",
                self.id
            )));
        }
        Ok(())
    }

    /// Copy of the history as it was before the attempt in progress
    pub fn metadata_snapshot(&self) -> TaskMetadata {
        self.metadata.clone()
    }

    pub fn record_success(&mut self, now: DateTime<Utc>) {
        let m = &mut self.metadata;
        m.previous_triggered_time = now;
        m.previous_trigger_was_successful = true;
        m.previous_error = None;

        m.total_success_count += 1;
        m.consecutive_success_count += 1;

        m.consecutive_failure_count = 0;
    }

    pub fn record_failure(&mut self, now: DateTime<Utc>, error: impl Into<String>) {
        let m = &mut self.metadata;
        m.previous_triggered_time = now;
        m.previous_trigger_was_successful = false;
        m.previous_error = Some(error.into());

        m.consecutive_success_count = 0;

        m.total_failure_count += 1;
        m.consecutive_failure_count += 1;
    }

    /// Apply the outcome of one fire attempt.
    ///
    /// Delivered: success bookkeeping, then recurring tasks move to the
    /// precomputed next trigger (sentinel if none) and one-off tasks are
    /// disabled for good. Failed: failure bookkeeping only, the trigger time
    /// stays put so the next sweep retries.
    pub fn apply_fire_outcome(&mut self, now: DateTime<Utc>, outcome: FireOutcome) {
        match outcome {
            FireOutcome::Delivered { next_trigger_time } => {
                self.record_success(now);
                if self.is_recurring {
                    self.next_trigger_time = next_trigger_time.unwrap_or_else(never);
                } else {
                    self.is_enabled = false;
                }
            }
            FireOutcome::Failed { error } => {
                self.record_failure(now, error);
            }
        }
    }
}

fn next_test_id() -> String {
    use std::sync::atomic::{AtomicU64, Ordering};
    static TEST_COUNTER: AtomicU64 = AtomicU64::new(1);

    format!("task-{}", TEST_COUNTER.fetch_add(1, Ordering::SeqCst))
}
