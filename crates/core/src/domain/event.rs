// Task Due Event - the payload delivered to the owning application

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::task::{
    ApplicationId, ExtraValues, RecurringSettings, ScheduledTask, ScheduledTaskId, TaskMetadata,
};

/// Event type name carried in every due-task notification
pub const TASK_DUE_EVENT_TYPE: &str = "cadence.scheduling.task_due.v1";

/// Due-task notification payload
///
/// Every field except the envelope (`event_id`, `event_type`, `task_id`) is a
/// verbatim copy of task state. `metadata` is the history as it was *before*
/// the attempt that produced this event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDueEvent {
    pub event_id: String,
    pub event_type: String,
    pub task_id: ScheduledTaskId,

    pub application_id: ApplicationId,
    pub is_recurring: bool,
    pub recurring_settings: Option<RecurringSettings>,

    pub current_trigger_time: DateTime<Utc>,
    pub next_trigger_time: Option<DateTime<Utc>>,

    pub extra_values: ExtraValues,
    pub metadata: TaskMetadata,

    pub created_on: DateTime<Utc>,
}

impl TaskDueEvent {
    /// Build the event for the fire currently in progress
    pub fn for_task(
        event_id: impl Into<String>,
        task: &ScheduledTask,
        next_trigger_time: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            event_type: TASK_DUE_EVENT_TYPE.to_string(),
            task_id: task.id.clone(),
            application_id: task.application_id.clone(),
            is_recurring: task.is_recurring,
            recurring_settings: task.recurring_settings.clone(),
            current_trigger_time: task.next_trigger_time,
            next_trigger_time: if task.is_recurring {
                next_trigger_time
            } else {
                None
            },
            extra_values: task.extra_values.clone(),
            metadata: task.metadata_snapshot(),
            created_on: task.created_on,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_event_carries_task_fields() {
        let fire_at = Utc.with_ymd_and_hms(2022, 9, 1, 0, 5, 0).unwrap();
        let mut task = ScheduledTask::new_test_recurring("billing", "*/5 * * * *", 60, fire_at);
        task.extra_values
            .insert("invoice_run".to_string(), Some("monthly".to_string()));
        task.extra_values.insert("note".to_string(), None);

        let next = fire_at + chrono::Duration::minutes(5);
        let event = TaskDueEvent::for_task("evt-1", &task, Some(next));

        assert_eq!(event.event_type, TASK_DUE_EVENT_TYPE);
        assert_eq!(event.task_id, task.id);
        assert_eq!(event.application_id.as_str(), "billing");
        assert!(event.is_recurring);
        assert_eq!(
            event.recurring_settings,
            Some(RecurringSettings::new("*/5 * * * *", 60))
        );
        assert_eq!(event.current_trigger_time, fire_at);
        assert_eq!(event.next_trigger_time, Some(next));
        assert_eq!(event.extra_values, task.extra_values);
        assert_eq!(event.created_on, task.created_on);
    }

    #[test]
    fn test_one_off_event_has_no_next_trigger() {
        let fire_at = Utc.with_ymd_and_hms(2022, 9, 1, 0, 0, 0).unwrap();
        let task = ScheduledTask::new_test_one_off("billing", fire_at);

        let event = TaskDueEvent::for_task("evt-2", &task, Some(fire_at));

        assert!(!event.is_recurring);
        assert!(event.recurring_settings.is_none());
        assert!(event.next_trigger_time.is_none());
    }

    #[test]
    fn test_event_metadata_is_pre_attempt_snapshot() {
        let fire_at = Utc.with_ymd_and_hms(2022, 9, 1, 0, 0, 0).unwrap();
        let mut task = ScheduledTask::new_test_one_off("billing", fire_at);
        task.record_failure(fire_at, "earlier failure");

        let event = TaskDueEvent::for_task("evt-3", &task, None);
        task.record_success(fire_at + chrono::Duration::seconds(1));

        assert_eq!(event.metadata.total_failure_count, 1);
        assert_eq!(event.metadata.total_success_count, 0);
        assert_eq!(
            event.metadata.previous_error.as_deref(),
            Some("earlier failure")
        );
    }
}
