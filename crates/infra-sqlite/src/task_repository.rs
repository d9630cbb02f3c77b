// SQLite ScheduledTaskRepository Implementation

use async_trait::async_trait;
use cadence_core::domain::{
    ApplicationId, ExtraValues, RecurringSettings, ScheduledTask, TaskMetadata,
};
use cadence_core::error::{AppError, Result};
use cadence_core::port::ScheduledTaskRepository;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::warn;

use crate::error::map_sqlx_error;

pub struct SqliteScheduledTaskRepository {
    pool: SqlitePool,
}

impl SqliteScheduledTaskRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ScheduledTaskRepository for SqliteScheduledTaskRepository {
    async fn insert(&self, task: &ScheduledTask) -> Result<()> {
        let extra_values = serde_json::to_string(&task.extra_values)?;
        let (cron_expression, utc_offset_minutes) = split_settings(task);
        let m = &task.metadata;

        sqlx::query(
            r#"
            INSERT INTO scheduled_tasks (
                id, application_id, reply_address,
                is_enabled, next_trigger_time,
                is_recurring, cron_expression, utc_offset_minutes,
                extra_values,
                previous_triggered_time, previous_trigger_was_successful, previous_error,
                total_success_count, consecutive_success_count,
                total_failure_count, consecutive_failure_count,
                created_on
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&task.id)
        .bind(task.application_id.as_str())
        .bind(&task.reply_address)
        .bind(task.is_enabled)
        .bind(task.next_trigger_time.timestamp_millis())
        .bind(task.is_recurring)
        .bind(cron_expression)
        .bind(utc_offset_minutes)
        .bind(&extra_values)
        // Metadata
        .bind(m.previous_triggered_time.timestamp_millis())
        .bind(m.previous_trigger_was_successful)
        .bind(&m.previous_error)
        .bind(m.total_success_count)
        .bind(m.consecutive_success_count)
        .bind(m.total_failure_count)
        .bind(m.consecutive_failure_count)
        .bind(task.created_on.timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<ScheduledTask>> {
        let row = sqlx::query_as::<_, TaskRow>("SELECT * FROM scheduled_tasks WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        row.map(TaskRow::into_task).transpose()
    }

    async fn find_due(&self, before: DateTime<Utc>) -> Result<Vec<ScheduledTask>> {
        // next_trigger_time = 0 is the "never" sentinel
        let rows: Vec<TaskRow> = sqlx::query_as(
            r#"
            SELECT * FROM scheduled_tasks
            WHERE is_enabled = 1
              AND next_trigger_time > 0
              AND next_trigger_time < ?
            ORDER BY next_trigger_time ASC
            "#,
        )
        .bind(before.timestamp_millis())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        // A corrupt row must not hide every other due task
        let mut tasks = Vec::with_capacity(rows.len());
        for row in rows {
            let id = row.id.clone();
            match row.into_task() {
                Ok(task) => tasks.push(task),
                Err(e) => warn!(task_id = %id, error = %e, "Skipping unreadable scheduled task"),
            }
        }
        Ok(tasks)
    }

    async fn save(&self, task: &ScheduledTask) -> Result<()> {
        let extra_values = serde_json::to_string(&task.extra_values)?;
        let (cron_expression, utc_offset_minutes) = split_settings(task);
        let m = &task.metadata;

        let result = sqlx::query(
            r#"
            UPDATE scheduled_tasks
            SET application_id = ?, reply_address = ?,
                is_enabled = ?, next_trigger_time = ?,
                is_recurring = ?, cron_expression = ?, utc_offset_minutes = ?,
                extra_values = ?,
                previous_triggered_time = ?, previous_trigger_was_successful = ?,
                previous_error = ?,
                total_success_count = ?, consecutive_success_count = ?,
                total_failure_count = ?, consecutive_failure_count = ?
            WHERE id = ?
            "#,
        )
        .bind(task.application_id.as_str())
        .bind(&task.reply_address)
        .bind(task.is_enabled)
        .bind(task.next_trigger_time.timestamp_millis())
        .bind(task.is_recurring)
        .bind(cron_expression)
        .bind(utc_offset_minutes)
        .bind(&extra_values)
        // Metadata
        .bind(m.previous_triggered_time.timestamp_millis())
        .bind(m.previous_trigger_was_successful)
        .bind(&m.previous_error)
        .bind(m.total_success_count)
        .bind(m.consecutive_success_count)
        .bind(m.total_failure_count)
        .bind(m.consecutive_failure_count)
        .bind(&task.id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "Scheduled task {} not found",
                task.id
            )));
        }

        Ok(())
    }
}

fn split_settings(task: &ScheduledTask) -> (Option<&str>, Option<i32>) {
    match &task.recurring_settings {
        Some(s) => (Some(s.cron_expression.as_str()), Some(s.utc_offset_minutes)),
        None => (None, None),
    }
}

fn from_millis(column: &str, ms: i64) -> Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .ok_or_else(|| AppError::Database(format!("Invalid timestamp in {}: {}", column, ms)))
}

fn to_count(column: &str, value: i64) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| AppError::Database(format!("Invalid counter in {}: {}", column, value)))
}

// Database row representation
#[derive(Debug, sqlx::FromRow)]
struct TaskRow {
    id: String,
    application_id: String,
    reply_address: String,

    is_enabled: bool,
    next_trigger_time: i64,

    is_recurring: bool,
    cron_expression: Option<String>,
    utc_offset_minutes: Option<i32>,

    extra_values: String,

    previous_triggered_time: i64,
    previous_trigger_was_successful: bool,
    previous_error: Option<String>,
    total_success_count: i64,
    consecutive_success_count: i64,
    total_failure_count: i64,
    consecutive_failure_count: i64,

    created_on: i64,
}

impl TaskRow {
    fn into_task(self) -> Result<ScheduledTask> {
        let recurring_settings = match (self.cron_expression, self.utc_offset_minutes) {
            (Some(cron_expression), Some(utc_offset_minutes)) => Some(RecurringSettings {
                cron_expression,
                utc_offset_minutes,
            }),
            _ => None,
        };

        let extra_values: ExtraValues = serde_json::from_str(&self.extra_values)?;

        let metadata = TaskMetadata {
            previous_triggered_time: from_millis(
                "previous_triggered_time",
                self.previous_triggered_time,
            )?,
            previous_trigger_was_successful: self.previous_trigger_was_successful,
            previous_error: self.previous_error,
            total_success_count: to_count("total_success_count", self.total_success_count)?,
            consecutive_success_count: to_count(
                "consecutive_success_count",
                self.consecutive_success_count,
            )?,
            total_failure_count: to_count("total_failure_count", self.total_failure_count)?,
            consecutive_failure_count: to_count(
                "consecutive_failure_count",
                self.consecutive_failure_count,
            )?,
        };

        let task = ScheduledTask {
            id: self.id,
            application_id: ApplicationId::new(self.application_id),
            reply_address: self.reply_address,
            is_enabled: self.is_enabled,
            next_trigger_time: from_millis("next_trigger_time", self.next_trigger_time)?,
            is_recurring: self.is_recurring,
            recurring_settings,
            extra_values,
            metadata,
            created_on: from_millis("created_on", self.created_on)?,
        };

        task.check_invariants()?;
        Ok(task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_pool, run_migrations};
    use cadence_core::domain::{is_never, never, FireOutcome};
    use chrono::TimeZone;

    async fn setup() -> SqliteScheduledTaskRepository {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        SqliteScheduledTaskRepository::new(pool)
    }

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2022, 9, 1, h, m, s).unwrap()
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let repo = setup().await;
        let mut task = ScheduledTask::new_test_recurring("billing", "0 3 * * *", 120, at(1, 0, 0));
        task.extra_values
            .insert("tenant".to_string(), Some("acme".to_string()));
        task.extra_values.insert("note".to_string(), None);

        repo.insert(&task).await.unwrap();

        let found = repo.find_by_id(&task.id).await.unwrap().unwrap();
        assert_eq!(found, task);
    }

    #[tokio::test]
    async fn test_find_missing() {
        let repo = setup().await;
        assert!(repo.find_by_id("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_insert_is_conflict() {
        let repo = setup().await;
        let task = ScheduledTask::new_test_one_off("billing", at(0, 0, 0));

        repo.insert(&task).await.unwrap();
        let result = repo.insert(&task).await;
        assert!(matches!(result, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_find_due_filters_and_orders() {
        let repo = setup().await;

        let late = ScheduledTask::new_test_one_off("app", at(0, 0, 40));
        let early = ScheduledTask::new_test_one_off("app", at(0, 0, 10));
        let outside = ScheduledTask::new_test_one_off("app", at(0, 1, 0));
        let mut disabled = ScheduledTask::new_test_one_off("app", at(0, 0, 5));
        disabled.is_enabled = false;
        let parked = ScheduledTask::new_test_recurring("app", "0 0 31 2 *", 0, never());

        for t in [&late, &early, &outside, &disabled, &parked] {
            repo.insert(t).await.unwrap();
        }

        let due = repo.find_due(at(0, 0, 55)).await.unwrap();
        let ids: Vec<_> = due.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec![early.id.as_str(), late.id.as_str()]);
    }

    #[tokio::test]
    async fn test_find_due_excludes_boundary() {
        let repo = setup().await;
        let task = ScheduledTask::new_test_one_off("app", at(0, 0, 55));
        repo.insert(&task).await.unwrap();

        assert!(repo.find_due(at(0, 0, 55)).await.unwrap().is_empty());
        assert_eq!(repo.find_due(at(0, 0, 56)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_save_replaces_state() {
        let repo = setup().await;
        let mut task = ScheduledTask::new_test_recurring("app", "*/5 * * * *", 0, at(0, 5, 0));
        repo.insert(&task).await.unwrap();

        task.apply_fire_outcome(
            at(0, 5, 1),
            FireOutcome::Failed {
                error: "503".to_string(),
            },
        );
        repo.save(&task).await.unwrap();
        task.apply_fire_outcome(
            at(0, 6, 0),
            FireOutcome::Delivered {
                next_trigger_time: Some(at(0, 10, 0)),
            },
        );
        repo.save(&task).await.unwrap();

        let stored = repo.find_by_id(&task.id).await.unwrap().unwrap();
        assert_eq!(stored, task);
        assert_eq!(stored.next_trigger_time, at(0, 10, 0));
        assert_eq!(stored.metadata.total_failure_count, 1);
        assert_eq!(stored.metadata.consecutive_success_count, 1);
        assert!(stored.metadata.previous_error.is_none());
    }

    #[tokio::test]
    async fn test_disabled_one_off_never_due_again() {
        let repo = setup().await;
        let mut task = ScheduledTask::new_test_one_off("app", at(0, 0, 0));
        repo.insert(&task).await.unwrap();

        task.apply_fire_outcome(
            at(0, 0, 1),
            FireOutcome::Delivered {
                next_trigger_time: None,
            },
        );
        repo.save(&task).await.unwrap();

        let far_future = Utc.with_ymd_and_hms(2100, 1, 1, 0, 0, 0).unwrap();
        assert!(repo.find_due(far_future).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_missing_is_not_found() {
        let repo = setup().await;
        let task = ScheduledTask::new_test_one_off("app", at(0, 0, 0));
        let result = repo.save(&task).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_sentinel_round_trips() {
        let repo = setup().await;
        let task = ScheduledTask::new_test_recurring("app", "*/5 * * * *", 0, never());
        repo.insert(&task).await.unwrap();

        let stored = repo.find_by_id(&task.id).await.unwrap().unwrap();
        assert!(is_never(stored.next_trigger_time));
        assert!(is_never(stored.metadata.previous_triggered_time));
    }
}
