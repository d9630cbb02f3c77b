// Add Schedule Use Case

use crate::application::constants::{MAX_APPLICATION_ID_LEN, MAX_UTC_OFFSET_MINUTES};
use crate::application::cron::{compute_next_trigger, parse_cron};
use crate::domain::{is_never, never, ApplicationId, ExtraValues, RecurringSettings, ScheduledTask};
use crate::error::{AppError, Result};
use crate::port::{IdProvider, ScheduledTaskRepository, TimeProvider};
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Timestamps are persisted with millisecond precision
const STORED_SUBSEC_DIGITS: u16 = 3;

/// Add schedule request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddScheduleRequest {
    pub application_id: String,
    pub reply_address: String,

    /// First trigger for one-off tasks, search start for recurring ones.
    /// Defaults to now.
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

impl AddScheduleRequest {
    /// One-off task firing at `start_time` (now if None)
    pub fn one_off(
        application_id: impl Into<String>,
        reply_address: impl Into<String>,
        start_time: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            application_id: application_id.into(),
            reply_address: reply_address.into(),
            start_time,
            is_recurring: false,
            cron_expression: None,
            utc_offset_minutes: None,
            extra_values: ExtraValues::new(),
        }
    }

    /// Recurring task starting now
    pub fn recurring(
        application_id: impl Into<String>,
        reply_address: impl Into<String>,
        cron_expression: impl Into<String>,
        utc_offset_minutes: i32,
    ) -> Self {
        Self {
            application_id: application_id.into(),
            reply_address: reply_address.into(),
            start_time: None,
            is_recurring: true,
            cron_expression: Some(cron_expression.into()),
            utc_offset_minutes: Some(utc_offset_minutes),
            extra_values: ExtraValues::new(),
        }
    }
}

/// Validate an add request, returning the recurring settings it describes
pub fn validate_request(req: &AddScheduleRequest) -> Result<Option<RecurringSettings>> {
    validate_application_id(&req.application_id)?;

    if req.reply_address.trim().is_empty() {
        return Err(AppError::Validation(
            "Reply address cannot be empty".to_string(),
        ));
    }

    // At or before the epoch reads back as the "never" sentinel
    if let Some(start_time) = req.start_time {
        if is_never(start_time.trunc_subsecs(STORED_SUBSEC_DIGITS)) {
            return Err(AppError::Validation(format!(
                "Start time {} must be after {}",
                start_time,
                never()
            )));
        }
    }

    if !req.is_recurring {
        if req.cron_expression.is_some() || req.utc_offset_minutes.is_some() {
            return Err(AppError::Validation(
                "Cron expression and UTC offset are only valid for recurring tasks".to_string(),
            ));
        }
        return Ok(None);
    }

    let cron_expression = match req.cron_expression.as_deref().map(str::trim) {
        Some(expr) if !expr.is_empty() => expr,
        _ => {
            return Err(AppError::Validation(
                "Recurring task requires a cron expression".to_string(),
            ))
        }
    };
    let utc_offset_minutes = req.utc_offset_minutes.ok_or_else(|| {
        AppError::Validation("Recurring task requires a UTC offset".to_string())
    })?;

    if utc_offset_minutes.abs() > MAX_UTC_OFFSET_MINUTES {
        return Err(AppError::Validation(format!(
            "UTC offset {} out of range (must be within ±{} minutes)",
            utc_offset_minutes, MAX_UTC_OFFSET_MINUTES
        )));
    }

    parse_cron(cron_expression).map_err(|e| AppError::Validation(e.to_string()))?;

    Ok(Some(RecurringSettings::new(
        cron_expression,
        utc_offset_minutes,
    )))
}

fn validate_application_id(application_id: &str) -> Result<()> {
    if application_id.is_empty() {
        return Err(AppError::Validation(
            "Application id cannot be empty".to_string(),
        ));
    }

    if application_id.len() > MAX_APPLICATION_ID_LEN {
        return Err(AppError::Validation(format!(
            "Application id too long: {} characters (max {})",
            application_id.len(),
            MAX_APPLICATION_ID_LEN
        )));
    }

    if !application_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
    {
        return Err(AppError::Validation(format!(
            "Application id '{}' must be alphanumeric with '_', '-' or '.' only",
            application_id
        )));
    }

    Ok(())
}

/// Execute add schedule use case
///
/// # Arguments
///
/// * `repository` - Scheduled task repository
/// * `id_provider` - ID generator (injected for determinism)
/// * `time_provider` - Time provider (injected for determinism)
/// * `req` - Add schedule request
pub async fn execute(
    repository: &dyn ScheduledTaskRepository,
    id_provider: &dyn IdProvider,
    time_provider: &dyn TimeProvider,
    req: AddScheduleRequest,
) -> Result<ScheduledTask> {
    let recurring_settings = validate_request(&req)?;

    // Storage keeps milliseconds; the returned task must match what is read back
    let now = time_provider.now().trunc_subsecs(STORED_SUBSEC_DIGITS);
    let start_time = req
        .start_time
        .map(|t| t.trunc_subsecs(STORED_SUBSEC_DIGITS))
        .unwrap_or(now);

    let mut task = ScheduledTask::new(
        id_provider.generate_id(),
        now,
        ApplicationId::new(req.application_id),
        req.reply_address,
        recurring_settings,
        req.extra_values,
    );

    // Seed the first trigger
    task.next_trigger_time = compute_next_trigger(&task, start_time, false);
    if task.is_recurring && is_never(task.next_trigger_time) {
        return Err(AppError::Validation(format!(
            "Cron expression '{}' has no upcoming occurrence",
            task.recurring_settings
                .as_ref()
                .map(|s| s.cron_expression.as_str())
                .unwrap_or_default()
        )));
    }

    repository.insert(&task).await?;

    info!(
        task_id = %task.id,
        application_id = %task.application_id,
        is_recurring = task.is_recurring,
        next_trigger_time = %task.next_trigger_time,
        "Scheduled task added"
    );

    Ok(task)
}
