//! Cron Schedule Evaluator
//!
//! Computes the next trigger instant of a recurring task. Cron fields are
//! matched in a fixed-offset "local" time (`local = utc + offset`), so a task
//! at offset +120 with `0 3 * * *` fires at 01:00Z every day.
//!
//! Catch-up policy: a task that already has a computed trigger never gets an
//! occurrence at or before that trigger again (no double fire), and a task
//! that fell behind resumes at the first occurrence after the reference time
//! instead of replaying every missed slot (no drift).

use chrono::{DateTime, FixedOffset, Timelike, Utc};
use croner::Cron;
use tracing::warn;

use crate::domain::{is_never, never, DomainError, RecurringSettings, ScheduledTask};

/// Parse a 5-field (minute resolution) or 6-field (leading seconds) cron expression
pub fn parse_cron(expression: &str) -> Result<Cron, DomainError> {
    Cron::new(expression)
        .with_seconds_optional()
        .parse()
        .map_err(|e| DomainError::InvalidCronExpression {
            expression: expression.to_string(),
            reason: e.to_string(),
        })
}

/// Build the fixed offset a task's cron fields are interpreted in
pub fn fixed_offset(utc_offset_minutes: i32) -> Result<FixedOffset, DomainError> {
    utc_offset_minutes
        .checked_mul(60)
        .and_then(FixedOffset::east_opt)
        .ok_or(DomainError::InvalidUtcOffset(utc_offset_minutes))
}

/// Earliest occurrence at or after `anchor` (inclusive)
///
/// Cron resolution is one second, so a sub-second anchor is first rounded up
/// to the next whole second.
pub fn next_occurrence(
    settings: &RecurringSettings,
    anchor: DateTime<Utc>,
) -> Result<DateTime<Utc>, DomainError> {
    let cron = parse_cron(&settings.cron_expression)?;
    let offset = fixed_offset(settings.utc_offset_minutes)?;

    let local_anchor = ceil_to_second(anchor).with_timezone(&offset);
    cron.find_next_occurrence(&local_anchor, true)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| DomainError::InvalidCronExpression {
            expression: settings.cron_expression.clone(),
            reason: e.to_string(),
        })
}

/// Compute the next trigger time of `task` relative to `reference_time`.
///
/// - One-off tasks: `reference_time` unchanged.
/// - Recurring tasks: earliest occurrence at or after the anchor, where the
///   anchor is `reference_time` if `ignore_current_next_trigger_time` is set
///   or nothing was ever computed, and otherwise
///   `max(reference_time, stored next_trigger_time + 1ms)`.
///
/// Never fails: an expression with no occurrence yields the "never" sentinel
/// and a warning.
pub fn compute_next_trigger(
    task: &ScheduledTask,
    reference_time: DateTime<Utc>,
    ignore_current_next_trigger_time: bool,
) -> DateTime<Utc> {
    if !task.is_recurring {
        return reference_time;
    }

    let settings = match &task.recurring_settings {
        Some(settings) => settings,
        None => {
            warn!(
                task_id = %task.id,
                "Recurring task has no recurring settings, trigger time set to never"
            );
            return never();
        }
    };

    let anchor = if ignore_current_next_trigger_time || is_never(task.next_trigger_time) {
        reference_time
    } else {
        reference_time.max(task.next_trigger_time + chrono::Duration::milliseconds(1))
    };

    match next_occurrence(settings, anchor) {
        Ok(next) => next,
        Err(e) => {
            warn!(
                task_id = %task.id,
                application_id = %task.application_id,
                cron_expression = %settings.cron_expression,
                utc_offset_minutes = settings.utc_offset_minutes,
                error = %e,
                "Unable to compute next trigger time, trigger time set to never"
            );
            never()
        }
    }
}

fn ceil_to_second(t: DateTime<Utc>) -> DateTime<Utc> {
    let nanos = t.nanosecond();
    if nanos == 0 {
        return t;
    }
    t - chrono::Duration::nanoseconds(i64::from(nanos)) + chrono::Duration::seconds(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    /// Recurring task that has never had a trigger computed
    fn fresh(cron: &str, offset: i32) -> ScheduledTask {
        ScheduledTask::new_test_recurring("app", cron, offset, never())
    }

    #[test]
    fn test_one_off_returns_reference() {
        let reference = utc(2022, 9, 1, 0, 0, 1);
        let task = ScheduledTask::new_test_one_off("app", utc(2022, 1, 1, 0, 0, 0));

        assert_eq!(compute_next_trigger(&task, reference, false), reference);
        assert_eq!(compute_next_trigger(&task, reference, true), reference);
    }

    #[test]
    fn test_every_five_minutes_across_offsets() {
        let reference = utc(2022, 9, 1, 0, 0, 1);
        let cases = [
            (0, utc(2022, 9, 1, 0, 5, 0)),
            (60, utc(2022, 9, 1, 0, 5, 0)),
            (120, utc(2022, 9, 1, 0, 5, 0)),
            (840, utc(2022, 9, 1, 0, 5, 0)),
            (-60, utc(2022, 9, 1, 0, 5, 0)),
            (-120, utc(2022, 9, 1, 0, 5, 0)),
            (-840, utc(2022, 9, 1, 0, 5, 0)),
            (2, utc(2022, 9, 1, 0, 3, 0)),
            (-6, utc(2022, 9, 1, 0, 1, 0)),
        ];

        for (offset, expected) in cases {
            let task = fresh("*/5 * * * *", offset);
            assert_eq!(
                compute_next_trigger(&task, reference, false),
                expected,
                "offset {}",
                offset
            );
        }
    }

    #[test]
    fn test_every_fifteen_minutes_across_offsets() {
        let reference = utc(2022, 9, 1, 0, 13, 0);
        let cases = [
            (0, utc(2022, 9, 1, 0, 15, 0)),
            (3, utc(2022, 9, 1, 0, 27, 0)),
            (-3, utc(2022, 9, 1, 0, 18, 0)),
        ];

        for (offset, expected) in cases {
            let task = fresh("*/15 * * * *", offset);
            assert_eq!(
                compute_next_trigger(&task, reference, false),
                expected,
                "offset {}",
                offset
            );
        }
    }

    #[test]
    fn test_weekday_midnight_utc() {
        let task = fresh("0 0 * * MON-FRI", 0);

        // Thursday -> Friday midnight
        assert_eq!(
            compute_next_trigger(&task, utc(2022, 9, 1, 0, 13, 0), false),
            utc(2022, 9, 2, 0, 0, 0)
        );
        // Friday -> skips the weekend
        assert_eq!(
            compute_next_trigger(&task, utc(2022, 9, 2, 0, 13, 0), false),
            utc(2022, 9, 5, 0, 0, 0)
        );
    }

    #[test]
    fn test_daily_at_three_utc() {
        let task = fresh("0 3 * * *", 0);
        assert_eq!(
            compute_next_trigger(&task, utc(2022, 9, 2, 0, 13, 0), false),
            utc(2022, 9, 2, 3, 0, 0)
        );
    }

    #[test]
    fn test_negative_seventeen_minute_offset() {
        let weekdays = fresh("0 0 * * MON-FRI", -17);
        assert_eq!(
            compute_next_trigger(&weekdays, utc(2022, 9, 1, 0, 13, 0), false),
            utc(2022, 9, 1, 0, 17, 0)
        );
        assert_eq!(
            compute_next_trigger(&weekdays, utc(2022, 9, 2, 0, 13, 0), false),
            utc(2022, 9, 2, 0, 17, 0)
        );

        let daily = fresh("0 3 * * *", -17);
        assert_eq!(
            compute_next_trigger(&daily, utc(2022, 9, 2, 0, 13, 0), false),
            utc(2022, 9, 2, 3, 17, 0)
        );
    }

    #[test]
    fn test_negative_one_hour_offset() {
        let weekdays = fresh("0 0 * * MON-FRI", -60);
        assert_eq!(
            compute_next_trigger(&weekdays, utc(2022, 9, 1, 0, 13, 0), false),
            utc(2022, 9, 1, 1, 0, 0)
        );

        let daily = fresh("0 3 * * *", -60);
        assert_eq!(
            compute_next_trigger(&daily, utc(2022, 9, 2, 0, 13, 0), false),
            utc(2022, 9, 2, 4, 0, 0)
        );
    }

    #[test]
    fn test_ignore_flag_controls_stored_trigger() {
        let stored = utc(2022, 10, 29, 4, 0, 0);
        let reference = utc(2022, 10, 29, 3, 50, 1);
        let task = ScheduledTask::new_test_recurring("app", "0 * * * *", 60, stored);

        let honoring = compute_next_trigger(&task, reference, false);
        assert_ne!(honoring, stored);
        assert_eq!(honoring, utc(2022, 10, 29, 5, 0, 0));

        let ignoring = compute_next_trigger(&task, reference, true);
        assert_eq!(ignoring, stored);
    }

    #[test]
    fn test_stored_trigger_is_never_reselected() {
        // Reference well before the stored trigger still moves strictly past it
        let stored = utc(2022, 9, 1, 0, 10, 0);
        let task = ScheduledTask::new_test_recurring("app", "*/5 * * * *", 0, stored);

        let next = compute_next_trigger(&task, utc(2022, 9, 1, 0, 4, 0), false);
        assert!(next > stored);
        assert_eq!(next, utc(2022, 9, 1, 0, 15, 0));
    }

    #[test]
    fn test_catch_up_skips_missed_occurrences() {
        // Stored trigger long in the past: resume after the reference time
        let stored = utc(2022, 9, 1, 0, 5, 0);
        let task = ScheduledTask::new_test_recurring("app", "*/5 * * * *", 0, stored);

        let next = compute_next_trigger(&task, utc(2022, 9, 1, 2, 31, 0), false);
        assert_eq!(next, utc(2022, 9, 1, 2, 35, 0));
    }

    #[test]
    fn test_inclusive_of_whole_second_anchor() {
        let task = fresh("*/5 * * * *", 0);
        let reference = utc(2022, 9, 1, 0, 5, 0);
        assert_eq!(compute_next_trigger(&task, reference, false), reference);
    }

    #[test]
    fn test_sub_second_anchor_rounds_up() {
        let task = fresh("* * * * * *", 0);
        let reference = utc(2022, 9, 1, 0, 5, 0) + chrono::Duration::milliseconds(250);
        assert_eq!(
            compute_next_trigger(&task, reference, false),
            utc(2022, 9, 1, 0, 5, 1)
        );
    }

    #[test]
    fn test_six_field_expression() {
        let task = fresh("30 */5 * * * *", 0);
        assert_eq!(
            compute_next_trigger(&task, utc(2022, 9, 1, 0, 0, 1), false),
            utc(2022, 9, 1, 0, 0, 30)
        );
    }

    #[test]
    fn test_malformed_expression_yields_never() {
        let task = fresh("not a cron", 0);
        assert!(is_never(compute_next_trigger(
            &task,
            utc(2022, 9, 1, 0, 0, 0),
            false
        )));
    }

    #[test]
    fn test_impossible_date_yields_never() {
        let task = fresh("0 0 31 2 *", 0);
        assert!(is_never(compute_next_trigger(
            &task,
            utc(2022, 9, 1, 0, 0, 0),
            false
        )));
    }

    #[test]
    fn test_missing_settings_yields_never() {
        let mut task = fresh("*/5 * * * *", 0);
        task.recurring_settings = None;
        assert!(is_never(compute_next_trigger(
            &task,
            utc(2022, 9, 1, 0, 0, 0),
            false
        )));
    }

    #[test]
    fn test_parse_cron_rejects_garbage() {
        assert!(parse_cron("*/5 * * * *").is_ok());
        assert!(parse_cron("0 */5 * * * *").is_ok());
        assert!(matches!(
            parse_cron("61 * * * *"),
            Err(DomainError::InvalidCronExpression { .. })
        ));
    }

    #[test]
    fn test_fixed_offset_bounds() {
        assert!(fixed_offset(840).is_ok());
        assert!(fixed_offset(-840).is_ok());
        assert!(matches!(
            fixed_offset(24 * 60),
            Err(DomainError::InvalidUtcOffset(1440))
        ));
    }
}
