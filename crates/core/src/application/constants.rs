// Scheduling constants (no magic values)
use std::time::Duration;

/// How far past "now" a sweep looks for due tasks (55s)
/// Slightly less than the sweep interval so consecutive sweeps overlap
/// without a task being picked up twice in one interval.
pub const DEFAULT_LOOKAHEAD: Duration = Duration::from_secs(55);

/// Interval between sweeps (1 minute)
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Seconds added to "now" when computing a recurring task's next trigger
pub const NEXT_TRIGGER_NUDGE_SECS: i64 = 1;

/// Upper bound on notify+persist sequences in flight per sweep
pub const DEFAULT_MAX_CONCURRENT_NOTIFICATIONS: usize = 16;

/// Maximum accepted |utc_offset_minutes| (UTC-14:00 .. UTC+14:00)
pub const MAX_UTC_OFFSET_MINUTES: i32 = 14 * 60;

/// Maximum application id length
pub const MAX_APPLICATION_ID_LEN: usize = 128;
