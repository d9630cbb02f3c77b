// Application Layer - Use Cases and Business Logic

pub mod constants;
pub mod cron;
pub mod dispatch;
pub mod schedule;
mod shutdown;
pub mod sweeper;

// Re-exports
pub use cron::compute_next_trigger;
pub use dispatch::{DispatchConfig, DispatchCycle, FailureKind, SweepReport, TaskFailure};
pub use schedule::{AddScheduleRequest, ScheduleService};
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};
pub use sweeper::SweepRunner;
