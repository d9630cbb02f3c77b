// Domain Layer - Pure business logic and entities

pub mod error;
pub mod event;
pub mod task;

// Re-exports
pub use error::DomainError;
pub use event::{TaskDueEvent, TASK_DUE_EVENT_TYPE};
pub use task::{
    is_never, never, ApplicationId, ExtraValues, FireOutcome, RecurringSettings, ScheduledTask,
    ScheduledTaskId, TaskMetadata, TaskState,
};
