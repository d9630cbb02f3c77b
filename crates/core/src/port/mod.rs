// Port Layer - Interfaces for external dependencies

pub mod id_provider; // For deterministic testing
pub mod notifier;
pub mod task_repository;
pub mod time_provider;

// Re-exports
pub use id_provider::IdProvider;
pub use notifier::{Notifier, NotifyError};
pub use task_repository::ScheduledTaskRepository;
pub use time_provider::TimeProvider;
