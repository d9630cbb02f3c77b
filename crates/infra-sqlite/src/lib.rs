// Cadence Infrastructure - SQLite Adapter
// Implements: ScheduledTaskRepository

mod connection;
mod error;
mod migration;
mod task_repository;

pub use connection::create_pool;
pub use migration::run_migrations;
pub use task_repository::SqliteScheduledTaskRepository;
