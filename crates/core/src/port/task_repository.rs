// Scheduled Task Repository Port (Interface)

use crate::domain::ScheduledTask;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Repository interface for ScheduledTask persistence
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ScheduledTaskRepository: Send + Sync {
    /// Insert a new task
    ///
    /// # Errors
    /// - AppError::Conflict if a task with the same ID already exists
    async fn insert(&self, task: &ScheduledTask) -> Result<()>;

    /// Find task by ID
    async fn find_by_id(&self, id: &str) -> Result<Option<ScheduledTask>>;

    /// Find all enabled tasks whose next trigger time is before `before`
    ///
    /// Tasks holding the "never" sentinel are excluded; they have no
    /// computable occurrence and must not fire until reconfigured.
    async fn find_due(&self, before: DateTime<Utc>) -> Result<Vec<ScheduledTask>>;

    /// Replace the stored task with this state
    ///
    /// # Errors
    /// - AppError::NotFound if the task does not exist
    /// - AppError::Database on IO failure
    async fn save(&self, task: &ScheduledTask) -> Result<()>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::domain::is_never;
    use crate::error::AppError;
    use std::collections::{BTreeMap, HashSet};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// In-memory repository with failure injection
    #[derive(Default)]
    pub struct InMemoryTaskRepository {
        tasks: Mutex<BTreeMap<String, ScheduledTask>>,
        failing_saves: Mutex<HashSet<String>>,
        fail_find_due: AtomicBool,
        save_calls: AtomicUsize,
    }

    impl InMemoryTaskRepository {
        pub fn new() -> Self {
            Self::default()
        }

        /// Seed tasks directly (bypasses insert)
        pub fn with_tasks(tasks: impl IntoIterator<Item = ScheduledTask>) -> Self {
            let repo = Self::new();
            {
                let mut map = repo.tasks.lock().unwrap();
                for task in tasks {
                    map.insert(task.id.clone(), task);
                }
            }
            repo
        }

        /// Make every save of this task fail
        pub fn fail_saves_for(&self, task_id: &str) {
            self.failing_saves
                .lock()
                .unwrap()
                .insert(task_id.to_string());
        }

        /// Make find_due fail
        pub fn set_find_due_failure(&self, fail: bool) {
            self.fail_find_due.store(fail, Ordering::SeqCst);
        }

        pub fn save_calls(&self) -> usize {
            self.save_calls.load(Ordering::SeqCst)
        }

        pub fn get(&self, id: &str) -> Option<ScheduledTask> {
            self.tasks.lock().unwrap().get(id).cloned()
        }
    }

    #[async_trait]
    impl ScheduledTaskRepository for InMemoryTaskRepository {
        async fn insert(&self, task: &ScheduledTask) -> Result<()> {
            let mut tasks = self.tasks.lock().unwrap();
            if tasks.contains_key(&task.id) {
                return Err(AppError::Conflict(format!(
                    "Task {} already exists",
                    task.id
                )));
            }
            tasks.insert(task.id.clone(), task.clone());
            Ok(())
        }

        async fn find_by_id(&self, id: &str) -> Result<Option<ScheduledTask>> {
            Ok(self.get(id))
        }

        async fn find_due(&self, before: DateTime<Utc>) -> Result<Vec<ScheduledTask>> {
            if self.fail_find_due.load(Ordering::SeqCst) {
                return Err(AppError::Database("find_due unavailable".to_string()));
            }
            let mut due: Vec<ScheduledTask> = self
                .tasks
                .lock()
                .unwrap()
                .values()
                .filter(|t| {
                    t.is_enabled && !is_never(t.next_trigger_time) && t.next_trigger_time < before
                })
                .cloned()
                .collect();
            due.sort_by_key(|t| t.next_trigger_time);
            Ok(due)
        }

        async fn save(&self, task: &ScheduledTask) -> Result<()> {
            self.save_calls.fetch_add(1, Ordering::SeqCst);

            if self.failing_saves.lock().unwrap().contains(&task.id) {
                return Err(AppError::Database(format!(
                    "Injected save failure for {}",
                    task.id
                )));
            }

            let mut tasks = self.tasks.lock().unwrap();
            match tasks.get_mut(&task.id) {
                Some(stored) => {
                    *stored = task.clone();
                    Ok(())
                }
                None => Err(AppError::NotFound(format!("Task {} not found", task.id))),
            }
        }
    }
}
