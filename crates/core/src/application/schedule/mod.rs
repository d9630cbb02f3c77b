// Schedule Service - registering and inspecting scheduled tasks

pub mod add;

pub use add::AddScheduleRequest;

use crate::domain::ScheduledTask;
use crate::error::{AppError, Result};
use crate::port::{IdProvider, ScheduledTaskRepository, TimeProvider};
use std::sync::Arc;

/// Schedule Service
pub struct ScheduleService {
    repository: Arc<dyn ScheduledTaskRepository>,
    id_provider: Arc<dyn IdProvider>,
    time_provider: Arc<dyn TimeProvider>,
}

impl ScheduleService {
    pub fn new(
        repository: Arc<dyn ScheduledTaskRepository>,
        id_provider: Arc<dyn IdProvider>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            repository,
            id_provider,
            time_provider,
        }
    }

    /// Register a new task; returns it with its first trigger time seeded
    pub async fn add(&self, req: AddScheduleRequest) -> Result<ScheduledTask> {
        add::execute(
            self.repository.as_ref(),
            self.id_provider.as_ref(),
            self.time_provider.as_ref(),
            req,
        )
        .await
    }

    /// Fetch a task by ID
    pub async fn get(&self, id: &str) -> Result<ScheduledTask> {
        self.repository
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Scheduled task {} not found", id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::id_provider::mocks::SequentialIdProvider;
    use crate::port::task_repository::mocks::InMemoryTaskRepository;
    use crate::port::time_provider::mocks::FixedTimeProvider;
    use chrono::{TimeZone, Utc};

    fn service() -> ScheduleService {
        ScheduleService::new(
            Arc::new(InMemoryTaskRepository::new()),
            Arc::new(SequentialIdProvider::new("sched")),
            Arc::new(FixedTimeProvider::new(
                Utc.with_ymd_and_hms(2022, 9, 1, 0, 0, 1).unwrap(),
            )),
        )
    }

    #[tokio::test]
    async fn test_add_then_get() {
        let service = service();
        let created = service
            .add(AddScheduleRequest::recurring(
                "billing",
                "http://billing/hooks",
                "*/5 * * * *",
                -6,
            ))
            .await
            .unwrap();

        assert_eq!(created.id, "sched-1");
        let fetched = service.get("sched-1").await.unwrap();
        assert_eq!(fetched, created);
        assert_eq!(
            fetched.next_trigger_time,
            Utc.with_ymd_and_hms(2022, 9, 1, 0, 1, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let result = service().get("nope").await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }
}
