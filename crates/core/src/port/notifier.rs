// Notifier Port
// Delivers a due-task event to the task's reply address

use crate::domain::{ScheduledTask, TaskDueEvent};
use async_trait::async_trait;
use thiserror::Error;

/// Notification errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotifyError {
    #[error("Invalid reply address '{0}'")]
    InvalidAddress(String),

    #[error("Recipient unreachable: {0}")]
    Unreachable(String),

    #[error("Recipient rejected event with status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("Notification timed out after {0}ms")]
    Timeout(u64),
}

/// Notifier trait
///
/// The dispatch cycle assumes nothing beyond Ok/Err: Ok means the recipient
/// accepted the event, any Err is recorded as a failed trigger.
///
/// Implementations:
/// - WebhookNotifier: HTTP POST of the JSON event (infra-webhook)
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, task: &ScheduledTask, event: &TaskDueEvent) -> Result<(), NotifyError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Mock notifier behavior
    #[derive(Debug, Clone)]
    pub enum MockBehavior {
        /// Always succeed
        Success,
        /// Always fail with message
        Fail(String),
        /// Succeed after sleeping (for cancellation tests)
        Delay(Duration),
    }

    /// Notifier that records every delivered event
    pub struct RecordingNotifier {
        behavior: Arc<Mutex<MockBehavior>>,
        per_task: Arc<Mutex<HashMap<String, MockBehavior>>>,
        delivered: Arc<Mutex<Vec<TaskDueEvent>>>,
        call_count: Arc<Mutex<usize>>,
    }

    impl RecordingNotifier {
        pub fn new(behavior: MockBehavior) -> Self {
            Self {
                behavior: Arc::new(Mutex::new(behavior)),
                per_task: Arc::new(Mutex::new(HashMap::new())),
                delivered: Arc::new(Mutex::new(Vec::new())),
                call_count: Arc::new(Mutex::new(0)),
            }
        }

        pub fn new_success() -> Self {
            Self::new(MockBehavior::Success)
        }

        pub fn new_fail(message: impl Into<String>) -> Self {
            Self::new(MockBehavior::Fail(message.into()))
        }

        /// Override the behavior for a single task
        pub fn set_behavior_for(&self, task_id: &str, behavior: MockBehavior) {
            self.per_task
                .lock()
                .unwrap()
                .insert(task_id.to_string(), behavior);
        }

        pub fn set_behavior(&self, behavior: MockBehavior) {
            *self.behavior.lock().unwrap() = behavior;
        }

        pub fn call_count(&self) -> usize {
            *self.call_count.lock().unwrap()
        }

        pub fn delivered(&self) -> Vec<TaskDueEvent> {
            self.delivered.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(
            &self,
            task: &ScheduledTask,
            event: &TaskDueEvent,
        ) -> Result<(), NotifyError> {
            *self.call_count.lock().unwrap() += 1;

            let behavior = self
                .per_task
                .lock()
                .unwrap()
                .get(&task.id)
                .cloned()
                .unwrap_or_else(|| self.behavior.lock().unwrap().clone());

            match behavior {
                MockBehavior::Success => {}
                MockBehavior::Fail(msg) => return Err(NotifyError::Unreachable(msg)),
                MockBehavior::Delay(d) => tokio::time::sleep(d).await,
            }

            self.delivered.lock().unwrap().push(event.clone());
            Ok(())
        }
    }
}
