// Webhook Notifier

use async_trait::async_trait;
use cadence_core::domain::{ScheduledTask, TaskDueEvent};
use cadence_core::error::{AppError, Result};
use cadence_core::port::{Notifier, NotifyError};
use reqwest::Url;
use std::time::Duration;
use tracing::{debug, warn};

/// Header carrying `TaskDueEvent::event_type`
pub const EVENT_TYPE_HEADER: &str = "X-Cadence-Event-Type";
/// Header carrying `TaskDueEvent::event_id` (receivers dedupe on it)
pub const EVENT_ID_HEADER: &str = "X-Cadence-Event-Id";

/// Longest response body echoed back in a rejection
const MAX_REJECTION_BODY: usize = 256;

/// Delivers due-task events as JSON POSTs to the task's reply address.
/// Any 2xx response counts as accepted.
pub struct WebhookNotifier {
    client: reqwest::Client,
    timeout: Duration,
}

impl WebhookNotifier {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("cadence/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, timeout })
    }

    fn parse_address(reply_address: &str) -> std::result::Result<Url, NotifyError> {
        let url = Url::parse(reply_address)
            .map_err(|_| NotifyError::InvalidAddress(reply_address.to_string()))?;

        match url.scheme() {
            "http" | "https" => Ok(url),
            _ => Err(NotifyError::InvalidAddress(reply_address.to_string())),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(
        &self,
        task: &ScheduledTask,
        event: &TaskDueEvent,
    ) -> std::result::Result<(), NotifyError> {
        let url = Self::parse_address(&task.reply_address)?;

        let response = self
            .client
            .post(url)
            .header(EVENT_TYPE_HEADER, event.event_type.as_str())
            .header(EVENT_ID_HEADER, event.event_id.as_str())
            .json(event)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    NotifyError::Timeout(self.timeout.as_millis() as u64)
                } else {
                    NotifyError::Unreachable(e.to_string())
                }
            })?;

        let status = response.status();
        if status.is_success() {
            debug!(
                task_id = %task.id,
                event_id = %event.event_id,
                status = status.as_u16(),
                "Webhook accepted due-task event"
            );
            return Ok(());
        }

        let mut message = response.text().await.unwrap_or_default();
        if message.len() > MAX_REJECTION_BODY {
            let mut cut = MAX_REJECTION_BODY;
            while !message.is_char_boundary(cut) {
                cut -= 1;
            }
            message.truncate(cut);
        }

        warn!(
            task_id = %task.id,
            status = status.as_u16(),
            "Webhook rejected due-task event"
        );
        Err(NotifyError::Rejected {
            status: status.as_u16(),
            message,
        })
    }
}
