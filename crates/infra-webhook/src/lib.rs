// Cadence Infrastructure - Webhook Adapter
// Implements: Notifier (HTTP POST of the due-task event to the reply address)

mod notifier;

pub use notifier::{WebhookNotifier, EVENT_ID_HEADER, EVENT_TYPE_HEADER};
