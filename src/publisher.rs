//! Channel event publishing over NATS.

use crate::domain::events::ChannelEvent;

const SUBJECT_PREFIX: &str = "channels.events";

/// Publishes [`ChannelEvent`]s as JSON. Without a NATS client events are only logged.
#[derive(Clone, Default)]
pub struct EventPublisher {
    nats: Option<async_nats::Client>,
}

impl EventPublisher {
    pub fn new(nats: Option<async_nats::Client>) -> Self { Self { nats } }

    pub fn disabled() -> Self { Self::default() }

    pub fn is_enabled(&self) -> bool { self.nats.is_some() }

    pub fn subject(event: &ChannelEvent) -> String {
        format!("{SUBJECT_PREFIX}.{}", event.kind())
    }

    /// Publishing is best effort; failures are logged and never surface to callers.
    pub async fn publish(&self, event: ChannelEvent) {
        let Some(nats) = &self.nats else {
            tracing::debug!(channel = %event.channel_id(), event = event.kind(), "event not published, NATS disabled");
            return;
        };
        let payload = match serde_json::to_vec(&event) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(event = event.kind(), error = %e, "event serialization failed");
                return;
            }
        };
        let subject = Self::subject(&event);
        match nats.publish(subject.clone(), payload.into()).await {
            Ok(()) => tracing::debug!(subject = %subject, "event published"),
            Err(e) => tracing::warn!(subject = %subject, error = %e, "event publish failed"),
        }
    }
}
