//! Real-time transports

use async_trait::async_trait;

use super::{NotifyError, RealtimeNotifier, StatusPayload};

/// Publishes events on NATS subject `<prefix>.<channel>`.
#[derive(Clone)]
pub struct NatsNotifier {
    client: async_nats::Client,
    prefix: String,
}

impl NatsNotifier {
    pub fn new(client: async_nats::Client, prefix: impl Into<String>) -> Self {
        Self { client, prefix: prefix.into() }
    }

    fn subject(&self, channel: &str) -> String {
        format!("{}.{}", self.prefix, channel)
    }
}

#[async_trait]
impl RealtimeNotifier for NatsNotifier {
    async fn emit(&self, channel: &str, payload: &StatusPayload) -> Result<(), NotifyError> {
        let body = serde_json::to_vec(payload)?;
        self.client
            .publish(self.subject(channel), body.into())
            .await
            .map_err(|e| NotifyError::Publish(e.to_string()))?;
        tracing::debug!(channel, order_id = %payload.order_id, status = %payload.status, "Status event published");
        Ok(())
    }
}

/// Used when no broker is configured.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl RealtimeNotifier for LogNotifier {
    async fn emit(&self, channel: &str, payload: &StatusPayload) -> Result<(), NotifyError> {
        tracing::info!(channel, order_id = %payload.order_id, status = %payload.status, "Status event (no broker configured)");
        Ok(())
    }
}
