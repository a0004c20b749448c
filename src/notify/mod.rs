//! Side effects of order events: real-time push and status emails.
//!
//! Delivery is best-effort. It runs after the order change is committed and
//! its failures are logged, never returned to the caller.

pub mod mail;
pub mod realtime;
#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::domain::aggregates::{Order, OrderItem, OrderStatus};
use crate::domain::events::OrderEvent;
use crate::store::UserDirectory;

pub use mail::{HttpMailer, LogMailer, StatusEmail};
pub use realtime::{LogNotifier, NatsNotifier};

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("payload serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("publish failed: {0}")]
    Publish(String),
    #[error("mail relay error: {0}")]
    Mail(#[from] reqwest::Error),
}

/// Real-time message pushed on the owner's channel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusPayload {
    pub order_id: Uuid,
    pub status: OrderStatus,
}

#[async_trait]
pub trait RealtimeNotifier: Send + Sync {
    async fn emit(&self, channel: &str, payload: &StatusPayload) -> Result<(), NotifyError>;
}

#[async_trait]
pub trait EmailNotifier: Send + Sync {
    async fn send(&self, email: &StatusEmail) -> Result<(), NotifyError>;
}

#[derive(Clone)]
pub struct NotificationDispatcher {
    realtime: Arc<dyn RealtimeNotifier>,
    email: Arc<dyn EmailNotifier>,
    users: Arc<dyn UserDirectory>,
}

impl NotificationDispatcher {
    pub fn new(realtime: Arc<dyn RealtimeNotifier>, email: Arc<dyn EmailNotifier>, users: Arc<dyn UserDirectory>) -> Self {
        Self { realtime, email, users }
    }

    /// Delivers `events` raised by `order` on a background task.
    pub fn dispatch(&self, order: &Order, events: Vec<OrderEvent>) -> JoinHandle<()> {
        let this = self.clone();
        let items = order.items().to_vec();
        tokio::spawn(async move {
            for event in events {
                this.deliver(event, &items).await;
            }
        })
    }

    async fn deliver(&self, event: OrderEvent, items: &[OrderItem]) {
        match event {
            OrderEvent::Placed { order_id, user_id, total } => {
                tracing::info!(%order_id, %user_id, %total, "Order placed");
            }
            OrderEvent::StatusChanged { order_id, user_id, status } => {
                let payload = StatusPayload { order_id, status };
                if let Err(e) = self.realtime.emit(&user_id.to_string(), &payload).await {
                    tracing::warn!(%order_id, error = %e, "Real-time status event failed");
                }
                self.send_status_email(order_id, user_id, status, items).await;
            }
        }
    }

    async fn send_status_email(&self, order_id: Uuid, user_id: Uuid, status: OrderStatus, items: &[OrderItem]) {
        let recipient = match self.users.recipient(user_id).await {
            Ok(Some(r)) => r,
            Ok(None) => {
                tracing::warn!(%order_id, %user_id, "No recipient for status email");
                return;
            }
            Err(e) => {
                tracing::warn!(%order_id, %user_id, error = %e, "Recipient lookup failed");
                return;
            }
        };
        let email = StatusEmail {
            to: recipient.email,
            recipient_name: recipient.name,
            order_id,
            status,
            items: items.to_vec(),
        };
        if let Err(e) = self.email.send(&email).await {
            tracing::warn!(%order_id, error = %e, "Status email failed");
        }
    }
}
