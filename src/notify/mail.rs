//! Order status emails

use async_trait::async_trait;
use serde::Serialize;
use std::fmt::Write as _;
use uuid::Uuid;

use super::{EmailNotifier, NotifyError};
use crate::domain::aggregates::{OrderItem, OrderStatus};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusEmail {
    pub to: String,
    pub recipient_name: String,
    pub order_id: Uuid,
    pub status: OrderStatus,
    pub items: Vec<OrderItem>,
}

impl StatusEmail {
    pub fn subject(&self) -> String {
        format!("Your order {} is now {}", self.order_id, self.status)
    }

    pub fn body_text(&self) -> String {
        let mut body = format!("Hi {},\n\nThe status of your order {} changed to \"{}\".\n\nItems:\n", self.recipient_name, self.order_id, self.status);
        for item in &self.items {
            let _ = writeln!(body, "- {} ({} / {}) x{} @ {}", item.title, item.color, item.size, item.quantity, item.price);
        }
        body.push_str("\nThank you for shopping with us.\n");
        body
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RelayMessage<'a> {
    from: &'a str,
    to: &'a str,
    to_name: &'a str,
    subject: String,
    text: String,
}

/// Posts messages to an HTTP mail relay.
#[derive(Clone)]
pub struct HttpMailer {
    client: reqwest::Client,
    endpoint: String,
    token: Option<String>,
    from: String,
}

impl HttpMailer {
    pub fn new(endpoint: impl Into<String>, token: Option<String>, from: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), endpoint: endpoint.into(), token, from: from.into() }
    }
}

#[async_trait]
impl EmailNotifier for HttpMailer {
    async fn send(&self, email: &StatusEmail) -> Result<(), NotifyError> {
        let message = RelayMessage {
            from: &self.from,
            to: &email.to,
            to_name: &email.recipient_name,
            subject: email.subject(),
            text: email.body_text(),
        };
        let mut request = self.client.post(&self.endpoint).json(&message);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        request.send().await?.error_for_status()?;
        tracing::info!(to = %email.to, order_id = %email.order_id, status = %email.status, "Status email sent");
        Ok(())
    }
}

/// Used when no relay is configured.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl EmailNotifier for LogMailer {
    async fn send(&self, email: &StatusEmail) -> Result<(), NotifyError> {
        tracing::info!(to = %email.to, subject = %email.subject(), "Status email (no relay configured)");
        Ok(())
    }
}
