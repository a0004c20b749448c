//! Recording notifiers for tests

use async_trait::async_trait;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use super::{EmailNotifier, NotifyError, RealtimeNotifier, StatusEmail, StatusPayload};

pub(crate) struct RecordingRealtime {
    sent: UnboundedSender<(String, StatusPayload)>,
    fail: bool,
}

impl RecordingRealtime {
    pub(crate) fn new() -> (Self, UnboundedReceiver<(String, StatusPayload)>) {
        let (sent, rx) = unbounded_channel();
        (Self { sent, fail: false }, rx)
    }

    /// Records the attempt, then reports a transport failure.
    pub(crate) fn failing() -> (Self, UnboundedReceiver<(String, StatusPayload)>) {
        let (sent, rx) = unbounded_channel();
        (Self { sent, fail: true }, rx)
    }
}

#[async_trait]
impl RealtimeNotifier for RecordingRealtime {
    async fn emit(&self, channel: &str, payload: &StatusPayload) -> Result<(), NotifyError> {
        let _ = self.sent.send((channel.to_string(), payload.clone()));
        if self.fail {
            return Err(NotifyError::Publish("transport down".into()));
        }
        Ok(())
    }
}

pub(crate) struct RecordingMailer {
    sent: UnboundedSender<StatusEmail>,
}

impl RecordingMailer {
    pub(crate) fn new() -> (Self, UnboundedReceiver<StatusEmail>) {
        let (sent, rx) = unbounded_channel();
        (Self { sent }, rx)
    }
}

#[async_trait]
impl EmailNotifier for RecordingMailer {
    async fn send(&self, email: &StatusEmail) -> Result<(), NotifyError> {
        let _ = self.sent.send(email.clone());
        Ok(())
    }
}
