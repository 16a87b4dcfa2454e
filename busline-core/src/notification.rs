use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html_body: String,
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Notification dispatch timed out after {0:?}")]
    Timeout(Duration),
    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),
    #[error("Provider error: {0}")]
    Provider(String),
}

/// Provider-agnostic outbound email (SMTP, HTTP API, console).
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    fn name(&self) -> &'static str;

    async fn send(&self, message: &EmailMessage) -> Result<(), DispatchError>;
}
