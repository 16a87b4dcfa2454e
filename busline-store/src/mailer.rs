use async_trait::async_trait;
use busline_core::{DispatchError, EmailMessage, NotificationDispatcher};
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::info;

use crate::app_config::{NotificationConfig, NotificationProvider};

/// Logs outgoing mail instead of sending it. Local runs and tests.
#[derive(Debug, Clone, Default)]
pub struct ConsoleDispatcher;

#[async_trait]
impl NotificationDispatcher for ConsoleDispatcher {
    fn name(&self) -> &'static str {
        "console"
    }

    async fn send(&self, message: &EmailMessage) -> Result<(), DispatchError> {
        if !message.to.contains('@') {
            return Err(DispatchError::InvalidRecipient(message.to.clone()));
        }
        info!(
            to = %message.to,
            subject = %message.subject,
            bytes = message.html_body.len(),
            "email (console provider)"
        );
        Ok(())
    }
}

/// Sends HTML mail through an SMTP relay
#[derive(Clone)]
pub struct SmtpDispatcher {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpDispatcher {
    pub fn new(
        host: &str,
        port: u16,
        credentials: Option<(String, String)>,
        from: &str,
    ) -> Result<Self, DispatchError> {
        let from: Mailbox = from
            .parse()
            .map_err(|e| DispatchError::Provider(format!("Invalid from address: {e}")))?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(host)
            .map_err(|e| DispatchError::Provider(format!("SMTP relay error: {e}")))?
            .port(port);
        if let Some((username, password)) = credentials {
            builder = builder.credentials(Credentials::new(username, password));
        }

        Ok(Self { transport: builder.build(), from })
    }
}

#[async_trait]
impl NotificationDispatcher for SmtpDispatcher {
    fn name(&self) -> &'static str {
        "smtp"
    }

    async fn send(&self, message: &EmailMessage) -> Result<(), DispatchError> {
        let to: Mailbox = message
            .to
            .parse()
            .map_err(|_| DispatchError::InvalidRecipient(message.to.clone()))?;

        let email = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(message.subject.clone())
            .header(ContentType::TEXT_HTML)
            .body(message.html_body.clone())
            .map_err(|e| DispatchError::Provider(format!("Failed to build email: {e}")))?;

        self.transport
            .send(email)
            .await
            .map_err(|e| DispatchError::Provider(format!("Failed to send email: {e}")))?;
        Ok(())
    }
}

/// Pick the dispatcher named by configuration. SMTP without a host falls back to console.
pub fn dispatcher_from_config(config: &NotificationConfig) -> Result<Box<dyn NotificationDispatcher>, DispatchError> {
    match (config.provider, config.smtp_host.as_deref()) {
        (NotificationProvider::Smtp, Some(host)) => {
            let credentials = config.smtp_username.clone().zip(config.smtp_password.clone());
            Ok(Box::new(SmtpDispatcher::new(host, config.smtp_port, credentials, &config.from_address)?))
        }
        (NotificationProvider::Smtp, None) => {
            tracing::warn!("SMTP provider selected without smtp_host, using console dispatcher");
            Ok(Box::new(ConsoleDispatcher))
        }
        (NotificationProvider::Console, _) => Ok(Box::new(ConsoleDispatcher)),
    }
}
