use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use log::debug;

use super::{Mail, MailTransport, TransportError};
use crate::config::SmtpConfig;

/// Mail transport over SMTP.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    pub fn from_config(config: &SmtpConfig) -> anyhow::Result<Self> {
        let mut builder = if config.tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?.port(config.port)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host).port(config.port)
        };

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        if let Some(timeout) = config.timeout {
            builder = builder.timeout(Some(timeout));
        }

        Ok(Self {
            transport: builder.build(),
        })
    }
}

/// Builds an HTML mail; every recipient goes on the `To` header.
pub fn build_message(mail: &Mail) -> Result<Message, TransportError> {
    let from: Mailbox = mail
        .from
        .parse()
        .map_err(|e| TransportError::Address(format!("'{}': {}", mail.from, e)))?;

    let mut builder = Message::builder()
        .from(from)
        .subject(mail.subject.clone())
        .header(ContentType::TEXT_HTML);

    for recipient in &mail.to {
        let to: Mailbox = recipient
            .parse()
            .map_err(|e| TransportError::Address(format!("'{}': {}", recipient, e)))?;
        builder = builder.to(to);
    }

    builder
        .body(mail.body.clone())
        .map_err(|e| TransportError::Message(e.to_string()))
}

#[async_trait]
impl MailTransport for SmtpMailer {
    async fn send(&self, mail: &Mail) -> Result<(), TransportError> {
        let message = build_message(mail)?;
        let response = self
            .transport
            .send(message)
            .await
            .map_err(|e| TransportError::Smtp(e.to_string()))?;
        debug!("SMTP response: {:?}", response.code());
        Ok(())
    }
}
