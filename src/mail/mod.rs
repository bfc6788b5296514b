//! Seams to the outside world used by the dispatcher: rendering a mail body
//! from a named template, and handing a finished mail to a transport.

pub mod smtp;
pub mod templates;
#[cfg(test)]
pub mod testing;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::MailContext;

pub use smtp::SmtpMailer;
pub use templates::TemplateStore;

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("template '{0}' not found")]
    NotFound(String),

    #[error("failed to render template '{name}': {reason}")]
    Render { name: String, reason: String },
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid address: {0}")]
    Address(String),

    #[error("invalid message: {0}")]
    Message(String),

    #[error("SMTP delivery failed: {0}")]
    Smtp(String),
}

/// A fully rendered mail, ready for the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct Mail {
    pub to: Vec<String>,
    pub from: String,
    pub subject: String,
    pub body: String,
}

pub trait TemplateRenderer: Send + Sync {
    fn render(&self, name: &str, context: &MailContext) -> Result<String, TemplateError>;
}

#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Sends the mail. Once started, a send is not cancelled.
    async fn send(&self, mail: &Mail) -> Result<(), TransportError>;
}
