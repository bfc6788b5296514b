//! Transport and renderer doubles shared by the unit tests.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::sync::{Notify, Semaphore};

use super::{Mail, MailTransport, TemplateError, TemplateRenderer, TransportError};
use crate::model::MailContext;

/// Renders `<name>|<MigrationId>`, fails on names starting with `missing`.
pub struct EchoRenderer;

impl TemplateRenderer for EchoRenderer {
    fn render(&self, name: &str, context: &MailContext) -> Result<String, TemplateError> {
        if name.starts_with("missing") {
            return Err(TemplateError::NotFound(name.to_string()));
        }
        let id = context
            .get("MigrationId")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        Ok(format!("{}|{}", name, id))
    }
}

/// Records every mail. When gated, each send waits for a permit.
pub struct RecordingTransport {
    sent: Mutex<Vec<Mail>>,
    gated: AtomicBool,
    permits: Semaphore,
    started: Notify,
    delivered: Notify,
    fail: AtomicBool,
}

impl Default for RecordingTransport {
    fn default() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            gated: AtomicBool::new(false),
            permits: Semaphore::new(0),
            started: Notify::new(),
            delivered: Notify::new(),
            fail: AtomicBool::new(false),
        }
    }
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gated() -> Self {
        let transport = Self::default();
        transport.gated.store(true, Ordering::SeqCst);
        transport
    }

    pub fn failing() -> Self {
        let transport = Self::default();
        transport.fail.store(true, Ordering::SeqCst);
        transport
    }

    pub fn release(&self, sends: usize) {
        self.permits.add_permits(sends);
    }

    pub async fn wait_started(&self) {
        self.started.notified().await
    }

    /// Waits until at least `count` mails were recorded.
    pub async fn wait_for(&self, count: usize) {
        loop {
            let delivered = self.delivered.notified();
            if self.sent().len() >= count {
                return;
            }
            delivered.await;
        }
    }

    pub fn sent(&self) -> Vec<Mail> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MailTransport for RecordingTransport {
    async fn send(&self, mail: &Mail) -> Result<(), TransportError> {
        self.started.notify_one();
        if self.gated.load(Ordering::SeqCst) {
            self.permits.acquire().await.unwrap().forget();
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(TransportError::Smtp("connection refused".to_string()));
        }
        self.sent.lock().unwrap().push(mail.clone());
        self.delivered.notify_waiters();
        Ok(())
    }
}
