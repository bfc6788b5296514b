//! Notification dispatcher: a bounded queue of outbound messages drained by
//! a fixed pool of workers. This is the only path mail takes out of the
//! process.
//!
//! Producers hold an [`Outbox`], a weak handle onto the queue. Only the
//! dispatcher owns the sending side, so the queue closes on shutdown once
//! in-flight enqueues complete, and workers drain whatever was accepted
//! before they exit.

use log::{debug, error, info};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::mail::{Mail, MailTransport, TemplateError, TemplateRenderer, TransportError};
use crate::model::OutboundMessage;
use crate::utils::format_duration;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("dispatcher is closed")]
    Closed,

    #[error("dispatch queue is full")]
    Saturated,

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Producer handle onto the dispatch queue.
#[derive(Clone)]
pub struct Outbox {
    tx: mpsc::WeakSender<OutboundMessage>,
}

impl Outbox {
    /// Queues a message, waiting while the queue is full.
    pub async fn enqueue(&self, message: OutboundMessage) -> Result<(), DispatchError> {
        debug!(
            "Queueing '{}' for {}",
            message.subject,
            message.to.join(", ")
        );
        let tx = self.tx.upgrade().ok_or(DispatchError::Closed)?;
        tx.send(message).await.map_err(|_| DispatchError::Closed)
    }

    /// Queues a message without waiting.
    pub fn try_enqueue(&self, message: OutboundMessage) -> Result<(), DispatchError> {
        let tx = self.tx.upgrade().ok_or(DispatchError::Closed)?;
        tx.try_send(message).map_err(|e| match e {
            TrySendError::Full(_) => DispatchError::Saturated,
            TrySendError::Closed(_) => DispatchError::Closed,
        })
    }
}

pub struct Dispatcher {
    tx: mpsc::Sender<OutboundMessage>,
    workers: Vec<JoinHandle<()>>,
}

impl Dispatcher {
    /// Spawns `workers` tasks draining a queue of `capacity` messages.
    pub fn start(
        workers: usize,
        capacity: usize,
        renderer: Arc<dyn TemplateRenderer>,
        transport: Arc<dyn MailTransport>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));

        let workers = (0..workers.max(1))
            .map(|id| {
                let rx = rx.clone();
                let renderer = renderer.clone();
                let transport = transport.clone();
                tokio::spawn(async move {
                    run_worker(id, rx, renderer, transport).await;
                })
            })
            .collect::<Vec<_>>();

        info!(
            "Dispatcher started with {} workers, queue capacity {}",
            workers.len(),
            capacity.max(1)
        );

        Self { tx, workers }
    }

    pub fn outbox(&self) -> Outbox {
        Outbox {
            tx: self.tx.downgrade(),
        }
    }

    /// Closes the queue to new messages and waits for the workers to drain it.
    pub async fn shutdown(self) {
        let Dispatcher { tx, workers } = self;
        drop(tx);
        info!("Dispatcher draining queue");
        for worker in workers {
            if let Err(e) = worker.await {
                error!("Dispatch worker ended abnormally: {}", e);
            }
        }
        info!("Dispatcher stopped");
    }
}

async fn run_worker(
    id: usize,
    rx: Arc<Mutex<mpsc::Receiver<OutboundMessage>>>,
    renderer: Arc<dyn TemplateRenderer>,
    transport: Arc<dyn MailTransport>,
) {
    debug!("Dispatch worker {} started", id);
    loop {
        let message = {
            let mut rx = rx.lock().await;
            rx.recv().await
        };
        let Some(message) = message else {
            break;
        };

        let start = Instant::now();
        match deliver(renderer.as_ref(), transport.as_ref(), &message).await {
            Ok(()) => info!(
                "Sent '{}' to {} in {}",
                message.subject,
                message.to.join(", "),
                format_duration(start.elapsed())
            ),
            Err(e) => error!(
                "Dropping '{}' for {}: {}",
                message.subject,
                message.to.join(", "),
                e
            ),
        }
    }
    debug!("Dispatch worker {} stopped", id);
}

/// Renders and sends a single message. An empty template name sends an
/// empty body.
pub async fn deliver(
    renderer: &dyn TemplateRenderer,
    transport: &dyn MailTransport,
    message: &OutboundMessage,
) -> Result<(), DispatchError> {
    let body = if message.template_name.is_empty() {
        String::new()
    } else {
        renderer.render(&message.template_name, &message.context)?
    };

    let mail = Mail {
        to: message.to.clone(),
        from: message.from.clone(),
        subject: message.subject.clone(),
        body,
    };
    transport.send(&mail).await?;
    Ok(())
}
