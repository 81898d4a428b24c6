//! Outbound email queue
//!
//! Requests hand emails to a bounded queue and return immediately. A single
//! worker task drains the queue through a [`MailTransport`]; delivery failures
//! are logged and dropped, never reported back to the request that queued them.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
}

#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, email: &Email) -> Result<()>;
}

/// Posts each email as JSON to an HTTP mail relay.
pub struct RelayTransport {
    client: reqwest::Client,
    url: String,
    token: Option<String>,
    from: String,
}

impl RelayTransport {
    pub fn new(url: String, token: Option<String>, from: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            url,
            token,
            from,
        })
    }
}

#[derive(Serialize)]
struct RelayMessage<'a> {
    from: &'a str,
    #[serde(flatten)]
    email: &'a Email,
}

#[async_trait]
impl MailTransport for RelayTransport {
    async fn send(&self, email: &Email) -> Result<()> {
        let mut request = self.client.post(&self.url).json(&RelayMessage {
            from: &self.from,
            email,
        });
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let resp = request.send().await.context("Mail relay unreachable")?;
        if !resp.status().is_success() {
            anyhow::bail!("Mail relay answered {}", resp.status());
        }
        Ok(())
    }
}

/// Logs emails instead of sending them. Used when no relay is configured.
pub struct LogTransport;

#[async_trait]
impl MailTransport for LogTransport {
    async fn send(&self, email: &Email) -> Result<()> {
        info!(to = %email.to, subject = %email.subject, "Mail relay not configured, email not sent");
        Ok(())
    }
}

/// Cloneable producer side of the queue.
#[derive(Clone)]
pub struct Mailer {
    tx: mpsc::Sender<Email>,
}

/// Owner of the worker task.
pub struct MailWorker {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl Mailer {
    pub fn spawn(transport: Arc<dyn MailTransport>, capacity: usize) -> (Mailer, MailWorker) {
        let (tx, mut rx) = mpsc::channel::<Email>(capacity);
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    next = rx.recv() => match next {
                        Some(email) => deliver(transport.as_ref(), &email).await,
                        None => break,
                    },
                    _ = &mut stop_rx => {
                        // Refuse new mail, then flush what is already queued.
                        rx.close();
                        while let Some(email) = rx.recv().await {
                            deliver(transport.as_ref(), &email).await;
                        }
                        break;
                    }
                }
            }
            debug!("Mail worker exited");
        });

        (
            Mailer { tx },
            MailWorker {
                stop: stop_tx,
                handle,
            },
        )
    }

    /// Queue an email without waiting. Returns whether it was accepted.
    pub fn enqueue(&self, email: Email) -> bool {
        match self.tx.try_send(email) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(email)) => {
                warn!(to = %email.to, "Mail queue full, dropping email");
                false
            }
            Err(mpsc::error::TrySendError::Closed(email)) => {
                warn!(to = %email.to, "Mail queue closed, dropping email");
                false
            }
        }
    }
}

impl MailWorker {
    /// Stop accepting mail and wait until the queue is drained.
    pub async fn shutdown(self) {
        let _ = self.stop.send(());
        if let Err(e) = self.handle.await {
            warn!("Mail worker ended abnormally: {}", e);
        }
        info!("Mail worker stopped");
    }
}

async fn deliver(transport: &dyn MailTransport, email: &Email) {
    match transport.send(email).await {
        Ok(()) => debug!(to = %email.to, subject = %email.subject, "Email delivered"),
        Err(e) => warn!(to = %email.to, subject = %email.subject, "Email delivery failed: {:#}", e),
    }
}
