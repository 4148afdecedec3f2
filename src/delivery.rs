//! Outbound message delivery.
//!
//! All scheduled jobs push onto one unbounded FIFO; a single consumer pops
//! and sends through the configured sink. A failed send requeues the message
//! verbatim and blocks the consumer for the current retry interval, which
//! doubles on every consecutive failure and resets once a send succeeds.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;

/// Initial retry interval after a failed send.
pub const RETRY_BASE: Duration = Duration::from_secs(60);

/// Delivery sink failures.
#[derive(Error, Debug)]
pub enum SendError {
    #[error("webhook request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("webhook returned status {0}")]
    Status(u16),
}

/// Sending side of the delivery pipeline.
pub trait MessageSink {
    fn send(&self, text: &str) -> impl Future<Output = Result<(), SendError>> + Send;
}

/// Incoming-webhook sink: POSTs `{"text": ...}` to a fixed URL.
#[derive(Debug, Clone)]
pub struct WebhookSink {
    url: String,
    client: reqwest::Client,
}

impl WebhookSink {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            client: reqwest::Client::new(),
        }
    }
}

impl MessageSink for WebhookSink {
    async fn send(&self, text: &str) -> Result<(), SendError> {
        let response = self
            .client
            .post(&self.url)
            .json(&serde_json::json!({ "text": text }))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SendError::Status(status.as_u16()));
        }
        Ok(())
    }
}

/// Consume the delivery queue until every sender is dropped.
///
/// `tx` is the same queue's sender, used to requeue a message after a failed
/// send. Empty messages are dropped with a warning and never reach the sink.
pub async fn run_delivery_loop<S: MessageSink>(
    mut rx: mpsc::UnboundedReceiver<String>,
    tx: mpsc::UnboundedSender<String>,
    sink: S,
) {
    let mut retry = RETRY_BASE;
    while let Some(message) = rx.recv().await {
        if message.is_empty() {
            tracing::warn!("dropping empty message");
            continue;
        }
        tracing::debug!("dequeued message: {}", message);
        match sink.send(&message).await {
            Ok(()) => {
                retry = RETRY_BASE;
            }
            Err(e) => {
                tracing::warn!("send failed, retrying in {:?}: {}", retry, e);
                let _ = tx.send(message);
                tokio::time::sleep(retry).await;
                retry = retry.saturating_mul(2);
            }
        }
    }
    tracing::debug!("delivery queue closed");
}
