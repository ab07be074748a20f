use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, warn};

use crate::reporter::{self, SignalRecord};

/// Delivers a text message to one recipient.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, recipient: &str, text: &str) -> Result<()>;
}

/// Sends messages through the Telegram Bot API `sendMessage` method.
pub struct TelegramNotifier {
    client: reqwest::Client,
    url: String,
}

impl TelegramNotifier {
    pub fn new(client: reqwest::Client, api_base: &str, bot_token: &str) -> Self {
        let url = format!(
            "{}/bot{bot_token}/sendMessage",
            api_base.trim_end_matches('/')
        );
        Self { client, url }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, recipient: &str, text: &str) -> Result<()> {
        let payload = json!({
            "chat_id": recipient,
            "text": text,
            "disable_web_page_preview": true,
        });

        let resp = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .context("telegram request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("telegram API error {status}: {body}");
        }
        debug!("Telegram message delivered to {recipient}");
        Ok(())
    }
}

/// Prints each message as a JSON line instead of delivering it.
#[derive(Debug, Default)]
pub struct ConsoleNotifier;

#[async_trait]
impl Notifier for ConsoleNotifier {
    async fn send(&self, recipient: &str, text: &str) -> Result<()> {
        reporter::report_signal(&SignalRecord {
            timestamp: chrono::Utc::now().to_rfc3339(),
            recipient,
            text,
        });
        Ok(())
    }
}

/// Send `text` to every recipient, returning how many deliveries succeeded.
///
/// A failing recipient is logged and skipped; it never blocks the others and is
/// not retried.
pub async fn broadcast(notifier: &dyn Notifier, recipients: &[String], text: &str) -> usize {
    let mut delivered = 0;
    for recipient in recipients {
        match notifier.send(recipient, text).await {
            Ok(()) => delivered += 1,
            Err(e) => warn!("Failed to notify {recipient}: {e:#}"),
        }
    }
    delivered
}
