//! Notification fan-out: tracing console output plus an optional Discord webhook.
//!
//! Mirrors a two-handler logger: everything goes to the console, info-and-above
//! also goes to the webhook when one is configured.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info, warn};
use wreq::Client;

/// Discord caps message content at 2000 characters.
const MAX_CONTENT_LEN: usize = 2000;

/// Notification severity. Only Info and Warning reach the webhook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Debug,
    Info,
    Warning,
}

/// Sink for tracker notifications - enables recording in tests.
#[async_trait]
pub trait NotifySink: Send + Sync {
    async fn emit(&self, level: Level, message: &str);

    async fn debug(&self, message: &str) {
        self.emit(Level::Debug, message).await;
    }

    async fn info(&self, message: &str) {
        self.emit(Level::Info, message).await;
    }

    async fn warning(&self, message: &str) {
        self.emit(Level::Warning, message).await;
    }
}

/// Console logger with an optional Discord webhook attached.
pub struct Notifier {
    service_name: String,
    webhook: Option<Webhook>,
}

struct Webhook {
    client: Client,
    url: String,
    avatar_url: Option<String>,
}

impl Notifier {
    /// Console-only notifier.
    pub fn console(service_name: impl Into<String>) -> Self {
        Self { service_name: service_name.into(), webhook: None }
    }

    /// Notifier with a Discord webhook attached.
    ///
    /// The avatar is typically the scraped shop avatar, with the configured
    /// URL as fallback.
    pub fn with_webhook(
        service_name: impl Into<String>,
        webhook_url: impl Into<String>,
        avatar_url: Option<String>,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .context("Failed to build webhook client")?;

        Ok(Self {
            service_name: service_name.into(),
            webhook: Some(Webhook { client, url: webhook_url.into(), avatar_url }),
        })
    }

    pub fn has_webhook(&self) -> bool {
        self.webhook.is_some()
    }

    async fn post_webhook(&self, message: &str) {
        let Some(webhook) = &self.webhook else {
            return;
        };

        let mut content = message.to_string();
        content.truncate(MAX_CONTENT_LEN);

        let mut body = json!({
            "content": content,
            "username": self.service_name,
        });
        if let Some(avatar) = &webhook.avatar_url {
            body["avatar_url"] = json!(avatar);
        }

        let result = webhook
            .client
            .post(webhook.url.as_str())
            .header("Content-Type", "application/json")
            .body(body.to_string())
            .send()
            .await;

        match result {
            Ok(response) if !response.status().is_success() => {
                warn!("Webhook rejected message with status: {}", response.status());
            }
            Ok(_) => {}
            Err(e) => warn!("Failed to deliver webhook message: {:#}", e),
        }
    }
}

#[async_trait]
impl NotifySink for Notifier {
    async fn emit(&self, level: Level, message: &str) {
        match level {
            Level::Debug => debug!("{}", message),
            Level::Info => info!("{}", message),
            Level::Warning => warn!("{}", message),
        }

        if level >= Level::Info {
            self.post_webhook(message).await;
        }
    }
}
