//! Operator notifications over Discord webhook and Telegram

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::TelemetryConfig;

const ALERT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Info,
    Warning,
    Error,
    Critical,
}

impl AlertLevel {
    pub fn emoji(&self) -> &str {
        match self {
            AlertLevel::Info => "ℹ️",
            AlertLevel::Warning => "⚠️",
            AlertLevel::Error => "❌",
            AlertLevel::Critical => "🚨",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub level: AlertLevel,
    pub title: String,
    pub message: String,
    pub timestamp: i64,
}

impl Alert {
    pub fn new(level: AlertLevel, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            title: title.into(),
            message: message.into(),
            timestamp: chrono::Utc::now().timestamp(),
        }
    }

    pub fn info(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(AlertLevel::Info, title, message)
    }

    pub fn warning(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(AlertLevel::Warning, title, message)
    }

    pub fn error(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(AlertLevel::Error, title, message)
    }

    pub fn critical(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(AlertLevel::Critical, title, message)
    }

    /// Single-line rendering used by every channel
    pub fn render(&self) -> String {
        format!("{} **{}**\n{}", self.level.emoji(), self.title, self.message)
    }
}

/// Outbound notification channel. Delivery is best-effort and never fails
/// into the caller.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_alert(&self, alert: Alert);
}

pub struct AlertManager {
    enabled: bool,
    webhook_url: Option<String>,
    telegram_enabled: bool,
    telegram_bot_token: Option<String>,
    telegram_chat_id: Option<String>,
    http_client: reqwest::Client,
}

impl AlertManager {
    pub fn new(config: &TelemetryConfig) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(ALERT_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                warn!("Falling back to default HTTP client for alerts: {}", e);
                reqwest::Client::new()
            });

        Self {
            enabled: config.enable_alerts,
            webhook_url: config.alert_webhook.clone().filter(|u| !u.is_empty()),
            telegram_enabled: config.telegram.enabled,
            telegram_bot_token: config.telegram.bot_token.clone(),
            telegram_chat_id: config.telegram.chat_id.clone(),
            http_client,
        }
    }

    /// Whether any remote channel is configured
    pub fn has_remote_channel(&self) -> bool {
        self.webhook_url.is_some() || self.telegram_target().is_some()
    }

    fn telegram_target(&self) -> Option<(&str, &str)> {
        if !self.telegram_enabled {
            return None;
        }
        match (&self.telegram_bot_token, &self.telegram_chat_id) {
            (Some(token), Some(chat)) => Some((token.as_str(), chat.as_str())),
            _ => None,
        }
    }

    pub async fn send(&self, alert: Alert) {
        if !self.enabled {
            return;
        }

        let line = format!("{}: {}", alert.title, alert.message);
        match alert.level {
            AlertLevel::Info => info!(target: "alerts", "{}", line),
            AlertLevel::Warning => warn!(target: "alerts", "{}", line),
            AlertLevel::Error | AlertLevel::Critical => error!(target: "alerts", "{}", line),
        }

        if let Some(url) = &self.webhook_url {
            let payload = serde_json::json!({ "content": alert.render() });
            if let Err(e) = self.post_json(url, &payload).await {
                warn!("Webhook delivery failed: {}", e);
            }
        }

        if let Some((token, chat_id)) = self.telegram_target() {
            let url = format!("https://api.telegram.org/bot{}/sendMessage", token);
            let payload = serde_json::json!({
                "chat_id": chat_id,
                "text": alert.render(),
            });
            if let Err(e) = self.post_json(&url, &payload).await {
                warn!("Telegram delivery failed: {}", e);
            }
        }
    }

    async fn post_json(&self, url: &str, payload: &serde_json::Value) -> Result<()> {
        self.http_client
            .post(url)
            .json(payload)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[async_trait]
impl Notifier for AlertManager {
    async fn send_alert(&self, alert: Alert) {
        self.send(alert).await;
    }
}
