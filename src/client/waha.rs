//! WAHA HTTP gateway client
//!
//! Reads channel history and posts text through a WAHA instance.

use super::Transport;
use crate::config::GatewayConfig;
use crate::error::{BotError, Result};
use crate::types::RawMessage;
use async_trait::async_trait;
use chrono::DateTime;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

/// WAHA gateway client
#[derive(Clone)]
pub struct WahaClient {
    http: Client,
    base_url: String,
    session: String,
    fetch_timeout: Duration,
    send_timeout: Duration,
    health_timeout: Duration,
}

#[derive(Debug, Clone, Deserialize)]
struct WahaMessage {
    #[serde(default)]
    timestamp: i64,
    #[serde(default)]
    body: Option<String>,
    #[serde(rename = "fromMe", default)]
    from_me: bool,
}

impl WahaClient {
    pub fn new(config: &GatewayConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(
                config
                    .fetch_timeout_secs
                    .max(config.send_timeout_secs)
                    .max(config.health_timeout_secs),
            ))
            .build()?;

        Ok(Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
            session: config.session.clone(),
            fetch_timeout: Duration::from_secs(config.fetch_timeout_secs),
            send_timeout: Duration::from_secs(config.send_timeout_secs),
            health_timeout: Duration::from_secs(config.health_timeout_secs),
        })
    }

    fn parse_message(&self, channel_id: &str, msg: WahaMessage) -> Option<RawMessage> {
        let timestamp = DateTime::from_timestamp(msg.timestamp, 0)?;
        Some(RawMessage {
            channel_id: channel_id.to_string(),
            body: msg.body.unwrap_or_default(),
            timestamp,
            from_self: msg.from_me,
        })
    }
}

#[async_trait]
impl Transport for WahaClient {
    async fn fetch_recent(&self, channel_id: &str, limit: usize) -> Result<Vec<RawMessage>> {
        let url = format!(
            "{}/api/{}/chats/{}/messages",
            self.base_url, self.session, channel_id
        );
        let resp = self
            .http
            .get(&url)
            .query(&[("limit", limit.to_string())])
            .timeout(self.fetch_timeout)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(BotError::GatewayStatus {
                operation: "fetch",
                status: resp.status().as_u16(),
            });
        }

        let messages: Vec<WahaMessage> = resp.json().await?;
        debug!(channel = %channel_id, count = messages.len(), "Fetched messages");

        Ok(messages
            .into_iter()
            .filter_map(|m| self.parse_message(channel_id, m))
            .collect())
    }

    async fn send(&self, destination: &str, text: &str) -> Result<()> {
        let url = format!("{}/api/sendText", self.base_url);
        let resp = self
            .http
            .post(&url)
            .json(&json!({
                "chatId": destination,
                "text": text,
                "session": self.session,
            }))
            .timeout(self.send_timeout)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(BotError::GatewayStatus {
                operation: "send",
                status: resp.status().as_u16(),
            });
        }
        Ok(())
    }

    async fn health_check(&self) -> bool {
        let url = format!("{}/api/sessions", self.base_url);
        match self
            .http
            .get(&url)
            .timeout(self.health_timeout)
            .send()
            .await
        {
            Ok(resp) => resp.status() == reqwest::StatusCode::OK,
            Err(e) => {
                warn!(error = %e, "Gateway health check failed");
                false
            }
        }
    }
}
