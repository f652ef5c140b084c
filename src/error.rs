//! Error types for the forwarder

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors surfaced by the forwarding engine and its collaborators.
///
/// Content rejections are not errors (see [`crate::ingester::RejectReason`]),
/// and rate ceilings are [`crate::governor::Admission`] values.
#[derive(Debug, Error)]
pub enum BotError {
    #[error("Transport unavailable: {0}")]
    TransportUnavailable(#[from] reqwest::Error),

    #[error("Gateway returned HTTP {status} for {operation}")]
    GatewayStatus { operation: &'static str, status: u16 },

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Cursor for {channel} would regress from {current} to {proposed}")]
    CursorRegression {
        channel: String,
        current: DateTime<Utc>,
        proposed: DateTime<Utc>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BotError {
    /// Transient failures are retried on the next cycle.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            BotError::TransportUnavailable(_) | BotError::GatewayStatus { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, BotError>;
