//! Core types shared across the forwarding pipeline

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A message as returned by the transport for one source channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawMessage {
    pub channel_id: String,
    pub body: String,
    pub timestamp: DateTime<Utc>,
    pub from_self: bool,
}

/// Shopping platform a deal link points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Amazon,
    Flipkart,
    Myntra,
    Ajio,
    Other,
}

impl Platform {
    /// Classify a host by substring, the way deal channels abbreviate links
    pub fn from_host(host: &str) -> Self {
        let host = host.to_ascii_lowercase();
        if host.contains("amazon") || host.contains("amzn.to") {
            Platform::Amazon
        } else if host.contains("flipkart") || host.contains("fkrt.") {
            Platform::Flipkart
        } else if host.contains("myntra") {
            Platform::Myntra
        } else if host.contains("ajio") {
            Platform::Ajio
        } else {
            Platform::Other
        }
    }

    /// Header line used in the rendered post
    pub fn label(&self) -> &'static str {
        match self {
            Platform::Amazon => "🛍️ Amazon",
            Platform::Flipkart => "📦 Flipkart",
            Platform::Myntra => "👕 Myntra",
            Platform::Ajio => "🛒 Ajio",
            Platform::Other => "🔗 Other",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Amazon => "amazon",
            Platform::Flipkart => "flipkart",
            Platform::Myntra => "myntra",
            Platform::Ajio => "ajio",
            Platform::Other => "other",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rupee amount
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Price(pub Decimal);

impl Price {
    pub fn amount(&self) -> Decimal {
        self.0
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "₹{}", self.0.normalize())
    }
}

/// Percentage off, 1..=100
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discount(pub u8);

impl Discount {
    pub fn new(percent: u32) -> Option<Self> {
        match percent {
            1..=100 => Some(Discount(percent as u8)),
            _ => None,
        }
    }
}

impl fmt::Display for Discount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

/// A parsed, rewritten deal ready for delivery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deal {
    pub platform: Platform,
    pub product_name: String,
    pub price: Option<Price>,
    pub discount: Option<Discount>,
    /// Link with tracking parameters removed
    pub url: String,
    /// Link as posted, with the affiliate tag for Amazon
    pub affiliate_url: String,
    /// Platform-scoped product identifier (ASIN, pid, slug), `platform:id`
    pub product_id: Option<String>,
    /// Post body without the hashtag line
    pub body: String,
    pub rendered_text: String,
}
