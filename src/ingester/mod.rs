//! Message parsing
//!
//! Turns one raw channel message into a [`Deal`] or a [`RejectReason`].
//! Rejections are ordinary values: the poller counts them and moves on.

pub mod links;
pub mod render;


use crate::config::{AffiliateConfig, ParserConfig};
use crate::types::{Deal, Discount, Platform, Price};
use chrono::{FixedOffset, Offset, Timelike, Utc};
use regex::Regex;
use rust_decimal::Decimal;
use serde::Serialize;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::LazyLock;

/// Why a message was not turned into a deal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, thiserror::Error)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    #[error("empty message")]
    Empty,
    #[error("elongated-letter noise")]
    Noise,
    #[error("numeric-only message")]
    NumericOnly,
    #[error("no link")]
    NoLink,
    #[error("no link to a known shopping domain")]
    NoAllowedLink,
    #[error("malformed price")]
    MalformedPrice,
}

impl RejectReason {
    pub const ALL: [RejectReason; 6] = [
        RejectReason::Empty,
        RejectReason::Noise,
        RejectReason::NumericOnly,
        RejectReason::NoLink,
        RejectReason::NoAllowedLink,
        RejectReason::MalformedPrice,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::Empty => "empty",
            RejectReason::Noise => "noise",
            RejectReason::NumericOnly => "numeric_only",
            RejectReason::NoLink => "no_link",
            RejectReason::NoAllowedLink => "no_allowed_link",
            RejectReason::MalformedPrice => "malformed_price",
        }
    }

    /// Position in [`RejectReason::ALL`]
    pub fn index(&self) -> usize {
        *self as usize
    }
}

/// Consecutive repeats of one letter that mark obfuscated promo text
const NOISE_RUN: usize = 4;

/// Product-name lines must be longer than this many characters
const MIN_NAME_CHARS: usize = 8;

static HEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)From\s*\*\s*[^:\n]*:|^\s*#{1,6}\s*From\b.*$").expect("valid header regex")
});

static PRICE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:@|₹|\brs\.?|\binr)\s*(\d[\d,]*(?:\.\d+)?)").expect("valid price regex")
});

static DISCOUNT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{1,3})\s*%").expect("valid discount regex"));

/// Deal parser with affiliate rewriting
pub struct DealParser {
    affiliate_tag: String,
    domains: Vec<String>,
    offset: FixedOffset,
    rotation: AtomicU64,
}

impl DealParser {
    pub fn new(affiliate_tag: impl Into<String>) -> Self {
        Self {
            affiliate_tag: affiliate_tag.into(),
            domains: links::DEFAULT_DOMAINS.iter().map(|d| d.to_string()).collect(),
            offset: Utc.fix(),
            rotation: AtomicU64::new(0),
        }
    }

    pub fn from_config(parser: &ParserConfig, affiliate: &AffiliateConfig) -> Self {
        Self::new(affiliate.amazon_tag.clone())
            .with_extra_domains(&parser.extra_domains)
            .with_utc_offset_minutes(parser.utc_offset_minutes)
    }

    pub fn with_extra_domains(mut self, extra: &[String]) -> Self {
        for domain in extra {
            let domain = domain.trim().to_ascii_lowercase();
            if !domain.is_empty() && !self.domains.contains(&domain) {
                self.domains.push(domain);
            }
        }
        self
    }

    pub fn with_utc_offset_minutes(mut self, minutes: i32) -> Self {
        self.offset = FixedOffset::east_opt(minutes * 60).unwrap_or_else(|| {
            tracing::warn!(minutes, "Invalid UTC offset, using UTC");
            Utc.fix()
        });
        self
    }

    /// Parse using the current local hour and the next rotation value
    pub fn parse(&self, text: &str) -> Result<Deal, RejectReason> {
        let hour = Utc::now().with_timezone(&self.offset).hour();
        let rotation = self.rotation.fetch_add(1, Ordering::Relaxed);
        self.parse_with(text, hour, rotation)
    }

    /// Parse with explicit hashtag inputs
    pub fn parse_with(&self, text: &str, hour: u32, rotation: u64) -> Result<Deal, RejectReason> {
        if text.trim().is_empty() {
            return Err(RejectReason::Empty);
        }

        let stripped = HEADER_RE.replace_all(text, "");
        let prose = links::strip_urls(&stripped);

        if has_elongated_run(&prose) {
            return Err(RejectReason::Noise);
        }
        if is_numeric_only(&stripped) {
            return Err(RejectReason::NumericOnly);
        }

        let urls = links::extract_urls(&stripped);
        if urls.is_empty() {
            return Err(RejectReason::NoLink);
        }
        let url = urls
            .iter()
            .find_map(|u| links::parse_allowed(u, &self.domains))
            .ok_or(RejectReason::NoAllowedLink)?;

        let platform = Platform::from_host(url.host_str().unwrap_or_default());
        let normalized = links::normalize(&url, platform);
        let affiliate_url = match platform {
            Platform::Amazon => links::with_affiliate_tag(&normalized, &self.affiliate_tag),
            _ => normalized.clone(),
        };

        let product_name = extract_product_name(&prose);
        let price = extract_price(&prose)?;
        let discount = extract_discount(&prose);

        let body = render::render_body(
            platform,
            &product_name,
            price,
            discount,
            affiliate_url.as_str(),
        );
        let hashtags = render::select_hashtags(platform, price, &product_name, hour, rotation);
        let rendered_text = render::render(&body, &hashtags);

        Ok(Deal {
            platform,
            product_id: links::product_id(&url, platform),
            product_name,
            price,
            discount,
            url: normalized.to_string(),
            affiliate_url: affiliate_url.to_string(),
            body,
            rendered_text,
        })
    }
}

/// A word with lowercase letters that repeats one letter `NOISE_RUN` times.
/// All-caps words are left alone so sizes and model codes like `XXXXL` pass.
fn has_elongated_run(text: &str) -> bool {
    text.split(|c: char| !c.is_alphabetic())
        .filter(|word| word.chars().any(char::is_lowercase))
        .any(has_letter_run)
}

fn has_letter_run(word: &str) -> bool {
    let mut prev: Option<char> = None;
    let mut run = 0;
    for c in word.chars().flat_map(char::to_lowercase) {
        if Some(c) == prev {
            run += 1;
            if run >= NOISE_RUN {
                return true;
            }
        } else {
            run = 1;
        }
        prev = Some(c);
    }
    false
}

/// Digits, whitespace and punctuation only, with at least one digit
fn is_numeric_only(text: &str) -> bool {
    let mut saw_digit = false;
    for c in text.chars() {
        if c.is_ascii_digit() {
            saw_digit = true;
        } else if !(c.is_whitespace() || c.is_ascii_punctuation()) {
            return false;
        }
    }
    saw_digit
}

fn is_noise_line(line: &str) -> bool {
    is_numeric_only(line) || has_elongated_run(line)
}

fn extract_product_name(prose: &str) -> String {
    prose
        .lines()
        .map(|l| l.trim().trim_matches(|c: char| c == '*' || c == '_' || c.is_whitespace()))
        .find(|l| l.chars().count() > MIN_NAME_CHARS && !is_noise_line(l))
        .map(str::to_string)
        .unwrap_or_else(|| render::PLACEHOLDER_NAME.to_string())
}

fn extract_price(prose: &str) -> Result<Option<Price>, RejectReason> {
    let Some(caps) = PRICE_RE.captures(prose) else {
        return Ok(None);
    };
    let digits = caps[1].replace(',', "");
    match Decimal::from_str(&digits) {
        Ok(amount) if amount > Decimal::ZERO => Ok(Some(Price(amount))),
        _ => Err(RejectReason::MalformedPrice),
    }
}

fn extract_discount(prose: &str) -> Option<Discount> {
    DISCOUNT_RE
        .captures_iter(prose)
        .filter_map(|c| c[1].parse::<u32>().ok())
        .find_map(Discount::new)
}
