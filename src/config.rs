//! Configuration loading
//!
//! Values are layered: built-in defaults, then an optional TOML file, then
//! `FORWARDER__SECTION__KEY` environment variables, then the flat variable
//! names used by existing deployments (`WAHA_URL`, `SOURCE_CHANNELS`, ...).

use crate::error::{BotError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub channels: ChannelsConfig,
    #[serde(default)]
    pub affiliate: AffiliateConfig,
    #[serde(default)]
    pub forwarder: ForwarderConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub parser: ParserConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
}

/// WAHA gateway connection
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GatewayConfig {
    #[serde(default = "default_gateway_url")]
    pub url: String,
    #[serde(default = "default_session")]
    pub session: String,
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_send_timeout")]
    pub send_timeout_secs: u64,
    #[serde(default = "default_health_timeout")]
    pub health_timeout_secs: u64,
}

fn default_gateway_url() -> String {
    "http://localhost:3000".to_string()
}
fn default_session() -> String {
    "default".to_string()
}
fn default_fetch_timeout() -> u64 {
    10
}
fn default_send_timeout() -> u64 {
    15
}
fn default_health_timeout() -> u64 {
    10
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            url: default_gateway_url(),
            session: default_session(),
            fetch_timeout_secs: default_fetch_timeout(),
            send_timeout_secs: default_send_timeout(),
            health_timeout_secs: default_health_timeout(),
        }
    }
}

/// Source and destination channels
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ChannelsConfig {
    #[serde(default)]
    pub destination: String,
    #[serde(default)]
    pub sources: Vec<String>,
    /// Display names keyed by channel id, used in logs only
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

impl ChannelsConfig {
    pub fn label_for<'a>(&'a self, channel_id: &'a str) -> &'a str {
        self.labels
            .get(channel_id)
            .map(String::as_str)
            .unwrap_or(channel_id)
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AffiliateConfig {
    #[serde(default)]
    pub amazon_tag: String,
}

/// Polling cadence and backoff
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ForwarderConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_staleness")]
    pub staleness_secs: u64,
    #[serde(default = "default_channel_pause")]
    pub channel_pause_ms: u64,
    #[serde(default = "default_health_retry")]
    pub health_retry_secs: u64,
    #[serde(default = "default_daily_cap_sleep")]
    pub daily_cap_sleep_secs: u64,
    #[serde(default = "default_error_backoff")]
    pub error_backoff_secs: u64,
    #[serde(default = "default_startup_attempts")]
    pub startup_health_attempts: u32,
    #[serde(default = "default_startup_interval")]
    pub startup_health_interval_secs: u64,
}

fn default_poll_interval() -> u64 {
    30
}
fn default_batch_size() -> usize {
    6
}
fn default_staleness() -> u64 {
    300
}
fn default_channel_pause() -> u64 {
    500
}
fn default_health_retry() -> u64 {
    10
}
fn default_daily_cap_sleep() -> u64 {
    3600
}
fn default_error_backoff() -> u64 {
    30
}
fn default_startup_attempts() -> u32 {
    30
}
fn default_startup_interval() -> u64 {
    10
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            batch_size: default_batch_size(),
            staleness_secs: default_staleness(),
            channel_pause_ms: default_channel_pause(),
            health_retry_secs: default_health_retry(),
            daily_cap_sleep_secs: default_daily_cap_sleep(),
            error_backoff_secs: default_error_backoff(),
            startup_health_attempts: default_startup_attempts(),
            startup_health_interval_secs: default_startup_interval(),
        }
    }
}

impl ForwarderConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn staleness(&self) -> Duration {
        Duration::from_secs(self.staleness_secs)
    }
}

/// Outbound send limits
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LimitsConfig {
    #[serde(default = "default_min_send_delay")]
    pub min_send_delay_secs: u64,
    #[serde(default = "default_max_daily")]
    pub max_daily: u32,
    #[serde(default = "default_max_hourly")]
    pub max_hourly: u32,
    #[serde(default = "default_hourly_cooldown")]
    pub hourly_cooldown_secs: u64,
    #[serde(default = "default_jitter_min")]
    pub jitter_min_ms: u64,
    #[serde(default = "default_jitter_max")]
    pub jitter_max_ms: u64,
    /// Hourly send count past which the spacing grows
    #[serde(default = "default_near_ceiling_sends")]
    pub near_ceiling_sends: u32,
    #[serde(default = "default_near_ceiling_extra")]
    pub near_ceiling_extra_secs: u64,
    #[serde(default = "default_true")]
    pub human_pauses: bool,
    /// Fixed RNG seed; random when unset
    #[serde(default)]
    pub rng_seed: Option<u64>,
}

fn default_min_send_delay() -> u64 {
    8
}
fn default_max_daily() -> u32 {
    400
}
fn default_max_hourly() -> u32 {
    35
}
fn default_hourly_cooldown() -> u64 {
    900
}
fn default_jitter_min() -> u64 {
    1000
}
fn default_jitter_max() -> u64 {
    3000
}
fn default_near_ceiling_sends() -> u32 {
    30
}
fn default_near_ceiling_extra() -> u64 {
    2
}
fn default_true() -> bool {
    true
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            min_send_delay_secs: default_min_send_delay(),
            max_daily: default_max_daily(),
            max_hourly: default_max_hourly(),
            hourly_cooldown_secs: default_hourly_cooldown(),
            jitter_min_ms: default_jitter_min(),
            jitter_max_ms: default_jitter_max(),
            near_ceiling_sends: default_near_ceiling_sends(),
            near_ceiling_extra_secs: default_near_ceiling_extra(),
            human_pauses: true,
            rng_seed: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ParserConfig {
    /// Shopping domains accepted in addition to the built-in list
    #[serde(default)]
    pub extra_domains: Vec<String>,
    /// Offset used for time-of-day hashtags
    #[serde(default = "default_utc_offset")]
    pub utc_offset_minutes: i32,
}

fn default_utc_offset() -> i32 {
    330
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            extra_domains: Vec::new(),
            utc_offset_minutes: default_utc_offset(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DashboardConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    5000
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_port(),
        }
    }
}

/// Flat variable names used by existing deployments and their config keys
const LEGACY_ENV: &[(&str, &str)] = &[
    ("WAHA_URL", "gateway.url"),
    ("DESTINATION_CHANNEL", "channels.destination"),
    ("AMAZON_AFFILIATE_TAG", "affiliate.amazon_tag"),
    ("CHECK_INTERVAL", "forwarder.poll_interval_secs"),
    ("MESSAGE_LIMIT", "forwarder.batch_size"),
    ("STALENESS_SECS", "forwarder.staleness_secs"),
    ("MIN_TIME_BETWEEN_SENDS", "limits.min_send_delay_secs"),
    ("MAX_DAILY_MESSAGES", "limits.max_daily"),
    ("MAX_HOURLY_MESSAGES", "limits.max_hourly"),
    ("PORT", "dashboard.port"),
];

impl Config {
    /// Load from `path` (optional) and the environment, then validate.
    pub fn load(path: &str) -> Result<Self> {
        let config = Self::load_unchecked(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Load without validation, for commands that need only part of it.
    pub fn load_unchecked(path: &str) -> Result<Self> {
        dotenvy::dotenv().ok();
        let expanded = shellexpand::tilde(path).into_owned();
        Self::load_with(&expanded, |key| std::env::var(key).ok())
    }

    /// Build without validation, reading legacy variables through `lookup`.
    pub fn load_with<F>(path: &str, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = config::Config::builder()
            .add_source(
                config::File::new(path, config::FileFormat::Toml).required(false),
            )
            .add_source(
                config::Environment::with_prefix("FORWARDER")
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("channels.sources")
                    .with_list_parse_key("parser.extra_domains")
                    .try_parsing(true),
            );

        for (var, key) in LEGACY_ENV {
            builder = builder.set_override_option(*key, lookup(var))?;
        }

        let sources = lookup("SOURCE_CHANNELS").map(|raw| split_list(&raw));
        builder = builder.set_override_option("channels.sources", sources)?;

        Ok(builder.build()?.try_deserialize()?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.channels.destination.trim().is_empty() {
            return Err(BotError::InvalidConfig(
                "channels.destination must be set".into(),
            ));
        }
        if self.channels.sources.is_empty() {
            return Err(BotError::InvalidConfig(
                "channels.sources must list at least one channel".into(),
            ));
        }
        if self.affiliate.amazon_tag.trim().is_empty() {
            return Err(BotError::InvalidConfig(
                "affiliate.amazon_tag must be set".into(),
            ));
        }
        if self.limits.max_daily == 0 || self.limits.max_hourly == 0 {
            return Err(BotError::InvalidConfig(
                "limits.max_daily and limits.max_hourly must be positive".into(),
            ));
        }
        if self.limits.jitter_min_ms > self.limits.jitter_max_ms {
            return Err(BotError::InvalidConfig(format!(
                "limits.jitter_min_ms ({}) exceeds limits.jitter_max_ms ({})",
                self.limits.jitter_min_ms, self.limits.jitter_max_ms
            )));
        }
        if self.forwarder.batch_size == 0 {
            return Err(BotError::InvalidConfig(
                "forwarder.batch_size must be positive".into(),
            ));
        }
        Ok(())
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
