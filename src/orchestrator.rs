//! Forwarding loop
//!
//! Owns the dedup index and the cursors and drives one pass over every
//! source channel per tick, at a fixed cadence, forever.

use crate::client::Transport;
use crate::config::{ChannelsConfig, Config, ForwarderConfig};
use crate::dedup::DedupIndex;
use crate::error::Result;
use crate::governor::RateGovernor;
use crate::ingester::DealParser;
use crate::monitor::ForwarderStats;
use crate::poller::{ChannelPoller, CursorBook, PollOutcome};
use chrono::{FixedOffset, Offset, Timelike, Utc};
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Checks between safety-status log lines
const STATUS_EVERY: u64 = 5;

/// What a tick did, which decides how long to sleep before the next one
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    GatewayDown,
    DailyCapReached,
    Polled(PollOutcome),
}

pub struct Orchestrator {
    transport: Arc<dyn Transport>,
    poller: ChannelPoller,
    governor: Arc<RateGovernor>,
    stats: Arc<ForwarderStats>,
    channels: ChannelsConfig,
    settings: ForwarderConfig,
    offset: FixedOffset,
    dedup: DedupIndex,
    cursors: CursorBook,
}

impl Orchestrator {
    /// Cursors start at now for every source: only new messages are forwarded.
    pub fn new(
        config: &Config,
        transport: Arc<dyn Transport>,
        parser: Arc<DealParser>,
        governor: Arc<RateGovernor>,
        stats: Arc<ForwarderStats>,
    ) -> Self {
        let poller = ChannelPoller::new(
            transport.clone(),
            parser,
            governor.clone(),
            stats.clone(),
            config.channels.destination.clone(),
            config.forwarder.batch_size,
            config.forwarder.staleness(),
        );
        let offset = FixedOffset::east_opt(config.parser.utc_offset_minutes * 60)
            .unwrap_or_else(|| Utc.fix());

        Self {
            transport,
            poller,
            governor,
            stats,
            channels: config.channels.clone(),
            settings: config.forwarder.clone(),
            offset,
            dedup: DedupIndex::new(),
            cursors: CursorBook::starting_at(config.channels.sources.iter().cloned(), Utc::now()),
        }
    }

    pub fn dedup(&self) -> &DedupIndex {
        &self.dedup
    }

    pub fn cursors(&self) -> &CursorBook {
        &self.cursors
    }

    /// Probe the gateway until it answers or the attempts run out.
    /// Returns whether it came up; the caller starts either way.
    pub async fn wait_for_gateway(&self) -> bool {
        let attempts = self.settings.startup_health_attempts;
        let interval = Duration::from_secs(self.settings.startup_health_interval_secs);

        for attempt in 1..=attempts {
            let healthy = self.transport.health_check().await;
            self.stats.record_health(healthy);
            if healthy {
                info!(attempt, "Gateway is up");
                return true;
            }
            warn!(attempt, attempts, "Gateway not ready, retrying");
            if attempt < attempts {
                tokio::time::sleep(interval).await;
            }
        }
        warn!("Gateway still down after startup checks, continuing");
        false
    }

    /// One pass over all channels
    pub async fn tick(&mut self) -> Result<TickOutcome> {
        let check = self.stats.record_check();
        if check % STATUS_EVERY == 0 {
            self.log_safety_status(check);
        }

        let healthy = self.transport.health_check().await;
        self.stats.record_health(healthy);
        if !healthy {
            warn!("Gateway unhealthy, skipping check");
            return Ok(TickOutcome::GatewayDown);
        }

        if self.governor.daily_cap_reached().await {
            info!(
                max_daily = self.governor.limits().max_daily,
                "Daily cap reached, pausing"
            );
            return Ok(TickOutcome::DailyCapReached);
        }

        let pause = Duration::from_millis(self.settings.channel_pause_ms);
        let mut total = PollOutcome::default();

        for (i, channel) in self.channels.sources.iter().enumerate() {
            if i > 0 && !pause.is_zero() {
                tokio::time::sleep(pause).await;
            }
            let label = self.channels.label_for(channel);

            match self
                .poller
                .poll_channel(channel, &mut self.dedup, &mut self.cursors)
                .await
            {
                Ok(outcome) => {
                    if outcome.forwarded > 0 {
                        info!(channel = %label, forwarded = outcome.forwarded, "Channel done");
                    }
                    accumulate(&mut total, &outcome);
                }
                Err(e) if e.is_transient() => {
                    self.stats.record_error();
                    warn!(channel = %label, error = %e, "Channel poll failed");
                }
                Err(e) => return Err(e),
            }
        }

        Ok(TickOutcome::Polled(total))
    }

    /// Run one tick with panic isolation and return how long to sleep after it
    pub async fn step(&mut self) -> Duration {
        match AssertUnwindSafe(self.tick()).catch_unwind().await {
            Ok(Ok(TickOutcome::GatewayDown)) => Duration::from_secs(self.settings.health_retry_secs),
            Ok(Ok(TickOutcome::DailyCapReached)) => {
                Duration::from_secs(self.settings.daily_cap_sleep_secs)
            }
            Ok(Ok(TickOutcome::Polled(_))) => self.settings.poll_interval(),
            Ok(Err(e)) => {
                self.stats.record_error();
                error!(error = %e, "Forwarding loop error");
                Duration::from_secs(self.settings.error_backoff_secs)
            }
            Err(_) => {
                self.stats.record_error();
                error!("Forwarding loop panicked");
                Duration::from_secs(self.settings.error_backoff_secs)
            }
        }
    }

    /// Forward forever
    pub async fn run(mut self) {
        info!(
            sources = self.channels.sources.len(),
            destination = %self.channels.destination,
            interval_secs = self.settings.poll_interval_secs,
            "Forwarder starting"
        );
        self.wait_for_gateway().await;

        loop {
            let pause = self.step().await;
            tokio::time::sleep(pause).await;
        }
    }

    fn log_safety_status(&self, check: u64) {
        let rate = self.governor.snapshot();
        let stats = self.stats.snapshot();
        info!(
            check,
            daily = rate.daily_count,
            max_daily = rate.max_daily,
            hourly = rate.hourly_count,
            max_hourly = rate.max_hourly,
            forwarded = stats.forwarded,
            duplicates = stats.duplicates,
            missed = stats.missed,
            seen_deals = self.dedup.len(),
            "Safety status"
        );

        let hour = Utc::now().with_timezone(&self.offset).hour();
        if (1..6).contains(&hour) {
            info!(hour, "Night hours, channel activity is usually low");
        }
    }
}

fn accumulate(total: &mut PollOutcome, outcome: &PollOutcome) {
    total.fetched += outcome.fetched;
    total.seen += outcome.seen;
    total.skipped += outcome.skipped;
    total.missed += outcome.missed;
    total.filtered += outcome.filtered;
    total.duplicates += outcome.duplicates;
    total.forwarded += outcome.forwarded;
    total.send_failures += outcome.send_failures;
    total.capped += outcome.capped;
}
