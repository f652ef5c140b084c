//! Per-channel polling
//!
//! One pass over a source channel: fetch, filter against the cursor, parse,
//! dedup, gate, send, then move the cursor past everything fetched.


use crate::client::Transport;
use crate::dedup::DedupIndex;
use crate::error::{BotError, Result};
use crate::governor::RateGovernor;
use crate::ingester::DealParser;
use crate::monitor::ForwarderStats;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Last-seen timestamp per channel. Never moves backwards.
#[derive(Debug, Clone, Default)]
pub struct CursorBook {
    cursors: HashMap<String, DateTime<Utc>>,
}

impl CursorBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every channel starts at `now`, so only messages after startup are forwarded
    pub fn starting_at<I, S>(channels: I, now: DateTime<Utc>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            cursors: channels.into_iter().map(|c| (c.into(), now)).collect(),
        }
    }

    pub fn get(&self, channel_id: &str) -> Option<DateTime<Utc>> {
        self.cursors.get(channel_id).copied()
    }

    pub fn advance(&mut self, channel_id: &str, to: DateTime<Utc>) -> Result<()> {
        match self.cursors.get_mut(channel_id) {
            Some(current) if to < *current => Err(BotError::CursorRegression {
                channel: channel_id.to_string(),
                current: *current,
                proposed: to,
            }),
            Some(current) => {
                *current = to;
                Ok(())
            }
            None => {
                self.cursors.insert(channel_id.to_string(), to);
                Ok(())
            }
        }
    }

    pub fn len(&self) -> usize {
        self.cursors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cursors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, DateTime<Utc>)> {
        self.cursors.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

/// What one channel pass did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PollOutcome {
    pub fetched: usize,
    /// At or before the cursor
    pub seen: usize,
    /// Own or empty messages
    pub skipped: usize,
    pub missed: usize,
    pub filtered: usize,
    pub duplicates: usize,
    pub forwarded: usize,
    pub send_failures: usize,
    /// Left unsent because the daily cap was reached
    pub capped: usize,
}

/// Runs the per-channel pipeline against shared collaborators
pub struct ChannelPoller {
    transport: Arc<dyn Transport>,
    parser: Arc<DealParser>,
    governor: Arc<RateGovernor>,
    stats: Arc<ForwarderStats>,
    destination: String,
    batch_size: usize,
    staleness: Duration,
}

impl ChannelPoller {
    pub fn new(
        transport: Arc<dyn Transport>,
        parser: Arc<DealParser>,
        governor: Arc<RateGovernor>,
        stats: Arc<ForwarderStats>,
        destination: impl Into<String>,
        batch_size: usize,
        staleness: Duration,
    ) -> Self {
        Self {
            transport,
            parser,
            governor,
            stats,
            destination: destination.into(),
            batch_size,
            staleness,
        }
    }

    /// Poll one channel. A fetch failure leaves the cursor untouched.
    pub async fn poll_channel(
        &self,
        channel_id: &str,
        dedup: &mut DedupIndex,
        cursors: &mut CursorBook,
    ) -> Result<PollOutcome> {
        let mut messages = self
            .transport
            .fetch_recent(channel_id, self.batch_size)
            .await?;
        messages.sort_by_key(|m| m.timestamp);

        let mut outcome = PollOutcome {
            fetched: messages.len(),
            ..PollOutcome::default()
        };
        let cursor = cursors.get(channel_id);
        let mut capped = false;

        for msg in &messages {
            if cursor.is_some_and(|c| msg.timestamp <= c) {
                outcome.seen += 1;
                continue;
            }
            if msg.from_self || msg.body.trim().is_empty() {
                outcome.skipped += 1;
                continue;
            }
            if self.is_stale(msg.timestamp) {
                debug!(channel = %channel_id, "Stale message");
                outcome.missed += 1;
                self.stats.record_missed();
                continue;
            }

            let deal = match self.parser.parse(&msg.body) {
                Ok(deal) => deal,
                Err(reason) => {
                    debug!(channel = %channel_id, reason = reason.as_str(), "Message filtered");
                    outcome.filtered += 1;
                    self.stats.record_rejection(reason);
                    continue;
                }
            };

            if dedup.is_duplicate(&deal) {
                debug!(channel = %channel_id, url = %deal.url, "Duplicate deal");
                outcome.duplicates += 1;
                self.stats.record_duplicate();
                continue;
            }

            if capped {
                outcome.capped += 1;
                continue;
            }
            let Some(permit) = self.governor.acquire().await else {
                capped = true;
                outcome.capped += 1;
                continue;
            };
            // acquire may have waited for spacing or the hourly ceiling
            if self.is_stale(msg.timestamp) {
                drop(permit);
                debug!(channel = %channel_id, url = %deal.url, "Deal went stale while waiting to send");
                outcome.missed += 1;
                self.stats.record_missed();
                continue;
            }

            match self.transport.send(&self.destination, &deal.rendered_text).await {
                Ok(()) => {
                    permit.commit();
                    dedup.commit(&deal);
                    outcome.forwarded += 1;
                    self.stats.record_forwarded();
                    info!(
                        channel = %channel_id,
                        platform = %deal.platform,
                        product = %deal.product_name,
                        "Forwarded deal"
                    );
                }
                Err(e) => {
                    drop(permit);
                    warn!(channel = %channel_id, error = %e, "Send failed");
                    outcome.send_failures += 1;
                    self.stats.record_send_failure();
                }
            }
        }

        if let Some(newest) = messages.iter().map(|m| m.timestamp).max() {
            let target = cursor.map_or(newest, |c| c.max(newest));
            cursors.advance(channel_id, target)?;
        }

        Ok(outcome)
    }

    /// Older than the staleness window, measured against the current time
    fn is_stale(&self, timestamp: DateTime<Utc>) -> bool {
        let age = (Utc::now() - timestamp).to_std().unwrap_or_default();
        age > self.staleness
    }
}
