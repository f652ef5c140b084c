//! Outbound rate governor
//!
//! Every send passes through [`RateGovernor::acquire`]. The governor keeps
//! fixed daily and hourly windows plus a 24h send history, so neither the
//! counters nor any trailing hour or day can exceed the configured caps.

#[cfg(test)]
mod tests;

use crate::config::LimitsConfig;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::Instant;
use tracing::{debug, info, warn};

const HOUR: Duration = Duration::from_secs(3600);
const DAY: Duration = Duration::from_secs(24 * 3600);

/// Sends per hour past which human pauses become less likely
const BUSY_HOUR_SENDS: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitReason {
    Spacing,
    HourlyCeiling,
}

/// Decision for the next outbound send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allow,
    Wait { delay: Duration, reason: WaitReason },
    Deny { retry_after: Duration },
}

/// Counters and history behind the governor lock
#[derive(Debug)]
pub struct RateState {
    pub daily_count: u32,
    pub hourly_count: u32,
    pub daily_window_start: Instant,
    pub hourly_window_start: Instant,
    pub last_send: Option<Instant>,
    /// Spacing required after `last_send`, drawn when the send was recorded
    next_spacing: Duration,
    /// Set while an hourly cooldown is running; the hourly window resets when it passes
    cooldown_until: Option<Instant>,
    history: VecDeque<Instant>,
    total_sent: u64,
    rng: StdRng,
}

impl RateState {
    pub fn new(now: Instant, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            daily_count: 0,
            hourly_count: 0,
            daily_window_start: now,
            hourly_window_start: now,
            last_send: None,
            next_spacing: Duration::ZERO,
            cooldown_until: None,
            history: VecDeque::new(),
            total_sent: 0,
            rng,
        }
    }

    fn roll_windows(&mut self, now: Instant) {
        if now.duration_since(self.daily_window_start) >= DAY {
            self.daily_count = 0;
            self.daily_window_start = now;
        }
        if now.duration_since(self.hourly_window_start) >= HOUR {
            self.hourly_count = 0;
            self.hourly_window_start = now;
        }
        if let Some(until) = self.cooldown_until {
            if now >= until {
                debug!("Hourly cooldown over, resetting hourly window");
                self.hourly_count = 0;
                self.hourly_window_start = now;
                self.cooldown_until = None;
            }
        }
        while self
            .history
            .front()
            .is_some_and(|t| now.duration_since(*t) >= DAY)
        {
            self.history.pop_front();
        }
    }

    fn sends_within(&self, now: Instant, span: Duration) -> usize {
        self.history
            .iter()
            .rev()
            .take_while(|t| now.duration_since(**t) < span)
            .count()
    }

    /// Time until the oldest send inside `span` ages out of it
    fn until_slot_frees(&self, now: Instant, span: Duration, cap: u32) -> Duration {
        let in_span = self.sends_within(now, span);
        if in_span < cap as usize {
            return Duration::ZERO;
        }
        // the send that has to age out for the count to drop below the cap
        let idx = self.history.len() - cap as usize;
        (self.history[idx] + span).saturating_duration_since(now)
    }

    pub fn daily_exhausted(&self, now: Instant, limits: &LimitsConfig) -> bool {
        self.daily_count >= limits.max_daily
            || self.sends_within(now, DAY) >= limits.max_daily as usize
    }

    /// Evaluate the next send at `now`. Rolls windows first.
    pub fn admit(&mut self, now: Instant, limits: &LimitsConfig) -> Admission {
        self.roll_windows(now);

        if self.daily_exhausted(now, limits) {
            let window_left = if self.daily_count >= limits.max_daily {
                (self.daily_window_start + DAY).saturating_duration_since(now)
            } else {
                Duration::ZERO
            };
            let retry_after = window_left.max(self.until_slot_frees(now, DAY, limits.max_daily));
            return Admission::Deny { retry_after };
        }

        if let Some(until) = self.cooldown_until {
            return Admission::Wait {
                delay: until.saturating_duration_since(now),
                reason: WaitReason::HourlyCeiling,
            };
        }

        if self.hourly_count >= limits.max_hourly
            || self.sends_within(now, HOUR) >= limits.max_hourly as usize
        {
            let cooldown = Duration::from_secs(limits.hourly_cooldown_secs);
            let delay = cooldown.max(self.until_slot_frees(now, HOUR, limits.max_hourly));
            self.cooldown_until = Some(now + delay);
            return Admission::Wait {
                delay,
                reason: WaitReason::HourlyCeiling,
            };
        }

        if let Some(last) = self.last_send {
            let elapsed = now.duration_since(last);
            if elapsed < self.next_spacing {
                return Admission::Wait {
                    delay: self.next_spacing - elapsed,
                    reason: WaitReason::Spacing,
                };
            }
        }

        Admission::Allow
    }

    /// Record a successful send at `now` and draw the spacing for the next one
    pub fn record_send(&mut self, now: Instant, limits: &LimitsConfig) {
        self.daily_count += 1;
        self.hourly_count += 1;
        self.total_sent += 1;
        self.last_send = Some(now);
        self.history.push_back(now);
        self.next_spacing = self.draw_spacing(limits);
    }

    fn draw_spacing(&mut self, limits: &LimitsConfig) -> Duration {
        let mut spacing = Duration::from_secs(limits.min_send_delay_secs);

        if self.hourly_count > limits.near_ceiling_sends {
            spacing += Duration::from_secs(limits.near_ceiling_extra_secs);
        }

        let jitter = self
            .rng
            .random_range(limits.jitter_min_ms..=limits.jitter_max_ms);
        spacing += Duration::from_millis(jitter);

        if limits.human_pauses {
            let chance = if self.hourly_count > BUSY_HOUR_SENDS { 0.2 } else { 0.3 };
            if self.rng.random_bool(chance) {
                spacing += Duration::from_millis(self.rng.random_range(500..=1500));
            }
        }
        spacing
    }

    fn snapshot(&self, limits: &LimitsConfig, last_send_at: Option<DateTime<Utc>>) -> RateSnapshot {
        RateSnapshot {
            daily_count: self.daily_count,
            hourly_count: self.hourly_count,
            max_daily: limits.max_daily,
            max_hourly: limits.max_hourly,
            daily_remaining: limits.max_daily.saturating_sub(self.daily_count),
            hourly_remaining: limits.max_hourly.saturating_sub(self.hourly_count),
            total_sent: self.total_sent,
            last_send_at,
            cooling_down: self.cooldown_until.is_some(),
        }
    }
}

/// Lock-free view of the governor for the status server
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RateSnapshot {
    pub daily_count: u32,
    pub hourly_count: u32,
    pub max_daily: u32,
    pub max_hourly: u32,
    pub daily_remaining: u32,
    pub hourly_remaining: u32,
    pub total_sent: u64,
    pub last_send_at: Option<DateTime<Utc>>,
    pub cooling_down: bool,
}

/// Process-wide send gate
pub struct RateGovernor {
    limits: LimitsConfig,
    state: Mutex<RateState>,
    published: RwLock<RateSnapshot>,
}

impl RateGovernor {
    pub fn new(limits: LimitsConfig) -> Self {
        let state = RateState::new(Instant::now(), limits.rng_seed);
        let published = RwLock::new(state.snapshot(&limits, None));
        Self {
            limits,
            state: Mutex::new(state),
            published,
        }
    }

    pub fn limits(&self) -> &LimitsConfig {
        &self.limits
    }

    /// Decision for a send right now, without waiting
    pub async fn admit(&self) -> Admission {
        let mut state = self.state.lock().await;
        let decision = state.admit(Instant::now(), &self.limits);
        self.publish(&state);
        decision
    }

    pub async fn daily_cap_reached(&self) -> bool {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        state.roll_windows(now);
        self.publish(&state);
        state.daily_exhausted(now, &self.limits)
    }

    /// Wait until a send is allowed and return a permit, or `None` when the
    /// daily cap is reached. The lock is held until the permit is dropped,
    /// so only one send is in flight.
    pub async fn acquire(&self) -> Option<SendPermit<'_>> {
        let mut state = self.state.lock().await;
        loop {
            match state.admit(Instant::now(), &self.limits) {
                Admission::Allow => {
                    return Some(SendPermit {
                        governor: self,
                        state,
                    })
                }
                Admission::Wait { delay, reason } => {
                    self.publish(&state);
                    match reason {
                        WaitReason::HourlyCeiling => warn!(
                            hourly = state.hourly_count,
                            max_hourly = self.limits.max_hourly,
                            wait_secs = delay.as_secs(),
                            "Hourly ceiling reached, cooling down"
                        ),
                        WaitReason::Spacing => debug!(
                            wait_ms = delay.as_millis() as u64,
                            "Spacing before next send"
                        ),
                    }
                    tokio::time::sleep(delay).await;
                }
                Admission::Deny { retry_after } => {
                    self.publish(&state);
                    info!(
                        daily = state.daily_count,
                        max_daily = self.limits.max_daily,
                        retry_after_secs = retry_after.as_secs(),
                        "Daily cap reached"
                    );
                    return None;
                }
            }
        }
    }

    pub fn snapshot(&self) -> RateSnapshot {
        self.published.read().clone()
    }

    fn publish(&self, state: &RateState) {
        let last_send_at = self.published.read().last_send_at;
        *self.published.write() = state.snapshot(&self.limits, last_send_at);
    }
}

/// Exclusive right to perform one send. Dropping it without
/// [`SendPermit::commit`] records nothing.
pub struct SendPermit<'a> {
    governor: &'a RateGovernor,
    state: MutexGuard<'a, RateState>,
}

impl SendPermit<'_> {
    pub fn commit(mut self) {
        self.state.record_send(Instant::now(), &self.governor.limits);
        let snapshot = self.state.snapshot(&self.governor.limits, Some(Utc::now()));
        *self.governor.published.write() = snapshot;
        debug!(
            daily = self.state.daily_count,
            hourly = self.state.hourly_count,
            "Send recorded"
        );
    }
}
