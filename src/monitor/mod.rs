//! Runtime counters and the status server

pub mod dashboard;

pub use dashboard::{create_router, start_dashboard, DashboardState};

use crate::ingester::RejectReason;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::time::Instant;

/// Counters written by the forwarding engine and read by the status server.
///
/// Everything is atomic so the server never waits on the engine.
pub struct ForwarderStats {
    started_at: DateTime<Utc>,
    started: Instant,
    forwarded: AtomicU64,
    duplicates: AtomicU64,
    missed: AtomicU64,
    send_failures: AtomicU64,
    errors: AtomicU64,
    checks: AtomicU64,
    rejections: [AtomicU64; RejectReason::ALL.len()],
    gateway_healthy: AtomicBool,
    /// Unix seconds of the last health probe, 0 when never probed
    last_health_check: AtomicI64,
}

impl Default for ForwarderStats {
    fn default() -> Self {
        Self::new()
    }
}

impl ForwarderStats {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            started: Instant::now(),
            forwarded: AtomicU64::new(0),
            duplicates: AtomicU64::new(0),
            missed: AtomicU64::new(0),
            send_failures: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            checks: AtomicU64::new(0),
            rejections: Default::default(),
            gateway_healthy: AtomicBool::new(false),
            last_health_check: AtomicI64::new(0),
        }
    }

    pub fn record_forwarded(&self) {
        self.forwarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_duplicate(&self) {
        self.duplicates.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_missed(&self) {
        self.missed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejection(&self, reason: RejectReason) {
        self.rejections[reason.index()].fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_send_failure(&self) {
        self.send_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a check and return the new total
    pub fn record_check(&self) -> u64 {
        self.checks.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn record_health(&self, healthy: bool) {
        self.gateway_healthy.store(healthy, Ordering::Relaxed);
        self.last_health_check
            .store(Utc::now().timestamp(), Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let rejections: BTreeMap<&'static str, u64> = RejectReason::ALL
            .iter()
            .map(|r| (r.as_str(), self.rejections[r.index()].load(Ordering::Relaxed)))
            .collect();
        let last_health = self.last_health_check.load(Ordering::Relaxed);

        StatsSnapshot {
            started_at: self.started_at,
            uptime_secs: self.started.elapsed().as_secs(),
            forwarded: self.forwarded.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            filtered: rejections.values().sum(),
            rejections,
            missed: self.missed.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            checks: self.checks.load(Ordering::Relaxed),
            gateway_healthy: self.gateway_healthy.load(Ordering::Relaxed),
            last_health_check: (last_health > 0)
                .then(|| DateTime::from_timestamp(last_health, 0))
                .flatten(),
        }
    }
}

/// Point-in-time copy of [`ForwarderStats`]
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub started_at: DateTime<Utc>,
    pub uptime_secs: u64,
    pub forwarded: u64,
    pub duplicates: u64,
    pub filtered: u64,
    pub rejections: BTreeMap<&'static str, u64>,
    pub missed: u64,
    pub send_failures: u64,
    pub errors: u64,
    pub checks: u64,
    pub gateway_healthy: bool,
    pub last_health_check: Option<DateTime<Utc>>,
}

impl StatsSnapshot {
    /// `1h 2m 3s` style uptime
    pub fn uptime_human(&self) -> String {
        let s = self.uptime_secs;
        format!("{}h {}m {}s", s / 3600, (s % 3600) / 60, s % 60)
    }
}
