//! Status API
//!
//! JSON endpoints for uptime probes and operators. Handlers only read
//! atomics and the governor's published snapshot.

use super::ForwarderStats;
use crate::config::Config;
use crate::governor::RateGovernor;
use axum::{extract::State, response::Json, routing::get, Router};
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

/// State shared across handlers
pub struct DashboardState {
    pub stats: Arc<ForwarderStats>,
    pub governor: Arc<RateGovernor>,
    pub settings: DashboardSettings,
}

/// Configuration echoed on `/stats`
#[derive(Debug, Clone, Serialize)]
pub struct DashboardSettings {
    pub source_channels: usize,
    pub destination: String,
    pub poll_interval_secs: u64,
    pub min_send_delay_secs: u64,
    pub batch_size: usize,
    pub staleness_secs: u64,
}

impl DashboardSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            source_channels: config.channels.sources.len(),
            destination: config.channels.destination.clone(),
            poll_interval_secs: config.forwarder.poll_interval_secs,
            min_send_delay_secs: config.limits.min_send_delay_secs,
            batch_size: config.forwarder.batch_size,
            staleness_secs: config.forwarder.staleness_secs,
        }
    }
}

/// Liveness plus the headline counters
async fn health(State(state): State<Arc<DashboardState>>) -> Json<Value> {
    let stats = state.stats.snapshot();
    let rate = state.governor.snapshot();
    Json(json!({
        "status": "running",
        "gateway_healthy": stats.gateway_healthy,
        "last_health_check": stats.last_health_check,
        "forwarded_today": rate.daily_count,
        "total_forwarded": stats.forwarded,
        "uptime_secs": stats.uptime_secs,
        "uptime": stats.uptime_human(),
        "checks": stats.checks,
    }))
}

async fn ping() -> Json<Value> {
    Json(json!({
        "status": "pong",
        "timestamp": Utc::now(),
    }))
}

async fn stats(State(state): State<Arc<DashboardState>>) -> Json<Value> {
    let stats = state.stats.snapshot();
    let rate = state.governor.snapshot();
    Json(json!({
        "limits": {
            "daily_sent": rate.daily_count,
            "daily_max": rate.max_daily,
            "daily_remaining": rate.daily_remaining,
            "hourly_sent": rate.hourly_count,
            "hourly_max": rate.max_hourly,
            "hourly_remaining": rate.hourly_remaining,
            "cooling_down": rate.cooling_down,
            "last_send_at": rate.last_send_at,
        },
        "performance": {
            "total_forwarded": stats.forwarded,
            "duplicates": stats.duplicates,
            "filtered": stats.filtered,
            "rejections": stats.rejections,
            "missed": stats.missed,
            "send_failures": stats.send_failures,
            "errors": stats.errors,
            "checks": stats.checks,
            "uptime_secs": stats.uptime_secs,
        },
        "config": state.settings,
    }))
}

/// Create status router
pub fn create_router(state: Arc<DashboardState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ping", get(ping))
        .route("/stats", get(stats))
        .with_state(state)
}

/// Serve the status API until the process exits
pub async fn start_dashboard(
    state: Arc<DashboardState>,
    port: u16,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let app = create_router(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Status server starting on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
