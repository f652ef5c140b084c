//! Deal Channel Forwarder
//!
//! Polls WhatsApp deal channels through a WAHA gateway, rewrites each deal
//! with an affiliate tag and reposts it once to a destination channel,
//! within the platform's sending limits.
//!
//! ## Architecture
//!
//! ```text
//! Orchestrator → Poller → Transport (fetch) → Parser → Dedup (check)
//!                                                         ↓
//!                          Dedup (commit) ← Transport (send) ← Governor
//! ```

pub mod client;
pub mod config;
pub mod dedup;
pub mod error;
pub mod governor;
pub mod ingester;
pub mod monitor;
pub mod orchestrator;
pub mod poller;
pub mod types;

#[cfg(test)]
mod config_tests;
