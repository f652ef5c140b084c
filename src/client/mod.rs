//! Gateway clients
//!
//! The forwarding engine talks to the messaging platform only through
//! [`Transport`], so tests can swap in a mock.

pub mod waha;

pub use waha::WahaClient;

use crate::error::Result;
use crate::types::RawMessage;
use async_trait::async_trait;

/// Fetch, send and health probe against the messaging gateway.
///
/// Implementations do not retry; a failed call is reported and the
/// caller moves on.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Most recent messages of `channel_id`, at most `limit`, in any order
    async fn fetch_recent(&self, channel_id: &str, limit: usize) -> Result<Vec<RawMessage>>;

    /// Post `text` to `destination`
    async fn send(&self, destination: &str, text: &str) -> Result<()>;

    /// Whether the gateway session is up
    async fn health_check(&self) -> bool;
}
