use async_trait::async_trait;
use serde_json::Value;

use crate::error::ProxyError;
use crate::stats::{DataKind, DateWindow};

/// Trait that every statistics source must implement.
#[async_trait]
pub trait StatsProvider: Send + Sync {
    /// Perform one upstream request and return the raw JSON payload.
    ///
    /// Implementations must fail with [`ProxyError::Upstream`] on timeout or
    /// non-success status and must never return partial data.
    async fn fetch(
        &self,
        kind: DataKind,
        league_id: &str,
        season: &str,
        window: &DateWindow,
    ) -> Result<Value, ProxyError>;

    /// Human-readable name for logging.
    fn name(&self) -> &str;
}
