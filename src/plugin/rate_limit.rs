//! Remote-quota tracking.
//!
//! One `RateLimiter` instance is owned by the catalog and threaded through
//! every call site that can read authoritative quota headers. There is no
//! global state; updates are last-writer-wins.

use std::time::SystemTime;

use async_trait::async_trait;

use crate::plugin::error::PluginResult;

/// One authoritative reading of the remote quota.
#[derive(Debug, Clone, Copy)]
pub struct QuotaSample {
    pub remaining: i64,
    pub reset_at: SystemTime,
}

/// Seam to the authoritative quota endpoint.
#[async_trait]
pub trait QuotaProbe: Send + Sync {
    async fn fetch_quota(&self) -> PluginResult<QuotaSample>;
}

/// Decisions allowed on a locally-held sample before the next one must come
/// from the quota endpoint. The fourth decision after a sample goes back to
/// the source.
const STALE_DECISION_LIMIT: u32 = 3;

#[derive(Debug, Default)]
pub struct RateLimiter {
    remaining: Option<i64>,
    reset_at: Option<SystemTime>,
    stale_calls: u32,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the tracked quota with a fresh authoritative sample.
    ///
    /// Called by any component that just made an authoritative call and can
    /// read its response headers. Never merges: latest sample wins.
    pub fn apply_sample(&mut self, remaining: i64, reset_at: SystemTime) {
        self.remaining = Some(remaining);
        self.reset_at = Some(reset_at);
        self.stale_calls = 0;
    }

    /// Decide whether remote calls are currently blocked by the quota.
    ///
    /// Refreshes from `probe` when no reset time is known or when too many
    /// decisions have been made on a stale sample. A refresh failure is
    /// logged and the decision proceeds on whatever is held locally.
    pub async fn is_blocked(&mut self, probe: &dyn QuotaProbe) -> bool {
        if self.reset_at.is_none() || self.stale_calls >= STALE_DECISION_LIMIT {
            self.refresh(probe).await;
        }

        if let Some(reset_at) = self.reset_at {
            if reset_at <= SystemTime::now() {
                // The window rolled over; the old sample means nothing now.
                self.remaining = None;
                self.reset_at = None;
                self.stale_calls = 0;
                return false;
            }
        }

        if matches!(self.remaining, Some(remaining) if remaining <= 0) {
            return true;
        }

        self.stale_calls += 1;
        false
    }

    async fn refresh(&mut self, probe: &dyn QuotaProbe) {
        match probe.fetch_quota().await {
            Ok(sample) => self.apply_sample(sample.remaining, sample.reset_at),
            Err(err) => {
                tracing::warn!("quota refresh failed, deciding on stale data: {err}");
            }
        }
    }
}
