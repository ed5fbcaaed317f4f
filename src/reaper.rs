//! Expiry reaper
//!
//! Periodically returns PENDING leases that never received a deposit to the
//! pool. PROCESSING records are mid-sweep and are never touched.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::common::config::ReaperConfig;
use crate::common::error::Result;
use crate::storage::WalletStore;
use crate::types::wallet::now_millis;

/// Reclaims stale leases
#[derive(Clone)]
pub struct ExpiryReaper {
    store: Arc<dyn WalletStore>,
    config: ReaperConfig,
}

impl ExpiryReaper {
    pub fn new(store: Arc<dyn WalletStore>, config: ReaperConfig) -> Self {
        Self { store, config }
    }

    /// Release every lease that went stale before `now`. Returns the count.
    pub async fn run_once_at(&self, now: i64) -> Result<u64> {
        let timeout_ms = i64::try_from(self.config.lease_timeout.as_millis()).unwrap_or(i64::MAX);
        let cutoff = now.saturating_sub(timeout_ms);

        let released = self.store.release_expired(cutoff).await?;
        if released > 0 {
            info!(released, "Released expired leases");
        }
        Ok(released)
    }

    pub async fn run_once(&self) -> Result<u64> {
        self.run_once_at(now_millis()).await
    }

    /// Run until `shutdown` is cancelled. Errors from a pass are logged and
    /// the next pass runs on schedule.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            timeout_secs = self.config.lease_timeout.as_secs(),
            "Expiry reaper started"
        );

        loop {
            if let Err(e) = self.run_once().await {
                error!(error = %e, "Expiry pass failed");
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.config.interval) => {}
            }
        }

        info!("Expiry reaper stopped");
    }
}
