//! Sweep fee estimation
//!
//! The cost of a sweep is the bandwidth price reported by the chain times a
//! fixed transaction size. Estimation never fails: any provider error yields
//! the configured fallback.

use std::sync::Arc;
use tracing::warn;

use crate::common::config::FeeConfig;
use crate::ledger::LedgerProvider;

/// Derives the cost of a sweep transaction from chain parameters
#[derive(Clone)]
pub struct FeeEstimator {
    ledger: Arc<dyn LedgerProvider>,
    config: FeeConfig,
}

impl FeeEstimator {
    pub fn new(ledger: Arc<dyn LedgerProvider>, config: FeeConfig) -> Self {
        Self { ledger, config }
    }

    pub fn config(&self) -> &FeeConfig {
        &self.config
    }

    /// Estimated fee in SUN
    pub async fn estimate(&self) -> u64 {
        match self.ledger.fee_per_byte().await {
            Ok(per_byte) => {
                let per_byte = per_byte.unwrap_or(self.config.default_fee_per_byte);
                self.config.tx_size_bytes.saturating_mul(per_byte)
            }
            Err(e) => {
                warn!(
                    error = %e,
                    fallback = self.config.fallback_fee,
                    "Fee parameter unavailable, using fallback"
                );
                self.config.fallback_fee
            }
        }
    }
}
