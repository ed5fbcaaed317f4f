//! Sweep executor
//!
//! Moves a funded deposit address's balance, minus the estimated fee, to the
//! lease's collection address. Only a PROCESSING record is swept. Every
//! failure path puts the record back to PENDING with its lease fields intact;
//! only an accepted broadcast returns it to FREE.

use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

use crate::common::error::{PoolError, Result};
use crate::common::logging::log_sweep_event;
use crate::fee::FeeEstimator;
use crate::ledger::{LedgerProvider, TransferRequest};
use crate::notifier::{spawn_notification, Notification, Notifier};
use crate::storage::WalletStore;
use crate::types::units::sun_to_display;
use crate::types::wallet::{now_millis, WalletRecord, WalletStatus};

/// Result of one sweep attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SweepOutcome {
    /// Broadcast accepted; the record is FREE again
    Swept {
        txid: String,
        amount_sun: u64,
        fee_sun: u64,
    },
    /// Balance does not cover the fee; the record is PENDING again
    Deferred { balance_sun: u64, fee_sun: u64 },
    /// The node refused the transfer; the record is PENDING again
    Rejected { txid: String, reason: String },
    /// The record was not PROCESSING, nothing to do
    Skipped,
}

impl fmt::Display for SweepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SweepOutcome::Swept {
                txid, amount_sun, ..
            } => write!(f, "swept {} ({})", sun_to_display(*amount_sun), txid),
            SweepOutcome::Deferred {
                balance_sun,
                fee_sun,
            } => write!(
                f,
                "deferred: balance {} does not cover fee {}",
                sun_to_display(*balance_sun),
                sun_to_display(*fee_sun)
            ),
            SweepOutcome::Rejected { reason, .. } => write!(f, "rejected: {}", reason),
            SweepOutcome::Skipped => write!(f, "skipped"),
        }
    }
}

/// Executes sweeps for PROCESSING records
#[derive(Clone)]
pub struct SweepExecutor {
    store: Arc<dyn WalletStore>,
    ledger: Arc<dyn LedgerProvider>,
    fee: FeeEstimator,
    notifier: Arc<dyn Notifier>,
}

impl SweepExecutor {
    pub fn new(
        store: Arc<dyn WalletStore>,
        ledger: Arc<dyn LedgerProvider>,
        fee: FeeEstimator,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            ledger,
            fee,
            notifier,
        }
    }

    /// Force a sweep of `address`
    ///
    /// A PENDING record is moved to PROCESSING first. A FREE record has
    /// nothing to sweep and is skipped.
    pub async fn trigger(&self, address: &str) -> Result<SweepOutcome> {
        let record = self
            .store
            .get(address)
            .await?
            .ok_or_else(|| PoolError::NotFound(address.to_string()))?;

        match record.status {
            WalletStatus::Free => {
                info!(address = %address, "Manual sweep on a FREE wallet, nothing to do");
                return Ok(SweepOutcome::Skipped);
            }
            WalletStatus::Pending => {
                self.store
                    .transition(
                        address,
                        WalletStatus::Pending,
                        WalletStatus::Processing,
                        now_millis(),
                    )
                    .await?;
            }
            WalletStatus::Processing => {}
        }

        self.sweep(address).await
    }

    /// Sweep a PROCESSING record
    pub async fn sweep(&self, address: &str) -> Result<SweepOutcome> {
        let record = match self
            .store
            .get_with_status(address, WalletStatus::Processing)
            .await?
        {
            Some(record) => record,
            None => return Ok(SweepOutcome::Skipped),
        };

        match self.execute(&record).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                log_sweep_event(
                    "sweep_failed",
                    address,
                    0,
                    false,
                    None,
                    Some(&e.to_string()),
                );
                self.revert(address).await;
                Err(e)
            }
        }
    }

    async fn execute(&self, record: &WalletRecord) -> Result<SweepOutcome> {
        let collect_address = record.collect_address.clone().ok_or_else(|| {
            PoolError::InvalidRecord(format!("{} has no collection address", record.address))
        })?;

        let balance = self.ledger.get_balance(&record.address).await?;
        let fee = self.fee.estimate().await;

        if balance <= fee {
            info!(
                address = %record.address,
                balance = %sun_to_display(balance),
                fee = %sun_to_display(fee),
                "Insufficient balance for sweep"
            );
            self.revert(&record.address).await;
            return Ok(SweepOutcome::Deferred {
                balance_sun: balance,
                fee_sun: fee,
            });
        }

        let amount = balance - fee;
        info!(
            address = %record.address,
            to = %collect_address,
            amount = %sun_to_display(amount),
            "Sweeping"
        );

        let receipt = self
            .ledger
            .send_transfer(&TransferRequest {
                from: record.address.clone(),
                to: collect_address.clone(),
                amount,
                private_key: record.private_key.clone(),
            })
            .await?;

        if !receipt.accepted {
            let reason = receipt
                .message
                .unwrap_or_else(|| "broadcast rejected".to_string());
            log_sweep_event(
                "sweep_rejected",
                &record.address,
                amount,
                false,
                Some(&receipt.txid),
                Some(&reason),
            );
            self.revert(&record.address).await;
            return Ok(SweepOutcome::Rejected {
                txid: receipt.txid,
                reason,
            });
        }

        log_sweep_event(
            "sweep_completed",
            &record.address,
            amount,
            true,
            Some(&receipt.txid),
            None,
        );

        spawn_notification(
            self.notifier.clone(),
            record.notify_url.clone(),
            Notification::CollectionSuccess {
                txid: receipt.txid.clone(),
                amount_sun: amount,
                from: record.address.clone(),
                to: collect_address,
                extra: record.extra_data.clone(),
            },
        );

        // Funds have moved; a store failure here must not revert the record
        match self
            .store
            .release(&record.address, WalletStatus::Processing)
            .await
        {
            Ok(true) => {}
            Ok(false) => warn!(address = %record.address, "Wallet left PROCESSING during sweep"),
            Err(e) => warn!(address = %record.address, error = %e, "Failed to release swept wallet"),
        }

        Ok(SweepOutcome::Swept {
            txid: receipt.txid,
            amount_sun: amount,
            fee_sun: fee,
        })
    }

    /// PROCESSING → PENDING, keeping the lease fields
    async fn revert(&self, address: &str) {
        match self
            .store
            .transition(
                address,
                WalletStatus::Processing,
                WalletStatus::Pending,
                now_millis(),
            )
            .await
        {
            Ok(true) => {}
            Ok(false) => warn!(address = %address, "Wallet left PROCESSING before revert"),
            Err(e) => warn!(address = %address, error = %e, "Failed to revert wallet to PENDING"),
        }
    }
}
