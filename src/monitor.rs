//! Deposit monitor
//!
//! Polls the chain for native transfers into leased addresses.
//!
//! While no lease is PENDING the monitor makes no ledger calls and forgets
//! its scan cursor. Once a lease is outstanding it starts at the current tip,
//! scans at most `max_blocks_per_tick` blocks per tick, and snaps the cursor
//! to `tip - 1` when it falls more than `resync_threshold` blocks behind.
//!
//! A matching transfer moves the record PENDING → PROCESSING, fires a
//! DEPOSIT_DETECTED webhook and schedules a sweep after the confirmation
//! delay.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::common::config::MonitorConfig;
use crate::common::error::Result;
use crate::common::logging::log_deposit_event;
use crate::ledger::{LedgerProvider, LedgerTransaction};
use crate::notifier::{spawn_notification, Notification, Notifier};
use crate::storage::WalletStore;
use crate::sweeper::SweepExecutor;
use crate::types::wallet::{now_millis, WalletStatus};

/// Summary of one monitor tick
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickResult {
    /// At least one lease was PENDING
    pub active: bool,
    /// Cursor was snapped forward past a backlog
    pub resynced: bool,
    pub blocks_scanned: u64,
    pub deposits_detected: usize,
}

impl TickResult {
    pub fn has_activity(&self) -> bool {
        self.resynced || self.deposits_detected > 0
    }
}

impl fmt::Display for TickResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "active: {}, resynced: {}, blocks: {}, deposits: {}",
            self.active, self.resynced, self.blocks_scanned, self.deposits_detected
        )
    }
}

/// Block-polling deposit detector
pub struct DepositMonitor {
    store: Arc<dyn WalletStore>,
    ledger: Arc<dyn LedgerProvider>,
    sweeper: SweepExecutor,
    notifier: Arc<dyn Notifier>,
    config: MonitorConfig,
    shutdown: CancellationToken,
    /// Last fully scanned block; None while idle
    cursor: Option<u64>,
}

impl DepositMonitor {
    pub fn new(
        store: Arc<dyn WalletStore>,
        ledger: Arc<dyn LedgerProvider>,
        sweeper: SweepExecutor,
        notifier: Arc<dyn Notifier>,
        config: MonitorConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            store,
            ledger,
            sweeper,
            notifier,
            config,
            shutdown,
            cursor: None,
        }
    }

    pub fn cursor(&self) -> Option<u64> {
        self.cursor
    }

    /// Run one poll
    pub async fn tick(&mut self) -> Result<TickResult> {
        let mut result = TickResult::default();

        if !self.store.exists_with_status(WalletStatus::Pending).await? {
            if self.cursor.take().is_some() {
                debug!("No pending leases, monitor idle");
            }
            return Ok(result);
        }
        result.active = true;

        let height = self.ledger.current_block_height().await?;
        let mut cursor = *self.cursor.get_or_insert(height);

        if height.saturating_sub(cursor) > self.config.resync_threshold {
            info!(from = cursor, to = height - 1, "Resyncing block height");
            cursor = height - 1;
            self.cursor = Some(cursor);
            result.resynced = true;
        }

        if height > cursor {
            let range = (height - cursor).min(self.config.max_blocks_per_tick);

            for block_num in cursor + 1..=cursor + range {
                let transactions = self.ledger.get_block(block_num).await?;

                for tx in transactions.iter().filter(|tx| tx.is_successful_transfer()) {
                    if self.handle_transfer(tx).await? {
                        result.deposits_detected += 1;
                    }
                }

                self.cursor = Some(block_num);
                result.blocks_scanned += 1;
            }
        }

        Ok(result)
    }

    /// Returns true when `tx` funded a PENDING lease
    async fn handle_transfer(&self, tx: &LedgerTransaction) -> Result<bool> {
        let record = match self
            .store
            .get_with_status(&tx.to, WalletStatus::Pending)
            .await?
        {
            Some(record) => record,
            None => return Ok(false),
        };

        let claimed = self
            .store
            .transition(
                &record.address,
                WalletStatus::Pending,
                WalletStatus::Processing,
                now_millis(),
            )
            .await?;
        if !claimed {
            return Ok(false);
        }

        log_deposit_event(
            &record.address,
            tx.amount,
            &tx.txid,
            record.extra_data.as_deref(),
        );

        spawn_notification(
            self.notifier.clone(),
            record.notify_url.clone(),
            Notification::DepositDetected {
                address: record.address.clone(),
                amount_sun: tx.amount,
                extra: record.extra_data.clone(),
            },
        );

        schedule_sweep(
            self.sweeper.clone(),
            record.address,
            self.config.confirmation_delay,
            self.shutdown.clone(),
        );

        Ok(true)
    }

    /// Poll until `shutdown` is cancelled
    pub async fn run(mut self) {
        info!(
            idle_secs = self.config.idle_delay.as_secs(),
            active_secs = self.config.active_delay.as_secs(),
            "Deposit monitor started"
        );

        loop {
            let delay = match self.tick().await {
                Ok(result) => {
                    if result.has_activity() {
                        info!("[tick] {}", result);
                    }
                    if result.active {
                        self.config.active_delay
                    } else {
                        self.config.idle_delay
                    }
                }
                Err(e) => {
                    error!(error = %e, "Monitor loop error");
                    self.config.active_delay
                }
            };

            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        info!("Deposit monitor stopped");
    }
}

/// Sweep `address` after `delay` in a detached task
pub fn schedule_sweep(
    sweeper: SweepExecutor,
    address: String,
    delay: Duration,
    shutdown: CancellationToken,
) {
    debug!(address = %address, delay_secs = delay.as_secs(), "Sweep scheduled");

    tokio::spawn(async move {
        tokio::select! {
            _ = shutdown.cancelled() => {
                debug!(address = %address, "Scheduled sweep dropped on shutdown");
            }
            _ = tokio::time::sleep(delay) => {
                match sweeper.sweep(&address).await {
                    Ok(outcome) => info!(address = %address, outcome = %outcome, "Scheduled sweep finished"),
                    Err(e) => warn!(address = %address, error = %e, "Scheduled sweep failed"),
                }
            }
        }
    });
}
