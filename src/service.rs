//! Wallet Pool Service
//!
//! Wires the store, ledger and notifier into the pool components and owns
//! the background workers.
//!
//! # Flow:
//! 1. A merchant leases an address (`lease_address`)
//! 2. The deposit monitor sees a transfer into it and marks it PROCESSING
//! 3. After the confirmation delay the sweep executor moves the funds to the
//!    merchant's collection address and the address returns to the pool
//! 4. Leases that never receive a deposit are reclaimed by the expiry reaper

use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::common::config::PoolConfig;
use crate::common::error::{PoolError, Result};
use crate::fee::FeeEstimator;
use crate::ledger::{keys, LedgerProvider};
use crate::monitor::{schedule_sweep, DepositMonitor};
use crate::notifier::Notifier;
use crate::pool::WalletPool;
use crate::reaper::ExpiryReaper;
use crate::storage::WalletStore;
use crate::sweeper::{SweepExecutor, SweepOutcome};
use crate::types::wallet::{Lease, LeaseOutcome, PoolStats, WalletRecord, WalletStatus};

/// Handles to the spawned background workers
pub struct BackgroundTasks {
    pub monitor: JoinHandle<()>,
    pub reaper: JoinHandle<()>,
}

impl BackgroundTasks {
    /// Wait for both workers to exit
    pub async fn join(self) {
        let _ = self.monitor.await;
        let _ = self.reaper.await;
    }
}

/// Deposit-address pool
#[derive(Clone)]
pub struct PoolService {
    config: PoolConfig,
    store: Arc<dyn WalletStore>,
    ledger: Arc<dyn LedgerProvider>,
    notifier: Arc<dyn Notifier>,
    pool: WalletPool,
    fee: FeeEstimator,
    sweeper: SweepExecutor,
}

impl PoolService {
    pub fn new(
        config: PoolConfig,
        store: Arc<dyn WalletStore>,
        ledger: Arc<dyn LedgerProvider>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let pool = WalletPool::new(store.clone(), ledger.clone(), config.max_wallets);
        let fee = FeeEstimator::new(ledger.clone(), config.fee.clone());
        let sweeper = SweepExecutor::new(
            store.clone(),
            ledger.clone(),
            fee.clone(),
            notifier.clone(),
        );

        Self {
            config,
            store,
            ledger,
            notifier,
            pool,
            fee,
            sweeper,
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Lease a deposit address
    pub async fn lease_address(
        &self,
        notify_url: &str,
        collect_address: &str,
        extra: Option<String>,
    ) -> Result<LeaseOutcome> {
        self.pool
            .lease(&Lease::new(notify_url, collect_address, extra))
            .await
    }

    pub async fn get_wallet(&self, address: &str) -> Result<Option<WalletRecord>> {
        Ok(self.store.get(address).await?)
    }

    /// Force a sweep of `address`
    pub async fn trigger_sweep(&self, address: &str) -> Result<SweepOutcome> {
        self.sweeper.trigger(address).await
    }

    /// Balance of any address in SUN
    pub async fn balance(&self, address: &str) -> Result<u64> {
        if !keys::is_valid_address(address) {
            return Err(PoolError::InvalidAddress(address.to_string()));
        }
        Ok(self.ledger.get_balance(address).await?)
    }

    pub async fn stats(&self) -> Result<PoolStats> {
        self.pool.stats().await
    }

    pub async fn estimate_fee(&self) -> u64 {
        self.fee.estimate().await
    }

    pub fn reaper(&self) -> ExpiryReaper {
        ExpiryReaper::new(self.store.clone(), self.config.reaper.clone())
    }

    pub fn monitor(&self, shutdown: CancellationToken) -> DepositMonitor {
        DepositMonitor::new(
            self.store.clone(),
            self.ledger.clone(),
            self.sweeper.clone(),
            self.notifier.clone(),
            self.config.monitor.clone(),
            shutdown,
        )
    }

    /// Reschedule sweeps for records left PROCESSING by a previous run
    pub async fn resume_interrupted_sweeps(&self, shutdown: &CancellationToken) -> Result<usize> {
        let interrupted: Vec<String> = self
            .store
            .get_all()
            .await?
            .into_iter()
            .filter(|r| r.status == WalletStatus::Processing)
            .map(|r| r.address)
            .collect();

        for address in &interrupted {
            schedule_sweep(
                self.sweeper.clone(),
                address.clone(),
                self.config.monitor.confirmation_delay,
                shutdown.clone(),
            );
        }

        if !interrupted.is_empty() {
            info!(count = interrupted.len(), "Resuming interrupted sweeps");
        }
        Ok(interrupted.len())
    }

    /// Start the deposit monitor and the expiry reaper
    pub async fn spawn_background(&self, shutdown: CancellationToken) -> Result<BackgroundTasks> {
        self.resume_interrupted_sweeps(&shutdown).await?;

        let monitor = self.monitor(shutdown.clone());
        let reaper = self.reaper();

        Ok(BackgroundTasks {
            monitor: tokio::spawn(monitor.run()),
            reaper: tokio::spawn(async move { reaper.run(shutdown).await }),
        })
    }
}
