//! Wallet pool manager
//!
//! Hands out deposit addresses. A FREE record is reused when one exists;
//! otherwise a fresh keypair is provisioned while the pool is below its
//! ceiling. Both paths rely on conditional store updates, so concurrent
//! lease requests never capture the same record or overshoot the ceiling.

use std::sync::Arc;
use tracing::debug;

use crate::common::error::{PoolError, Result};
use crate::common::logging::log_lease_event;
use crate::ledger::LedgerProvider;
use crate::storage::WalletStore;
use crate::types::wallet::{
    now_millis, Lease, LeaseKind, LeaseOutcome, PoolStats, WalletRecord, WalletStatus,
};

/// Attempts at capturing a FREE record before falling back to provisioning
const MAX_REUSE_ATTEMPTS: usize = 8;

/// Lease allocation over the wallet store
#[derive(Clone)]
pub struct WalletPool {
    store: Arc<dyn WalletStore>,
    ledger: Arc<dyn LedgerProvider>,
    max_wallets: u64,
}

impl WalletPool {
    pub fn new(
        store: Arc<dyn WalletStore>,
        ledger: Arc<dyn LedgerProvider>,
        max_wallets: u64,
    ) -> Self {
        Self {
            store,
            ledger,
            max_wallets,
        }
    }

    pub fn max_wallets(&self) -> u64 {
        self.max_wallets
    }

    /// Lease an address for one deposit
    pub async fn lease(&self, lease: &Lease) -> Result<LeaseOutcome> {
        match self.try_lease(lease).await {
            Ok(outcome) => {
                log_lease_event(
                    "lease_granted",
                    Some(&outcome.address),
                    Some(&outcome.kind.to_string()),
                    None,
                );
                Ok(outcome)
            }
            Err(e) => {
                log_lease_event("lease_refused", None, None, Some(&e.to_string()));
                Err(e)
            }
        }
    }

    async fn try_lease(&self, lease: &Lease) -> Result<LeaseOutcome> {
        for _ in 0..MAX_REUSE_ATTEMPTS {
            let candidate = match self.store.find_any(WalletStatus::Free).await? {
                Some(record) => record,
                None => break,
            };

            if self
                .store
                .try_lease(&candidate.address, lease, now_millis())
                .await?
            {
                return Ok(LeaseOutcome {
                    address: candidate.address,
                    kind: LeaseKind::Reused,
                });
            }

            debug!(address = %candidate.address, "FREE record taken concurrently, retrying");
        }

        if self.store.count().await? >= self.max_wallets {
            return Err(PoolError::PoolExhausted);
        }

        let keypair = self.ledger.create_keypair().await?;
        let record =
            WalletRecord::new_leased(keypair.address, keypair.private_key, lease, now_millis());

        if self
            .store
            .insert_within_capacity(&record, self.max_wallets)
            .await?
        {
            Ok(LeaseOutcome {
                address: record.address,
                kind: LeaseKind::New,
            })
        } else {
            Err(PoolError::PoolExhausted)
        }
    }

    /// Current pool occupancy
    pub async fn stats(&self) -> Result<PoolStats> {
        let counts = self.store.count_by_status().await?;
        let get = |status: WalletStatus| counts.get(&status).copied().unwrap_or(0);

        Ok(PoolStats {
            total: counts.values().sum(),
            free: get(WalletStatus::Free),
            pending: get(WalletStatus::Pending),
            processing: get(WalletStatus::Processing),
            max_wallets: self.max_wallets,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{Keypair, LedgerError, MockLedgerProvider};
    use crate::storage::MemoryWalletStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn lease() -> Lease {
        Lease::new("https://shop.example/hook", "TCollect", Some("order-1".to_string()))
    }

    fn counting_ledger() -> MockLedgerProvider {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut mock = MockLedgerProvider::new();
        mock.expect_create_keypair().returning(move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            Ok(Keypair {
                address: format!("TNew{}", n),
                private_key: format!("key{}", n),
            })
        });
        mock
    }

    #[tokio::test]
    async fn test_reuses_free_record() {
        let store = Arc::new(MemoryWalletStore::new());
        store
            .insert(&WalletRecord::new_free("TOld".to_string(), "k".to_string(), 0))
            .await
            .unwrap();

        let mut ledger = MockLedgerProvider::new();
        ledger.expect_create_keypair().never();

        let pool = WalletPool::new(store.clone(), Arc::new(ledger), 20);
        let outcome = pool.lease(&lease()).await.unwrap();

        assert_eq!(outcome.address, "TOld");
        assert_eq!(outcome.kind, LeaseKind::Reused);

        let record = store.get("TOld").await.unwrap().unwrap();
        assert_eq!(record.status, WalletStatus::Pending);
        assert_eq!(record.collect_address.as_deref(), Some("TCollect"));
        assert_eq!(record.extra_data.as_deref(), Some("order-1"));
    }

    #[tokio::test]
    async fn test_provisions_when_no_free_record() {
        let store = Arc::new(MemoryWalletStore::new());
        let pool = WalletPool::new(store.clone(), Arc::new(counting_ledger()), 20);

        let outcome = pool.lease(&lease()).await.unwrap();
        assert_eq!(outcome.kind, LeaseKind::New);

        let record = store.get(&outcome.address).await.unwrap().unwrap();
        assert_eq!(record.status, WalletStatus::Pending);
        assert_eq!(record.notify_url.as_deref(), Some("https://shop.example/hook"));
    }

    #[tokio::test]
    async fn test_exhausted_at_ceiling() {
        let store = Arc::new(MemoryWalletStore::new());
        let pool = WalletPool::new(store.clone(), Arc::new(counting_ledger()), 2);

        pool.lease(&lease()).await.unwrap();
        pool.lease(&lease()).await.unwrap();

        let result = pool.lease(&lease()).await;
        assert!(matches!(result, Err(PoolError::PoolExhausted)));
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_provider_failure_inserts_nothing() {
        let store = Arc::new(MemoryWalletStore::new());
        let mut ledger = MockLedgerProvider::new();
        ledger
            .expect_create_keypair()
            .returning(|| Err(LedgerError::Api("node down".to_string())));

        let pool = WalletPool::new(store.clone(), Arc::new(ledger), 20);
        let result = pool.lease(&lease()).await;

        assert!(matches!(result, Err(PoolError::Provider(_))));
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_leases_respect_ceiling() {
        let store = Arc::new(MemoryWalletStore::new());
        let pool = WalletPool::new(store.clone(), Arc::new(counting_ledger()), 5);

        let mut handles = Vec::new();
        for _ in 0..20 {
            let pool = pool.clone();
            handles.push(tokio::spawn(async move { pool.lease(&lease()).await }));
        }

        let mut granted = Vec::new();
        for handle in handles {
            if let Ok(outcome) = handle.await.unwrap() {
                granted.push(outcome.address);
            }
        }

        assert_eq!(granted.len(), 5);
        granted.sort();
        granted.dedup();
        assert_eq!(granted.len(), 5);
        assert_eq!(store.count().await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_stats() {
        let store = Arc::new(MemoryWalletStore::new());
        store
            .insert(&WalletRecord::new_free("TA".to_string(), "k".to_string(), 0))
            .await
            .unwrap();
        let pool = WalletPool::new(store, Arc::new(counting_ledger()), 20);
        pool.lease(&lease()).await.unwrap();
        pool.lease(&lease()).await.unwrap();

        let stats = pool.stats().await.unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.free, 0);
        assert_eq!(stats.pending, 2);
        assert_eq!(stats.max_wallets, 20);
    }
}
