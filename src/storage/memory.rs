//! In-Memory Storage Implementation
//!
//! Provides in-memory storage for testing and development.
//! Data is lost when the service restarts.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

use super::traits::{StorageError, StorageResult, WalletStore};
use crate::types::wallet::{Lease, WalletRecord, WalletStatus};

/// In-memory wallet store
///
/// Every conditional update holds the write lock for the whole
/// check-and-set, which gives the same guarantee as a guarded SQL UPDATE.
#[derive(Clone, Default)]
pub struct MemoryWalletStore {
    /// Records indexed by address
    records: Arc<RwLock<BTreeMap<String, WalletRecord>>>,
}

impl MemoryWalletStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WalletStore for MemoryWalletStore {
    async fn insert(&self, record: &WalletRecord) -> StorageResult<()> {
        let mut records = self.records.write().await;

        if records.contains_key(&record.address) {
            return Err(StorageError::Duplicate(record.address.clone()));
        }

        records.insert(record.address.clone(), record.clone());
        Ok(())
    }

    async fn insert_within_capacity(
        &self,
        record: &WalletRecord,
        ceiling: u64,
    ) -> StorageResult<bool> {
        let mut records = self.records.write().await;

        if records.len() as u64 >= ceiling {
            return Ok(false);
        }
        if records.contains_key(&record.address) {
            return Err(StorageError::Duplicate(record.address.clone()));
        }

        records.insert(record.address.clone(), record.clone());
        Ok(true)
    }

    async fn get(&self, address: &str) -> StorageResult<Option<WalletRecord>> {
        let records = self.records.read().await;
        Ok(records.get(address).cloned())
    }

    async fn get_with_status(
        &self,
        address: &str,
        status: WalletStatus,
    ) -> StorageResult<Option<WalletRecord>> {
        let records = self.records.read().await;
        Ok(records
            .get(address)
            .filter(|r| r.status == status)
            .cloned())
    }

    async fn find_any(&self, status: WalletStatus) -> StorageResult<Option<WalletRecord>> {
        let records = self.records.read().await;
        Ok(records.values().find(|r| r.status == status).cloned())
    }

    async fn exists_with_status(&self, status: WalletStatus) -> StorageResult<bool> {
        let records = self.records.read().await;
        Ok(records.values().any(|r| r.status == status))
    }

    async fn count(&self) -> StorageResult<u64> {
        let records = self.records.read().await;
        Ok(records.len() as u64)
    }

    async fn count_by_status(&self) -> StorageResult<HashMap<WalletStatus, u64>> {
        let records = self.records.read().await;

        let mut counts = HashMap::new();
        for record in records.values() {
            *counts.entry(record.status).or_insert(0) += 1;
        }

        Ok(counts)
    }

    async fn try_lease(&self, address: &str, lease: &Lease, now: i64) -> StorageResult<bool> {
        let mut records = self.records.write().await;

        match records.get_mut(address) {
            Some(record) if record.status == WalletStatus::Free => {
                record.apply_lease(lease, now);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn transition(
        &self,
        address: &str,
        from: WalletStatus,
        to: WalletStatus,
        now: i64,
    ) -> StorageResult<bool> {
        if to == WalletStatus::Free {
            return Err(StorageError::InvalidData(
                "use release() to return a wallet to FREE".to_string(),
            ));
        }

        let mut records = self.records.write().await;

        match records.get_mut(address) {
            Some(record) if record.status == from => {
                record.set_status(to, now);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release(&self, address: &str, from: WalletStatus) -> StorageResult<bool> {
        let mut records = self.records.write().await;

        match records.get_mut(address) {
            Some(record) if record.status == from => {
                record.release();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release_expired(&self, cutoff: i64) -> StorageResult<u64> {
        let mut records = self.records.write().await;

        let mut released = 0;
        for record in records.values_mut().filter(|r| r.is_expired(cutoff)) {
            record.release();
            released += 1;
        }

        Ok(released)
    }

    async fn get_all(&self) -> StorageResult<Vec<WalletRecord>> {
        let records = self.records.read().await;
        Ok(records.values().cloned().collect())
    }
}
