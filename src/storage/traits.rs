//! Storage Trait Definitions
//!
//! Defines the wallet store interface. Every method that changes lease
//! ownership is a single conditional update guarded by the expected prior
//! status, and reports whether it applied. Callers treat `false` as "someone
//! else got there first" and never retry blindly.

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

use crate::types::wallet::{Lease, WalletRecord, WalletStatus};

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Duplicate record: {0}")]
    Duplicate(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Connection error: {0}")]
    Connection(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Wallet storage interface
///
/// Implementations:
/// - `SqliteWalletStore` - Durable storage with SQLite
/// - `MemoryWalletStore` - In-memory storage for testing
#[async_trait]
pub trait WalletStore: Send + Sync {
    /// Insert a record unconditionally
    async fn insert(&self, record: &WalletRecord) -> StorageResult<()>;

    /// Insert a record only while the row count is below `ceiling`.
    /// Returns false when the pool is full.
    async fn insert_within_capacity(&self, record: &WalletRecord, ceiling: u64)
        -> StorageResult<bool>;

    /// Get a record by address
    async fn get(&self, address: &str) -> StorageResult<Option<WalletRecord>>;

    /// Get a record by address if it currently has `status`
    async fn get_with_status(
        &self,
        address: &str,
        status: WalletStatus,
    ) -> StorageResult<Option<WalletRecord>>;

    /// Any one record with `status`
    async fn find_any(&self, status: WalletStatus) -> StorageResult<Option<WalletRecord>>;

    /// Whether at least one record has `status`
    async fn exists_with_status(&self, status: WalletStatus) -> StorageResult<bool>;

    /// Total number of records
    async fn count(&self) -> StorageResult<u64>;

    /// Record count keyed by status
    async fn count_by_status(&self) -> StorageResult<HashMap<WalletStatus, u64>>;

    /// FREE → PENDING with the lease fields and `now`.
    async fn try_lease(&self, address: &str, lease: &Lease, now: i64) -> StorageResult<bool>;

    /// `from` → `to` keeping the lease fields; stamps `now`. `to` must not be FREE.
    async fn transition(
        &self,
        address: &str,
        from: WalletStatus,
        to: WalletStatus,
        now: i64,
    ) -> StorageResult<bool>;

    /// `from` → FREE, clearing the lease fields.
    async fn release(&self, address: &str, from: WalletStatus) -> StorageResult<bool>;

    /// Every PENDING record with `updated_at < cutoff` → FREE, clearing the
    /// lease fields. Returns the number of records released.
    async fn release_expired(&self, cutoff: i64) -> StorageResult<u64>;

    /// All records
    async fn get_all(&self) -> StorageResult<Vec<WalletRecord>>;
}
