//! SQLite Persistent Storage for the Wallet Pool
//!
//! Durable wallet table that survives service restarts. The schema keeps the
//! column names of the existing `trx_transactions` table so an existing
//! `address.db` opens unchanged. Uses connection pooling via r2d2.

use async_trait::async_trait;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension, TransactionBehavior};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use super::traits::{StorageError, StorageResult, WalletStore};
use crate::types::wallet::{Lease, WalletRecord, WalletStatus};

const SELECT_COLUMNS: &str =
    "SELECT address, privateKey, notifyUrl, collectAddress, extraData, status, updated_at FROM trx_transactions";

/// SQLite-backed wallet store with connection pooling
pub struct SqliteWalletStore {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteWalletStore {
    /// Create a new store with the given database path
    ///
    /// Creates the database file and runs migrations if needed.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, StorageError> {
        if let Some(parent) = db_path.as_ref().parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let manager = SqliteConnectionManager::file(db_path)
            .with_init(|conn| conn.busy_timeout(Duration::from_secs(5)));
        let pool = Pool::builder()
            .max_size(10)
            .build(manager)
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations()?;

        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> Result<Self, StorageError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations()?;

        Ok(store)
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, StorageError> {
        self.pool
            .get()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }

    fn run_migrations(&self) -> Result<(), StorageError> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS trx_transactions (
                address TEXT PRIMARY KEY,
                privateKey TEXT,
                notifyUrl TEXT,
                collectAddress TEXT,
                extraData TEXT,
                status TEXT DEFAULT 'FREE',
                updated_at INTEGER
            );

            CREATE INDEX IF NOT EXISTS idx_trx_transactions_status ON trx_transactions(status);
            "#,
        )
        .map_err(db_err)?;

        Ok(())
    }

    fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<WalletRecord> {
        let status_str: Option<String> = row.get("status")?;
        let status = status_str
            .as_deref()
            .map(str::parse::<WalletStatus>)
            .transpose()
            .map_err(|e: String| {
                rusqlite::Error::FromSqlConversionFailure(
                    5,
                    rusqlite::types::Type::Text,
                    e.into(),
                )
            })?
            .unwrap_or_default();

        Ok(WalletRecord {
            address: row.get("address")?,
            private_key: row.get::<_, Option<String>>("privateKey")?.unwrap_or_default(),
            status,
            notify_url: row.get("notifyUrl")?,
            collect_address: row.get("collectAddress")?,
            extra_data: row.get("extraData")?,
            updated_at: row.get::<_, Option<i64>>("updated_at")?.unwrap_or(0),
        })
    }

    fn insert_sync(&self, record: &WalletRecord) -> StorageResult<()> {
        let conn = self.conn()?;

        conn.execute(
            r#"
            INSERT INTO trx_transactions (
                address, privateKey, notifyUrl, collectAddress, extraData, status, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                record.address,
                record.private_key,
                record.notify_url,
                record.collect_address,
                record.extra_data,
                record.status.as_str(),
                record.updated_at,
            ],
        )
        .map_err(|e| insert_err(e, &record.address))?;

        Ok(())
    }

    fn insert_within_capacity_sync(&self, record: &WalletRecord, ceiling: u64) -> StorageResult<bool> {
        let mut conn = self.conn()?;
        // IMMEDIATE takes the write lock before counting, so two inserts
        // cannot both observe the last free slot.
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(db_err)?;

        let count: i64 = tx
            .query_row("SELECT COUNT(*) FROM trx_transactions", [], |row| row.get(0))
            .map_err(db_err)?;

        if count as u64 >= ceiling {
            return Ok(false);
        }

        tx.execute(
            r#"
            INSERT INTO trx_transactions (
                address, privateKey, notifyUrl, collectAddress, extraData, status, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                record.address,
                record.private_key,
                record.notify_url,
                record.collect_address,
                record.extra_data,
                record.status.as_str(),
                record.updated_at,
            ],
        )
        .map_err(|e| insert_err(e, &record.address))?;

        tx.commit().map_err(db_err)?;
        Ok(true)
    }

    fn get_sync(&self, address: &str) -> StorageResult<Option<WalletRecord>> {
        let conn = self.conn()?;

        conn.query_row(
            &format!("{} WHERE address = ?1", SELECT_COLUMNS),
            params![address],
            Self::row_to_record,
        )
        .optional()
        .map_err(db_err)
    }

    fn get_with_status_sync(
        &self,
        address: &str,
        status: WalletStatus,
    ) -> StorageResult<Option<WalletRecord>> {
        let conn = self.conn()?;

        conn.query_row(
            &format!("{} WHERE address = ?1 AND status = ?2", SELECT_COLUMNS),
            params![address, status.as_str()],
            Self::row_to_record,
        )
        .optional()
        .map_err(db_err)
    }

    fn find_any_sync(&self, status: WalletStatus) -> StorageResult<Option<WalletRecord>> {
        let conn = self.conn()?;

        conn.query_row(
            &format!("{} WHERE status = ?1 LIMIT 1", SELECT_COLUMNS),
            params![status.as_str()],
            Self::row_to_record,
        )
        .optional()
        .map_err(db_err)
    }

    fn exists_with_status_sync(&self, status: WalletStatus) -> StorageResult<bool> {
        let conn = self.conn()?;

        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM trx_transactions WHERE status = ?1 LIMIT 1",
                params![status.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;

        Ok(found.is_some())
    }

    fn count_sync(&self) -> StorageResult<u64> {
        let conn = self.conn()?;

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM trx_transactions", [], |row| row.get(0))
            .map_err(db_err)?;

        Ok(count as u64)
    }

    fn count_by_status_sync(&self) -> StorageResult<HashMap<WalletStatus, u64>> {
        let conn = self.conn()?;

        let mut stmt = conn
            .prepare("SELECT status, COUNT(*) FROM trx_transactions GROUP BY status")
            .map_err(db_err)?;

        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, Option<String>>(0)?, row.get::<_, i64>(1)?))
            })
            .map_err(db_err)?;

        let mut counts = HashMap::new();
        for row in rows {
            let (status, count) = row.map_err(db_err)?;
            let status = match status {
                Some(s) => s.parse().map_err(StorageError::InvalidData)?,
                None => WalletStatus::Free,
            };
            *counts.entry(status).or_insert(0) += count as u64;
        }

        Ok(counts)
    }

    fn try_lease_sync(&self, address: &str, lease: &Lease, now: i64) -> StorageResult<bool> {
        let conn = self.conn()?;

        let rows = conn
            .execute(
                r#"
                UPDATE trx_transactions
                SET status = 'PENDING', notifyUrl = ?2, collectAddress = ?3, extraData = ?4, updated_at = ?5
                WHERE address = ?1 AND status = 'FREE'
                "#,
                params![address, lease.notify_url, lease.collect_address, lease.extra, now],
            )
            .map_err(db_err)?;

        Ok(rows == 1)
    }

    fn transition_sync(
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

        let conn = self.conn()?;

        let rows = conn
            .execute(
                "UPDATE trx_transactions SET status = ?3, updated_at = ?4 WHERE address = ?1 AND status = ?2",
                params![address, from.as_str(), to.as_str(), now],
            )
            .map_err(db_err)?;

        Ok(rows == 1)
    }

    fn release_sync(&self, address: &str, from: WalletStatus) -> StorageResult<bool> {
        let conn = self.conn()?;

        let rows = conn
            .execute(
                r#"
                UPDATE trx_transactions
                SET status = 'FREE', notifyUrl = NULL, collectAddress = NULL, extraData = NULL
                WHERE address = ?1 AND status = ?2
                "#,
                params![address, from.as_str()],
            )
            .map_err(db_err)?;

        Ok(rows == 1)
    }

    fn release_expired_sync(&self, cutoff: i64) -> StorageResult<u64> {
        let conn = self.conn()?;

        let rows = conn
            .execute(
                r#"
                UPDATE trx_transactions
                SET status = 'FREE', notifyUrl = NULL, collectAddress = NULL, extraData = NULL
                WHERE status = 'PENDING' AND updated_at < ?1
                "#,
                params![cutoff],
            )
            .map_err(db_err)?;

        Ok(rows as u64)
    }

    fn get_all_sync(&self) -> StorageResult<Vec<WalletRecord>> {
        let conn = self.conn()?;

        let mut stmt = conn
            .prepare(&format!("{} ORDER BY rowid ASC", SELECT_COLUMNS))
            .map_err(db_err)?;

        let records = stmt
            .query_map([], Self::row_to_record)
            .map_err(db_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)?;

        Ok(records)
    }
}

fn db_err(e: rusqlite::Error) -> StorageError {
    StorageError::Database(e.to_string())
}

fn insert_err(e: rusqlite::Error, address: &str) -> StorageError {
    if let rusqlite::Error::SqliteFailure(ref err, _) = e {
        // SQLITE_CONSTRAINT_PRIMARYKEY / SQLITE_CONSTRAINT_UNIQUE
        if err.extended_code == 1555 || err.extended_code == 2067 {
            return StorageError::Duplicate(address.to_string());
        }
    }
    db_err(e)
}

#[async_trait]
impl WalletStore for SqliteWalletStore {
    async fn insert(&self, record: &WalletRecord) -> StorageResult<()> {
        self.insert_sync(record)
    }

    async fn insert_within_capacity(
        &self,
        record: &WalletRecord,
        ceiling: u64,
    ) -> StorageResult<bool> {
        self.insert_within_capacity_sync(record, ceiling)
    }

    async fn get(&self, address: &str) -> StorageResult<Option<WalletRecord>> {
        self.get_sync(address)
    }

    async fn get_with_status(
        &self,
        address: &str,
        status: WalletStatus,
    ) -> StorageResult<Option<WalletRecord>> {
        self.get_with_status_sync(address, status)
    }

    async fn find_any(&self, status: WalletStatus) -> StorageResult<Option<WalletRecord>> {
        self.find_any_sync(status)
    }

    async fn exists_with_status(&self, status: WalletStatus) -> StorageResult<bool> {
        self.exists_with_status_sync(status)
    }

    async fn count(&self) -> StorageResult<u64> {
        self.count_sync()
    }

    async fn count_by_status(&self) -> StorageResult<HashMap<WalletStatus, u64>> {
        self.count_by_status_sync()
    }

    async fn try_lease(&self, address: &str, lease: &Lease, now: i64) -> StorageResult<bool> {
        self.try_lease_sync(address, lease, now)
    }

    async fn transition(
        &self,
        address: &str,
        from: WalletStatus,
        to: WalletStatus,
        now: i64,
    ) -> StorageResult<bool> {
        self.transition_sync(address, from, to, now)
    }

    async fn release(&self, address: &str, from: WalletStatus) -> StorageResult<bool> {
        self.release_sync(address, from)
    }

    async fn release_expired(&self, cutoff: i64) -> StorageResult<u64> {
        self.release_expired_sync(cutoff)
    }

    async fn get_all(&self) -> StorageResult<Vec<WalletRecord>> {
        self.get_all_sync()
    }
}
