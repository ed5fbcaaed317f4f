//! Common Error Types for the Wallet Pool
//!
//! Provides unified error handling across all modules.

use thiserror::Error;

use crate::ledger::LedgerError;
use crate::storage::StorageError;

/// Root error type for pool operations
#[derive(Debug, Error)]
pub enum PoolError {
    /// No FREE record and the pool is at its ceiling
    #[error("no wallet available, please try again later")]
    PoolExhausted,

    /// Ledger query or broadcast failure
    #[error("ledger provider error: {0}")]
    Provider(#[from] LedgerError),

    /// Persistence failure
    #[error("storage error: {0}")]
    Store(#[from] StorageError),

    /// Unknown address
    #[error("address not found: {0}")]
    NotFound(String),

    /// Malformed address in a request
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// A record lacks a field its status requires
    #[error("invalid wallet record: {0}")]
    InvalidRecord(String),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(#[from] super::config::ConfigError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PoolError {
    /// Check if this is a retryable error
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PoolError::PoolExhausted | PoolError::Provider(_) | PoolError::Store(_)
        )
    }

    /// Get error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            PoolError::PoolExhausted => "POOL_EXHAUSTED",
            PoolError::Provider(_) => "PROVIDER_ERROR",
            PoolError::Store(_) => "STORE_ERROR",
            PoolError::NotFound(_) => "NOT_FOUND",
            PoolError::InvalidAddress(_) => "INVALID_ADDRESS",
            PoolError::InvalidRecord(_) => "INVALID_RECORD",
            PoolError::Config(_) => "CONFIG_ERROR",
            PoolError::Io(_) => "IO_ERROR",
        }
    }
}

/// Result type alias using PoolError
pub type Result<T> = std::result::Result<T, PoolError>;
