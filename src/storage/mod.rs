//! Storage Layer Module
//!
//! Provides persistence for wallet records.
//!
//! This module contains:
//! - Storage trait definition for abstraction
//! - SQLite implementation for production
//! - In-memory implementation for testing

pub mod memory;
pub mod sqlite;
pub mod traits;

// Re-exports for convenience
pub use memory::MemoryWalletStore;
pub use sqlite::SqliteWalletStore;
pub use traits::{StorageError, StorageResult, WalletStore};
