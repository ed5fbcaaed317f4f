//! Shared Types Module
//!
//! Data types shared across the wallet pool.

pub mod units;
pub mod wallet;

// Re-exports for convenience
pub use units::{parse_trx, sun_to_display, sun_to_trx_string, SUN_PER_TRX};
pub use wallet::{
    now_millis, Lease, LeaseKind, LeaseOutcome, PoolStats, WalletRecord, WalletStatus,
};
