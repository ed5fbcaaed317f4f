//! trxpool - Tron Deposit Address Pool
//!
//! Leases single-use TRX deposit addresses to merchant customers, watches
//! the chain for deposits into them, sweeps funded addresses to the
//! merchant's collection address and returns them to the pool.
//!
//! ## Components
//!
//! 1. **Wallet Pool** - lease allocation with a pool ceiling
//! 2. **Deposit Monitor** - idle/active block polling
//! 3. **Sweep Executor** - balance-minus-fee transfer to the collection address
//! 4. **Fee Estimator** - chain bandwidth price with a static fallback
//! 5. **Expiry Reaper** - reclaims leases that never received a deposit
//! 6. **Webhook Notifier** - fire-and-forget GET callbacks

pub mod api;
pub mod common;
pub mod fee;
pub mod ledger;
pub mod monitor;
pub mod notifier;
pub mod pool;
pub mod reaper;
pub mod service;
pub mod storage;
pub mod sweeper;
pub mod types;

// Re-exports: infrastructure
pub use common::{PoolConfig, PoolError, Result};

// Re-exports: components
pub use fee::FeeEstimator;
pub use monitor::{DepositMonitor, TickResult};
pub use notifier::{ChannelNotifier, HttpNotifier, Notification, Notifier};
pub use pool::WalletPool;
pub use reaper::ExpiryReaper;
pub use service::{BackgroundTasks, PoolService};
pub use sweeper::{SweepExecutor, SweepOutcome};

// Re-exports: ledger and storage
pub use ledger::{LedgerError, LedgerProvider, TronGridClient};
pub use storage::{MemoryWalletStore, SqliteWalletStore, WalletStore};

// Re-exports: types
pub use types::{Lease, LeaseKind, LeaseOutcome, PoolStats, WalletRecord, WalletStatus};
