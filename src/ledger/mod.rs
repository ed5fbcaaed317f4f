//! Ledger Provider Module
//!
//! Everything the pool needs from the Tron network sits behind
//! [`LedgerProvider`]:
//! - block height and block contents for deposit detection
//! - account balances and the per-byte fee parameter for sweeps
//! - keypair generation for new deposit addresses
//! - building, signing and broadcasting a TRX transfer
//!
//! `TronGridClient` is the HTTP implementation; tests mock the trait.

pub mod keys;
pub mod tron;

use async_trait::async_trait;
use thiserror::Error;

pub use tron::TronGridClient;

/// Ledger errors
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error: {0}")]
    Api(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),
}

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Contract type of a transaction's first contract
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContractKind {
    /// Native TRX transfer
    Transfer,
    Other(String),
}

impl ContractKind {
    pub fn from_type_name(name: &str) -> Self {
        match name {
            "TransferContract" => ContractKind::Transfer,
            other => ContractKind::Other(other.to_string()),
        }
    }
}

/// One transaction as seen in a block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerTransaction {
    pub txid: String,
    /// Execution result was SUCCESS
    pub success: bool,
    pub kind: ContractKind,
    /// Sender, base58
    pub from: String,
    /// Recipient, base58
    pub to: String,
    /// Amount in SUN
    pub amount: u64,
}

impl LedgerTransaction {
    /// A successful native transfer, the only kind that counts as a deposit
    pub fn is_successful_transfer(&self) -> bool {
        self.success && self.kind == ContractKind::Transfer
    }
}

/// Freshly generated account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keypair {
    pub address: String,
    /// Hex-encoded secret key
    pub private_key: String,
}

/// Everything needed to move TRX out of a pool wallet
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub from: String,
    pub to: String,
    pub amount: u64,
    pub private_key: String,
}

/// Result of a broadcast
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastReceipt {
    pub accepted: bool,
    pub txid: String,
    /// Rejection reason reported by the node
    pub message: Option<String>,
}

impl BroadcastReceipt {
    pub fn accepted(txid: impl Into<String>) -> Self {
        Self {
            accepted: true,
            txid: txid.into(),
            message: None,
        }
    }

    pub fn rejected(txid: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            accepted: false,
            txid: txid.into(),
            message: Some(message.into()),
        }
    }
}

/// Ledger operations used by the pool
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerProvider: Send + Sync {
    /// Height of the latest block
    async fn current_block_height(&self) -> LedgerResult<u64>;

    /// Transactions in block `height`, empty for an empty block
    async fn get_block(&self, height: u64) -> LedgerResult<Vec<LedgerTransaction>>;

    /// Balance in SUN, zero for an account that was never activated
    async fn get_balance(&self, address: &str) -> LedgerResult<u64>;

    /// The `getTransactionFee` chain parameter, if the node reports one
    async fn fee_per_byte(&self) -> LedgerResult<Option<u64>>;

    /// Generate a new account
    async fn create_keypair(&self) -> LedgerResult<Keypair>;

    /// Build, sign and broadcast a TRX transfer
    async fn send_transfer(&self, request: &TransferRequest) -> LedgerResult<BroadcastReceipt>;
}
