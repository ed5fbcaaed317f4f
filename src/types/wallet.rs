//! Wallet Pool Types
//!
//! A wallet record is one managed deposit address. Its lease moves through:
//!
//! ```text
//! FREE → PENDING → PROCESSING → FREE      (swept)
//!                            ↘ PENDING   (sweep deferred or failed)
//! PENDING → FREE                          (lease expired)
//! ```

use serde::{Deserialize, Serialize};

/// Lease state of a wallet record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WalletStatus {
    /// Idle, available for a new lease
    Free,
    /// Leased, waiting for a deposit
    Pending,
    /// Deposit detected, waiting for the sweep
    Processing,
}

impl Default for WalletStatus {
    fn default() -> Self {
        Self::Free
    }
}

impl WalletStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "FREE",
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
        }
    }

    /// True while the record belongs to a customer
    pub fn is_leased(&self) -> bool {
        !matches!(self, Self::Free)
    }
}

impl std::fmt::Display for WalletStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for WalletStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "FREE" => Ok(Self::Free),
            "PENDING" => Ok(Self::Pending),
            "PROCESSING" => Ok(Self::Processing),
            other => Err(format!("unknown wallet status: {}", other)),
        }
    }
}

/// Customer-supplied lease fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    /// Webhook receiving deposit/collection notifications
    pub notify_url: String,
    /// Merchant address that receives the swept balance
    pub collect_address: String,
    /// Opaque customer tag echoed back in notifications
    pub extra: Option<String>,
}

impl Lease {
    pub fn new(
        notify_url: impl Into<String>,
        collect_address: impl Into<String>,
        extra: Option<String>,
    ) -> Self {
        Self {
            notify_url: notify_url.into(),
            collect_address: collect_address.into(),
            extra,
        }
    }
}

/// One managed deposit address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletRecord {
    /// Base58 address, primary key
    pub address: String,
    /// Hex private key controlling `address`
    #[serde(skip_serializing)]
    pub private_key: String,
    /// Current lease state
    pub status: WalletStatus,
    pub notify_url: Option<String>,
    pub collect_address: Option<String>,
    pub extra_data: Option<String>,
    /// Unix millis of the last lease-relevant transition
    pub updated_at: i64,
}

impl WalletRecord {
    /// A freshly provisioned, unleased record
    pub fn new_free(address: String, private_key: String, now: i64) -> Self {
        Self {
            address,
            private_key,
            status: WalletStatus::Free,
            notify_url: None,
            collect_address: None,
            extra_data: None,
            updated_at: now,
        }
    }

    /// A freshly provisioned record that is leased immediately
    pub fn new_leased(address: String, private_key: String, lease: &Lease, now: i64) -> Self {
        let mut record = Self::new_free(address, private_key, now);
        record.apply_lease(lease, now);
        record
    }

    /// FREE → PENDING with the lease fields
    pub fn apply_lease(&mut self, lease: &Lease, now: i64) {
        self.status = WalletStatus::Pending;
        self.notify_url = Some(lease.notify_url.clone());
        self.collect_address = Some(lease.collect_address.clone());
        self.extra_data = lease.extra.clone();
        self.updated_at = now;
    }

    /// Change status, keeping the lease fields
    pub fn set_status(&mut self, status: WalletStatus, now: i64) {
        self.status = status;
        self.updated_at = now;
    }

    /// Back to FREE; the lease fields are dropped
    pub fn release(&mut self) {
        self.status = WalletStatus::Free;
        self.notify_url = None;
        self.collect_address = None;
        self.extra_data = None;
    }

    /// PENDING lease older than `cutoff`
    pub fn is_expired(&self, cutoff: i64) -> bool {
        self.status == WalletStatus::Pending && self.updated_at < cutoff
    }

    pub fn has_lease_fields(&self) -> bool {
        self.notify_url.is_some() || self.collect_address.is_some() || self.extra_data.is_some()
    }
}

/// Current time in milliseconds since the epoch
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// How a lease request was satisfied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeaseKind {
    /// A FREE record was reused
    Reused,
    /// A new keypair was provisioned
    New,
}

impl std::fmt::Display for LeaseKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Reused => write!(f, "reused"),
            Self::New => write!(f, "new"),
        }
    }
}

/// Successful lease
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeaseOutcome {
    pub address: String,
    pub kind: LeaseKind,
}

/// Pool occupancy
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    pub total: u64,
    pub free: u64,
    pub pending: u64,
    pub processing: u64,
    pub max_wallets: u64,
}

impl std::fmt::Display for PoolStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Wallets: {}/{} | {} free | {} pending | {} processing",
            self.total, self.max_wallets, self.free, self.pending, self.processing
        )
    }
}
