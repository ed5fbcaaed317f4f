//! Environment-based Configuration for the Wallet Pool
//!
//! Every setting has a default, so an empty environment yields a working
//! mainnet configuration. Values come from the process environment (a `.env`
//! file is loaded by the binary before this runs).
//!
//! # Environment Variables
//!
//! ## Ledger
//! - `TRXPOOL_NETWORK` - "mainnet", "shasta" or "nile" (default: "mainnet")
//! - `TRXPOOL_API_URL` - TronGrid-compatible endpoint (default: per network)
//! - `TRXPOOL_API_KEY` - TronGrid API key, sent as `TRON-PRO-API-KEY`
//!
//! ## Pool
//! - `TRXPOOL_DB_PATH` - SQLite file (default: "./data/address.db")
//! - `TRXPOOL_MAX_WALLETS` - pool ceiling (default: 20)
//! - `TRXPOOL_LEASE_TIMEOUT_MINUTES` - unpaid lease lifetime (default: 7)
//!
//! ## Timers
//! - `TRXPOOL_REAPER_INTERVAL_SECS` (default: 60)
//! - `TRXPOOL_CONFIRMATION_DELAY_SECS` (default: 60)
//! - `TRXPOOL_IDLE_POLL_SECS` (default: 6)
//! - `TRXPOOL_ACTIVE_POLL_SECS` (default: 10)
//! - `TRXPOOL_WEBHOOK_TIMEOUT_SECS` (default: 10)
//!
//! ## Optional Settings
//! - `TRXPOOL_FALLBACK_FEE_SUN` - fee used when the chain parameter is unavailable
//! - `TRXPOOL_PORT` - HTTP port (default: 80)
//! - `TRXPOOL_LOG_LEVEL` - Logging level (debug, info, warn, error)
//! - `TRXPOOL_LOG_JSON` - Set to "1" for JSON log lines

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Blocks the monitor may fall behind before it snaps to the tip
pub const RESYNC_THRESHOLD_BLOCKS: u64 = 10;

/// Upper bound on blocks scanned per monitor tick
pub const MAX_BLOCKS_PER_TICK: u64 = 5;

/// Assumed size of a native transfer, in bytes
pub const SWEEP_TX_SIZE_BYTES: u64 = 350;

/// Fee-per-byte used when the chain does not publish the parameter
pub const DEFAULT_FEE_PER_BYTE_SUN: u64 = 1_000;

/// Fee used when the chain parameter query fails
pub const FALLBACK_FEE_SUN: u64 = 400_000;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Tron network
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Mainnet,
    Shasta,
    Nile,
}

impl FromStr for Network {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mainnet" | "main" => Ok(Network::Mainnet),
            "shasta" => Ok(Network::Shasta),
            "nile" => Ok(Network::Nile),
            _ => Err(ConfigError::InvalidValue(
                "TRXPOOL_NETWORK".to_string(),
                format!("unknown network: {}", s),
            )),
        }
    }
}

impl Network {
    /// Default TronGrid endpoint for this network
    pub fn default_api_url(&self) -> &'static str {
        match self {
            Network::Mainnet => "https://api.trongrid.io",
            Network::Shasta => "https://api.shasta.trongrid.io",
            Network::Nile => "https://nile.trongrid.io",
        }
    }
}

/// Deposit monitor timing
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Delay between polls while no lease is outstanding
    pub idle_delay: Duration,
    /// Delay between polls while at least one lease is PENDING
    pub active_delay: Duration,
    /// Delay between deposit detection and the sweep
    pub confirmation_delay: Duration,
    pub resync_threshold: u64,
    pub max_blocks_per_tick: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            idle_delay: Duration::from_secs(6),
            active_delay: Duration::from_secs(10),
            confirmation_delay: Duration::from_secs(60),
            resync_threshold: RESYNC_THRESHOLD_BLOCKS,
            max_blocks_per_tick: MAX_BLOCKS_PER_TICK,
        }
    }
}

/// Expiry reaper timing
#[derive(Debug, Clone)]
pub struct ReaperConfig {
    pub interval: Duration,
    pub lease_timeout: Duration,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            lease_timeout: Duration::from_secs(7 * 60),
        }
    }
}

/// Fee estimation parameters
#[derive(Debug, Clone)]
pub struct FeeConfig {
    pub tx_size_bytes: u64,
    pub default_fee_per_byte: u64,
    pub fallback_fee: u64,
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            tx_size_bytes: SWEEP_TX_SIZE_BYTES,
            default_fee_per_byte: DEFAULT_FEE_PER_BYTE_SUN,
            fallback_fee: FALLBACK_FEE_SUN,
        }
    }
}

/// Main configuration struct
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub network: Network,
    pub api_url: String,
    pub api_key: Option<String>,
    pub db_path: PathBuf,
    pub port: u16,
    /// Maximum number of wallet records
    pub max_wallets: u64,
    pub monitor: MonitorConfig,
    pub reaper: ReaperConfig,
    pub fee: FeeConfig,
    pub webhook_timeout: Duration,
    pub log_level: String,
    pub log_json: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            network: Network::Mainnet,
            api_url: Network::Mainnet.default_api_url().to_string(),
            api_key: None,
            db_path: PathBuf::from("./data/address.db"),
            port: 80,
            max_wallets: 20,
            monitor: MonitorConfig::default(),
            reaper: ReaperConfig::default(),
            fee: FeeConfig::default(),
            webhook_timeout: Duration::from_secs(10),
            log_level: "info".to_string(),
            log_json: false,
        }
    }
}

impl PoolConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let network: Network = lookup("TRXPOOL_NETWORK")
            .unwrap_or_else(|| "mainnet".to_string())
            .parse()?;

        let api_url = lookup("TRXPOOL_API_URL")
            .unwrap_or_else(|| network.default_api_url().to_string());

        let api_key = lookup("TRXPOOL_API_KEY").filter(|k| !k.trim().is_empty());

        let db_path = lookup("TRXPOOL_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.db_path);

        let port = parse_or(&lookup, "TRXPOOL_PORT", defaults.port)?;

        let max_wallets = parse_or(&lookup, "TRXPOOL_MAX_WALLETS", defaults.max_wallets)?;
        if max_wallets == 0 {
            return Err(ConfigError::InvalidValue(
                "TRXPOOL_MAX_WALLETS".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        let lease_timeout_minutes: u64 = parse_or(&lookup, "TRXPOOL_LEASE_TIMEOUT_MINUTES", 7)?;
        let reaper = ReaperConfig {
            interval: secs_or(&lookup, "TRXPOOL_REAPER_INTERVAL_SECS", 60)?,
            lease_timeout: Duration::from_secs(lease_timeout_minutes * 60),
        };

        let monitor = MonitorConfig {
            idle_delay: secs_or(&lookup, "TRXPOOL_IDLE_POLL_SECS", 6)?,
            active_delay: secs_or(&lookup, "TRXPOOL_ACTIVE_POLL_SECS", 10)?,
            confirmation_delay: secs_or(&lookup, "TRXPOOL_CONFIRMATION_DELAY_SECS", 60)?,
            ..MonitorConfig::default()
        };

        let fee = FeeConfig {
            fallback_fee: parse_or(&lookup, "TRXPOOL_FALLBACK_FEE_SUN", FALLBACK_FEE_SUN)?,
            ..FeeConfig::default()
        };

        let webhook_timeout = secs_or(&lookup, "TRXPOOL_WEBHOOK_TIMEOUT_SECS", 10)?;

        let log_level = lookup("TRXPOOL_LOG_LEVEL").unwrap_or_else(|| "info".to_string());
        let log_json = lookup("TRXPOOL_LOG_JSON").map(|v| v == "1").unwrap_or(false);

        Ok(Self {
            network,
            api_url,
            api_key,
            db_path,
            port,
            max_wallets,
            monitor,
            reaper,
            fee,
            webhook_timeout,
            log_level,
            log_json,
        })
    }

    /// Log configuration summary (hiding the API key)
    pub fn summary(&self) {
        tracing::info!(
            network = ?self.network,
            api_url = %self.api_url,
            api_key = if self.api_key.is_some() { "set" } else { "unset" },
            db_path = %self.db_path.display(),
            port = self.port,
            max_wallets = self.max_wallets,
            lease_timeout_secs = self.reaper.lease_timeout.as_secs(),
            confirmation_delay_secs = self.monitor.confirmation_delay.as_secs(),
            "wallet pool configuration"
        );
    }
}

fn parse_or<F, T>(lookup: &F, var_name: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(var_name) {
        Some(value) => value.trim().parse().map_err(|_| {
            ConfigError::InvalidValue(var_name.to_string(), format!("cannot parse {:?}", value))
        }),
        None => Ok(default),
    }
}

fn secs_or<F>(lookup: &F, var_name: &str, default: u64) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    parse_or(lookup, var_name, default).map(Duration::from_secs)
}
