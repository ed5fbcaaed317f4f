//! Common Infrastructure Module
//!
//! This module contains:
//! - Configuration loading from environment variables
//! - Structured logging setup
//! - Common error types

pub mod config;
pub mod error;
pub mod logging;

// Re-exports for convenience
pub use config::{ConfigError, FeeConfig, MonitorConfig, Network, PoolConfig, ReaperConfig};
pub use error::{PoolError, Result};
pub use logging::{
    generate_correlation_id, init_from_config, init_logging, log_api_request, log_api_response,
    log_deposit_event, log_lease_event, log_sweep_event, EventCategory, LogEvent, LogLevel,
    LoggingError,
};
