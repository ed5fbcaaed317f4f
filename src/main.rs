//! trxpool - Tron Deposit Address Pool
//!
//! Run modes:
//!   trxpool serve [--port <port>]   - HTTP API plus deposit monitor and expiry reaper
//!   trxpool sweep <address>         - Sweep one wallet now and print the outcome
//!   trxpool help                    - Show usage

use std::env;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use trxpool::api;
use trxpool::common::{init_from_config, PoolConfig};
use trxpool::{HttpNotifier, PoolService, SqliteWalletStore, TronGridClient};

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        print_usage();
        return ExitCode::SUCCESS;
    }

    let config = match PoolConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = init_from_config(&config) {
        eprintln!("{}", e);
        return ExitCode::FAILURE;
    }

    match args[1].as_str() {
        "serve" => run_server(config, &args[2..]).await,
        "sweep" => run_manual_sweep(config, &args[2..]).await,
        _ => {
            print_usage();
            ExitCode::SUCCESS
        }
    }
}

fn print_usage() {
    println!("trxpool - Tron Deposit Address Pool");
    println!();
    println!("Usage:");
    println!("  trxpool serve [--port <port>]   Start HTTP API, deposit monitor and expiry reaper");
    println!("  trxpool sweep <address>         Sweep one wallet now");
    println!("  trxpool help                    Show this message");
    println!();
    println!("Environment Variables:");
    println!("  TRXPOOL_NETWORK                 mainnet | shasta | nile (default: mainnet)");
    println!("  TRXPOOL_API_URL                 Full node HTTP endpoint");
    println!("  TRXPOOL_API_KEY                 TronGrid API key");
    println!("  TRXPOOL_DB_PATH                 SQLite file (default: ./data/address.db)");
    println!("  TRXPOOL_PORT                    HTTP port (default: 80)");
    println!("  TRXPOOL_MAX_WALLETS             Pool ceiling (default: 20)");
    println!("  TRXPOOL_LEASE_TIMEOUT_MINUTES   Lease expiry (default: 7)");
    println!("  TRXPOOL_CONFIRMATION_DELAY_SECS Delay before sweeping (default: 60)");
    println!("  TRXPOOL_LOG_LEVEL / TRXPOOL_LOG_JSON");
}

/// Build the service from configuration
fn create_service(config: PoolConfig) -> Result<PoolService, trxpool::PoolError> {
    let store = SqliteWalletStore::new(&config.db_path)?;
    let ledger = TronGridClient::new(&config.api_url, config.api_key.clone());
    let notifier = HttpNotifier::new(config.webhook_timeout);

    Ok(PoolService::new(
        config,
        Arc::new(store),
        Arc::new(ledger),
        Arc::new(notifier),
    ))
}

async fn run_server(mut config: PoolConfig, args: &[String]) -> ExitCode {
    // Parse arguments
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--port" if i + 1 < args.len() => {
                config.port = args[i + 1].parse().unwrap_or(config.port);
                i += 2;
            }
            _ => i += 1,
        }
    }

    config.summary();
    let port = config.port;

    let service = match create_service(config) {
        Ok(service) => service,
        Err(e) => {
            error!(error = %e, "Failed to start");
            return ExitCode::FAILURE;
        }
    };

    let shutdown = CancellationToken::new();
    let tasks = match service.spawn_background(shutdown.clone()).await {
        Ok(tasks) => tasks,
        Err(e) => {
            error!(error = %e, "Failed to start background workers");
            return ExitCode::FAILURE;
        }
    };

    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown requested");
        }
        signal.cancel();
    });

    let server_shutdown = shutdown.clone();
    let result = api::start_server(service, port, async move {
        server_shutdown.cancelled().await
    })
    .await;

    shutdown.cancel();
    tasks.join().await;

    match result {
        Ok(()) => {
            info!("Stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "API server error");
            ExitCode::FAILURE
        }
    }
}

async fn run_manual_sweep(config: PoolConfig, args: &[String]) -> ExitCode {
    let address = match args.first() {
        Some(address) => address.clone(),
        None => {
            eprintln!("Usage: trxpool sweep <address>");
            return ExitCode::FAILURE;
        }
    };

    let service = match create_service(config) {
        Ok(service) => service,
        Err(e) => {
            eprintln!("Failed to start: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match service.trigger_sweep(&address).await {
        Ok(outcome) => {
            println!("{}: {}", address, outcome);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{}: {}", address, e);
            ExitCode::FAILURE
        }
    }
}
