//! Shared fixtures for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

use trxpool::common::config::{FeeConfig, MonitorConfig, PoolConfig};
use trxpool::ledger::{
    BroadcastReceipt, ContractKind, Keypair, LedgerError, LedgerProvider, LedgerResult,
    LedgerTransaction, TransferRequest,
};
use trxpool::{ChannelNotifier, Notification, PoolService, WalletStatus, WalletStore};

pub const COLLECT: &str = "T9yD14Nj9j7xAB4dbGeiX9h8unkKHxuWwb";

#[derive(Default)]
struct LedgerState {
    height: u64,
    blocks: HashMap<u64, Vec<LedgerTransaction>>,
    balances: HashMap<String, u64>,
    fee_per_byte: Option<u64>,
    transfers: Vec<TransferRequest>,
    keys_issued: usize,
    offline: bool,
}

/// Scripted in-memory chain
#[derive(Default)]
pub struct FakeLedger {
    state: Mutex<LedgerState>,
}

impl FakeLedger {
    pub fn new(height: u64, fee_per_byte: Option<u64>) -> Arc<Self> {
        let ledger = Self::default();
        {
            let mut state = ledger.state.lock().unwrap();
            state.height = height;
            state.fee_per_byte = fee_per_byte;
        }
        Arc::new(ledger)
    }

    /// Append a block holding one successful transfer and credit the recipient
    pub fn mine_transfer(&self, to: &str, amount: u64) -> u64 {
        let mut state = self.state.lock().unwrap();
        state.height += 1;
        let height = state.height;

        state.blocks.insert(
            height,
            vec![LedgerTransaction {
                txid: format!("deposit-{}", height),
                success: true,
                kind: ContractKind::Transfer,
                from: "TPayer".to_string(),
                to: to.to_string(),
                amount,
            }],
        );
        *state.balances.entry(to.to_string()).or_insert(0) += amount;
        height
    }

    pub fn advance(&self, blocks: u64) {
        self.state.lock().unwrap().height += blocks;
    }

    pub fn set_offline(&self, offline: bool) {
        self.state.lock().unwrap().offline = offline;
    }

    pub fn balance_of(&self, address: &str) -> u64 {
        let state = self.state.lock().unwrap();
        state.balances.get(address).copied().unwrap_or(0)
    }

    pub fn transfers(&self) -> Vec<TransferRequest> {
        self.state.lock().unwrap().transfers.clone()
    }

    fn check_online(&self) -> LedgerResult<()> {
        if self.state.lock().unwrap().offline {
            return Err(LedgerError::Api("node unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerProvider for FakeLedger {
    async fn current_block_height(&self) -> LedgerResult<u64> {
        self.check_online()?;
        Ok(self.state.lock().unwrap().height)
    }

    async fn get_block(&self, height: u64) -> LedgerResult<Vec<LedgerTransaction>> {
        self.check_online()?;
        let state = self.state.lock().unwrap();
        Ok(state.blocks.get(&height).cloned().unwrap_or_default())
    }

    async fn get_balance(&self, address: &str) -> LedgerResult<u64> {
        self.check_online()?;
        Ok(self.balance_of(address))
    }

    async fn fee_per_byte(&self) -> LedgerResult<Option<u64>> {
        self.check_online()?;
        Ok(self.state.lock().unwrap().fee_per_byte)
    }

    async fn create_keypair(&self) -> LedgerResult<Keypair> {
        self.check_online()?;
        let mut state = self.state.lock().unwrap();
        state.keys_issued += 1;
        Ok(Keypair {
            address: format!("TPool{:02}", state.keys_issued),
            private_key: format!("{:064x}", state.keys_issued),
        })
    }

    async fn send_transfer(&self, request: &TransferRequest) -> LedgerResult<BroadcastReceipt> {
        self.check_online()?;
        let mut state = self.state.lock().unwrap();

        let balance = state.balances.get(&request.from).copied().unwrap_or(0);
        if request.amount > balance {
            return Ok(BroadcastReceipt::rejected("", "balance is not sufficient"));
        }

        // The fee is burned along with the transfer
        state.balances.insert(request.from.clone(), 0);
        *state.balances.entry(request.to.clone()).or_insert(0) += request.amount;
        state.transfers.push(request.clone());

        Ok(BroadcastReceipt::accepted(format!(
            "sweep-{}",
            state.transfers.len()
        )))
    }
}

/// Configuration with a fee of exactly `fee` SUN and short timers
pub fn test_config(max_wallets: u64, fee: u64) -> PoolConfig {
    PoolConfig {
        max_wallets,
        monitor: MonitorConfig {
            confirmation_delay: Duration::from_millis(30),
            ..MonitorConfig::default()
        },
        fee: FeeConfig {
            tx_size_bytes: 1,
            default_fee_per_byte: fee,
            fallback_fee: fee,
        },
        ..PoolConfig::default()
    }
}

pub type Deliveries = UnboundedReceiver<(String, Notification)>;

pub fn build_service(
    config: PoolConfig,
    store: Arc<dyn WalletStore>,
    ledger: Arc<FakeLedger>,
) -> (PoolService, Deliveries) {
    let (notifier, rx) = ChannelNotifier::new();
    let service = PoolService::new(config, store, ledger, Arc::new(notifier));
    (service, rx)
}

pub async fn next_notification(rx: &mut Deliveries) -> (String, Notification) {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("notification not delivered in time")
        .expect("notifier channel closed")
}

/// Poll until `address` reaches `status`
pub async fn wait_for_status(store: &dyn WalletStore, address: &str, status: WalletStatus) {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let record = store.get(address).await.unwrap().unwrap();
            if record.status == status {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("{} never reached {}", address, status));
}
