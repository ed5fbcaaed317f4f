//! TronGrid HTTP Client
//!
//! Talks to a full node through the `/wallet/*` HTTP API. Block data is
//! requested in hex form and addresses are converted to base58 locally.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

use super::keys;
use super::{
    BroadcastReceipt, ContractKind, Keypair, LedgerError, LedgerProvider, LedgerResult,
    LedgerTransaction, TransferRequest,
};

/// Header carrying the TronGrid API key
pub const API_KEY_HEADER: &str = "TRON-PRO-API-KEY";

/// Chain parameter holding the bandwidth price in SUN per byte
pub const FEE_PARAMETER_KEY: &str = "getTransactionFee";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// TronGrid HTTP client
#[derive(Debug, Clone)]
pub struct TronGridClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl TronGridClient {
    /// Create a new client with custom URL
    pub fn new(base_url: &str, api_key: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/wallet/{}", self.base_url, path)
    }

    async fn post<T>(&self, path: &str, body: &Value) -> LedgerResult<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        let mut request = self.client.post(self.url(path)).json(body);
        if let Some(key) = &self.api_key {
            request = request.header(API_KEY_HEADER, key);
        }

        let resp = request.send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(LedgerError::Api(format!("{} returned {}: {}", path, status, text)));
        }

        resp.json::<T>()
            .await
            .map_err(|e| LedgerError::Parse(format!("{}: {}", path, e)))
    }

    async fn get<T>(&self, path: &str) -> LedgerResult<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        let mut request = self.client.get(self.url(path));
        if let Some(key) = &self.api_key {
            request = request.header(API_KEY_HEADER, key);
        }

        let resp = request.send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(LedgerError::Api(format!("{} returned {}: {}", path, status, text)));
        }

        resp.json::<T>()
            .await
            .map_err(|e| LedgerError::Parse(format!("{}: {}", path, e)))
    }

    /// Build an unsigned transfer
    async fn create_transaction(&self, request: &TransferRequest) -> LedgerResult<Value> {
        let body = json!({
            "owner_address": request.from,
            "to_address": request.to,
            "amount": request.amount,
            "visible": true,
        });
        let tx: Value = self.post("createtransaction", &body).await?;

        if let Some(error) = tx.get("Error").and_then(Value::as_str) {
            return Err(LedgerError::Api(format!("createtransaction: {}", error)));
        }

        Ok(tx)
    }

    async fn broadcast(&self, signed: &Value) -> LedgerResult<BroadcastResponse> {
        self.post("broadcasttransaction", signed).await
    }
}

#[async_trait]
impl LedgerProvider for TronGridClient {
    async fn current_block_height(&self) -> LedgerResult<u64> {
        let block: BlockResponse = self.post("getnowblock", &json!({})).await?;
        block
            .height()
            .ok_or_else(|| LedgerError::Parse("getnowblock: missing block number".to_string()))
    }

    async fn get_block(&self, height: u64) -> LedgerResult<Vec<LedgerTransaction>> {
        let block: BlockResponse = self
            .post("getblockbynum", &json!({ "num": height }))
            .await?;
        Ok(block.into_transactions())
    }

    async fn get_balance(&self, address: &str) -> LedgerResult<u64> {
        let account: AccountResponse = self
            .post("getaccount", &json!({ "address": address, "visible": true }))
            .await?;
        Ok(account.balance)
    }

    async fn fee_per_byte(&self) -> LedgerResult<Option<u64>> {
        let params: ChainParametersResponse = self.get("getchainparameters").await?;
        Ok(params.fee_per_byte())
    }

    async fn create_keypair(&self) -> LedgerResult<Keypair> {
        Ok(keys::generate_keypair())
    }

    async fn send_transfer(&self, request: &TransferRequest) -> LedgerResult<BroadcastReceipt> {
        let mut tx = self.create_transaction(request).await?;

        let txid = tx
            .get("txID")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| LedgerError::Parse("createtransaction: missing txID".to_string()))?;
        let raw_data_hex = tx
            .get("raw_data_hex")
            .and_then(Value::as_str)
            .ok_or_else(|| LedgerError::Parse("createtransaction: missing raw_data_hex".to_string()))?;

        // Never sign a txID that does not hash the transaction we asked for
        if !keys::txid_matches(raw_data_hex, &txid) {
            return Err(LedgerError::Api(format!(
                "createtransaction: txID {} does not match raw data",
                txid
            )));
        }

        let signature = keys::sign_txid(&txid, &request.private_key)?;
        tx["signature"] = json!([signature]);

        debug!(txid = %txid, from = %request.from, to = %request.to, "Broadcasting transfer");
        let response = self.broadcast(&tx).await?;

        if response.result {
            Ok(BroadcastReceipt::accepted(response.txid.unwrap_or(txid)))
        } else {
            let message = response.reason();
            warn!(txid = %txid, code = ?response.code, message = %message, "Broadcast rejected");
            Ok(BroadcastReceipt::rejected(txid, message))
        }
    }
}

// ============================================================================
// Wire types
// ============================================================================

/// `getnowblock` / `getblockbynum` response
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BlockResponse {
    #[serde(rename = "blockID", default)]
    pub block_id: Option<String>,
    #[serde(default)]
    pub block_header: Option<BlockHeader>,
    #[serde(default)]
    pub transactions: Vec<BlockTransaction>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BlockHeader {
    pub raw_data: BlockHeaderRaw,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BlockHeaderRaw {
    #[serde(default)]
    pub number: Option<u64>,
    #[serde(default)]
    pub timestamp: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BlockTransaction {
    #[serde(rename = "txID")]
    pub tx_id: String,
    #[serde(default)]
    pub ret: Vec<TransactionResult>,
    pub raw_data: TransactionRaw,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransactionResult {
    #[serde(rename = "contractRet", default)]
    pub contract_ret: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransactionRaw {
    #[serde(default)]
    pub contract: Vec<Contract>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Contract {
    #[serde(rename = "type")]
    pub contract_type: String,
    pub parameter: ContractParameter,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContractParameter {
    #[serde(default)]
    pub value: Value,
}

/// Value of a `TransferContract`
#[derive(Debug, Clone, Deserialize)]
pub struct TransferValue {
    #[serde(default)]
    pub amount: u64,
    pub owner_address: String,
    pub to_address: String,
}

impl BlockResponse {
    pub fn height(&self) -> Option<u64> {
        self.block_header.as_ref().and_then(|h| h.raw_data.number)
    }

    /// Flatten the block into one entry per transaction, keyed on the first
    /// contract. Transfer values are decoded and their addresses converted
    /// to base58.
    pub fn into_transactions(self) -> Vec<LedgerTransaction> {
        self.transactions
            .into_iter()
            .filter_map(|tx| {
                let success = tx
                    .ret
                    .first()
                    .and_then(|r| r.contract_ret.as_deref())
                    .map(|r| r == "SUCCESS")
                    .unwrap_or(false);
                let contract = tx.raw_data.contract.into_iter().next()?;
                let kind = ContractKind::from_type_name(&contract.contract_type);

                let (from, to, amount) = match kind {
                    ContractKind::Transfer => {
                        let value: TransferValue =
                            match serde_json::from_value(contract.parameter.value) {
                                Ok(v) => v,
                                Err(e) => {
                                    warn!(txid = %tx.tx_id, error = %e, "Malformed transfer value");
                                    return None;
                                }
                            };
                        (
                            to_base58(&value.owner_address),
                            to_base58(&value.to_address),
                            value.amount,
                        )
                    }
                    ContractKind::Other(_) => (String::new(), String::new(), 0),
                };

                Some(LedgerTransaction {
                    txid: tx.tx_id,
                    success,
                    kind,
                    from,
                    to,
                    amount,
                })
            })
            .collect()
    }
}

/// Addresses may arrive hex or base58 depending on `visible`
fn to_base58(address: &str) -> String {
    if address.starts_with('T') {
        return address.to_string();
    }
    keys::hex_to_base58(address).unwrap_or_else(|_| address.to_string())
}

/// `getaccount` response; an unactivated account comes back as `{}`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccountResponse {
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub balance: u64,
}

/// `getchainparameters` response
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChainParametersResponse {
    #[serde(rename = "chainParameter", default)]
    pub chain_parameter: Vec<ChainParameter>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainParameter {
    pub key: String,
    #[serde(default)]
    pub value: Option<u64>,
}

impl ChainParametersResponse {
    pub fn fee_per_byte(&self) -> Option<u64> {
        self.chain_parameter
            .iter()
            .find(|p| p.key == FEE_PARAMETER_KEY)
            .and_then(|p| p.value)
    }
}

/// `broadcasttransaction` response
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BroadcastResponse {
    #[serde(default)]
    pub result: bool,
    #[serde(default)]
    pub txid: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    /// Hex-encoded UTF-8 text
    #[serde(default)]
    pub message: Option<String>,
}

impl BroadcastResponse {
    /// Human-readable rejection reason
    pub fn reason(&self) -> String {
        let message = self.message.as_deref().map(|m| {
            hex::decode(m)
                .ok()
                .and_then(|bytes| String::from_utf8(bytes).ok())
                .unwrap_or_else(|| m.to_string())
        });

        match (&self.code, message) {
            (Some(code), Some(message)) => format!("{}: {}", code, message),
            (Some(code), None) => code.clone(),
            (None, Some(message)) => message,
            (None, None) => "broadcast rejected".to_string(),
        }
    }
}
