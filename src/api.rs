//! HTTP API
//!
//! Endpoints:
//! - GET /newAddress?notifyurl=&collect_address=&extra= - Lease a deposit address
//! - GET /balance?address= - Live balance of any address, in TRX
//! - GET /trans?address= - Trigger a manual sweep
//! - GET /stats - Pool occupancy
//! - GET /health - Health check
//!
//! Responses are always HTTP 200 with a numeric `code` in the JSON body:
//! 0 ok, 4 not found, 6 missing params, 8 invalid address, 500 internal,
//! 503 pool exhausted.

use axum::{
    extract::{Query, Request, State},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::common::error::PoolError;
use crate::common::logging::{generate_correlation_id, log_api_request, log_api_response};
use crate::ledger::keys;
use crate::service::PoolService;
use crate::types::units::sun_to_trx_string;

/// Shared app state type
pub type AppState = Arc<PoolService>;

pub const CODE_OK: u16 = 0;
pub const CODE_NOT_FOUND: u16 = 4;
pub const CODE_MISSING_PARAMS: u16 = 6;
pub const CODE_INVALID_ADDRESS: u16 = 8;
pub const CODE_INTERNAL: u16 = 500;
pub const CODE_EXHAUSTED: u16 = 503;

// ============================================================================
// Request / response types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct NewAddressQuery {
    pub notifyurl: Option<String>,
    pub collect_address: Option<String>,
    pub extra: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AddressQuery {
    pub address: Option<String>,
}

/// Body of every pool endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiResponse {
    pub code: u16,
    pub msg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trx: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
}

impl ApiResponse {
    pub fn ok() -> Self {
        Self {
            code: CODE_OK,
            msg: "ok".to_string(),
            ..Default::default()
        }
    }

    pub fn error(code: u16, msg: impl Into<String>) -> Self {
        Self {
            code,
            msg: msg.into(),
            ..Default::default()
        }
    }

    fn missing_params() -> Self {
        Self::error(CODE_MISSING_PARAMS, "Missing params")
    }
}

impl From<&PoolError> for ApiResponse {
    fn from(e: &PoolError) -> Self {
        match e {
            PoolError::PoolExhausted => {
                Self::error(CODE_EXHAUSTED, "No wallet available. Please try again later.")
            }
            PoolError::NotFound(_) => Self::error(CODE_NOT_FOUND, "Address not found"),
            PoolError::InvalidAddress(address) => {
                Self::error(CODE_INVALID_ADDRESS, format!("Invalid address: {}", address))
            }
            other => Self::error(CODE_INTERNAL, other.to_string()),
        }
    }
}

/// Non-empty query value
fn required(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

// ============================================================================
// Router
// ============================================================================

pub fn create_router(service: PoolService) -> Router {
    let state: AppState = Arc::new(service);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/newAddress", get(handle_new_address))
        .route("/balance", get(handle_balance))
        .route("/trans", get(handle_trans))
        .route("/stats", get(handle_stats))
        .route("/health", get(handle_health))
        .layer(middleware::from_fn(log_requests))
        .layer(cors)
        .with_state(state)
}

/// Serve until `shutdown` resolves
pub async fn start_server<F>(service: PoolService, port: u16, shutdown: F) -> std::io::Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let app = create_router(service);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "HTTP API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}

async fn log_requests(req: Request, next: Next) -> Response {
    let correlation_id = generate_correlation_id();
    let method = req.method().to_string();
    let path = req.uri().path().to_string();
    let started = Instant::now();

    log_api_request(&method, &path, &correlation_id);
    let response = next.run(req).await;
    log_api_response(
        &method,
        &path,
        response.status().as_u16(),
        started.elapsed().as_millis() as u64,
        &correlation_id,
    );

    response
}

// ============================================================================
// Handlers
// ============================================================================

async fn handle_new_address(
    State(service): State<AppState>,
    Query(query): Query<NewAddressQuery>,
) -> Json<ApiResponse> {
    let (notify_url, collect_address) =
        match (required(query.notifyurl), required(query.collect_address)) {
            (Some(n), Some(c)) => (n, c),
            _ => return Json(ApiResponse::missing_params()),
        };

    if !keys::is_valid_address(&collect_address) {
        return Json(ApiResponse::from(&PoolError::InvalidAddress(collect_address)));
    }

    let extra = required(query.extra);
    match service
        .lease_address(&notify_url, &collect_address, extra)
        .await
    {
        Ok(outcome) => Json(ApiResponse {
            address: Some(outcome.address),
            kind: Some(outcome.kind.to_string()),
            ..ApiResponse::ok()
        }),
        Err(e) => Json(ApiResponse::from(&e)),
    }
}

async fn handle_balance(
    State(service): State<AppState>,
    Query(query): Query<AddressQuery>,
) -> Json<ApiResponse> {
    let address = match required(query.address) {
        Some(address) => address,
        None => return Json(ApiResponse::missing_params()),
    };

    match service.balance(&address).await {
        Ok(sun) => Json(ApiResponse {
            trx: Some(sun_to_trx_string(sun)),
            ..ApiResponse::ok()
        }),
        Err(e) => Json(ApiResponse::from(&e)),
    }
}

async fn handle_trans(
    State(service): State<AppState>,
    Query(query): Query<AddressQuery>,
) -> Json<ApiResponse> {
    let address = match required(query.address) {
        Some(address) => address,
        None => return Json(ApiResponse::missing_params()),
    };

    match service.get_wallet(&address).await {
        Ok(Some(_)) => {}
        Ok(None) => return Json(ApiResponse::from(&PoolError::NotFound(address))),
        Err(e) => return Json(ApiResponse::from(&e)),
    }

    // The sweep outcome is only logged; the caller gets an acknowledgement
    let sweep_service = service.clone();
    tokio::spawn(async move {
        match sweep_service.trigger_sweep(&address).await {
            Ok(outcome) => info!(address = %address, outcome = %outcome, "Manual sweep finished"),
            Err(e) => warn!(address = %address, error = %e, "Manual sweep failed"),
        }
    });

    Json(ApiResponse {
        info: Some("Manual sweep triggered".to_string()),
        ..ApiResponse::ok()
    })
}

async fn handle_stats(State(service): State<AppState>) -> Response {
    match service.stats().await {
        Ok(stats) => Json(stats).into_response(),
        Err(e) => Json(ApiResponse::from(&e)).into_response(),
    }
}

async fn handle_health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "trxpool",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::config::PoolConfig;
    use crate::ledger::{Keypair, MockLedgerProvider};
    use crate::notifier::ChannelNotifier;
    use crate::storage::{MemoryWalletStore, WalletStore};
    use crate::types::wallet::{Lease, PoolStats, WalletRecord};
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    const COLLECT: &str = "T9yD14Nj9j7xAB4dbGeiX9h8unkKHxuWwb";

    fn app(store: Arc<MemoryWalletStore>, ledger: MockLedgerProvider, max_wallets: u64) -> Router {
        let (notifier, _rx) = ChannelNotifier::new();
        let config = PoolConfig {
            max_wallets,
            ..PoolConfig::default()
        };
        create_router(PoolService::new(
            config,
            store,
            Arc::new(ledger),
            Arc::new(notifier),
        ))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(app: Router, uri: &str) -> T {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    fn keypair_ledger() -> MockLedgerProvider {
        let mut ledger = MockLedgerProvider::new();
        ledger.expect_create_keypair().returning(|| {
            Ok(Keypair {
                address: "TNewWallet".to_string(),
                private_key: "k".to_string(),
            })
        });
        ledger
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = app(Arc::new(MemoryWalletStore::new()), MockLedgerProvider::new(), 20);
        let body: serde_json::Value = get_json(app, "/health").await;
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_new_address() {
        let store = Arc::new(MemoryWalletStore::new());
        let app = app(store.clone(), keypair_ledger(), 20);

        let uri = format!(
            "/newAddress?notifyurl=https%3A%2F%2Fshop.example%2Fhook&collect_address={}&extra=order-5",
            COLLECT
        );
        let body: ApiResponse = get_json(app, &uri).await;

        assert_eq!(body.code, CODE_OK);
        assert_eq!(body.msg, "ok");
        assert_eq!(body.address.as_deref(), Some("TNewWallet"));
        assert_eq!(body.kind.as_deref(), Some("new"));

        let record = store.get("TNewWallet").await.unwrap().unwrap();
        assert_eq!(record.notify_url.as_deref(), Some("https://shop.example/hook"));
        assert_eq!(record.extra_data.as_deref(), Some("order-5"));
    }

    #[tokio::test]
    async fn test_new_address_missing_params() {
        let app = app(Arc::new(MemoryWalletStore::new()), MockLedgerProvider::new(), 20);
        let body: ApiResponse = get_json(app, "/newAddress?notifyurl=&collect_address=T").await;

        assert_eq!(body.code, CODE_MISSING_PARAMS);
        assert_eq!(body.msg, "Missing params");
    }

    #[tokio::test]
    async fn test_new_address_invalid_collect_address() {
        let app = app(Arc::new(MemoryWalletStore::new()), MockLedgerProvider::new(), 20);
        let body: ApiResponse =
            get_json(app, "/newAddress?notifyurl=https://hook&collect_address=nope").await;

        assert_eq!(body.code, CODE_INVALID_ADDRESS);
    }

    #[tokio::test]
    async fn test_new_address_exhausted() {
        let app = app(Arc::new(MemoryWalletStore::new()), MockLedgerProvider::new(), 0);
        let uri = format!("/newAddress?notifyurl=https://hook&collect_address={}", COLLECT);
        let body: ApiResponse = get_json(app, &uri).await;

        assert_eq!(body.code, CODE_EXHAUSTED);
        assert_eq!(body.msg, "No wallet available. Please try again later.");
    }

    #[tokio::test]
    async fn test_balance_in_trx() {
        let mut ledger = MockLedgerProvider::new();
        ledger.expect_get_balance().returning(|_| Ok(1_500_000));

        let app = app(Arc::new(MemoryWalletStore::new()), ledger, 20);
        let body: ApiResponse = get_json(app, &format!("/balance?address={}", COLLECT)).await;

        assert_eq!(body.code, CODE_OK);
        assert_eq!(body.trx.as_deref(), Some("1.5"));
    }

    #[tokio::test]
    async fn test_trans_unknown_address() {
        let app = app(Arc::new(MemoryWalletStore::new()), MockLedgerProvider::new(), 20);
        let body: ApiResponse = get_json(app, "/trans?address=TUnknown").await;

        assert_eq!(body.code, CODE_NOT_FOUND);
        assert_eq!(body.msg, "Address not found");
    }

    #[tokio::test]
    async fn test_trans_acknowledges_known_address() {
        let store = Arc::new(MemoryWalletStore::new());
        store
            .insert(&WalletRecord::new_leased(
                "TLeased".to_string(),
                "k".to_string(),
                &Lease::new("https://hook", COLLECT, None),
                0,
            ))
            .await
            .unwrap();

        let mut ledger = MockLedgerProvider::new();
        ledger.expect_get_balance().returning(|_| Ok(0));
        ledger.expect_fee_per_byte().returning(|| Ok(None));

        let app = app(store, ledger, 20);
        let body: ApiResponse = get_json(app, "/trans?address=TLeased").await;

        assert_eq!(body.code, CODE_OK);
        assert_eq!(body.info.as_deref(), Some("Manual sweep triggered"));
    }

    #[tokio::test]
    async fn test_stats_endpoint() {
        let store = Arc::new(MemoryWalletStore::new());
        store
            .insert(&WalletRecord::new_free("TFree".to_string(), "k".to_string(), 0))
            .await
            .unwrap();

        let app = app(store, MockLedgerProvider::new(), 20);
        let stats: PoolStats = get_json(app, "/stats").await;

        assert_eq!(stats.total, 1);
        assert_eq!(stats.free, 1);
        assert_eq!(stats.max_wallets, 20);
    }
}
