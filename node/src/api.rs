//! # REST + WebSocket API
//!
//! Builds the axum router that exposes the treasury over HTTP. All
//! endpoints share application state through axum's `State` extractor.
//!
//! ## Endpoints
//!
//! | Method | Path                  | Description                              |
//! |--------|-----------------------|------------------------------------------|
//! | GET    | `/health`             | Liveness probe                           |
//! | GET    | `/status`             | Treasury health summary                  |
//! | GET    | `/nav`                | Current NAV report and in-flight proposal |
//! | GET    | `/nav/history`        | Superseded NAV reports, oldest first     |
//! | GET    | `/accounts/:address`  | Shares, balance and redemption requests  |
//! | GET    | `/redemptions/:id`    | One redemption request                   |
//! | GET    | `/collateral`         | Per-kind balances and coverage           |
//! | POST   | `/rpc`                | JSON-RPC 2.0 gateway (see [`crate::rpc`]) |
//! | GET    | `/ws`                 | Live treasury event stream               |
//!
//! The REST routes are read-only. Everything that moves funds or changes a
//! setting goes through `/rpc` as a signed call.

use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use ballast_contracts::{
    CircuitBreakerState, CollateralKind, ErrorCategory, EventSink, HealthSummary, NavReport,
    RedemptionId, RedemptionRequest, Treasury, TreasuryError, TreasuryEvent,
};
use ballast_contracts::nav_oracle::PendingAttestation;
use ballast_protocol::{amount_serde, Address, Clock};
use chrono::{DateTime, Utc};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::genesis::Genesis;
use crate::metrics::{NodeMetrics, SharedMetrics};
use crate::rpc::{self, JsonRpcError, JsonRpcRequest, JsonRpcResponse, NonceBook, RpcMethod};

/// Broadcast channel capacity for live event streaming. Slow WebSocket
/// clients past this many events get a lag notice instead.
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// The treasury behind the node's single serialization point.
pub type SharedTreasury = Arc<Mutex<Treasury>>;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state available to all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// The node's reported version string.
    pub version: String,
    /// Network label from genesis.
    pub network: String,
    /// The treasury. Every operation takes this lock.
    pub treasury: SharedTreasury,
    /// Committed treasury events, fanned out to WebSocket subscribers.
    pub event_tx: broadcast::Sender<TreasuryEvent>,
    /// Prometheus metrics.
    pub metrics: SharedMetrics,
    /// Last accepted nonce per signer, for signed RPC calls.
    pub nonces: Arc<NonceBook>,
}

impl AppState {
    /// Builds the treasury from `genesis` and wires its events into the
    /// broadcast channel and the metrics.
    pub fn from_genesis(genesis: &Genesis, clock: Arc<dyn Clock>, version: String) -> Result<Self> {
        let metrics = Arc::new(NodeMetrics::new().context("failed to register metrics")?);
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (treasury, _custody) = genesis.build(clock)?;
        let sink = BroadcastSink {
            tx: event_tx.clone(),
            metrics: Arc::clone(&metrics),
        };
        let state = Self {
            version,
            network: genesis.network.clone(),
            treasury: Arc::new(Mutex::new(treasury.with_event_sink(Arc::new(sink)))),
            event_tx,
            metrics,
            nonces: Arc::new(NonceBook::default()),
        };
        state.refresh_metrics();
        Ok(state)
    }

    /// Copies the current health summary into the gauges.
    pub fn refresh_metrics(&self) {
        let health = self.treasury.lock().health();
        match health {
            Ok(health) => self.metrics.observe_health(&health),
            Err(e) => tracing::warn!(error = %e, "health summary unavailable"),
        }
    }
}

/// Publishes committed treasury events to the broadcast channel.
pub struct BroadcastSink {
    tx: broadcast::Sender<TreasuryEvent>,
    metrics: SharedMetrics,
}

impl EventSink for BroadcastSink {
    fn publish(&self, event: &TreasuryEvent) {
        self.metrics
            .events_published_total
            .with_label_values(&[event.name()])
            .inc();
        // No subscribers is not an error.
        let _ = self.tx.send(event.clone());
    }
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the full axum [`Router`] with all API routes, CORS, and tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/nav", get(nav_handler))
        .route("/nav/history", get(nav_history_handler))
        .route("/accounts/:address", get(account_handler))
        .route("/redemptions/:id", get(redemption_handler))
        .route("/collateral", get(collateral_handler))
        .route("/rpc", post(rpc_handler))
        .route("/ws", get(ws_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Response Types
// ---------------------------------------------------------------------------

/// Response payload for `GET /status`.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub version: String,
    pub network: String,
    /// RFC 3339 time of the response.
    pub timestamp: String,
    pub treasury: HealthSummary,
}

/// Response payload for `GET /nav`.
#[derive(Debug, Serialize)]
pub struct NavResponse {
    #[serde(with = "amount_serde")]
    pub nav_per_share: u128,
    pub fresh: bool,
    pub seconds_since_last_report: Option<i64>,
    pub current: Option<NavReport>,
    pub pending: Option<PendingAttestation>,
    pub attestors: Vec<Address>,
    pub threshold: usize,
}

/// Response payload for `GET /accounts/:address`.
#[derive(Debug, Serialize)]
pub struct AccountResponse {
    pub address: Address,
    #[serde(with = "amount_serde")]
    pub shares: u128,
    #[serde(with = "amount_serde")]
    pub balance: u128,
    pub redemptions: Vec<RedemptionRequest>,
}

/// Response payload for `GET /redemptions/:id`.
#[derive(Debug, Serialize)]
pub struct RedemptionResponse {
    #[serde(flatten)]
    pub request: RedemptionRequest,
    /// When the request can be processed under the current delay.
    pub ready_at: Option<DateTime<Utc>>,
}

/// One row of `GET /collateral`.
#[derive(Debug, Serialize)]
pub struct CollateralBalance {
    pub kind: CollateralKind,
    /// Native precision.
    #[serde(with = "amount_serde")]
    pub balance: u128,
}

/// Response payload for `GET /collateral`.
#[derive(Debug, Serialize)]
pub struct CollateralResponse {
    pub approved: Vec<CollateralKind>,
    pub balances: Vec<CollateralBalance>,
    #[serde(with = "amount_serde")]
    pub total_collateral_value: u128,
    #[serde(with = "amount_serde::option")]
    pub collateral_ratio_bps: Option<u128>,
    pub circuit_breaker: CircuitBreakerState,
}

/// Generic error body returned by REST endpoints on failure.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// REST error: a status code plus an [`ErrorResponse`] body.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorResponse,
}

impl ApiError {
    fn not_found(message: String) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            body: ErrorResponse {
                error: message,
                reason: None,
            },
        }
    }
}

impl From<TreasuryError> for ApiError {
    fn from(err: TreasuryError) -> Self {
        let status = match err.category() {
            ErrorCategory::Validation | ErrorCategory::BoundViolation => StatusCode::BAD_REQUEST,
            ErrorCategory::Authorization => StatusCode::FORBIDDEN,
            ErrorCategory::StateConflict => StatusCode::CONFLICT,
            ErrorCategory::ResourceInsufficiency => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorCategory::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            body: ErrorResponse {
                error: err.to_string(),
                reason: Some(err.reason_code().to_string()),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health`: returns 200 while the process is up.
///
/// Liveness only. Treasury health is `/status`.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// `GET /status`
async fn status_handler(State(state): State<AppState>) -> Result<Json<StatusResponse>, ApiError> {
    let health = state.treasury.lock().health()?;
    Ok(Json(StatusResponse {
        version: state.version.clone(),
        network: state.network.clone(),
        timestamp: Utc::now().to_rfc3339(),
        treasury: health,
    }))
}

/// `GET /nav`
async fn nav_handler(State(state): State<AppState>) -> Json<NavResponse> {
    let treasury = state.treasury.lock();
    let now = treasury.now();
    let oracle = treasury.oracle();
    Json(NavResponse {
        nav_per_share: oracle.nav_per_share(),
        fresh: oracle.is_fresh(now),
        seconds_since_last_report: oracle.seconds_since_last_report(now),
        current: oracle.current_report().cloned(),
        pending: oracle.pending_attestation().cloned(),
        attestors: oracle.attestors(),
        threshold: oracle.threshold(),
    })
}

/// `GET /nav/history`
async fn nav_history_handler(State(state): State<AppState>) -> Json<Vec<NavReport>> {
    Json(state.treasury.lock().oracle().history().to_vec())
}

/// `GET /accounts/:address`: unknown addresses read as empty accounts.
async fn account_handler(
    Path(address): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<AccountResponse>, ApiError> {
    let address = Address::from(address);
    let treasury = state.treasury.lock();
    Ok(Json(AccountResponse {
        shares: treasury.shares_of(&address),
        balance: treasury.balance_of(&address)?,
        redemptions: treasury
            .vault()
            .requests_of(&address)
            .into_iter()
            .cloned()
            .collect(),
        address,
    }))
}

/// `GET /redemptions/:id`
async fn redemption_handler(
    Path(id): Path<RedemptionId>,
    State(state): State<AppState>,
) -> Result<Json<RedemptionResponse>, ApiError> {
    let treasury = state.treasury.lock();
    let vault = treasury.vault();
    let request = vault
        .redemption_request(id)
        .ok_or_else(|| ApiError::not_found(format!("redemption request {id} not found")))?;
    Ok(Json(RedemptionResponse {
        request: request.clone(),
        ready_at: vault.redemption_ready_at(id),
    }))
}

/// `GET /collateral`
async fn collateral_handler(State(state): State<AppState>) -> Result<Json<CollateralResponse>, ApiError> {
    let treasury = state.treasury.lock();
    let vault = treasury.vault();
    Ok(Json(CollateralResponse {
        approved: treasury.approved_collateral(),
        balances: vault
            .collateral_balances()
            .iter()
            .map(|(kind, balance)| CollateralBalance {
                kind: kind.clone(),
                balance: *balance,
            })
            .collect(),
        total_collateral_value: vault.total_collateral_value(),
        collateral_ratio_bps: treasury.collateral_ratio_bps()?,
        circuit_breaker: vault.circuit_breaker().clone(),
    }))
}

/// `POST /rpc`: JSON-RPC 2.0 gateway.
async fn rpc_handler(
    State(state): State<AppState>,
    Json(req): Json<JsonRpcRequest>,
) -> Json<JsonRpcResponse> {
    if req.jsonrpc != "2.0" {
        return Json(JsonRpcResponse::from_outcome(
            req.id,
            Err(JsonRpcError::new(
                rpc::INVALID_REQUEST,
                "Invalid Request: jsonrpc must be \"2.0\"",
            )),
        ));
    }

    let started = Instant::now();
    let outcome = rpc::dispatch(&state, &req.method, req.params);
    state
        .metrics
        .rpc_latency_seconds
        .observe(started.elapsed().as_secs_f64());

    // Unknown method names would make the label set unbounded.
    let method = match RpcMethod::parse(&req.method) {
        Some(_) => req.method.as_str(),
        None => "unknown",
    };
    let label = if outcome.is_ok() { "ok" } else { "error" };
    state
        .metrics
        .rpc_requests_total
        .with_label_values(&[method, label])
        .inc();
    if let Err(err) = &outcome {
        tracing::debug!(method = %req.method, code = err.code, message = %err.message, "rpc call failed");
    }
    state.refresh_metrics();

    Json(JsonRpcResponse::from_outcome(req.id, outcome))
}

/// `GET /ws`: WebSocket upgrade for live event streaming.
///
/// Clients receive every committed [`TreasuryEvent`] as a JSON text frame.
/// Client messages are ignored.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
}

/// Forwards broadcast events until the client disconnects or the channel
/// closes.
async fn handle_ws_connection(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let mut rx = state.event_tx.subscribe();

    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Ok(ev) => {
                        let payload = match serde_json::to_string(&ev) {
                            Ok(s) => s,
                            Err(e) => {
                                tracing::warn!("failed to serialize ws event: {}", e);
                                continue;
                            }
                        };
                        if sender.send(Message::Text(payload)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("ws subscriber lagged by {} events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
