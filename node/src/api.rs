//! # Read API
//!
//! Builds the axum router over the ledger's query layer. The surface is
//! transport-thin: every endpoint delegates to `QueryService` (or, for
//! submission, the engine) and maps `ApiError` to its HTTP status with
//! the stable `{kind, message}` body.
//!
//! ## Endpoints
//!
//! | Method | Path               | Description                               |
//! |--------|--------------------|-------------------------------------------|
//! | GET    | `/health`          | Liveness probe                            |
//! | GET    | `/stats`           | Chain summary                             |
//! | GET    | `/blocks`          | Paged blocks, newest first                |
//! | GET    | `/block?id=`       | One block by height or hash               |
//! | GET    | `/transactions`    | Paged confirmed transactions              |
//! | GET    | `/transaction?id=` | One transaction by hash                   |
//! | POST   | `/transactions`    | Submit a signed transaction               |
//! | GET    | `/wallet?address=` | Account view with formatted balances      |
//! | GET    | `/contracts`       | Paged contract summaries                  |
//! | GET    | `/contract?address=`| Full contract record                     |
//! | GET    | `/validators`      | Validator set                             |
//! | GET    | `/staking_records` | Active stakes only (peer-safe)            |
//! | GET    | `/staking_records/all` | Every stake row (introspection)       |
//! | GET    | `/nodes`           | Node registry                             |
//! | GET    | `/mempool`         | Pending transactions in drain order       |

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use meridian_ledger::engine::Engine;
use meridian_ledger::query::{ApiError, QueryService};
use meridian_ledger::transaction::Transaction;

// ---------------------------------------------------------------------------
// State & plumbing
// ---------------------------------------------------------------------------

/// Shared application state. Cheap to clone — everything behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub query: QueryService,
}

impl AppState {
    pub fn new(engine: Arc<Engine>) -> Self {
        let query = QueryService::new(Arc::clone(&engine));
        Self { engine, query }
    }
}

/// `?page=&limit=` with engine-side clamping.
#[derive(Debug, Deserialize, Default)]
struct PageQuery {
    #[serde(default)]
    page: usize,
    #[serde(default)]
    limit: usize,
}

#[derive(Debug, Deserialize)]
struct IdQuery {
    id: String,
}

#[derive(Debug, Deserialize)]
struct AddressQuery {
    address: String,
}

#[derive(Debug, Deserialize, Default)]
struct LimitQuery {
    #[serde(default)]
    limit: usize,
}

/// Render an [`ApiError`] as its HTTP-shaped response.
struct ApiFailure(ApiError);

impl IntoResponse for ApiFailure {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.0)).into_response()
    }
}

impl From<ApiError> for ApiFailure {
    fn from(e: ApiError) -> Self {
        Self(e)
    }
}

type ApiResult<T> = Result<Json<T>, ApiFailure>;

fn ok<T>(value: Result<T, ApiError>) -> ApiResult<T> {
    value.map(Json).map_err(ApiFailure)
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the full router with CORS and request tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/blocks", get(blocks))
        .route("/block", get(block))
        .route("/transactions", get(transactions).post(submit_transaction))
        .route("/transaction", get(transaction))
        .route("/wallet", get(wallet))
        .route("/contracts", get(contracts))
        .route("/contract", get(contract))
        .route("/validators", get(validators))
        .route("/staking_records", get(staking_records))
        .route("/staking_records/all", get(all_staking_records))
        .route("/nodes", get(nodes))
        .route("/mempool", get(mempool))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}

async fn stats(State(state): State<AppState>) -> ApiResult<impl serde::Serialize> {
    ok(state.query.stats())
}

async fn blocks(
    State(state): State<AppState>,
    Query(q): Query<PageQuery>,
) -> ApiResult<impl serde::Serialize> {
    ok(state.query.blocks(q.page, q.limit))
}

async fn block(
    State(state): State<AppState>,
    Query(q): Query<IdQuery>,
) -> ApiResult<impl serde::Serialize> {
    ok(state.query.block(&q.id))
}

async fn transactions(
    State(state): State<AppState>,
    Query(q): Query<PageQuery>,
) -> ApiResult<impl serde::Serialize> {
    ok(state.query.transactions(q.page, q.limit))
}

async fn transaction(
    State(state): State<AppState>,
    Query(q): Query<IdQuery>,
) -> ApiResult<impl serde::Serialize> {
    ok(state.query.transaction(&q.id))
}

async fn submit_transaction(
    State(state): State<AppState>,
    Json(tx): Json<Transaction>,
) -> Response {
    match state.engine.submit_transaction(tx) {
        Ok(hash) => (
            StatusCode::ACCEPTED,
            Json(serde_json::json!({"hash": hash, "status": "pending"})),
        )
            .into_response(),
        Err(e) => ApiFailure(ApiError::from(e)).into_response(),
    }
}

async fn wallet(
    State(state): State<AppState>,
    Query(q): Query<AddressQuery>,
) -> ApiResult<impl serde::Serialize> {
    ok(state.query.wallet(&q.address))
}

async fn contracts(
    State(state): State<AppState>,
    Query(q): Query<PageQuery>,
) -> ApiResult<impl serde::Serialize> {
    ok(state.query.contracts(q.page, q.limit))
}

async fn contract(
    State(state): State<AppState>,
    Query(q): Query<AddressQuery>,
) -> ApiResult<impl serde::Serialize> {
    ok(state.query.contract(&q.address))
}

async fn validators(State(state): State<AppState>) -> ApiResult<impl serde::Serialize> {
    ok(state.query.validators())
}

async fn staking_records(
    State(state): State<AppState>,
    Query(q): Query<PageQuery>,
) -> ApiResult<impl serde::Serialize> {
    ok(state.query.staking_records(q.page, q.limit))
}

async fn all_staking_records(
    State(state): State<AppState>,
    Query(q): Query<PageQuery>,
) -> ApiResult<impl serde::Serialize> {
    ok(state.query.all_staking_records(q.page, q.limit))
}

async fn nodes(State(state): State<AppState>) -> ApiResult<impl serde::Serialize> {
    ok(state.query.nodes())
}

async fn mempool(
    State(state): State<AppState>,
    Query(q): Query<LimitQuery>,
) -> ApiResult<impl serde::Serialize> {
    ok(state.query.mempool(q.limit))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
