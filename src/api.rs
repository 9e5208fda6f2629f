//! REST API server for bookledger
//!
//! Serves the node protocol routes peers and clients use (`/add_block`,
//! `/add_transaction`, `/get_chain`, `/new_nodes`, `/check_consensus`,
//! `/propagate`) plus operator endpoints under `/api`.

use axum::{
    extract::{rejection::JsonRejection, Request, State},
    http::{self, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::info;

use crate::blockchain::{Block, Ledger};
use crate::error::ChainError;
use crate::network::{ChainResponse, DEFAULT_MAX_PEER_FAILURES};
use crate::node::NodeState;
use crate::sync::{NodeSynchronizer, PropagationReport};
use crate::transaction::{Transaction, TransactionRequest};

/// Shared handle the route handlers operate on.
#[derive(Clone)]
pub struct Node {
    pub ledger: Arc<RwLock<Ledger>>,
    pub synchronizer: Arc<NodeSynchronizer>,
    pub node_id: String,
    // Orchestrator state, when running under `node::Node`.
    pub state: Option<Arc<RwLock<NodeState>>>,
    max_peer_failures: u32,
    api_stats: Arc<RwLock<ApiStats>>,
}

#[derive(Debug, Default)]
struct ApiStats {
    total_requests: u64,
    successful_requests: u64,
    failed_requests: u64,
    transactions_submitted: u64,
    blocks_created: u64,
    start_time: Option<Instant>,
}

impl ApiStats {
    fn new() -> Self {
        ApiStats {
            start_time: Some(Instant::now()),
            ..Default::default()
        }
    }

    fn record_request(&mut self, success: bool) {
        self.total_requests += 1;
        if success {
            self.successful_requests += 1;
        } else {
            self.failed_requests += 1;
        }
    }
}

impl Node {
    pub fn new(synchronizer: Arc<NodeSynchronizer>, node_id: impl Into<String>) -> Self {
        Self {
            ledger: synchronizer.ledger().clone(),
            synchronizer,
            node_id: node_id.into(),
            state: None,
            max_peer_failures: DEFAULT_MAX_PEER_FAILURES,
            api_stats: Arc::new(RwLock::new(ApiStats::new())),
        }
    }

    pub fn with_state(mut self, state: Arc<RwLock<NodeState>>) -> Self {
        self.state = Some(state);
        self
    }

    pub fn with_max_peer_failures(mut self, max_failures: u32) -> Self {
        self.max_peer_failures = max_failures;
        self
    }

    pub async fn get_stats(&self) -> ApiStatsResponse {
        let sync_stats = self.synchronizer.get_stats().await;
        let (chain_length, pending_transactions) = {
            let ledger = self.ledger.read().await;
            (ledger.len(), ledger.pending().len())
        };

        let stats = self.api_stats.read().await;
        let uptime = stats.start_time.map(|t| t.elapsed().as_secs()).unwrap_or(0);

        ApiStatsResponse {
            total_requests: stats.total_requests,
            successful_requests: stats.successful_requests,
            failed_requests: stats.failed_requests,
            transactions_submitted: stats.transactions_submitted,
            blocks_created: stats.blocks_created,
            resolutions_run: sync_stats.resolutions_run,
            chains_replaced: sync_stats.chains_replaced,
            chains_rejected: sync_stats.chains_rejected,
            peer_failures: sync_stats.peer_failures,
            chain_length,
            pending_transactions,
            uptime_seconds: uptime,
        }
    }
}

// ============================================================================
// API Error Handling
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    Chain(ChainError),
    InvalidInput(String),
    NotFound(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Chain(e) => {
                let status = match e {
                    ChainError::ValidationError(_) => StatusCode::BAD_REQUEST,
                    ChainError::TransportError(_) => StatusCode::BAD_GATEWAY,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, e.to_string())
            }
            ApiError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<ChainError> for ApiError {
    fn from(err: ChainError) -> Self {
        ApiError::Chain(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::InvalidInput(rejection.body_text())
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Serialize)]
pub struct BlockCreatedResponse {
    pub message: String,
    pub index: u64,
    pub transaction: Vec<Transaction>,
    pub previous_hash: String,
}

#[derive(Serialize)]
pub struct TransactionAcceptedResponse {
    pub message: String,
    pub index: u64,
}

#[derive(Deserialize)]
pub struct NewNodesRequest {
    #[serde(default)]
    pub nodes: Option<Vec<String>>,
}

#[derive(Serialize)]
pub struct NewNodesResponse {
    pub message: String,
    pub total_nodes: Vec<String>,
}

#[derive(Serialize)]
pub struct ConsensusResponse {
    pub message: String,
    pub replaced: bool,
    pub chain: Vec<Block>,
}

#[derive(Serialize)]
pub struct PeerView {
    pub address: String,
    pub consecutive_failures: u32,
    pub successful_fetches: u64,
    pub last_seen_secs_ago: Option<u64>,
    pub unreliable: bool,
}

#[derive(Serialize)]
pub struct ApiStatsResponse {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub transactions_submitted: u64,
    pub blocks_created: u64,
    pub resolutions_run: u64,
    pub chains_replaced: u64,
    pub chains_rejected: u64,
    pub peer_failures: u64,
    pub chain_length: usize,
    pub pending_transactions: usize,
    pub uptime_seconds: u64,
}

// ============================================================================
// Middleware
// ============================================================================

async fn stats_middleware(State(node): State<Arc<Node>>, req: Request, next: Next) -> Response {
    let response = next.run(req).await;

    let success = response.status().is_success();
    let mut stats = node.api_stats.write().await;
    stats.record_request(success);

    response
}

/// Logs method, path, status, duration and the orchestrator state for every
/// request.
async fn logging_middleware(
    State(node): State<Arc<Node>>,
    req: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = next.run(req).await;

    let duration = start.elapsed();
    let status = response.status();

    let node_state = if let Some(s) = &node.state {
        format!("{:?}", *s.read().await)
    } else {
        "unknown".to_string()
    };

    tracing::info!(
        method = %method,
        path = %path,
        status = %status.as_u16(),
        duration_ms = %duration.as_millis(),
        node_state = %node_state,
        "api.request"
    );

    response
}

// ============================================================================
// API Server
// ============================================================================

/// Build the router with every endpoint and middleware attached.
pub fn build_api_router(node: Arc<Node>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods(vec![
            http::Method::GET,
            http::Method::POST,
            http::Method::OPTIONS,
        ])
        .allow_headers(vec![http::header::CONTENT_TYPE]);

    let operator_routes = Router::new()
        .route("/health", get(health_check))
        .route("/stats", get(get_api_stats))
        .route("/network/peers", get(get_peers));

    Router::new()
        .route("/add_block", get(add_block))
        .route("/add_transaction", post(add_transaction))
        .route("/get_chain", get(get_chain))
        .route("/new_nodes", post(new_nodes))
        .route("/check_consensus", get(check_consensus))
        .route("/propagate", get(propagate))
        .nest("/api", operator_routes)
        .fallback(not_found)
        // logging before stats so we always record timing and node-state
        .layer(middleware::from_fn_with_state(node.clone(), logging_middleware))
        .layer(middleware::from_fn_with_state(node.clone(), stats_middleware))
        .with_state(node)
        .layer(cors)
}

/// Serves the API on `addr` until the task is aborted or the listener fails.
pub async fn run_api_server(node: Arc<Node>, addr: SocketAddr) -> Result<(), ChainError> {
    let app = build_api_router(node);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!(address = %addr, "api.listening");

    axum::serve(listener, app).await?;
    Ok(())
}

// ============================================================================
// Route Handlers
// ============================================================================

async fn add_block(State(node): State<Arc<Node>>) -> Result<Json<BlockCreatedResponse>, ApiError> {
    let block = node.ledger.write().await.new_block(None)?;
    node.api_stats.write().await.blocks_created += 1;
    info!(index = block.index, transactions = block.transactions.len(), "ledger.block_created");

    Ok(Json(BlockCreatedResponse {
        message: "new block".to_string(),
        index: block.index,
        transaction: block.transactions,
        previous_hash: block.previous_hash,
    }))
}

async fn add_transaction(
    State(node): State<Arc<Node>>,
    payload: Result<Json<TransactionRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<TransactionAcceptedResponse>), ApiError> {
    let Json(req) = payload?;
    let tx = req.into_transaction()?;

    let (index, pending) = {
        let mut ledger = node.ledger.write().await;
        let index = ledger.add_transaction(tx);
        (index, ledger.pending().len())
    };
    node.api_stats.write().await.transactions_submitted += 1;

    Ok((
        StatusCode::CREATED,
        Json(TransactionAcceptedResponse {
            message: format!(
                "New transaction for block {} and transaction {}",
                index, pending
            ),
            index,
        }),
    ))
}

async fn get_chain(State(node): State<Arc<Node>>) -> Json<ChainResponse> {
    let ledger = node.ledger.read().await;
    Json(ChainResponse {
        chain: ledger.blocks().to_vec(),
        length: ledger.len() as u64,
    })
}

async fn new_nodes(
    State(node): State<Arc<Node>>,
    payload: Result<Json<NewNodesRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<NewNodesResponse>), ApiError> {
    let Json(req) = payload?;
    let nodes = req
        .nodes
        .ok_or_else(|| ApiError::InvalidInput("Missing field: nodes".to_string()))?;

    let total_nodes = node.synchronizer.peers().register_all(&nodes[..])?;
    info!(added = nodes.len(), total = total_nodes.len(), "network.peers_registered");

    Ok((
        StatusCode::CREATED,
        Json(NewNodesResponse {
            message: "Node created".to_string(),
            total_nodes,
        }),
    ))
}

async fn check_consensus(State(node): State<Arc<Node>>) -> Json<ConsensusResponse> {
    let resolution = node.synchronizer.resolve().await;
    let message = if resolution.replaced {
        "New chain"
    } else {
        "Consensus failed"
    };

    Json(ConsensusResponse {
        message: message.to_string(),
        replaced: resolution.replaced,
        chain: resolution.chain,
    })
}

async fn propagate(State(node): State<Arc<Node>>) -> Json<PropagationReport> {
    Json(node.synchronizer.propagate_pending().await)
}

async fn health_check(State(node): State<Arc<Node>>) -> Response {
    let sync_state = node.synchronizer.get_sync_state().await;
    let timestamp = chrono::Utc::now().to_rfc3339();

    // Without an orchestrator the node is serving and therefore healthy.
    let (status, node_state) = match &node.state {
        Some(s) => {
            let state = *s.read().await;
            let status = if state == NodeState::Ready {
                StatusCode::OK
            } else {
                StatusCode::SERVICE_UNAVAILABLE
            };
            (status, Some(format!("{:?}", state)))
        }
        None => (StatusCode::OK, None),
    };

    let health = if status == StatusCode::OK {
        "healthy"
    } else {
        "unhealthy"
    };

    (
        status,
        Json(serde_json::json!({
            "status": health,
            "node_id": node.node_id,
            "node_state": node_state,
            "sync_state": sync_state,
            "timestamp": timestamp
        })),
    )
        .into_response()
}

async fn get_api_stats(State(node): State<Arc<Node>>) -> Json<ApiStatsResponse> {
    Json(node.get_stats().await)
}

async fn get_peers(State(node): State<Arc<Node>>) -> impl IntoResponse {
    let peers: Vec<PeerView> = node
        .synchronizer
        .peers()
        .peer_info()
        .into_iter()
        .map(|p| PeerView {
            unreliable: p.is_unreliable(node.max_peer_failures),
            last_seen_secs_ago: p.last_seen.map(|t| t.elapsed().as_secs()),
            address: p.address,
            consecutive_failures: p.consecutive_failures,
            successful_fetches: p.successful_fetches,
        })
        .collect();

    Json(serde_json::json!({
        "count": peers.len(),
        "peers": peers
    }))
}

async fn not_found(req: Request) -> ApiError {
    ApiError::NotFound(format!("No route for {}", req.uri().path()))
}
