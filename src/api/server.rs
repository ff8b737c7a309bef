//! API Server Module
//!
//! This module implements the JSON-RPC server the view process pushes hook
//! events to. Each event starts a batch; the response carries the batch id
//! as soon as the wallet accepted the batch, and the outcome is delivered
//! later through the result sink.

use crate::{
    BookingCompleted, BookingCreated, EventTypeCreated, HookEvent,
    batch::BatchOrchestrator,
    config::ApiConfig,
};
use axum::{Json, Router, extract::State, routing::post};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{error, info, warn};

/// Standard JSON-RPC error code for an unknown method
const METHOD_NOT_FOUND: i32 = -32601;
/// Standard JSON-RPC error code for malformed params
const INVALID_PARAMS: i32 = -32602;
/// Server error: the wallet rejected the batch
const BATCH_REJECTED: i32 = -32000;
/// Server error: no batch with the given id is known
const UNKNOWN_BATCH: i32 = -32001;

/// Shared application state that is accessible across all request handlers
#[derive(Clone)]
pub struct AppState {
    orchestrator: BatchOrchestrator,
}

/// The main API server struct
pub struct Server {
    config: ApiConfig,
    state: AppState,
}

impl Server {
    /// Creates a new API server instance
    ///
    /// # Arguments
    /// * `config` - Listening address
    /// * `orchestrator` - Pipeline every hook event is dispatched to
    pub fn new(config: ApiConfig, orchestrator: BatchOrchestrator) -> Self {
        Self { config, state: AppState { orchestrator } }
    }

    /// Starts the API server and begins listening for incoming requests
    ///
    /// # Returns
    /// `Ok(())` when the server stops, or an error if binding fails
    pub async fn start(self) -> anyhow::Result<()> {
        let app = router(self.state);

        let addr = format!("{}:{}", self.config.host, self.config.port);
        info!("API server listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }
}

/// Router with a single POST endpoint at "/" handling JSON-RPC requests
pub fn router(state: AppState) -> Router {
    Router::new().route("/", post(handle_rpc)).with_state(state)
}

impl AppState {
    pub fn new(orchestrator: BatchOrchestrator) -> Self {
        Self { orchestrator }
    }
}

/// JSON-RPC 2.0 request structure
#[derive(Debug, Deserialize)]
struct JsonRpcRequest {
    #[allow(dead_code)]
    jsonrpc: String,
    method: String,
    #[serde(default)]
    params: Value,
    id: Value,
}

/// JSON-RPC 2.0 response structure
///
/// Either `result` or `error` is populated, never both.
#[derive(Debug, Serialize)]
struct JsonRpcResponse {
    jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
    id: Value,
}

#[derive(Debug, Serialize)]
struct JsonRpcError {
    code: i32,
    message: String,
}

impl JsonRpcResponse {
    fn ok(id: Value, result: Value) -> Json<Self> {
        Json(Self { jsonrpc: "2.0".to_string(), result: Some(result), error: None, id })
    }

    fn err(id: Value, code: i32, message: String) -> Json<Self> {
        Json(Self {
            jsonrpc: "2.0".to_string(),
            result: None,
            error: Some(JsonRpcError { code, message }),
            id,
        })
    }
}

/// Params of the batch query methods
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchQuery {
    calls_id: String,
}

/// Main RPC request handler
///
/// Routes the request to the appropriate handler based on the method name.
async fn handle_rpc(State(state): State<AppState>, Json(request): Json<JsonRpcRequest>) -> Json<JsonRpcResponse> {
    info!("Received RPC request: {}", request.method);

    match request.method.as_str() {
        "booking_created" => dispatch::<BookingCreated>(state, request, HookEvent::BookingCreated).await,
        "booking_completed" => dispatch::<BookingCompleted>(state, request, HookEvent::BookingCompleted).await,
        "event_created" => dispatch::<EventTypeCreated>(state, request, HookEvent::EventTypeCreated).await,
        "batch_status" => handle_batch_status(state, request).await,
        "batch_cancel" => handle_batch_cancel(state, request).await,
        _ => JsonRpcResponse::err(request.id, METHOD_NOT_FOUND, "Method not found".to_string()),
    }
}

/// Accept params either bare or wrapped in a one-element array
fn parse_params<T: DeserializeOwned>(params: Value) -> Result<T, serde_json::Error> {
    match params {
        Value::Array(mut items) if items.len() == 1 => serde_json::from_value(items.remove(0)),
        other => serde_json::from_value(other),
    }
}

/// Handles the hook event methods
///
/// 1. Deserializes the event payload from the request params
/// 2. Dispatches it to the orchestrator (submits the batch)
/// 3. Returns the batch id, or the rejection reason
async fn dispatch<T: DeserializeOwned>(
    state: AppState,
    request: JsonRpcRequest,
    into_event: fn(T) -> HookEvent,
) -> Json<JsonRpcResponse> {
    let payload: T = match parse_params(request.params) {
        Ok(payload) => payload,
        Err(e) => {
            error!("Failed to deserialize {} params: {}", request.method, e);
            return JsonRpcResponse::err(request.id, INVALID_PARAMS, format!("Invalid params: {}", e));
        }
    };

    match state.orchestrator.dispatch(into_event(payload)).await {
        Ok((handle, _task)) => JsonRpcResponse::ok(request.id, json!({ "callsId": handle.calls_id })),
        Err(e) => {
            warn!("{} batch rejected: {}", request.method, e);
            JsonRpcResponse::err(request.id, BATCH_REJECTED, e.to_string())
        }
    }
}

async fn handle_batch_status(state: AppState, request: JsonRpcRequest) -> Json<JsonRpcResponse> {
    let query: BatchQuery = match parse_params(request.params) {
        Ok(query) => query,
        Err(e) => return JsonRpcResponse::err(request.id, INVALID_PARAMS, format!("Invalid params: {}", e)),
    };

    match state.orchestrator.status(&query.calls_id).await {
        Some(tracked) => match serde_json::to_value(tracked) {
            Ok(result) => JsonRpcResponse::ok(request.id, result),
            Err(e) => JsonRpcResponse::err(request.id, BATCH_REJECTED, e.to_string()),
        },
        None => JsonRpcResponse::err(request.id, UNKNOWN_BATCH, format!("Unknown batch {}", query.calls_id)),
    }
}

async fn handle_batch_cancel(state: AppState, request: JsonRpcRequest) -> Json<JsonRpcResponse> {
    let query: BatchQuery = match parse_params(request.params) {
        Ok(query) => query,
        Err(e) => return JsonRpcResponse::err(request.id, INVALID_PARAMS, format!("Invalid params: {}", e)),
    };

    let cancelled = state.orchestrator.cancel(&query.calls_id).await;
    JsonRpcResponse::ok(request.id, json!({ "cancelled": cancelled }))
}
