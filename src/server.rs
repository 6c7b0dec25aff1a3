//! Local ingestion receiver for relayed events.
//!
//! A minimal collector that accepts the batches posted by
//! [`HttpTransport`](crate::delivery::HttpTransport) and keeps them in memory:
//!
//! ```text
//! relay ──→ POST /api/input ──→ receiver ──→ GET /api/events
//! ```

use axum::{
    extract::{Query, State},
    http::{HeaderValue, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to bind to (0 for random)
    pub port: u16,
}

impl ServerConfig {
    pub fn new(port: u16) -> Self {
        Self { port }
    }
}

/// Shared receiver state
#[derive(Debug, Default)]
pub struct ReceiverState {
    /// Received events, oldest first
    events: RwLock<Vec<Value>>,
    /// When set, every ingest is answered with 503
    rejecting: AtomicBool,
}

impl ReceiverState {
    /// Make the receiver refuse (or accept again) incoming batches.
    pub fn set_rejecting(&self, rejecting: bool) {
        self.rejecting.store(rejecting, Ordering::SeqCst);
    }

    /// Number of events received so far.
    pub async fn received(&self) -> usize {
        self.events.read().await.len()
    }

    /// Snapshot of everything received, oldest first.
    pub async fn events(&self) -> Vec<Value> {
        self.events.read().await.clone()
    }
}

/// Response from the ingest endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestResponse {
    pub status: String,
    pub received: usize,
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Error response
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    pub limit: Option<usize>,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, code: &str, error: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
            code: code.to_string(),
        }),
    )
}

/// GET /health
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// POST /api/input
async fn ingest(
    State(state): State<Arc<ReceiverState>>,
    Json(payload): Json<Value>,
) -> Result<Json<IngestResponse>, ApiError> {
    if state.rejecting.load(Ordering::SeqCst) {
        return Err(api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "UNAVAILABLE",
            "Receiver is not accepting events",
        ));
    }

    let events = match payload.get("events").and_then(Value::as_array) {
        Some(events) => events.clone(),
        None => {
            return Err(api_error(
                StatusCode::BAD_REQUEST,
                "MISSING_EVENTS",
                "Missing events list",
            ))
        }
    };

    let received = events.len();
    state.events.write().await.extend(events);
    tracing::debug!("Received batch of {} events", received);

    Ok(Json(IngestResponse {
        status: "ok".to_string(),
        received,
    }))
}

/// GET /api/events?limit=N, newest first
async fn recent_events(
    State(state): State<Arc<ReceiverState>>,
    Query(query): Query<EventsQuery>,
) -> Json<Vec<Value>> {
    let limit = query.limit.unwrap_or(100);
    let events = state.events.read().await;
    Json(events.iter().rev().take(limit).cloned().collect())
}

/// Build the receiver router over `state`.
pub fn router(state: Arc<ReceiverState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/input", post(ingest))
        .route("/api/events", get(recent_events))
        .layer(
            CorsLayer::new()
                .allow_origin([
                    HeaderValue::from_static("http://localhost"),
                    HeaderValue::from_static("http://127.0.0.1"),
                ])
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Run the receiver.
///
/// Returns the bound address, the shared state and a shutdown trigger.
pub async fn run(
    config: ServerConfig,
) -> anyhow::Result<(
    SocketAddr,
    Arc<ReceiverState>,
    tokio::sync::oneshot::Sender<()>,
)> {
    let state = Arc::new(ReceiverState::default());
    let app = router(Arc::clone(&state));

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    tracing::info!("Receiver listening on http://{}", actual_addr);

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                tracing::info!("Receiver shutdown signal received");
            })
            .await
        {
            tracing::error!("Receiver error: {}", e);
        }
    });

    Ok((actual_addr, state, shutdown_tx))
}
