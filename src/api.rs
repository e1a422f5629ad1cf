//! REST API for the query router
//!
//! GET /health, POST /route (raw envelope), POST /query (polished answer)

use axum::{extract::State, http::StatusCode, routing::get, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::models::{ResponseEnvelope, RouteRequest, RouteStatus};
use crate::polish::ResponsePolisher;
use crate::router::QueryRouter;

/// =============================
/// Request / Response Models
/// =============================

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub query: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct QueryResponse {
    pub request_id: String,
    pub status: RouteStatus,
    pub response: Value,
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub router: Arc<QueryRouter>,
    /// `None` returns raw envelope data from /query
    pub polisher: Option<Arc<ResponsePolisher>>,
}

/// =============================
/// Handlers
/// =============================

async fn health() -> Json<Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn route_handler(
    State(state): State<ApiState>,
    Json(request): Json<RouteRequest>,
) -> (StatusCode, Json<ResponseEnvelope>) {
    info!(request_id = %request.request_id, source = %request.source, "Received route request");

    let envelope = state.router.route(request).await;
    (StatusCode::OK, Json(envelope))
}

async fn query_handler(
    State(state): State<ApiState>,
    Json(req): Json<QueryRequest>,
) -> (StatusCode, Json<QueryResponse>) {
    let request = RouteRequest::new(req.query.clone());
    info!(request_id = %request.request_id, "Received query");

    let envelope = state.router.route(request).await;

    let response = match &state.polisher {
        Some(polisher) if envelope.status != RouteStatus::Failed => {
            let polished = polisher.polish(&req.query, &envelope).await;
            serde_json::to_value(&polished).unwrap_or(Value::Null)
        }
        _ => Value::Object(envelope.data.clone()),
    };

    (
        StatusCode::OK,
        Json(QueryResponse {
            request_id: envelope.request_id,
            status: envelope.status,
            response,
        }),
    )
}

/// =============================
/// Router
/// =============================

pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/route", post(route_handler))
        .route("/query", post(query_handler))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    state: ApiState,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API server listening on http://0.0.0.0:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}
