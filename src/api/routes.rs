use axum::{
    error_handling::HandleErrorLayer,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    BoxError, Json, Router,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::observability::MetricsRegistry;
use crate::pipeline::Protector;

use super::request::ProtectRequest;
use super::response::{DecisionResponse, ErrorResponse, HealthResponse};

/// Upper bound on a single HTTP request, remote decide included.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared application state.
pub struct AppState {
    pub protector: Protector,

    pub metrics: Arc<MetricsRegistry>,

    /// Application start time
    pub start_time: Instant,

    /// Application version
    pub version: String,
}

/// Create the application router.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/protect", post(handle_protect))
        .route("/health", get(handle_health))
        .route("/metrics", get(handle_metrics))
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(handle_timeout))
                .timeout(REQUEST_TIMEOUT),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn handle_timeout(err: BoxError) -> impl IntoResponse {
    warn!(error = %err, "Request failed in middleware");
    if err.is::<tower::timeout::error::Elapsed>() {
        (
            StatusCode::REQUEST_TIMEOUT,
            Json(ErrorResponse::new("request timed out", "TIMEOUT")),
        )
    } else {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse::new(err.to_string(), "INTERNAL_ERROR")),
        )
    }
}

/// Run the pipeline for a request snapshot.
async fn handle_protect(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ProtectRequest>,
) -> impl IntoResponse {
    let (details, body) = req.into_parts();
    let ip = details.ip.clone();

    let decision = state.protector.protect(details, body).await;

    info!(
        ip = %ip,
        id = decision.id(),
        conclusion = %decision.conclusion(),
        "Protect completed"
    );

    (StatusCode::OK, Json(DecisionResponse::from(&decision)))
}

/// Health check endpoint.
async fn handle_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: state.version.clone(),
        rules: state.protector.rules().len(),
        cached_fingerprints: state.protector.cache().len(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

/// Metrics endpoint (Prometheus format).
async fn handle_metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let metrics = format!(
        r#"# HELP arcjet_uptime_seconds Application uptime in seconds
# TYPE arcjet_uptime_seconds counter
arcjet_uptime_seconds {}

# HELP arcjet_rules Number of composed rules
# TYPE arcjet_rules gauge
arcjet_rules {}

# HELP arcjet_cache_entries Fingerprints in the outcome cache
# TYPE arcjet_cache_entries gauge
arcjet_cache_entries {}

{}"#,
        state.start_time.elapsed().as_secs(),
        state.protector.rules().len(),
        state.protector.cache().len(),
        state.metrics.to_prometheus(),
    );

    (
        StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; charset=utf-8",
        )],
        metrics,
    )
}
