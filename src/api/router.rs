//! Request routing for the public and admin endpoints

use axum::{
    body::{Body, Bytes},
    extract::{DefaultBodyLimit, MatchedPath, Path, Query, State},
    http::{header, HeaderValue, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::error::ShortenerError;
use crate::model::LongUrl;
use crate::observability::{HealthCheck, HealthStatus};
use crate::service::{Reaper, ShortenRequest, Shortener};

/// Upper bound on a manually requested cleanup batch
pub const MAX_MANUAL_BATCH: i64 = 10_000;

/// Largest accepted request body
pub const MAX_BODY_SIZE: usize = 1024 * 1024;

/// JSON error body `{ "error": code, "message": message }`
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    fn invalid_request(e: serde_json::Error) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_request", e.to_string())
    }

    fn cleanup_unavailable() -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "cleanup_unavailable",
            "Cleanup service is not configured",
        )
    }
}

impl From<ShortenerError> for ApiError {
    fn from(err: ShortenerError) -> Self {
        let status =
            StatusCode::from_u16(err.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Self::new(status, err.code(), err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({ "error": self.code, "message": self.message });
        (self.status, Json(body)).into_response()
    }
}

#[derive(Debug, Default, Deserialize)]
struct ManualCleanupRequest {
    #[serde(default)]
    batch_size: Option<i64>,
}

/// Handler state shared by every route
#[derive(Clone)]
struct ApiState {
    shortener: Arc<Shortener>,
    reaper: Option<Arc<Reaper>>,
    health: Arc<HealthCheck>,
    admin_api_key: Option<Arc<str>>,
}

/// Builds the axum router over the shortener, reaper and health checks
pub struct ApiRouter {
    shortener: Arc<Shortener>,
    reaper: Option<Arc<Reaper>>,
    health: HealthCheck,
    admin_api_key: Option<String>,
}

impl ApiRouter {
    pub fn new(shortener: Arc<Shortener>) -> Self {
        Self {
            shortener,
            reaper: None,
            health: HealthCheck::new(),
            admin_api_key: None,
        }
    }

    pub fn with_reaper(mut self, reaper: Arc<Reaper>) -> Self {
        self.reaper = Some(reaper);
        self
    }

    pub fn with_health(mut self, health: HealthCheck) -> Self {
        self.health = health;
        self
    }

    /// Require `Authorization: Bearer <key>` on admin routes
    pub fn with_admin_api_key(mut self, key: Option<String>) -> Self {
        self.admin_api_key = key.filter(|k| !k.is_empty());
        self
    }

    pub fn shortener(&self) -> &Arc<Shortener> {
        &self.shortener
    }

    pub fn into_router(self) -> Router {
        let state = ApiState {
            shortener: self.shortener,
            reaper: self.reaper,
            health: Arc::new(self.health),
            admin_api_key: self.admin_api_key.map(Arc::from),
        };

        let admin = Router::new()
            .route("/api/admin/cleanup/stats", get(cleanup_stats))
            .route("/api/admin/cleanup/manual", post(manual_cleanup))
            .route("/api/admin/metrics", get(admin_metrics))
            .route_layer(middleware::from_fn_with_state(state.clone(), require_admin));

        Router::new()
            .route("/api/shorten", post(shorten))
            .route("/api/stats/:key", get(stats))
            .route("/health", get(health))
            .route("/:key", get(redirect))
            .merge(admin)
            .route_layer(middleware::from_fn_with_state(state.clone(), track_request))
            .fallback(not_found)
            .layer(
                ServiceBuilder::new()
                    .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
                    .layer(TraceLayer::new_for_http()),
            )
            .with_state(state)
    }
}

/// Count the request and its latency under the matched route template
async fn track_request(State(state): State<ApiState>, request: Request<Body>, next: Next) -> Response {
    let label = match request.extensions().get::<MatchedPath>() {
        Some(path) => format!("{} {}", request.method(), path.as_str()),
        None => format!("{} unmatched", request.method()),
    };

    let start = Instant::now();
    let response = next.run(request).await;
    let elapsed = start.elapsed();

    state.shortener.metrics().record_request(&label, elapsed);
    debug!(route = %label, status = response.status().as_u16(), latency = ?elapsed, "Request handled");
    response
}

async fn require_admin(State(state): State<ApiState>, request: Request<Body>, next: Next) -> Response {
    if let Some(expected) = &state.admin_api_key {
        let token = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim);
        if token != Some(expected.as_ref()) {
            warn!(path = %request.uri().path(), "Rejected unauthorized admin request");
            return ApiError::new(
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                "Missing or invalid API key",
            )
            .into_response();
        }
    }
    next.run(request).await
}

async fn shorten(State(state): State<ApiState>, body: Bytes) -> Result<Response, ApiError> {
    let request: ShortenRequest = serde_json::from_slice(&body).map_err(ApiError::invalid_request)?;
    let created = state.shortener.shorten(&request)?;
    let status = if created.reused {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(created)).into_response())
}

async fn stats(State(state): State<ApiState>, Path(key): Path<String>) -> Result<Response, ApiError> {
    let stats = state.shortener.stats(&key)?;
    Ok(Json(stats).into_response())
}

async fn redirect(State(state): State<ApiState>, Path(key): Path<String>) -> Result<Response, ApiError> {
    let url = state.shortener.resolve(&key)?;
    let location = location_header(&url).ok_or_else(|| {
        ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            "stored URL cannot be sent as a redirect",
        )
    })?;
    Ok((StatusCode::FOUND, [(header::LOCATION, location)]).into_response())
}

/// The stored URL as-is when it is header-safe, otherwise percent-encoded
fn location_header(url: &str) -> Option<HeaderValue> {
    HeaderValue::from_str(url).ok().or_else(|| {
        let encoded = LongUrl::parse(url).ok()?.to_ascii();
        HeaderValue::from_str(&encoded).ok()
    })
}

async fn health(State(state): State<ApiState>) -> Response {
    let health = state.health.check();
    let status = match health.overall {
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::OK,
    };
    (status, Json(health)).into_response()
}

async fn cleanup_stats(State(state): State<ApiState>) -> Result<Response, ApiError> {
    let reaper = state.reaper.as_ref().ok_or_else(ApiError::cleanup_unavailable)?;
    Ok(Json(reaper.stats()).into_response())
}

async fn manual_cleanup(
    State(state): State<ApiState>,
    Query(params): Query<HashMap<String, String>>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let reaper = state.reaper.clone().ok_or_else(ApiError::cleanup_unavailable)?;

    let requested = if body.is_empty() {
        params.get("batch_size").and_then(|v| v.parse::<i64>().ok())
    } else {
        serde_json::from_slice::<ManualCleanupRequest>(&body)
            .map_err(ApiError::invalid_request)?
            .batch_size
    };
    let batch_size = effective_batch_size(requested, reaper.config().batch_size);

    info!(batch_size, "Manual cleanup triggered");
    let start = Instant::now();
    let outcome = tokio::task::spawn_blocking(move || reaper.cleanup_expired_batch(batch_size))
        .await
        .map_err(|e| {
            error!(error = %e, "Manual cleanup task panicked");
            ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "cleanup_failed", e.to_string())
        })?;

    match outcome {
        Ok(cleaned) => Ok(Json(json!({
            "cleaned_count": cleaned,
            "batch_size": batch_size,
            "duration_ms": start.elapsed().as_millis() as u64,
            "timestamp": Utc::now(),
        }))
        .into_response()),
        Err(e) => {
            error!(error = %e, "Manual cleanup failed");
            Err(ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "cleanup_failed",
                e.to_string(),
            ))
        }
    }
}

async fn admin_metrics(State(state): State<ApiState>) -> Response {
    let cleanup = state.reaper.as_ref().map(|reaper| {
        let pending = match reaper.pending_count() {
            Ok(n) => json!(n),
            Err(e) => {
                warn!(error = %e, "Failed to count pending expired records");
                serde_json::Value::Null
            }
        };
        json!({ "stats": reaper.stats(), "pending": pending })
    });

    Json(json!({
        "shortener": state.shortener.metrics().to_json(),
        "dedup_tracked_keys": state.shortener.visits().tracked(),
        "cleanup": cleanup,
        "uptime_secs": state.health.uptime().as_secs(),
    }))
    .into_response()
}

async fn not_found() -> ApiError {
    ApiError::new(StatusCode::NOT_FOUND, "not_found", "Not found")
}

/// Missing or non-positive values fall back to the configured size
pub fn effective_batch_size(requested: Option<i64>, configured: usize) -> usize {
    match requested {
        Some(n) if n > 0 => n.min(MAX_MANUAL_BATCH) as usize,
        _ => configured,
    }
}
