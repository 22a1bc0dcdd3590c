//! HTTP API.
//!
//! Provides endpoints for:
//! - Polling and streaming snapshots of warnings and current conditions
//! - Notification push ingress
//! - Reloading the conditions station
//! - Health and Prometheus metrics

use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use bulletin_common::FeedError;
use ingestion::{Alert, Conditions, Feed, FeedPolicy, FeedRecord, StationLocation};

use crate::state::AppState;
use crate::stream::{connected_clients, snapshot_stream};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct NotifyRequest {
    /// Defaults to the feed's own topic.
    #[serde(default)]
    pub topic: Option<String>,
    pub reference: String,
    #[serde(default)]
    pub received_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NotifyResponse {
    pub topic: String,
    pub delivered: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReloadRequest {
    pub province: String,
    pub location: String,
    #[serde(default)]
    pub reject_in_hour_updates: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReloadResponse {
    pub topic: String,
    pub reject_in_hour_updates: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct FeedHealth {
    pub enabled: bool,
    pub running: bool,
    pub warm: bool,
    pub records: usize,
}

// ============================================================================
// Router
// ============================================================================

pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/warnings", get(warnings_handler))
        .route("/api/warnings/live", get(warnings_live_handler))
        .route("/api/weather", get(weather_handler))
        .route("/api/weather/live", get(weather_live_handler))
        .route("/api/notify/:feed", post(notify_handler))
        .route("/api/reload", post(reload_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(Extension(state))
}

// ============================================================================
// Snapshots
// ============================================================================

async fn warnings_body(feed: Option<Arc<Feed<Alert>>>) -> Value {
    let warnings = match feed {
        Some(feed) => feed.store().snapshot().await,
        None => Vec::new(),
    };
    json!({ "warnings": warnings })
}

async fn weather_body(feed: Option<Arc<Feed<Conditions>>>) -> Value {
    let conditions = match feed {
        Some(feed) => feed.store().snapshot().await.into_iter().next(),
        None => None,
    };
    json!({ "conditions": conditions })
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/warnings - live alerts in priority order
async fn warnings_handler(Extension(state): Extension<Arc<AppState>>) -> impl IntoResponse {
    Json(warnings_body(state.alerts.clone()).await)
}

/// GET /api/warnings/live - alert snapshots as server-sent events
async fn warnings_live_handler(Extension(state): Extension<Arc<AppState>>) -> impl IntoResponse {
    let feed = state.alerts.clone();
    snapshot_stream("warnings_update", state.stream_interval, move || {
        warnings_body(feed.clone())
    })
}

/// GET /api/weather - current conditions, `null` until the first report
async fn weather_handler(Extension(state): Extension<Arc<AppState>>) -> impl IntoResponse {
    Json(weather_body(state.conditions.clone()).await)
}

/// GET /api/weather/live - condition snapshots as server-sent events
async fn weather_live_handler(Extension(state): Extension<Arc<AppState>>) -> impl IntoResponse {
    let feed = state.conditions.clone();
    snapshot_stream("condition_update", state.stream_interval, move || {
        weather_body(feed.clone())
    })
}

/// POST /api/notify/:feed - publish a document reference on the hub
async fn notify_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(feed): Path<String>,
    Json(request): Json<NotifyRequest>,
) -> Response {
    let default_topic = match feed.as_str() {
        "alerts" => match &state.alerts {
            Some(feed) => feed.topic().await,
            None => return feed_disabled(Alert::FEED),
        },
        "conditions" => match &state.conditions {
            Some(feed) => feed.topic().await,
            None => return feed_disabled(Conditions::FEED),
        },
        other => {
            return error_json(StatusCode::NOT_FOUND, format!("unknown feed '{}'", other));
        }
    };

    // Publishing needs a concrete topic; a pattern default is reduced to
    // its literal prefix.
    let topic = request
        .topic
        .unwrap_or_else(|| literal_prefix(&default_topic));
    if topic.is_empty() || topic.contains(['*', '#']) {
        return error_json(StatusCode::BAD_REQUEST, format!("invalid topic '{}'", topic));
    }

    let received_at = request.received_at.unwrap_or_else(Utc::now);
    let delivered = state
        .hub
        .publish(&topic, &request.reference, received_at)
        .await;

    (
        StatusCode::ACCEPTED,
        Json(NotifyResponse { topic, delivered }),
    )
        .into_response()
}

/// POST /api/reload - follow a different conditions station
async fn reload_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(request): Json<ReloadRequest>,
) -> Response {
    let Some(feed) = &state.conditions else {
        return feed_disabled(Conditions::FEED);
    };

    let station = StationLocation::new(request.province, request.location);
    if let Err(e) = station.validate() {
        return feed_error(&e);
    }

    let policy = FeedPolicy {
        reject_intra_period_updates: request.reject_in_hour_updates,
    };
    let url = station.document_url(&state.url_template);

    match feed.reload(station.topic(), policy, Some(url)).await {
        Ok(()) => {
            info!(
                province = %station.province,
                location = %station.location,
                reject_in_hour_updates = request.reject_in_hour_updates,
                "Conditions station reloaded"
            );
            Json(ReloadResponse {
                topic: station.topic(),
                reject_in_hour_updates: request.reject_in_hour_updates,
            })
            .into_response()
        }
        Err(e) => feed_error(&e),
    }
}

/// GET /health - per-feed status
async fn health_handler(Extension(state): Extension<Arc<AppState>>) -> impl IntoResponse {
    let alerts = match &state.alerts {
        Some(feed) => feed_health(feed).await,
        None => FeedHealth::disabled(),
    };
    let conditions = match &state.conditions {
        Some(feed) => feed_health(feed).await,
        None => FeedHealth::disabled(),
    };

    Json(json!({
        "status": "ok",
        "service": "bulletin-server",
        "stream_clients": connected_clients(),
        "feeds": {
            "alerts": alerts,
            "conditions": conditions,
        }
    }))
}

/// GET /metrics - Prometheus exposition
async fn metrics_handler(Extension(state): Extension<Arc<AppState>>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [("content-type", "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => error_json(StatusCode::NOT_FOUND, "metrics recorder not installed"),
    }
}

// ============================================================================
// Helpers
// ============================================================================

impl FeedHealth {
    fn disabled() -> Self {
        Self {
            enabled: false,
            running: false,
            warm: false,
            records: 0,
        }
    }
}

async fn feed_health<R: FeedRecord>(feed: &Feed<R>) -> FeedHealth {
    FeedHealth {
        enabled: true,
        running: feed.is_running().await,
        warm: feed.is_warm(),
        records: feed.store().len().await,
    }
}

/// Topic words before the first wildcard.
fn literal_prefix(pattern: &str) -> String {
    pattern
        .split('.')
        .take_while(|w| *w != "*" && *w != "#")
        .collect::<Vec<_>>()
        .join(".")
}

fn error_json(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

fn feed_disabled(feed: &str) -> Response {
    error_json(StatusCode::NOT_FOUND, format!("feed '{}' is not enabled", feed))
}

fn feed_error(err: &FeedError) -> Response {
    let status =
        StatusCode::from_u16(err.http_status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        status,
        Json(json!({ "error": err.to_string(), "kind": err.kind() })),
    )
        .into_response()
}

/// Start the HTTP server; returns when `shutdown` resolves.
pub async fn run_server(
    state: Arc<AppState>,
    port: u16,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = create_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    info!(port = port, "Starting bulletin server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
