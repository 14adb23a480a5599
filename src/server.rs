//! HTTP API exposing the monitor's output to presentation clients.
//!
//! Routes:
//! - `GET /health` liveness and version
//! - `GET /view` the complete current view
//! - `GET /stats` summary statistics (404 until a snapshot with readings is applied)
//! - `GET /series?window=7d` filtered series with labels, optionally switching windows
//! - `GET /daily` per-day averages
//! - `GET /alert` alert state and threshold
//! - `GET /error` the last fetch failure, if any
//! - `POST /refresh` fetch now and return the outcome
//!
//! # Architecture
//!
//! ```text
//! App / dashboard ──→ GET /view ──→ server ──→ Monitor (read lock)
//!                 ──→ POST /refresh ──→ Monitor::manual_refresh ──→ source
//! ```

use crate::core::{AlertState, DailyAverage, Stats, TimeWindow};
use crate::monitor::{FetchFailure, Monitor, MonitorView, RefreshOutcome};
use crate::source::Reading;
use axum::{
    extract::{Query, State},
    http::{HeaderValue, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
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

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub source: String,
}

/// Error response
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
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

/// Query for `GET /series`
#[derive(Debug, Deserialize)]
pub struct SeriesQuery {
    pub window: Option<String>,
}

/// Response for `GET /series`
#[derive(Serialize)]
pub struct SeriesResponse {
    pub window: TimeWindow,
    pub windows: Vec<TimeWindow>,
    pub readings: Vec<Reading>,
    pub labels: Vec<String>,
}

/// Response for `GET /alert`
#[derive(Serialize)]
pub struct AlertResponse {
    pub state: AlertState,
    pub active: bool,
    pub threshold: f64,
    pub current: Option<f64>,
}

/// Response for `POST /refresh`
#[derive(Serialize)]
pub struct RefreshResponse {
    pub outcome: RefreshOutcome,
    pub view: MonitorView,
}

/// GET /health
async fn health(State(monitor): State<Arc<Monitor>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        source: monitor.source_description().to_string(),
    })
}

/// GET /view
async fn view(State(monitor): State<Arc<Monitor>>) -> Json<MonitorView> {
    Json(monitor.view())
}

/// GET /stats
async fn stats(State(monitor): State<Arc<Monitor>>) -> Result<Json<Stats>, ApiError> {
    monitor.stats().map(Json).ok_or_else(|| {
        api_error(StatusCode::NOT_FOUND, "NO_DATA", "no readings available")
    })
}

/// GET /series
async fn series(
    State(monitor): State<Arc<Monitor>>,
    Query(query): Query<SeriesQuery>,
) -> Result<Json<SeriesResponse>, ApiError> {
    let view = match query.window {
        Some(window) => {
            let window: TimeWindow = window
                .parse()
                .map_err(|e: String| api_error(StatusCode::BAD_REQUEST, "INVALID_WINDOW", e))?;
            monitor
                .select_window(window)
                .map_err(|e| api_error(StatusCode::BAD_REQUEST, "INVALID_WINDOW", e.to_string()))?
        }
        None => monitor.view(),
    };

    Ok(Json(SeriesResponse {
        window: view.window,
        windows: monitor.windows(),
        readings: view.series,
        labels: view.labels,
    }))
}

/// GET /daily
async fn daily(State(monitor): State<Arc<Monitor>>) -> Json<Vec<DailyAverage>> {
    Json(monitor.daily())
}

/// GET /alert
async fn alert(State(monitor): State<Arc<Monitor>>) -> Json<AlertResponse> {
    let view = monitor.view();
    Json(AlertResponse {
        state: view.alert,
        active: view.alert.is_active(),
        threshold: view.threshold,
        current: view.stats.map(|s| s.current),
    })
}

/// GET /error
async fn last_error(State(monitor): State<Arc<Monitor>>) -> Json<Option<FetchFailure>> {
    Json(monitor.last_error())
}

/// POST /refresh
async fn refresh(State(monitor): State<Arc<Monitor>>) -> Result<Json<RefreshResponse>, ApiError> {
    let outcome = monitor
        .manual_refresh()
        .await
        .map_err(|e| api_error(StatusCode::BAD_GATEWAY, e.code(), e.to_string()))?;

    Ok(Json(RefreshResponse {
        outcome,
        view: monitor.view(),
    }))
}

/// Build the API router over a monitor.
pub fn router(monitor: Arc<Monitor>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/view", get(view))
        .route("/stats", get(stats))
        .route("/series", get(series))
        .route("/daily", get(daily))
        .route("/alert", get(alert))
        .route("/error", get(last_error))
        .route("/refresh", post(refresh))
        .layer(
            CorsLayer::new()
                .allow_origin([
                    HeaderValue::from_static("http://localhost"),
                    HeaderValue::from_static("http://127.0.0.1"),
                    // Capacitor/Ionic app shells
                    HeaderValue::from_static("capacitor://localhost"),
                    HeaderValue::from_static("ionic://localhost"),
                ])
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(monitor)
}

/// Run the HTTP server
pub async fn run(
    config: ServerConfig,
    monitor: Arc<Monitor>,
) -> anyhow::Result<(SocketAddr, tokio::sync::oneshot::Sender<()>)> {
    let app = router(monitor);

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    tracing::info!("Monitor API listening on http://{}", actual_addr);

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                tracing::info!("Server shutdown signal received");
            })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    Ok((actual_addr, shutdown_tx))
}
