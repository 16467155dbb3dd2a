//! Web server module for plugwatch.
//!
//! JSON API over the aggregator and the device gateway. Failures are reported
//! as `{"error": <message>, "code": <reason>}`.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    Json, Router,
    extract::{Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, TraceLayer},
};

use crate::aggregate::{AggregateError, Aggregator, Granularity, WindowOverride};
use crate::collector::{CollectorStats, CollectorStatsSnapshot};
use crate::gateway::{DeviceGateway, GatewayError, SwitchCode};
use crate::storage::{SampleReader, StorageError};

// =============================================================================
// State
// =============================================================================

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub reader: SampleReader,
    pub aggregator: Aggregator,
    pub gateway: DeviceGateway,
    pub collector_stats: Option<Arc<CollectorStats>>,
    pub started_at: Instant,
}

impl AppState {
    /// State over `reader` and `gateway`, with the uptime clock starting now.
    pub fn new(reader: SampleReader, gateway: DeviceGateway) -> Self {
        Self {
            aggregator: Aggregator::new(reader.clone()),
            reader,
            gateway,
            collector_stats: None,
            started_at: Instant::now(),
        }
    }

    /// Expose the running collector's counters on `/api/system`.
    pub fn with_collector_stats(mut self, stats: Arc<CollectorStats>) -> Self {
        self.collector_stats = Some(stats);
        self
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Query-path failure, rendered as a JSON body with a reason code.
#[derive(Debug)]
pub enum ApiError {
    InvalidRequest(String),
    StorageUnavailable(StorageError),
    GatewayUnavailable(GatewayError),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    code: &'static str,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::GatewayUnavailable(_) => StatusCode::BAD_GATEWAY,
        }
    }

    fn reason(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request",
            Self::StorageUnavailable(_) => "storage_unavailable",
            Self::GatewayUnavailable(_) => "gateway_unavailable",
        }
    }

    fn message(&self) -> String {
        match self {
            Self::InvalidRequest(msg) => msg.clone(),
            Self::StorageUnavailable(e) => e.to_string(),
            Self::GatewayUnavailable(e) => e.to_string(),
        }
    }
}

impl From<AggregateError> for ApiError {
    fn from(e: AggregateError) -> Self {
        match e {
            AggregateError::InvalidRequest(msg) => Self::InvalidRequest(msg),
            AggregateError::Storage(e) => Self::StorageUnavailable(e),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        Self::StorageUnavailable(e)
    }
}

impl From<GatewayError> for ApiError {
    fn from(e: GatewayError) -> Self {
        Self::GatewayUnavailable(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(code = self.reason(), error = %self.message(), "Request failed");
        }
        let body = ErrorBody {
            error: self.message(),
            code: self.reason(),
        };
        (status, Json(body)).into_response()
    }
}

// =============================================================================
// Request / response bodies
// =============================================================================

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    db: Option<String>,
}

/// Current device reading.
#[derive(Debug, Serialize, Deserialize)]
pub struct LiveResponse {
    pub switch: bool,
    pub power: f64,
    pub voltage: f64,
    pub current: f64,
    /// Unix seconds at which the reading was taken.
    pub server_time: i64,
}

/// Today's totals.
#[derive(Debug, Serialize, Deserialize)]
pub struct SummaryResponse {
    pub today_energy_kwh: f64,
    pub daily_runtime_seconds: u64,
}

/// Query parameters for the series API. Numbers are parsed by the handler so
/// malformed values get the standard error body.
#[derive(Debug, Default, Deserialize)]
pub struct SeriesQueryParams {
    pub granularity: Option<String>,
    pub hours: Option<String>,
    pub days: Option<String>,
    pub weeks: Option<String>,
}

/// One series bucket.
#[derive(Debug, Serialize, Deserialize)]
pub struct SeriesPoint {
    /// Bucket start, Unix milliseconds.
    pub ts: i64,
    pub avg_power: f64,
    pub energy_kwh: f64,
    pub count: u64,
}

/// Query parameters for the history API.
#[derive(Debug, Default, Deserialize)]
pub struct HistoryQueryParams {
    pub date: Option<String>,
}

/// One history point: bucket start (ms) and average power.
#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryPoint {
    pub x: i64,
    pub y: f64,
}

/// Process diagnostics.
#[derive(Debug, Serialize)]
pub struct SystemResponse {
    pub uptime_seconds: f64,
    pub sample_count: u64,
    /// Unix seconds of the newest stored sample.
    pub latest_sample_ts: Option<i64>,
    pub collector: Option<CollectorStatsSnapshot>,
}

/// Switch command body.
#[derive(Debug, Deserialize)]
pub struct SwitchRequest {
    #[serde(default)]
    pub on: bool,
}

/// Switch command result.
#[derive(Debug, Serialize, Deserialize)]
pub struct SwitchResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_used: Option<SwitchCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

// =============================================================================
// Router
// =============================================================================

/// Create the Axum router with all routes.
pub fn create_router(state: AppState) -> Router {
    let app_state = Arc::new(state);

    Router::new()
        .route("/healthz", get(healthz_handler))
        .route("/readyz", get(readyz_handler))
        .route("/api/live", get(live_handler))
        .route("/api/summary", get(summary_handler))
        .route("/api/series", get(series_handler))
        .route("/api/history", get(history_handler))
        .route("/api/system", get(system_handler))
        .route("/switch", post(switch_handler))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(true)),
        )
        .layer(CorsLayer::permissive())
        .with_state(app_state)
}

/// Liveness probe.
async fn healthz_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        db: None,
    })
}

/// Readiness probe that checks store availability.
async fn readyz_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.reader.count().await {
        Ok(_) => Json(HealthResponse {
            status: "ok".to_string(),
            db: Some("ready".to_string()),
        })
        .into_response(),
        Err(err) => {
            tracing::error!(error = %err, "Readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "not_ready".to_string(),
                    db: Some(err.to_string()),
                }),
            )
                .into_response()
        }
    }
}

async fn live_handler(State(state): State<Arc<AppState>>) -> Result<Json<LiveResponse>, ApiError> {
    let telemetry = state.gateway.read_telemetry().await?;
    Ok(Json(LiveResponse {
        switch: telemetry.switch_on,
        power: telemetry.power,
        voltage: telemetry.voltage,
        current: telemetry.current,
        server_time: chrono::Utc::now().timestamp(),
    }))
}

async fn summary_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SummaryResponse>, ApiError> {
    let summary = state.aggregator.summary().await?;
    Ok(Json(SummaryResponse {
        today_energy_kwh: round_to(summary.today_energy_kwh, 3),
        daily_runtime_seconds: summary.daily_runtime_seconds,
    }))
}

async fn series_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SeriesQueryParams>,
) -> Result<Json<Vec<SeriesPoint>>, ApiError> {
    let granularity = match params.granularity.as_deref().map(str::trim) {
        None | Some("") => Granularity::default(),
        Some(raw) => Granularity::parse(raw)?,
    };
    let window = WindowOverride::from_params(
        params.hours.as_deref(),
        params.days.as_deref(),
        params.weeks.as_deref(),
    )?;

    let buckets = state.aggregator.series(granularity, &window).await?;
    Ok(Json(
        buckets
            .iter()
            .map(|b| SeriesPoint {
                ts: b.start * 1_000,
                avg_power: round_to(b.average_power, 3),
                energy_kwh: round_to(b.energy_kwh, 6),
                count: b.sample_count,
            })
            .collect(),
    ))
}

async fn history_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HistoryQueryParams>,
) -> Result<Json<Vec<HistoryPoint>>, ApiError> {
    let date = params
        .date
        .ok_or_else(|| ApiError::InvalidRequest("missing 'date', expected YYYY-MM-DD".into()))?;

    let buckets = state.aggregator.history(&date).await?;
    Ok(Json(
        buckets
            .iter()
            .map(|b| HistoryPoint {
                x: b.start * 1_000,
                y: b.average_power,
            })
            .collect(),
    ))
}

async fn system_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SystemResponse>, ApiError> {
    let sample_count = state.reader.count().await?;
    let latest = state.reader.latest().await?;
    Ok(Json(SystemResponse {
        uptime_seconds: state.started_at.elapsed().as_secs_f64(),
        sample_count,
        latest_sample_ts: latest.map(|s| s.ts),
        collector: state.collector_stats.as_ref().map(|s| s.snapshot()),
    }))
}

async fn switch_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Json<SwitchRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => return ApiError::InvalidRequest(rejection.body_text()).into_response(),
    };

    match state.gateway.set_switch(request.on).await {
        Ok(outcome) => Json(SwitchResponse {
            success: true,
            code_used: Some(outcome.code_used),
            error: None,
        })
        .into_response(),
        Err(e) => (
            StatusCode::BAD_GATEWAY,
            Json(SwitchResponse {
                success: false,
                code_used: None,
                error: Some(e.to_string()),
            }),
        )
            .into_response(),
    }
}
