//! Stateless forecast service.
//!
//! The latest model artifact is loaded once at startup (missing artifact
//! is fatal) and shared read-only across requests. Forecast-time errors
//! are folded into the response status string so one bad request cannot
//! take the process down.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::State;
use axum::http::header;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{Duration, NaiveDateTime, Timelike, Utc};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::error::{PipelineError, Result};
use crate::metrics::{self, MetricsSink};
use crate::store::{ModelArtifact, ModelStore};

pub const DEFAULT_HORIZON: usize = 72;
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Clone)]
pub struct AppState {
    artifact: Arc<ModelArtifact>,
    metrics: MetricsSink,
}

#[derive(Debug, Deserialize)]
pub struct ForecastRequest {
    #[serde(default)]
    pub exog_data: Option<Vec<Vec<f64>>>,
    #[serde(default)]
    pub steps: Option<usize>,
    #[serde(default)]
    pub last_timestamp: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ForecastResponse {
    pub forecast: Vec<f64>,
    pub forecast_dates: Vec<String>,
    pub status: String,
}

pub async fn run(
    store: &ModelStore,
    model_name: &str,
    metrics: MetricsSink,
    addr: SocketAddr,
) -> anyhow::Result<()> {
    let artifact = store
        .load_latest(model_name)
        .context("loading latest model artifact at startup")?;
    info!(
        "Loaded model '{}' version {} ({})",
        artifact.name,
        artifact.version,
        artifact.metadata.order
    );

    let state = AppState {
        artifact: Arc::new(artifact),
        metrics,
    };

    let app = Router::new()
        .route("/forecast", post(forecast))
        .route("/health", get(health))
        .route("/metrics", get(metrics_exposition))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    info!("Forecast service listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn forecast(
    State(state): State<AppState>,
    Json(request): Json<ForecastRequest>,
) -> Json<ForecastResponse> {
    match run_forecast(&state.artifact, &request) {
        Ok((forecast, forecast_dates)) => Json(ForecastResponse {
            forecast,
            forecast_dates,
            status: String::from("success"),
        }),
        Err(e) => Json(ForecastResponse {
            forecast: Vec::new(),
            forecast_dates: Vec::new(),
            status: format!("error: {e}"),
        }),
    }
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "model_loaded": true,
        "model_version": state.artifact.version,
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

async fn metrics_exposition(State(state): State<AppState>) -> ([(header::HeaderName, &'static str); 1], String) {
    let body = metrics::render_exposition(&state.metrics.load());
    ([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], body)
}

/// Core forecast logic, shared between the handler and tests.
pub fn run_forecast(
    artifact: &ModelArtifact,
    request: &ForecastRequest,
) -> Result<(Vec<f64>, Vec<String>)> {
    let steps = request.steps.unwrap_or(DEFAULT_HORIZON);

    // An empty matrix means unconditional, same as omitting it.
    let exog = match &request.exog_data {
        Some(rows) if !rows.is_empty() => Some(rows_to_matrix(rows)?),
        _ => None,
    };

    let values = artifact.model.forecast(steps, exog.as_ref())?;
    let dates = forecast_dates(request.last_timestamp.as_deref(), steps)?;
    Ok((values, dates))
}

fn rows_to_matrix(rows: &[Vec<f64>]) -> Result<Array2<f64>> {
    let width = rows[0].len();
    if rows.iter().any(|r| r.len() != width) {
        return Err(PipelineError::ApiFormat(
            "exog_data rows have inconsistent widths".into(),
        ));
    }
    let mut matrix = Array2::<f64>::zeros((rows.len(), width));
    for (r, row) in rows.iter().enumerate() {
        for (c, v) in row.iter().enumerate() {
            matrix[[r, c]] = *v;
        }
    }
    Ok(matrix)
}

/// Consecutive hours starting one hour after `last_timestamp`, or after
/// the current wall-clock hour when the caller does not anchor the
/// forecast.
fn forecast_dates(last_timestamp: Option<&str>, steps: usize) -> Result<Vec<String>> {
    let base = match last_timestamp {
        Some(raw) => NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
            .map_err(|e| PipelineError::ApiFormat(format!("bad last_timestamp '{raw}': {e}")))?,
        None => Utc::now()
            .naive_utc()
            .with_minute(0)
            .and_then(|dt| dt.with_second(0))
            .and_then(|dt| dt.with_nanosecond(0))
            .expect("hour truncation is always valid"),
    };

    Ok((1..=steps as i64)
        .map(|h| (base + Duration::hours(h)).format(TIMESTAMP_FORMAT).to_string())
        .collect())
}
