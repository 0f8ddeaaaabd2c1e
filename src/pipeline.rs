//! Stage orchestration for the scheduled daily run.
//!
//! Stages run strictly in order; the quality gate and training failures
//! abort the run. Everything shared across stages lives in one context
//! object built at process start.

use std::path::Path;
use std::time::Instant;

use anyhow::Result;
use chrono::{Duration, Utc};
use polars::prelude::DataFrame;
use tracing::info;

use crate::config::Config;
use crate::error::PipelineError;
use crate::features;
use crate::ingest::{self, ObservationFetcher};
use crate::metrics::MetricsSink;
use crate::quality;
use crate::select;
use crate::storage;
use crate::store::ModelStore;
use crate::tracking::MlflowClient;
use crate::train;

/// Process-wide collaborators, constructed once and passed into every
/// stage instead of living as module globals.
pub struct AppContext {
    pub config: Config,
    pub metrics: MetricsSink,
    pub store: ModelStore,
    pub tracker: Option<MlflowClient>,
}

impl AppContext {
    pub fn from_config(config: Config) -> Result<Self> {
        let metrics = MetricsSink::new(&config.paths.metrics);
        let store = ModelStore::new(&config.paths.model_store);
        let tracker = match &config.tracking.uri {
            Some(uri) => Some(MlflowClient::new(uri, &config.tracking.experiment)?),
            None => None,
        };
        Ok(Self {
            config,
            metrics,
            store,
            tracker,
        })
    }
}

fn read_required(path: &Path) -> Result<DataFrame> {
    storage::read_table_if_exists(path)?
        .ok_or_else(|| anyhow::anyhow!("required table {:?} does not exist yet", path))
}

/// Stage 1: fetch yesterday's observations and fold them into history.
pub async fn run_ingestion(ctx: &AppContext) -> Result<()> {
    info!("Stage 1: Ingesting observations...");
    let fetcher = ObservationFetcher::new(ctx.config.location.clone())?;
    let yesterday = (Utc::now() - Duration::days(1)).date_naive();

    let (fetched, stats) = fetcher.fetch_range(yesterday, yesterday).await?;
    let existing = storage::read_table_if_exists(&ctx.config.paths.history)?;
    let mut merged = ingest::merge_into_history(existing, fetched)?;
    storage::write_table(&ctx.config.paths.history, &mut merged)?;

    ctx.metrics.update(&[
        ("api_success_rate", stats.success_rate),
        (
            "api_response_time",
            (stats.avg_response_time * 1000.0).round() / 1000.0,
        ),
    ])?;

    info!("Stage 1 complete: history has {} rows", merged.height());
    Ok(())
}

/// Stage 2: hard quality gate. A failed report aborts the run.
pub fn run_quality_gate(ctx: &AppContext) -> Result<()> {
    info!("Stage 2: Running quality gate...");
    let history = read_required(&ctx.config.paths.history)?;
    let report = quality::check(&history)?;
    if !report.passed() {
        return Err(PipelineError::QualityGate(report.summary()).into());
    }
    info!("Stage 2 complete: quality gate passed");
    Ok(())
}

/// Stage 3: feature engineering, incremental when a previous table
/// exists unless a rebuild is forced.
pub fn run_feature_engineering(ctx: &AppContext, rebuild: bool) -> Result<()> {
    info!("Stage 3: Engineering features (rebuild={})...", rebuild);
    let history = read_required(&ctx.config.paths.history)?;
    let previous = storage::read_table_if_exists(&ctx.config.paths.features)?;

    let mut engineered = match (rebuild, previous) {
        (false, Some(previous)) => features::update(&history, &previous)?,
        _ => features::rebuild(&history)?,
    };
    storage::write_table(&ctx.config.paths.features, &mut engineered)?;

    info!("Stage 3 complete: {} feature rows", engineered.height());
    Ok(())
}

/// Stage 4: advance the feature-selection snapshot watermark.
pub fn run_feature_selection(ctx: &AppContext) -> Result<()> {
    info!("Stage 4: Updating feature-selection snapshot...");
    let engineered = read_required(&ctx.config.paths.features)?;
    let snapshot = storage::read_table_if_exists(&ctx.config.paths.snapshot)?;

    let mut updated = select::append_new(&engineered, snapshot)?;
    storage::write_table(&ctx.config.paths.snapshot, &mut updated)?;

    info!("Stage 4 complete: snapshot has {} rows", updated.height());
    Ok(())
}

/// Stage 5: candidate training, selection, refit, horizon forecast,
/// artifact persistence and metrics.
pub async fn run_training(ctx: &AppContext) -> Result<()> {
    info!("Stage 5: Training and selecting models...");
    let snapshot = read_required(&ctx.config.paths.snapshot)?;

    let outcome = train::run(
        &ctx.config.training,
        ctx.tracker.as_ref(),
        &ctx.store,
        &ctx.config.paths.model_name,
        &snapshot,
    )
    .await?;

    let mut predictions = outcome.predictions;
    storage::write_table(&ctx.config.paths.predictions, &mut predictions)?;

    ctx.metrics.update(&[
        ("rmse", (outcome.rmse * 10_000.0).round() / 10_000.0),
        ("mae", (outcome.mae * 10_000.0).round() / 10_000.0),
        ("aic", (outcome.aic * 10_000.0).round() / 10_000.0),
        (
            "training_duration_seconds",
            (outcome.duration_seconds * 100.0).round() / 100.0,
        ),
    ])?;

    info!(
        "Stage 5 complete: model '{}' version {} saved",
        outcome.artifact.name, outcome.artifact.version
    );
    Ok(())
}

/// The whole daily run, stages 1 through 5.
pub async fn run_all(ctx: &AppContext) -> Result<()> {
    let total_start = Instant::now();

    run_ingestion(ctx).await?;
    run_quality_gate(ctx)?;
    run_feature_engineering(ctx, false)?;
    run_feature_selection(ctx)?;
    run_training(ctx).await?;

    info!(
        "Pipeline completed in {:.2} seconds",
        total_start.elapsed().as_secs_f32()
    );
    Ok(())
}
