//! Candidate fitting, selection, refit and persistence.
//!
//! Exactly two fixed hyperparameter sets are compared; this is a small
//! deliberate comparison, not a search. Each candidate is fitted on the
//! chronological first 80% of the trailing window and scored on the
//! remaining 20%; failures are values, not exceptions, so one diverging
//! candidate never takes the other down.

use std::time::Instant;

use chrono::Utc;
use ndarray::Array2;
use polars::prelude::*;
use tracing::{info, warn};

use crate::config::TrainingConfig;
use crate::error::{PipelineError, Result};
use crate::sarimax::{ModelError, SarimaxModel, SarimaxOrder};
use crate::schema::{self, DATETIME, TARGET};
use crate::stats;
use crate::storage;
use crate::store::{ModelArtifact, ModelStore, TrainingMetadata};
use crate::tracking::MlflowClient;

/// The two candidate orders, in stable comparison order.
pub fn candidates() -> Vec<SarimaxOrder> {
    vec![
        SarimaxOrder::new((0, 0, 0), (2, 0, 2), 6),
        SarimaxOrder::new((2, 0, 0), (2, 0, 2), 12),
    ]
}

#[derive(Debug, Clone)]
pub enum CandidateOutcome {
    Fitted {
        order: SarimaxOrder,
        rmse: f64,
        mae: f64,
        aic: f64,
    },
    Failed {
        order: SarimaxOrder,
        reason: String,
    },
}

/// Target/exogenous arrays pulled from the trailing window of the
/// snapshot, rows with any null dropped.
pub struct TrainingData {
    pub timestamps: Vec<i64>,
    pub target: Vec<f64>,
    pub exog: Array2<f64>,
    pub feature_names: Vec<String>,
}

pub struct TrainingOutcome {
    pub artifact: ModelArtifact,
    pub rmse: f64,
    pub mae: f64,
    pub aic: f64,
    pub duration_seconds: f64,
    pub predictions: DataFrame,
}

/// Restricts the snapshot to the trailing window and materializes the
/// target and exogenous arrays. Exogenous columns are every snapshot
/// column except the timestamp and the target, in snapshot order.
pub fn prepare(snapshot: &DataFrame, window_days: i64) -> Result<TrainingData> {
    storage::require_columns(snapshot, &[DATETIME, TARGET], "feature_selection")?;
    let sorted = storage::sort_by_datetime(snapshot)?;

    let latest = sorted
        .column(DATETIME)?
        .i64()?
        .max()
        .ok_or(PipelineError::InsufficientData {
            required: 1,
            actual: 0,
        })?;
    let cutoff = latest - window_days * 24 * schema::SECONDS_PER_HOUR;
    let mask: BooleanChunked = sorted
        .column(DATETIME)?
        .i64()?
        .into_iter()
        .map(|opt| opt.map_or(false, |t| t > cutoff))
        .collect();
    let window = sorted.filter(&mask)?;
    info!(
        "Training window: {} rows over the trailing {} days",
        window.height(),
        window_days
    );

    let feature_names: Vec<String> = window
        .get_column_names()
        .iter()
        .filter(|name| **name != DATETIME && **name != TARGET)
        .map(|name| name.to_string())
        .collect();

    let timestamps: Vec<Option<i64>> = window.column(DATETIME)?.i64()?.into_iter().collect();
    let target: Vec<Option<f64>> = window
        .column(TARGET)?
        .cast(&DataType::Float64)?
        .f64()?
        .into_iter()
        .collect();
    let mut exog_columns: Vec<Vec<Option<f64>>> = Vec::with_capacity(feature_names.len());
    for name in &feature_names {
        exog_columns.push(
            window
                .column(name)?
                .cast(&DataType::Float64)?
                .f64()?
                .into_iter()
                .collect(),
        );
    }

    // Lag columns are null at the very start of the series; those rows
    // cannot feed the regression.
    let mut kept_ts = Vec::new();
    let mut kept_target = Vec::new();
    let mut kept_rows: Vec<Vec<f64>> = Vec::new();
    'rows: for row in 0..window.height() {
        let (Some(ts), Some(y)) = (timestamps[row], target[row]) else {
            continue;
        };
        let mut values = Vec::with_capacity(exog_columns.len());
        for col in &exog_columns {
            match col[row] {
                Some(v) => values.push(v),
                None => continue 'rows,
            }
        }
        kept_ts.push(ts);
        kept_target.push(y);
        kept_rows.push(values);
    }
    let dropped = window.height() - kept_ts.len();
    if dropped > 0 {
        info!("Dropped {} rows with null features from the window", dropped);
    }

    let mut exog = Array2::<f64>::zeros((kept_rows.len(), feature_names.len()));
    for (r, row) in kept_rows.iter().enumerate() {
        for (c, v) in row.iter().enumerate() {
            exog[[r, c]] = *v;
        }
    }

    Ok(TrainingData {
        timestamps: kept_ts,
        target: kept_target,
        exog,
        feature_names,
    })
}

fn evaluate_candidate(
    data: &TrainingData,
    split: usize,
    order: SarimaxOrder,
    max_iterations: usize,
) -> Result<(f64, f64, f64), ModelError> {
    let train_target = &data.target[..split];
    let val_target = &data.target[split..];
    let train_exog = data.exog.slice(ndarray::s![..split, ..]).to_owned();
    let val_exog = data.exog.slice(ndarray::s![split.., ..]).to_owned();

    let model = SarimaxModel::fit(train_target, &train_exog, order, max_iterations)?;
    let predictions = model.forecast(val_target.len(), Some(&val_exog))?;

    let rmse = stats::rmse(val_target, &predictions);
    let mae = stats::mae(val_target, &predictions);
    if !rmse.is_finite() || !mae.is_finite() {
        return Err(ModelError::NonFinite);
    }
    Ok((rmse, mae, model.aic()))
}

/// Fits every candidate, selects by lowest validation RMSE (first wins a
/// tie), logs the winner to the tracker, refits it on the whole window,
/// forecasts the next horizon, and persists the artifact.
pub async fn run(
    training: &TrainingConfig,
    tracker: Option<&MlflowClient>,
    store: &ModelStore,
    model_name: &str,
    snapshot: &DataFrame,
) -> Result<TrainingOutcome> {
    let started = Instant::now();

    let data = prepare(snapshot, training.window_days)?;
    let n = data.target.len();
    let split = (n as f64 * training.train_fraction) as usize;
    if split == 0 || split >= n {
        return Err(PipelineError::InsufficientData {
            required: 10,
            actual: n,
        });
    }
    info!("Training size: {}, validation size: {}", split, n - split);

    let mut outcomes = Vec::new();
    for order in candidates() {
        info!("Fitting candidate {}", order);
        match evaluate_candidate(&data, split, order, training.max_iterations) {
            Ok((rmse, mae, aic)) => {
                info!(
                    "Candidate {} fitted: rmse={:.4}, mae={:.4}, aic={:.4}",
                    order, rmse, mae, aic
                );
                outcomes.push(CandidateOutcome::Fitted {
                    order,
                    rmse,
                    mae,
                    aic,
                });
            }
            Err(e) => {
                warn!("Candidate {} failed: {}", order, e);
                outcomes.push(CandidateOutcome::Failed {
                    order,
                    reason: e.to_string(),
                });
            }
        }
    }

    let best = select_best(&outcomes).ok_or(PipelineError::NoViableModel)?;
    let (order, rmse, mae, aic) = best;
    info!(
        "Best candidate: {} (rmse={:.4}, mae={:.4}, aic={:.4})",
        order, rmse, mae, aic
    );

    if let Some(client) = tracker {
        let run_name = format!("SARIMAX Run {}", Utc::now().format("%Y-%m-%d"));
        let params = [
            ("p", order.p.to_string()),
            ("d", order.d.to_string()),
            ("q", order.q.to_string()),
            ("P", order.sp.to_string()),
            ("D", order.sd.to_string()),
            ("Q", order.sq.to_string()),
            ("seasonal_period", order.period.to_string()),
        ];
        let metrics = [("rmse", rmse), ("mae", mae), ("aic", aic)];
        let tags = [("stage", "daily_training"), ("model_type", "SARIMAX")];
        if let Err(e) = client.log_run(&run_name, &params, &metrics, &tags).await {
            warn!("Experiment tracker logging failed, continuing: {}", e);
        }
    }

    // Refit on the entire window so the deployed artifact sees all data.
    info!("Refitting {} on the full window", order);
    let model = SarimaxModel::fit(&data.target, &data.exog, order, training.max_iterations)?;

    let predictions = forecast_next(&data, &model, training.horizon)?;

    let metadata = TrainingMetadata {
        rmse,
        mae,
        aic,
        target: TARGET.to_string(),
        features: data.feature_names.clone(),
        order,
        window_rows: n,
        trained_at: Utc::now(),
    };
    let artifact = store.save(model_name, model, metadata)?;

    Ok(TrainingOutcome {
        artifact,
        rmse,
        mae,
        aic,
        duration_seconds: started.elapsed().as_secs_f64(),
        predictions,
    })
}

/// Lowest finite RMSE wins; earlier candidates win ties.
pub fn select_best(outcomes: &[CandidateOutcome]) -> Option<(SarimaxOrder, f64, f64, f64)> {
    let mut best: Option<(SarimaxOrder, f64, f64, f64)> = None;
    for outcome in outcomes {
        if let CandidateOutcome::Fitted {
            order,
            rmse,
            mae,
            aic,
        } = outcome
        {
            match best {
                Some((_, best_rmse, _, _)) if *rmse >= best_rmse => {}
                _ => best = Some((*order, *rmse, *mae, *aic)),
            }
        }
    }
    best
}

/// Forecasts the next `horizon` hours conditioned on the last `horizon`
/// exogenous rows of the window, the way the daily job has always done.
fn forecast_next(
    data: &TrainingData,
    model: &SarimaxModel,
    horizon: usize,
) -> Result<DataFrame> {
    let n = data.target.len();
    if n < horizon {
        return Err(PipelineError::InsufficientData {
            required: horizon,
            actual: n,
        });
    }
    let exog_future = data.exog.slice(ndarray::s![n - horizon.., ..]).to_owned();
    let values = model.forecast(horizon, Some(&exog_future))?;

    let last_ts = *data.timestamps.last().expect("window is non-empty");
    let timestamps: Vec<i64> = (1..=horizon as i64)
        .map(|h| last_ts + h * schema::SECONDS_PER_HOUR)
        .collect();

    info!(
        "Forecast horizon {}: mean={:.2}, min={:.2}, max={:.2}",
        horizon,
        stats::mean(&values),
        values.iter().cloned().fold(f64::INFINITY, f64::min),
        values.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
    );

    Ok(DataFrame::new(vec![
        Series::new(DATETIME, timestamps),
        Series::new("predicted_aqi_us", values),
    ])?)
}
