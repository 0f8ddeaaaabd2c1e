//! Feature engineering over the historical table.
//!
//! Two entry points: `rebuild` transforms the whole history at once,
//! `update` transforms only rows newer than the previous feature table.
//! Lags are always taken from the chronologically complete series so a
//! batch boundary never truncates them; the scaler, by contrast, is refit
//! on whatever window is being transformed — in incremental mode that is
//! each new batch on its own, a preserved inconsistency of the original
//! design (scaled values are not comparable across batches).

use std::f64::consts::PI;

use chrono::{DateTime, Datelike, Timelike};
use polars::prelude::*;
use tracing::info;

use crate::error::Result;
use crate::schema::{self, DATETIME, TARGET};
use crate::storage;

/// Zero-mean / unit-variance standardization, population variance.
/// A constant column scales by 1.0 instead of dividing by zero.
#[derive(Debug, Clone)]
pub struct Scaler {
    columns: Vec<String>,
    means: Vec<f64>,
    scales: Vec<f64>,
}

impl Scaler {
    pub fn fit(df: &DataFrame, columns: &[String]) -> Result<Self> {
        let mut means = Vec::with_capacity(columns.len());
        let mut scales = Vec::with_capacity(columns.len());
        for col in columns {
            let values: Vec<f64> = df
                .column(col)?
                .cast(&DataType::Float64)?
                .f64()?
                .into_no_null_iter()
                .collect();
            let mean = crate::stats::mean(&values);
            let std = crate::stats::population_std(&values);
            means.push(if mean.is_finite() { mean } else { 0.0 });
            scales.push(if std.is_finite() && std > 0.0 { std } else { 1.0 });
        }
        Ok(Self {
            columns: columns.to_vec(),
            means,
            scales,
        })
    }

    /// Appends `scaled_<col>` for every fitted column; nulls stay null.
    pub fn transform(&self, df: &mut DataFrame) -> Result<()> {
        for ((col, mean), scale) in self
            .columns
            .iter()
            .zip(self.means.iter())
            .zip(self.scales.iter())
        {
            let scaled: Vec<Option<f64>> = df
                .column(col)?
                .cast(&DataType::Float64)?
                .f64()?
                .into_iter()
                .map(|opt| opt.map(|v| (v - mean) / scale))
                .collect();
            df.with_column(Series::new(&schema::scaled_column(col), scaled))?;
        }
        Ok(())
    }
}

fn add_log_columns(df: &mut DataFrame) -> Result<()> {
    for col in schema::LOG_COLUMNS {
        let logged: Vec<Option<f64>> = df
            .column(col)?
            .cast(&DataType::Float64)?
            .f64()?
            .into_iter()
            .map(|opt| opt.map(f64::ln_1p))
            .collect();
        df.with_column(Series::new(&schema::log_column(col), logged))?;
    }
    Ok(())
}

/// Shifts the target by each lag offset. Must run on the full sorted
/// series before any batch split.
fn add_lag_columns(df: &mut DataFrame) -> Result<()> {
    for offset in schema::LAG_OFFSETS {
        let lag = df.column(TARGET)?.shift(offset);
        df.with_column(lag.with_name(&schema::lag_column(offset)))?;
    }
    Ok(())
}

fn add_calendar_columns(df: &mut DataFrame) -> Result<()> {
    let timestamps: Vec<Option<i64>> = df.column(DATETIME)?.i64()?.into_iter().collect();

    let mut hours: Vec<Option<i64>> = Vec::with_capacity(timestamps.len());
    let mut days: Vec<Option<i64>> = Vec::with_capacity(timestamps.len());
    let mut weekends: Vec<Option<i64>> = Vec::with_capacity(timestamps.len());
    let mut hour_sin: Vec<Option<f64>> = Vec::with_capacity(timestamps.len());
    let mut hour_cos: Vec<Option<f64>> = Vec::with_capacity(timestamps.len());

    for ts in &timestamps {
        match ts.and_then(|t| DateTime::from_timestamp(t, 0)) {
            Some(dt) => {
                let hour = dt.hour() as i64;
                let day = dt.weekday().num_days_from_monday() as i64;
                let angle = hour as f64 * 2.0 * PI / 24.0;
                hours.push(Some(hour));
                days.push(Some(day));
                weekends.push(Some(i64::from(day >= 5)));
                hour_sin.push(Some(angle.sin()));
                hour_cos.push(Some(angle.cos()));
            }
            None => {
                hours.push(None);
                days.push(None);
                weekends.push(None);
                hour_sin.push(None);
                hour_cos.push(None);
            }
        }
    }

    df.with_column(Series::new("hour", hours))?;
    df.with_column(Series::new("day_of_week", days))?;
    df.with_column(Series::new("is_weekend", weekends))?;
    df.with_column(Series::new("hour_sin", hour_sin))?;
    df.with_column(Series::new("hour_cos", hour_cos))?;
    Ok(())
}

fn add_interaction_columns(df: &mut DataFrame) -> Result<()> {
    for (left, right, name) in schema::INTERACTION_COLUMNS {
        let product = (df.column(left)? * df.column(right)?)?;
        df.with_column(product.with_name(name))?;
    }
    Ok(())
}

/// Log, scale (fit on this window), calendar, interactions. Lags are not
/// touched here; they must already be present.
fn transform_window(df: DataFrame) -> Result<DataFrame> {
    let mut df = df;
    add_log_columns(&mut df)?;
    let scale_columns: Vec<String> = schema::SCALE_COLUMNS.iter().map(|c| c.to_string()).collect();
    let scaler = Scaler::fit(&df, &scale_columns)?;
    scaler.transform(&mut df)?;
    add_calendar_columns(&mut df)?;
    add_interaction_columns(&mut df)?;
    Ok(df)
}

fn required_columns() -> Vec<&'static str> {
    let mut cols = vec![DATETIME];
    cols.extend(schema::OBSERVATION_COLUMNS);
    cols
}

/// Full rebuild: every history row transformed in one window.
pub fn rebuild(history: &DataFrame) -> Result<DataFrame> {
    storage::require_columns(history, &required_columns(), "history")?;

    let sorted = storage::sort_by_datetime(&storage::dedup_keep_last(history)?)?;
    let mut with_lags = sorted;
    add_lag_columns(&mut with_lags)?;
    let features = transform_window(with_lags)?;

    info!(
        "Feature rebuild complete: {} rows, {} columns",
        features.height(),
        features.width()
    );
    Ok(features)
}

/// Incremental update: transforms only history rows whose timestamp is
/// absent from `previous`, then merges. An empty new-rows set is a no-op.
pub fn update(history: &DataFrame, previous: &DataFrame) -> Result<DataFrame> {
    storage::require_columns(history, &required_columns(), "history")?;

    let sorted = storage::sort_by_datetime(&storage::dedup_keep_last(history)?)?;
    let known = storage::timestamp_set(previous)?;

    let is_new: Vec<bool> = sorted
        .column(DATETIME)?
        .i64()?
        .into_iter()
        .map(|opt| opt.map_or(false, |t| !known.contains(&t)))
        .collect();
    let new_count = is_new.iter().filter(|new| **new).count();
    let mask: BooleanChunked = is_new.into_iter().collect();
    if new_count == 0 {
        info!("No new rows to engineer, feature table unchanged");
        return Ok(previous.clone());
    }
    info!("Engineering features for {} new rows", new_count);

    // Lags come from the complete series, then the batch is split off.
    let mut with_lags = sorted.clone();
    add_lag_columns(&mut with_lags)?;
    let batch = with_lags.filter(&mask)?;
    let transformed = transform_window(batch)?;

    let columns: Vec<String> = previous
        .get_column_names()
        .iter()
        .map(|s| s.to_string())
        .collect();
    let aligned = transformed.select(columns)?;

    let merged = previous.vstack(&aligned)?;
    let merged = storage::dedup_keep_last(&merged)?;
    storage::sort_by_datetime(&merged)
}
