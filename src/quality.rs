//! Hard quality gate over the historical table.
//!
//! Every check contributes to a single pass/fail verdict; downstream
//! stages must not run on a failed table.

use std::collections::BTreeSet;

use polars::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::Result;
use crate::schema;
use crate::stats;
use crate::storage;

pub const MISSING_FRACTION_LIMIT: f64 = 0.10;
pub const SKEW_THRESHOLD: f64 = 1.0;
pub const IQR_MULTIPLIER: f64 = 1.5;
pub const OUTLIER_FRACTION_LIMIT: f64 = 0.15;

/// Per-column [min, max] domain bounds. Windspeed is capped upstream at
/// 150 kph, so anything above is a fetch artifact.
const DOMAIN_BOUNDS: [(&str, f64, f64); 11] = [
    ("temp_C", -10.0, 55.0),
    ("humidity_%", 0.0, 100.0),
    ("windspeed_kph", 0.0, 150.0),
    ("precip_mm", 0.0, 400.0),
    ("pm10", 0.0, 2000.0),
    ("pm2_5", 0.0, 2000.0),
    ("co", 0.0, 50000.0),
    ("no2", 0.0, 1500.0),
    ("so2", 0.0, 1500.0),
    ("o3", 0.0, 1500.0),
    ("aqi_us", 0.0, 500.0),
];

#[derive(Debug, Clone, Default, Serialize)]
pub struct QualityReport {
    /// Columns whose null fraction exceeds the limit, with the fraction.
    pub missing_columns: Vec<(String, f64)>,
    /// Symmetric difference between skew-observed and expected
    /// log-transform candidates. Any entry fails the gate.
    pub skew_mismatch: Vec<String>,
    /// Columns with out-of-domain values, with the violation count.
    pub range_violations: Vec<(String, usize)>,
    /// Columns whose Tukey-rule outlier count exceeds the limit.
    pub outlier_columns: Vec<(String, usize)>,
    /// Successive timestamp differences that are not exactly one hour.
    pub hour_gaps: usize,
    pub duplicate_timestamps: usize,
}

impl QualityReport {
    pub fn passed(&self) -> bool {
        self.missing_columns.is_empty()
            && self.skew_mismatch.is_empty()
            && self.range_violations.is_empty()
            && self.outlier_columns.is_empty()
            && self.hour_gaps == 0
            && self.duplicate_timestamps == 0
    }

    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        if !self.missing_columns.is_empty() {
            let cols: Vec<String> = self
                .missing_columns
                .iter()
                .map(|(c, f)| format!("{c} ({:.0}% null)", f * 100.0))
                .collect();
            parts.push(format!("missing values in [{}]", cols.join(", ")));
        }
        if !self.skew_mismatch.is_empty() {
            parts.push(format!(
                "skew/log-candidate mismatch on [{}]",
                self.skew_mismatch.join(", ")
            ));
        }
        if !self.range_violations.is_empty() {
            let cols: Vec<String> = self
                .range_violations
                .iter()
                .map(|(c, n)| format!("{c} ({n})"))
                .collect();
            parts.push(format!("out-of-range values in [{}]", cols.join(", ")));
        }
        if !self.outlier_columns.is_empty() {
            let cols: Vec<String> = self
                .outlier_columns
                .iter()
                .map(|(c, n)| format!("{c} ({n})"))
                .collect();
            parts.push(format!("excessive outliers in [{}]", cols.join(", ")));
        }
        if self.hour_gaps > 0 {
            parts.push(format!("{} non-hourly timestamp gaps", self.hour_gaps));
        }
        if self.duplicate_timestamps > 0 {
            parts.push(format!(
                "{} duplicate timestamps",
                self.duplicate_timestamps
            ));
        }
        if parts.is_empty() {
            String::from("all checks passed")
        } else {
            parts.join("; ")
        }
    }
}

/// Runs every check over the table and collects the flags.
pub fn check(history: &DataFrame) -> Result<QualityReport> {
    let mut required = vec![schema::DATETIME];
    required.extend(schema::OBSERVATION_COLUMNS);
    storage::require_columns(history, &required, "history")?;

    let total_rows = history.height();
    info!("Quality gate: checking {} rows", total_rows);

    let mut report = QualityReport::default();
    let mut observed_candidates: BTreeSet<String> = BTreeSet::new();

    for col in schema::OBSERVATION_COLUMNS {
        let series = history.column(col)?;

        // Missing values
        if total_rows > 0 {
            let null_fraction = series.null_count() as f64 / total_rows as f64;
            if null_fraction > MISSING_FRACTION_LIMIT {
                warn!(
                    "Column {} is {:.1}% null",
                    col,
                    null_fraction * 100.0
                );
                report.missing_columns.push((col.to_string(), null_fraction));
            }
        }

        let values: Vec<f64> = series
            .cast(&DataType::Float64)?
            .f64()?
            .into_no_null_iter()
            .collect();

        // Skew-based log-transform candidates
        if stats::skewness(&values) > SKEW_THRESHOLD {
            observed_candidates.insert(col.to_string());
        }

        // Domain range
        if let Some((_, min, max)) = DOMAIN_BOUNDS.iter().find(|(name, _, _)| *name == col) {
            let violations = values.iter().filter(|v| **v < *min || **v > *max).count();
            if violations > 0 {
                report.range_violations.push((col.to_string(), violations));
            }
        }

        // Tukey IQR outliers
        if !values.is_empty() {
            let q1 = stats::quantile(&values, 0.25);
            let q3 = stats::quantile(&values, 0.75);
            let iqr = q3 - q1;
            let lower = q1 - IQR_MULTIPLIER * iqr;
            let upper = q3 + IQR_MULTIPLIER * iqr;
            let outliers = values.iter().filter(|v| **v < lower || **v > upper).count();
            if outliers as f64 > OUTLIER_FRACTION_LIMIT * total_rows as f64 {
                report.outlier_columns.push((col.to_string(), outliers));
            }
        }
    }

    // The gate compares observed candidates against the fixed expected
    // set and fails on ANY difference, in either direction.
    let expected: BTreeSet<String> = schema::LOG_COLUMNS.iter().map(|c| c.to_string()).collect();
    report.skew_mismatch = observed_candidates
        .symmetric_difference(&expected)
        .cloned()
        .collect();

    // Temporal uniformity and duplicates over the sorted timestamps
    let mut timestamps: Vec<i64> = history
        .column(schema::DATETIME)?
        .i64()?
        .into_no_null_iter()
        .collect();
    timestamps.sort_unstable();
    for pair in timestamps.windows(2) {
        match pair[1] - pair[0] {
            0 => report.duplicate_timestamps += 1,
            schema::SECONDS_PER_HOUR => {}
            _ => report.hour_gaps += 1,
        }
    }

    if report.passed() {
        info!("Quality gate passed");
    } else {
        warn!("Quality gate failed: {}", report.summary());
    }

    Ok(report)
}
