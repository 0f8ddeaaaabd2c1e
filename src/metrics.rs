//! Flat key -> number metrics document, merged in place by each stage and
//! re-exposed as Prometheus plaintext gauges.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::{PipelineError, Result};

/// Descriptions rendered into the exposition HELP lines.
const METRIC_DESCRIPTIONS: [(&str, &str); 6] = [
    ("api_success_rate", "API call success rate (1 = success)"),
    ("api_response_time", "API response time in seconds"),
    ("rmse", "Root Mean Squared Error of predictions"),
    ("mae", "Mean Absolute Error of predictions"),
    ("aic", "Akaike Information Criterion from SARIMAX"),
    (
        "training_duration_seconds",
        "Time taken for model training in seconds",
    ),
];

#[derive(Debug, Clone)]
pub struct MetricsSink {
    path: PathBuf,
}

impl MetricsSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// An unreadable or malformed document starts over empty rather than
    /// aborting the stage that wanted to record a number.
    pub fn load(&self) -> BTreeMap<String, f64> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => match serde_json::from_str::<BTreeMap<String, f64>>(&raw) {
                Ok(map) => map,
                Err(e) => {
                    warn!("Failed to parse {:?}, starting fresh: {}", self.path, e);
                    BTreeMap::new()
                }
            },
            Err(_) => BTreeMap::new(),
        }
    }

    /// Merges the given entries into the persisted document, leaving other
    /// keys untouched.
    pub fn update(&self, entries: &[(&str, f64)]) -> Result<()> {
        let mut metrics = self.load();
        for (key, value) in entries {
            metrics.insert((*key).to_string(), *value);
        }
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent, e))?;
            }
        }
        let body = serde_json::to_string_pretty(&metrics)?;
        std::fs::write(&self.path, body).map_err(|e| PipelineError::io(&self.path, e))?;
        Ok(())
    }
}

/// Renders the document in the Prometheus exposition format: one gauge per
/// key with a HELP/TYPE header pair.
pub fn render_exposition(metrics: &BTreeMap<String, f64>) -> String {
    let mut lines = Vec::with_capacity(metrics.len() * 4);
    for (key, value) in metrics {
        let name = key.to_lowercase();
        let desc = METRIC_DESCRIPTIONS
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, d)| *d)
            .unwrap_or("No description available");
        lines.push(format!("# HELP {name} {desc}"));
        lines.push(format!("# TYPE {name} gauge"));
        lines.push(format!("{name} {value}"));
        lines.push(String::new());
    }
    lines.join("\n")
}
