use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub location: LocationConfig,
    pub paths: PathConfig,
    pub training: TrainingConfig,
    pub tracking: TrackingConfig,
}

/// Fixed observation site. Defaults point at Karachi.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationConfig {
    pub latitude: f64,
    pub longitude: f64,
    pub timezone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathConfig {
    pub history: PathBuf,
    pub features: PathBuf,
    pub snapshot: PathBuf,
    pub predictions: PathBuf,
    pub metrics: PathBuf,
    pub model_store: PathBuf,
    pub model_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Trailing window, in days, ending at the latest observation.
    pub window_days: i64,
    /// Chronological share of the window used for fitting candidates.
    pub train_fraction: f64,
    /// Iteration cap for the estimation refinement loop.
    pub max_iterations: usize,
    /// Forecast horizon in hours.
    pub horizon: usize,
}

/// Experiment tracker endpoint. Left unset, training skips tracker calls.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackingConfig {
    pub uri: Option<String>,
    pub experiment: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            location: LocationConfig {
                latitude: 24.8607,
                longitude: 67.0011,
                timezone: String::from("Asia/Karachi"),
            },
            paths: PathConfig {
                history: PathBuf::from("data/history.csv"),
                features: PathBuf::from("data/features.csv"),
                snapshot: PathBuf::from("data/feature_selection.csv"),
                predictions: PathBuf::from("data/predictions.csv"),
                metrics: PathBuf::from("metrics.json"),
                model_store: PathBuf::from("models"),
                model_name: String::from("sarimax_aqi"),
            },
            training: TrainingConfig {
                window_days: 90,
                train_fraction: 0.8,
                max_iterations: 50,
                horizon: 72,
            },
            tracking: TrackingConfig {
                uri: None,
                experiment: String::from("AQI Model Logging"),
            },
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(lat) = std::env::var("AQI_LATITUDE") {
            config.location.latitude = lat.parse()?;
        }
        if let Ok(lon) = std::env::var("AQI_LONGITUDE") {
            config.location.longitude = lon.parse()?;
        }
        if let Ok(tz) = std::env::var("AQI_TIMEZONE") {
            config.location.timezone = tz;
        }
        if let Ok(dir) = std::env::var("AQI_DATA_DIR") {
            let dir = PathBuf::from(dir);
            config.paths.history = dir.join("history.csv");
            config.paths.features = dir.join("features.csv");
            config.paths.snapshot = dir.join("feature_selection.csv");
            config.paths.predictions = dir.join("predictions.csv");
        }
        if let Ok(path) = std::env::var("AQI_METRICS_PATH") {
            config.paths.metrics = PathBuf::from(path);
        }
        if let Ok(path) = std::env::var("AQI_MODEL_STORE") {
            config.paths.model_store = PathBuf::from(path);
        }
        if let Ok(uri) = std::env::var("MLFLOW_TRACKING_URI") {
            config.tracking.uri = Some(uri);
        }
        if let Ok(name) = std::env::var("MLFLOW_EXPERIMENT_NAME") {
            config.tracking.experiment = name;
        }
        if let Ok(days) = std::env::var("AQI_WINDOW_DAYS") {
            config.training.window_days = days.parse()?;
        }

        Ok(config)
    }
}
