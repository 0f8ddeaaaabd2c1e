use std::path::PathBuf;
use thiserror::Error;

use crate::sarimax::ModelError;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("required column '{column}' missing from {table}")]
    MissingColumn { column: String, table: String },

    #[error("quality gate failed: {0}")]
    QualityGate(String),

    #[error("no candidate model fitted successfully")]
    NoViableModel,

    #[error("insufficient data: need at least {required} rows, have {actual}")]
    InsufficientData { required: usize, actual: usize },

    #[error("history merge would shrink the table from {before} to {after} rows")]
    HistoryShrink { before: usize, after: usize },

    #[error("no model artifact named '{name}' in store at {root:?}")]
    ArtifactNotFound { name: String, root: PathBuf },

    #[error("external API request failed: {0}")]
    Api(#[from] reqwest::Error),

    #[error("unexpected API response: {0}")]
    ApiFormat(String),

    #[error("model estimation failed: {0}")]
    Model(#[from] ModelError),

    #[error("dataframe operation failed: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization failed: {0}")]
    Serde(#[from] serde_json::Error),
}

impl PipelineError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn missing_column(column: impl Into<String>, table: impl Into<String>) -> Self {
        Self::MissingColumn {
            column: column.into(),
            table: table.into(),
        }
    }
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
