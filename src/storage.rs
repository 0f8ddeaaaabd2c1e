//! CSV-backed table persistence.
//!
//! Tables round-trip through CSV, so dtypes are re-normalized on every
//! load: `datetime` and the calendar columns to Int64, measurements to
//! Float64. Inference alone would type an all-integer float column as
//! Int64 and break later vstacks.

use std::collections::HashSet;
use std::fs::File;
use std::path::Path;

use polars::prelude::*;
use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::schema;

pub fn read_table(path: &Path) -> Result<DataFrame> {
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(1000))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;
    debug!("Loaded {} rows from {:?}", df.height(), path);
    normalize_dtypes(df)
}

/// Missing file reads as `None`; derived tables start empty.
pub fn read_table_if_exists(path: &Path) -> Result<Option<DataFrame>> {
    if path.exists() {
        read_table(path).map(Some)
    } else {
        Ok(None)
    }
}

pub fn write_table(path: &Path, df: &mut DataFrame) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent, e))?;
        }
    }
    let mut file = File::create(path).map_err(|e| PipelineError::io(path, e))?;
    CsvWriter::new(&mut file).include_header(true).finish(df)?;
    debug!("Wrote {} rows to {:?}", df.height(), path);
    Ok(())
}

fn normalize_dtypes(df: DataFrame) -> Result<DataFrame> {
    let mut out = df;
    let names: Vec<String> = out
        .get_column_names()
        .iter()
        .map(|s| s.to_string())
        .collect();
    for name in names {
        let target = if schema::INTEGER_COLUMNS.contains(&name.as_str()) {
            DataType::Int64
        } else {
            DataType::Float64
        };
        if out.column(&name)?.dtype() != &target {
            let cast = out.column(&name)?.cast(&target)?;
            out.replace(&name, cast)?;
        }
    }
    Ok(out)
}

pub fn sort_by_datetime(df: &DataFrame) -> Result<DataFrame> {
    Ok(df.sort([schema::DATETIME], SortMultipleOptions::default())?)
}

/// Drops duplicate timestamps, keeping the last occurrence in row order.
/// Callers stack older rows before newer ones, so last wins.
pub fn dedup_keep_last(df: &DataFrame) -> Result<DataFrame> {
    let ts = df.column(schema::DATETIME)?.i64()?;
    let mut seen: HashSet<i64> = HashSet::with_capacity(df.height());
    let mut keep = vec![false; df.height()];
    for idx in (0..df.height()).rev() {
        let key = ts.get(idx).unwrap_or(i64::MIN);
        if seen.insert(key) {
            keep[idx] = true;
        }
    }
    let mask: BooleanChunked = keep.into_iter().collect();
    Ok(df.filter(&mask)?)
}

/// Timestamps of a table as a set, for membership tests against new rows.
pub fn timestamp_set(df: &DataFrame) -> Result<HashSet<i64>> {
    Ok(df
        .column(schema::DATETIME)?
        .i64()?
        .into_no_null_iter()
        .collect())
}

/// Fails fast when a required column is absent.
pub fn require_columns(df: &DataFrame, columns: &[&str], table: &str) -> Result<()> {
    for col in columns {
        if df.column(col).is_err() {
            return Err(PipelineError::missing_column(*col, table));
        }
    }
    Ok(())
}
