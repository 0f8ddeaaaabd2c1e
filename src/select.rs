//! Feature-selection snapshot: a fixed projection of the feature table,
//! advanced by a timestamp high-water mark.

use polars::prelude::*;
use tracing::info;

use crate::error::Result;
use crate::schema::{self, DATETIME};
use crate::storage;

/// Appends rows strictly newer than the snapshot's watermark, projected
/// to the selected columns. Nothing newer is a no-op, not an error.
pub fn append_new(features: &DataFrame, snapshot: Option<DataFrame>) -> Result<DataFrame> {
    storage::require_columns(features, &schema::SELECTED_COLUMNS, "features")?;

    let watermark = match &snapshot {
        Some(existing) => existing.column(DATETIME)?.i64()?.max(),
        None => None,
    };

    let mask: BooleanChunked = features
        .column(DATETIME)?
        .i64()?
        .into_iter()
        .map(|opt| opt.map_or(false, |t| watermark.map_or(true, |w| t > w)))
        .collect();
    let fresh = features.filter(&mask)?;

    let columns: Vec<String> = schema::SELECTED_COLUMNS
        .iter()
        .map(|c| c.to_string())
        .collect();
    let projected = fresh.select(columns)?;

    let combined = match snapshot {
        Some(existing) if projected.height() == 0 => {
            info!("No rows past the snapshot watermark, snapshot unchanged");
            return Ok(existing);
        }
        Some(existing) => {
            info!("Appending {} rows to the snapshot", projected.height());
            existing.vstack(&projected)?
        }
        None => {
            info!("Creating snapshot with {} rows", projected.height());
            projected
        }
    };

    let deduped = storage::dedup_keep_last(&combined)?;
    storage::sort_by_datetime(&deduped)
}
