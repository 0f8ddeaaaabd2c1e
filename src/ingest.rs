//! Hourly observation ingestion from the two Open-Meteo APIs.
//!
//! Pollutants and weather arrive as parallel hourly arrays; the two
//! responses are merged on timestamp and folded into the persisted
//! history table, newest fetch winning on duplicate hours.

use std::time::Instant;

use chrono::{NaiveDate, NaiveDateTime};
use polars::prelude::*;
use serde_json::Value;
use tracing::{debug, info};

use crate::config::LocationConfig;
use crate::error::{PipelineError, Result};
use crate::schema;
use crate::storage;

const AIR_QUALITY_URL: &str = "https://air-quality-api.open-meteo.com/v1/air-quality";
const WEATHER_URL: &str = "https://api.open-meteo.com/v1/forecast";

/// Open-Meteo hourly variable -> history column.
const POLLUTANT_VARS: [(&str, &str); 7] = [
    ("pm10", "pm10"),
    ("pm2_5", "pm2_5"),
    ("carbon_monoxide", "co"),
    ("nitrogen_dioxide", "no2"),
    ("sulphur_dioxide", "so2"),
    ("ozone", "o3"),
    ("us_aqi", "aqi_us"),
];

const WEATHER_VARS: [(&str, &str); 4] = [
    ("temperature_2m", "temp_C"),
    ("relative_humidity_2m", "humidity_%"),
    ("wind_speed_10m", "windspeed_kph"),
    ("precipitation", "precip_mm"),
];

/// Fetch outcome recorded into the metrics sink.
#[derive(Debug, Clone, Copy)]
pub struct ApiCallStats {
    pub success_rate: f64,
    pub avg_response_time: f64,
}

pub struct ObservationFetcher {
    http: reqwest::Client,
    location: LocationConfig,
}

impl ObservationFetcher {
    pub fn new(location: LocationConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()?;
        Ok(Self { http, location })
    }

    /// Fetches both APIs for the date range and merges them on timestamp.
    /// A non-2xx response from either API is a hard stop.
    pub async fn fetch_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<(DataFrame, ApiCallStats)> {
        info!(
            "Fetching observations for lat={}, lon={} from {} to {}",
            self.location.latitude, self.location.longitude, start, end
        );

        let (pollutants, pollutant_secs) = self
            .fetch_hourly(AIR_QUALITY_URL, &POLLUTANT_VARS, start, end)
            .await?;
        let (weather, weather_secs) = self
            .fetch_hourly(WEATHER_URL, &WEATHER_VARS, start, end)
            .await?;

        let merged = pollutants.inner_join(&weather, [schema::DATETIME], [schema::DATETIME])?;
        let mut columns: Vec<String> = vec![schema::DATETIME.to_string()];
        columns.extend(schema::OBSERVATION_COLUMNS.iter().map(|c| c.to_string()));
        let merged = merged.select(columns)?;

        info!("Fetched {} hourly observation rows", merged.height());

        // Both calls returned 2xx if we got here.
        let stats = ApiCallStats {
            success_rate: 1.0,
            avg_response_time: (pollutant_secs + weather_secs) / 2.0,
        };
        Ok((merged, stats))
    }

    async fn fetch_hourly(
        &self,
        url: &str,
        vars: &[(&str, &str)],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<(DataFrame, f64)> {
        let hourly: Vec<&str> = vars.iter().map(|(api, _)| *api).collect();
        let params = [
            ("latitude", self.location.latitude.to_string()),
            ("longitude", self.location.longitude.to_string()),
            ("start_date", start.format("%Y-%m-%d").to_string()),
            ("end_date", end.format("%Y-%m-%d").to_string()),
            ("hourly", hourly.join(",")),
            ("timezone", self.location.timezone.clone()),
        ];

        let started = Instant::now();
        let response = self
            .http
            .get(url)
            .query(&params)
            .send()
            .await?
            .error_for_status()?;
        let data: Value = response.json().await?;
        let elapsed = started.elapsed().as_secs_f64();
        debug!("{} responded in {:.3}s", url, elapsed);

        Ok((parse_hourly_block(&data, vars)?, elapsed))
    }
}

fn parse_hourly_block(data: &Value, vars: &[(&str, &str)]) -> Result<DataFrame> {
    let hourly = data
        .get("hourly")
        .ok_or_else(|| PipelineError::ApiFormat("missing 'hourly' block".into()))?;
    let time_array = hourly
        .get("time")
        .and_then(|v| v.as_array())
        .ok_or_else(|| PipelineError::ApiFormat("missing 'time' array".into()))?;

    let mut timestamps: Vec<i64> = Vec::with_capacity(time_array.len());
    for value in time_array {
        let raw = value
            .as_str()
            .ok_or_else(|| PipelineError::ApiFormat("non-string timestamp".into()))?;
        timestamps.push(parse_api_timestamp(raw)?);
    }

    let mut series = vec![Series::new(schema::DATETIME, timestamps)];
    for (api_name, column) in vars {
        let values: Vec<Option<f64>> = (0..time_array.len())
            .map(|i| extract_value(hourly, api_name, i))
            .collect();
        series.push(Series::new(column, values));
    }

    Ok(DataFrame::new(series)?)
}

fn parse_api_timestamp(raw: &str) -> Result<i64> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S"))
        .map(|dt| dt.and_utc().timestamp())
        .map_err(|e| PipelineError::ApiFormat(format!("bad timestamp '{raw}': {e}")))
}

fn extract_value(hourly: &Value, key: &str, index: usize) -> Option<f64> {
    hourly
        .get(key)
        .and_then(|v| v.as_array())
        .and_then(|arr| arr.get(index))
        .and_then(|v| v.as_f64())
}

/// Folds freshly fetched rows into the existing history: stack, dedup by
/// timestamp keeping the newest fetch, sort ascending. Refuses to produce
/// a smaller table than it started with.
pub fn merge_into_history(existing: Option<DataFrame>, fetched: DataFrame) -> Result<DataFrame> {
    let (combined, before) = match existing {
        Some(existing) => {
            let columns: Vec<String> = existing
                .get_column_names()
                .iter()
                .map(|s| s.to_string())
                .collect();
            let aligned = fetched.select(columns)?;
            let before = existing.height();
            (existing.vstack(&aligned)?, before)
        }
        None => {
            info!("No existing history, starting a new table");
            (fetched, 0)
        }
    };

    let deduped = storage::dedup_keep_last(&combined)?;
    let sorted = storage::sort_by_datetime(&deduped)?;

    let after = sorted.height();
    if after < before {
        return Err(PipelineError::HistoryShrink { before, after });
    }
    if after == before {
        info!("No new observations, history unchanged");
    } else {
        info!("History updated: {} new rows", after - before);
    }

    Ok(sorted)
}
