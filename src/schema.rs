//! Column names and table schemas shared across pipeline stages.
//!
//! The `datetime` column holds hour-aligned UTC instants as epoch seconds;
//! every other observation column is a float measurement.

/// Timestamp column, epoch seconds, unique and ascending in every table.
pub const DATETIME: &str = "datetime";

/// Forecast target.
pub const TARGET: &str = "aqi_us";

/// Measurement columns of one observation row, in table order.
pub const OBSERVATION_COLUMNS: [&str; 11] = [
    "pm10",
    "pm2_5",
    "co",
    "no2",
    "so2",
    "o3",
    "aqi_us",
    "temp_C",
    "humidity_%",
    "windspeed_kph",
    "precip_mm",
];

/// Right-skewed measurements that get a `log_<col>` companion.
pub const LOG_COLUMNS: [&str; 6] = ["co", "pm2_5", "pm10", "precip_mm", "so2", "no2"];

/// Columns standardized into `scaled_<col>`.
pub const SCALE_COLUMNS: [&str; 10] = [
    "temp_C",
    "humidity_%",
    "windspeed_kph",
    "log_pm2_5",
    "log_pm10",
    "log_precip_mm",
    "log_co",
    "log_no2",
    "log_so2",
    "o3",
];

/// Lag offsets (hours) applied to the target.
pub const LAG_OFFSETS: [i64; 3] = [1, 12, 24];

/// Pairwise interaction products, (left, right, output name).
pub const INTERACTION_COLUMNS: [(&str, &str, &str); 3] = [
    (
        "log_pm2_5",
        "scaled_windspeed_kph",
        "log_pm2_5_scaled_windspeed_kph",
    ),
    ("scaled_temp_C", "scaled_o3", "scaled_temp_C_scaled_o3"),
    (
        "scaled_temp_C",
        "scaled_windspeed_kph",
        "scaled_temp_C_scaled_windspeed_kph",
    ),
];

/// Projection persisted to the feature-selection snapshot.
pub const SELECTED_COLUMNS: [&str; 14] = [
    "datetime",
    "aqi_us_lag1",
    "aqi_us_lag12",
    "aqi_us_lag24",
    "pm2_5",
    "log_pm10",
    "scaled_humidity_%",
    "scaled_temp_C_scaled_windspeed_kph",
    "log_so2",
    "day_of_week",
    "scaled_temp_C",
    "scaled_temp_C_scaled_o3",
    "log_no2",
    "aqi_us",
];

/// Columns stored as integers; everything else numeric is Float64.
pub const INTEGER_COLUMNS: [&str; 4] = ["datetime", "hour", "day_of_week", "is_weekend"];

/// Lag column name for an offset.
pub fn lag_column(offset: i64) -> String {
    format!("{}_lag{}", TARGET, offset)
}

/// Log-transform column name.
pub fn log_column(col: &str) -> String {
    format!("log_{col}")
}

/// Standardized column name.
pub fn scaled_column(col: &str) -> String {
    format!("scaled_{col}")
}

pub const SECONDS_PER_HOUR: i64 = 3_600;
