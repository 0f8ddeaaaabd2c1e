#[cfg(test)]
pub mod test_helpers {
    use polars::prelude::*;

    /// 2025-07-01 00:00:00 UTC.
    pub const BASE_EPOCH: i64 = 1_751_328_000;

    /// Right-skewed series: a low cycling base with an occasional spike,
    /// enough to push adjusted skewness well past 1.0 while keeping the
    /// spike share under the outlier limit.
    pub fn spiky(i: usize, spike: f64) -> f64 {
        if i % 20 == 0 {
            spike
        } else {
            5.0 + (i % 7) as f64
        }
    }

    /// Right-skewed series with its own base pattern and spike cadence,
    /// so no two pollutant columns are linear combinations of each other.
    fn skewed_series(rows: usize, base: f64, modulus: usize, cadence: usize, spike: f64) -> Vec<f64> {
        (0..rows)
            .map(|i| {
                if i % cadence == 0 {
                    spike
                } else {
                    base + (i % modulus) as f64
                }
            })
            .collect()
    }

    /// A clean synthetic history: exact hourly spacing, no duplicates,
    /// no nulls, every value in its domain range, and skewness that puts
    /// exactly the expected columns over the log-transform threshold.
    /// The target mixes incommensurate frequencies so its lag columns
    /// stay linearly independent of each other and of the calendar terms.
    pub fn synthetic_history(rows: usize) -> DataFrame {
        let datetime: Vec<i64> = (0..rows).map(|i| BASE_EPOCH + i as i64 * 3_600).collect();
        let angle = |i: usize| i as f64 * 2.0 * std::f64::consts::PI / 24.0;

        let temp: Vec<f64> = (0..rows).map(|i| 28.0 + 5.0 * angle(i).sin()).collect();
        let humidity: Vec<f64> = (0..rows).map(|i| 55.0 + 10.0 * angle(i).cos()).collect();
        let windspeed: Vec<f64> = (0..rows).map(|i| 10.0 + (i % 5) as f64).collect();
        let o3: Vec<f64> = (0..rows).map(|i| 40.0 + (i % 9) as f64).collect();
        let aqi: Vec<f64> = (0..rows)
            .map(|i| {
                120.0
                    + 30.0 * angle(i).sin()
                    + (i % 11) as f64
                    + 3.0 * (i as f64 * 0.7).sin()
                    + 2.0 * (i as f64 * 1.3).cos()
            })
            .collect();

        let pm10 = skewed_series(rows, 5.0, 7, 20, 320.0);
        let pm2_5 = skewed_series(rows, 4.0, 6, 19, 290.0);
        let co = skewed_series(rows, 3.0, 8, 23, 900.0);
        let no2 = skewed_series(rows, 6.0, 5, 17, 250.0);
        let so2 = skewed_series(rows, 2.0, 9, 21, 240.0);
        let precip = skewed_series(rows, 0.0, 4, 22, 30.0);

        df![
            "datetime" => datetime,
            "pm10" => pm10,
            "pm2_5" => pm2_5,
            "co" => co,
            "no2" => no2,
            "so2" => so2,
            "o3" => o3,
            "aqi_us" => aqi,
            "temp_C" => temp,
            "humidity_%" => humidity,
            "windspeed_kph" => windspeed,
            "precip_mm" => precip,
        ]
        .unwrap()
    }

    pub fn column_values(df: &DataFrame, name: &str) -> Vec<Option<f64>> {
        df.column(name)
            .unwrap()
            .cast(&DataType::Float64)
            .unwrap()
            .f64()
            .unwrap()
            .into_iter()
            .collect()
    }

    pub fn timestamps(df: &DataFrame) -> Vec<i64> {
        df.column("datetime")
            .unwrap()
            .i64()
            .unwrap()
            .into_no_null_iter()
            .collect()
    }
}
