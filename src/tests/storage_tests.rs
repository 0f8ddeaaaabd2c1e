#[cfg(test)]
mod storage_tests {
    use polars::prelude::*;

    use crate::storage;
    use crate::tests::test_helpers::test_helpers::*;

    #[test]
    fn tables_round_trip_through_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.csv");

        let mut original = synthetic_history(48);
        storage::write_table(&path, &mut original).unwrap();
        let loaded = storage::read_table(&path).unwrap();

        assert_eq!(loaded.height(), original.height());
        assert_eq!(timestamps(&loaded), timestamps(&original));
        assert_eq!(
            column_values(&loaded, "aqi_us"),
            column_values(&original, "aqi_us")
        );
    }

    #[test]
    fn loaded_dtypes_are_normalized() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("table.csv");

        // Whole-number floats would otherwise be inferred back as ints.
        let mut df = df![
            "datetime" => [1_751_328_000_i64, 1_751_331_600],
            "aqi_us" => [100.0, 101.0],
            "hour" => [0_i64, 1],
        ]
        .unwrap();
        storage::write_table(&path, &mut df).unwrap();
        let loaded = storage::read_table(&path).unwrap();

        assert_eq!(loaded.column("datetime").unwrap().dtype(), &DataType::Int64);
        assert_eq!(loaded.column("hour").unwrap().dtype(), &DataType::Int64);
        assert_eq!(
            loaded.column("aqi_us").unwrap().dtype(),
            &DataType::Float64
        );
    }

    #[test]
    fn missing_file_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.csv");
        assert!(storage::read_table_if_exists(&path).unwrap().is_none());
    }

    #[test]
    fn dedup_keeps_the_last_row_per_timestamp() {
        let df = df![
            "datetime" => [10_i64, 20, 20, 30],
            "aqi_us" => [1.0, 2.0, 5.0, 3.0],
        ]
        .unwrap();
        let deduped = storage::dedup_keep_last(&df).unwrap();
        assert_eq!(deduped.height(), 3);
        assert_eq!(
            column_values(&deduped, "aqi_us"),
            vec![Some(1.0), Some(5.0), Some(3.0)]
        );
    }

    #[test]
    fn nulls_survive_the_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sparse.csv");

        let mut df = df![
            "datetime" => [10_i64, 20, 30],
            "pm10" => [Some(1.5), None, Some(2.5)],
        ]
        .unwrap();
        storage::write_table(&path, &mut df).unwrap();
        let loaded = storage::read_table(&path).unwrap();

        assert_eq!(
            column_values(&loaded, "pm10"),
            vec![Some(1.5), None, Some(2.5)]
        );
    }
}
