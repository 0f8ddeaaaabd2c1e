#[cfg(test)]
mod select_tests {
    use crate::features;
    use crate::schema;
    use crate::select;
    use crate::tests::test_helpers::test_helpers::*;

    #[test]
    fn first_snapshot_takes_every_row() {
        let engineered = features::rebuild(&synthetic_history(60)).unwrap();
        let snapshot = select::append_new(&engineered, None).unwrap();

        assert_eq!(snapshot.height(), 60);
        assert_eq!(snapshot.width(), schema::SELECTED_COLUMNS.len());
        let names: Vec<String> = snapshot
            .get_column_names()
            .iter()
            .map(|s| s.to_string())
            .collect();
        let expected: Vec<String> = schema::SELECTED_COLUMNS
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(names, expected);
    }

    #[test]
    fn rows_at_or_below_the_watermark_are_a_noop() {
        let engineered = features::rebuild(&synthetic_history(80)).unwrap();
        let snapshot = select::append_new(&engineered, None).unwrap();

        // Feed the same rows back: nothing is strictly newer.
        let unchanged = select::append_new(&engineered, Some(snapshot.clone())).unwrap();
        assert_eq!(unchanged.height(), snapshot.height());

        // An older slice is equally a no-op.
        let stale = engineered.slice(0, 40);
        let unchanged = select::append_new(&stale, Some(snapshot.clone())).unwrap();
        assert_eq!(unchanged.height(), snapshot.height());
    }

    #[test]
    fn newer_rows_are_appended_in_order() {
        let full = features::rebuild(&synthetic_history(100)).unwrap();
        let early = full.slice(0, 70);

        let snapshot = select::append_new(&early, None).unwrap();
        assert_eq!(snapshot.height(), 70);

        let advanced = select::append_new(&full, Some(snapshot)).unwrap();
        assert_eq!(advanced.height(), 100);

        let ts = timestamps(&advanced);
        assert!(ts.windows(2).all(|w| w[0] < w[1]), "snapshot not sorted");
    }

    #[test]
    fn missing_projection_column_fails() {
        let engineered = features::rebuild(&synthetic_history(40)).unwrap();
        let broken = engineered.drop("log_pm10").unwrap();
        assert!(select::append_new(&broken, None).is_err());
    }
}
