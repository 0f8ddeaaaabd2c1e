#[cfg(test)]
mod metrics_tests {
    use crate::metrics::{render_exposition, MetricsSink};

    #[test]
    fn updates_merge_into_the_existing_document() {
        let dir = tempfile::tempdir().unwrap();
        let sink = MetricsSink::new(dir.path().join("metrics.json"));

        sink.update(&[("api_success_rate", 1.0), ("api_response_time", 0.42)])
            .unwrap();
        sink.update(&[("rmse", 5.1234)]).unwrap();

        let loaded = sink.load();
        assert_eq!(loaded.get("api_success_rate"), Some(&1.0));
        assert_eq!(loaded.get("api_response_time"), Some(&0.42));
        assert_eq!(loaded.get("rmse"), Some(&5.1234));
    }

    #[test]
    fn unreadable_document_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.json");
        std::fs::write(&path, "not json at all").unwrap();

        let sink = MetricsSink::new(&path);
        assert!(sink.load().is_empty());

        // Writing after a corrupt read succeeds and replaces the file.
        sink.update(&[("mae", 3.5)]).unwrap();
        assert_eq!(sink.load().get("mae"), Some(&3.5));
    }

    #[test]
    fn exposition_renders_gauges_with_headers() {
        let dir = tempfile::tempdir().unwrap();
        let sink = MetricsSink::new(dir.path().join("metrics.json"));
        sink.update(&[("rmse", 5.5), ("custom_metric", 1.0)])
            .unwrap();

        let body = render_exposition(&sink.load());
        assert!(body.contains("# HELP rmse Root Mean Squared Error of predictions"));
        assert!(body.contains("# TYPE rmse gauge"));
        assert!(body.contains("rmse 5.5"));
        assert!(body.contains("# HELP custom_metric No description available"));
        assert!(body.contains("custom_metric 1"));
    }
}
