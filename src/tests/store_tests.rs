#[cfg(test)]
mod store_tests {
    use chrono::Utc;
    use ndarray::Array2;

    use crate::error::PipelineError;
    use crate::sarimax::{SarimaxModel, SarimaxOrder};
    use crate::store::{ModelStore, TrainingMetadata};

    fn fitted_model() -> SarimaxModel {
        let n = 60;
        let x: Vec<f64> = (0..n).map(|i| (i as f64 * 0.37).sin()).collect();
        let y: Vec<f64> = x.iter().map(|v| 1.0 + 2.0 * v).collect();
        let exog = Array2::from_shape_fn((n, 1), |(r, _)| x[r]);
        let order = SarimaxOrder::new((0, 0, 0), (0, 0, 0), 24);
        SarimaxModel::fit(&y, &exog, order, 50).unwrap()
    }

    fn metadata(rmse: f64) -> TrainingMetadata {
        TrainingMetadata {
            rmse,
            mae: rmse / 2.0,
            aic: -10.0,
            target: String::from("aqi_us"),
            features: vec![String::from("x")],
            order: SarimaxOrder::new((0, 0, 0), (0, 0, 0), 24),
            window_rows: 60,
            trained_at: Utc::now(),
        }
    }

    #[test]
    fn versions_auto_increment_and_latest_follows() {
        let dir = tempfile::tempdir().unwrap();
        let store = ModelStore::new(dir.path());

        let first = store
            .save("sarimax_aqi", fitted_model(), metadata(5.0))
            .unwrap();
        assert_eq!(first.version, 1);

        let second = store
            .save("sarimax_aqi", fitted_model(), metadata(4.0))
            .unwrap();
        assert_eq!(second.version, 2);

        let latest = store.load_latest("sarimax_aqi").unwrap();
        assert_eq!(latest.version, 2);
        assert_eq!(latest.metadata.rmse, 4.0);
    }

    #[test]
    fn prior_versions_stay_retrievable() {
        let dir = tempfile::tempdir().unwrap();
        let store = ModelStore::new(dir.path());

        store
            .save("sarimax_aqi", fitted_model(), metadata(5.0))
            .unwrap();
        store
            .save("sarimax_aqi", fitted_model(), metadata(4.0))
            .unwrap();

        let old = store.load_version("sarimax_aqi", 1).unwrap();
        assert_eq!(old.metadata.rmse, 5.0);
    }

    #[test]
    fn missing_artifact_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let store = ModelStore::new(dir.path());
        let result = store.load_latest("sarimax_aqi");
        assert!(matches!(
            result,
            Err(PipelineError::ArtifactNotFound { .. })
        ));
    }

    #[test]
    fn latest_survives_a_lost_pointer() {
        let dir = tempfile::tempdir().unwrap();
        let store = ModelStore::new(dir.path());

        store
            .save("sarimax_aqi", fitted_model(), metadata(5.0))
            .unwrap();
        store
            .save("sarimax_aqi", fitted_model(), metadata(4.0))
            .unwrap();
        std::fs::remove_file(dir.path().join("sarimax_aqi").join("LATEST")).unwrap();

        let latest = store.load_latest("sarimax_aqi").unwrap();
        assert_eq!(latest.version, 2);
    }
}
