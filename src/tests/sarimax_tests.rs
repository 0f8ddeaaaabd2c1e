#[cfg(test)]
mod sarimax_tests {
    use approx::assert_relative_eq;
    use ndarray::Array2;

    use crate::sarimax::{ModelError, SarimaxModel, SarimaxOrder};

    fn pure_regression_order() -> SarimaxOrder {
        SarimaxOrder::new((0, 0, 0), (0, 0, 0), 24)
    }

    /// Deterministic noise with no useful structure.
    fn wiggle(i: usize) -> f64 {
        (i as f64 * 12.9898).sin() * 0.01
    }

    #[test]
    fn pure_regression_recovers_coefficients() {
        let n = 80;
        let x: Vec<f64> = (0..n).map(|i| (i as f64 * 0.37).sin() * 4.0).collect();
        let y: Vec<f64> = x.iter().map(|v| 3.0 + 2.0 * v).collect();
        let exog =
            Array2::from_shape_fn((n, 1), |(r, _)| x[r]);

        let model = SarimaxModel::fit(&y, &exog, pure_regression_order(), 50).unwrap();

        let future_x: Vec<f64> = (0..10).map(|i| (i as f64 * 0.91).cos() * 2.0).collect();
        let future = Array2::from_shape_fn((10, 1), |(r, _)| future_x[r]);
        let forecast = model.forecast(10, Some(&future)).unwrap();
        for (pred, x) in forecast.iter().zip(future_x.iter()) {
            assert_relative_eq!(*pred, 3.0 + 2.0 * x, epsilon = 1e-8);
        }
    }

    #[test]
    fn autoregressive_errors_improve_the_forecast() {
        // y = 1 + x + e with e an AR(1) process; the first forecast step
        // should leans towards the sign of the last residual.
        let n = 300;
        let x: Vec<f64> = (0..n).map(|i| (i as f64 * 0.13).sin()).collect();
        let mut e = vec![0.0_f64; n];
        for i in 1..n {
            e[i] = 0.8 * e[i - 1] + wiggle(i);
        }
        let y: Vec<f64> = (0..n).map(|i| 1.0 + x[i] + e[i]).collect();
        let exog = Array2::from_shape_fn((n, 1), |(r, _)| x[r]);

        let order = SarimaxOrder::new((1, 0, 0), (0, 0, 0), 24);
        let model = SarimaxModel::fit(&y, &exog, order, 50).unwrap();
        assert!(model.aic().is_finite());
        assert!(model.sigma2() > 0.0);

        let future = Array2::from_shape_fn((5, 1), |(r, _)| x[(n - 5) + r]);
        let forecast = model.forecast(5, Some(&future)).unwrap();
        assert_eq!(forecast.len(), 5);
        assert!(forecast.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn differencing_extends_a_linear_trend() {
        let n = 50;
        let y: Vec<f64> = (0..n).map(|i| i as f64).collect();
        let exog = Array2::<f64>::zeros((n, 0));

        let order = SarimaxOrder::new((0, 1, 0), (0, 0, 0), 24);
        let model = SarimaxModel::fit(&y, &exog, order, 50).unwrap();

        let forecast = model.forecast(4, None).unwrap();
        for (h, value) in forecast.iter().enumerate() {
            assert_relative_eq!(*value, (n + h) as f64, epsilon = 1e-8);
        }
    }

    #[test]
    fn seasonal_terms_fit_a_periodic_residual() {
        let n = 400;
        let period = 12;
        let x: Vec<f64> = (0..n).map(|i| (i as f64 * 0.21).cos()).collect();
        let y: Vec<f64> = (0..n)
            .map(|i| {
                5.0 + 0.5 * x[i]
                    + 2.0 * ((i % period) as f64 * 2.0 * std::f64::consts::PI / period as f64).sin()
                    + wiggle(i)
            })
            .collect();
        let exog = Array2::from_shape_fn((n, 1), |(r, _)| x[r]);

        let order = SarimaxOrder::new((0, 0, 0), (1, 0, 0), period);
        let model = SarimaxModel::fit(&y, &exog, order, 50).unwrap();

        let future = Array2::from_shape_fn((period, 1), |(r, _)| x[n - period + r]);
        let forecast = model.forecast(period, Some(&future)).unwrap();
        assert!(forecast.iter().all(|v| v.is_finite()));
        // The seasonal swing should survive into the forecast.
        let spread = forecast.iter().cloned().fold(f64::NEG_INFINITY, f64::max)
            - forecast.iter().cloned().fold(f64::INFINITY, f64::min);
        assert!(spread > 1.0, "seasonal spread collapsed: {spread}");
    }

    #[test]
    fn collinear_exog_is_a_candidate_failure() {
        let n = 100;
        let y: Vec<f64> = (0..n).map(|i| 10.0 + wiggle(i)).collect();
        // A constant column is collinear with the intercept.
        let exog = Array2::from_elem((n, 1), 1.0);

        let result = SarimaxModel::fit(&y, &exog, pure_regression_order(), 50);
        assert!(matches!(result, Err(ModelError::SingularSystem)));
    }

    #[test]
    fn too_few_observations_is_reported() {
        let y = vec![1.0, 2.0, 3.0];
        let exog = Array2::<f64>::zeros((3, 0));
        let order = SarimaxOrder::new((2, 0, 0), (2, 0, 2), 12);
        let result = SarimaxModel::fit(&y, &exog, order, 50);
        assert!(matches!(result, Err(ModelError::InsufficientData { .. })));
    }

    #[test]
    fn exog_row_count_must_match_steps() {
        let n = 80;
        let x: Vec<f64> = (0..n).map(|i| (i as f64 * 0.37).sin()).collect();
        let y: Vec<f64> = x.iter().map(|v| 1.0 + v).collect();
        let exog = Array2::from_shape_fn((n, 1), |(r, _)| x[r]);
        let model = SarimaxModel::fit(&y, &exog, pure_regression_order(), 50).unwrap();

        let short = Array2::from_elem((3, 1), 0.5);
        let result = model.forecast(5, Some(&short));
        assert!(matches!(result, Err(ModelError::ExogRows { .. })));

        let wide = Array2::from_elem((5, 2), 0.5);
        let result = model.forecast(5, Some(&wide));
        assert!(matches!(result, Err(ModelError::ExogWidth { .. })));
    }

    #[test]
    fn unconditional_forecast_holds_the_last_exog_row() {
        let n = 80;
        let x: Vec<f64> = (0..n).map(|i| (i % 10) as f64).collect();
        let y: Vec<f64> = x.iter().map(|v| 2.0 + 3.0 * v).collect();
        let exog = Array2::from_shape_fn((n, 1), |(r, _)| x[r]);
        let model = SarimaxModel::fit(&y, &exog, pure_regression_order(), 50).unwrap();

        let forecast = model.forecast(4, None).unwrap();
        let expected = 2.0 + 3.0 * x[n - 1];
        for value in forecast {
            assert_relative_eq!(value, expected, epsilon = 1e-8);
        }
    }

    #[test]
    fn artifact_round_trips_through_json() {
        let n = 80;
        let x: Vec<f64> = (0..n).map(|i| (i as f64 * 0.37).sin()).collect();
        let y: Vec<f64> = x.iter().map(|v| 1.0 + 2.0 * v + 0.0).collect();
        let exog = Array2::from_shape_fn((n, 1), |(r, _)| x[r]);
        let model = SarimaxModel::fit(&y, &exog, pure_regression_order(), 50).unwrap();

        let encoded = serde_json::to_string(&model).unwrap();
        let decoded: SarimaxModel = serde_json::from_str(&encoded).unwrap();

        let future = Array2::from_elem((3, 1), 0.25);
        assert_eq!(
            model.forecast(3, Some(&future)).unwrap(),
            decoded.forecast(3, Some(&future)).unwrap()
        );
    }
}
