//! Seasonal regression-with-exogenous-variables model.
//!
//! The target is regressed on the exogenous block (with a constant) by
//! ordinary least squares; the error series then gets an additive
//! seasonal ARMA process estimated by iterated Hannan-Rissanen
//! regression, a conditional-least-squares scheme with a bounded
//! iteration cap. Stationarity and invertibility are not enforced,
//! matching the configuration the pipeline has always run with.

use std::fmt;

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const CONVERGENCE_TOL: f64 = 1e-7;
const PIVOT_TOL: f64 = 1e-12;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("not enough observations: need at least {required}, have {actual}")]
    InsufficientData { required: usize, actual: usize },

    #[error("normal equations are singular")]
    SingularSystem,

    #[error("estimation produced non-finite coefficients")]
    NonFinite,

    #[error("exogenous width {actual} does not match the fitted width {expected}")]
    ExogWidth { expected: usize, actual: usize },

    #[error("{actual} exogenous rows supplied for {steps} forecast steps")]
    ExogRows { steps: usize, actual: usize },

    #[error("target has {endog} rows but exogenous block has {exog}")]
    LengthMismatch { endog: usize, exog: usize },
}

/// Non-seasonal (p, d, q) and seasonal (P, D, Q, s) orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SarimaxOrder {
    pub p: usize,
    pub d: usize,
    pub q: usize,
    pub sp: usize,
    pub sd: usize,
    pub sq: usize,
    pub period: usize,
}

impl SarimaxOrder {
    pub fn new(
        order: (usize, usize, usize),
        seasonal: (usize, usize, usize),
        period: usize,
    ) -> Self {
        Self {
            p: order.0,
            d: order.1,
            q: order.2,
            sp: seasonal.0,
            sd: seasonal.1,
            sq: seasonal.2,
            period,
        }
    }

    fn n_arma_params(&self) -> usize {
        self.p + self.sp + self.q + self.sq
    }

    fn max_resid_lag(&self) -> usize {
        self.p.max(self.sp * self.period)
    }

    fn max_innov_lag(&self) -> usize {
        self.q.max(self.sq * self.period)
    }

    /// Rows consumed by differencing.
    fn diff_rows(&self) -> usize {
        self.d + self.sd * self.period
    }
}

impl fmt::Display for SarimaxOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({},{},{})x({},{},{},{})",
            self.p, self.d, self.q, self.sp, self.sd, self.sq, self.period
        )
    }
}

/// A fitted model, self-contained for forecasting: coefficient vectors
/// plus the residual/innovation tails and raw-scale tails needed to
/// continue the recursions past the end of the sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SarimaxModel {
    order: SarimaxOrder,
    n_exog: usize,
    /// Constant first, then one coefficient per exogenous column.
    beta: Vec<f64>,
    ar: Vec<f64>,
    sar: Vec<f64>,
    ma: Vec<f64>,
    sma: Vec<f64>,
    sigma2: f64,
    aic: f64,
    nobs: usize,
    resid_tail: Vec<f64>,
    innov_tail: Vec<f64>,
    /// (lag, last values at that level) in differencing application order.
    endog_diff_tails: Vec<(usize, Vec<f64>)>,
    /// Last raw exogenous rows, for differencing continuity and as the
    /// held-constant fallback when a forecast supplies no exogenous data.
    exog_raw_tail: Vec<Vec<f64>>,
}

impl SarimaxModel {
    pub fn fit(
        endog: &[f64],
        exog: &Array2<f64>,
        order: SarimaxOrder,
        max_iterations: usize,
    ) -> Result<Self, ModelError> {
        if endog.len() != exog.nrows() {
            return Err(ModelError::LengthMismatch {
                endog: endog.len(),
                exog: exog.nrows(),
            });
        }

        let (dy, endog_diff_tails) = apply_differencing(endog, &order)?;
        let dx = difference_columns(exog, &order)?;
        let n = dy.len();
        let n_exog = exog.ncols();

        let k = 1 + n_exog + order.n_arma_params();
        let required = 2 * k + order.max_resid_lag() + order.max_innov_lag() + 1;
        if n < required {
            return Err(ModelError::InsufficientData {
                required: required + order.diff_rows(),
                actual: endog.len(),
            });
        }

        // Regression block
        let mut design = Array2::<f64>::ones((n, 1 + n_exog));
        for r in 0..n {
            for c in 0..n_exog {
                design[[r, 1 + c]] = dx[[r, c]];
            }
        }
        let target = Array1::from(dy.clone());
        let beta = solve_least_squares(&design, &target)?;
        if beta.iter().any(|b| !b.is_finite()) {
            return Err(ModelError::NonFinite);
        }
        let fitted = design.dot(&beta);
        let resid: Vec<f64> = dy.iter().zip(fitted.iter()).map(|(y, f)| y - f).collect();

        // Error process
        let (ar, sar, ma, sma, innov) = estimate_seasonal_arma(&resid, &order, max_iterations)?;

        let sse: f64 = innov.iter().map(|e| e * e).sum();
        let sigma2 = (sse / n as f64).max(f64::MIN_POSITIVE);
        let aic = n as f64 * sigma2.ln() + 2.0 * (k as f64 + 1.0);

        let resid_tail = tail(&resid, order.max_resid_lag());
        let innov_tail = tail(&innov, order.max_innov_lag());
        let exog_keep = order.diff_rows().max(1).min(exog.nrows());
        let exog_raw_tail: Vec<Vec<f64>> = (exog.nrows() - exog_keep..exog.nrows())
            .map(|r| exog.row(r).to_vec())
            .collect();

        Ok(Self {
            order,
            n_exog,
            beta: beta.to_vec(),
            ar,
            sar,
            ma,
            sma,
            sigma2,
            aic,
            nobs: n,
            resid_tail,
            innov_tail,
            endog_diff_tails,
            exog_raw_tail,
        })
    }

    /// Forecasts `steps` values past the end of the fitted sample. With
    /// exogenous rows the regression block conditions on them (row count
    /// must equal `steps`); without, the last observed exogenous row is
    /// held constant.
    pub fn forecast(&self, steps: usize, exog: Option<&Array2<f64>>) -> Result<Vec<f64>, ModelError> {
        if steps == 0 {
            return Ok(Vec::new());
        }

        let future_rows: Vec<Vec<f64>> = match exog {
            Some(x) => {
                if x.ncols() != self.n_exog {
                    return Err(ModelError::ExogWidth {
                        expected: self.n_exog,
                        actual: x.ncols(),
                    });
                }
                if x.nrows() != steps {
                    return Err(ModelError::ExogRows {
                        steps,
                        actual: x.nrows(),
                    });
                }
                (0..steps).map(|r| x.row(r).to_vec()).collect()
            }
            None => {
                let last = self
                    .exog_raw_tail
                    .last()
                    .cloned()
                    .unwrap_or_else(|| vec![0.0; self.n_exog]);
                vec![last; steps]
            }
        };

        // Differencing continuity through the stored raw tail.
        let mut combined = self.exog_raw_tail.clone();
        combined.extend(future_rows);
        let combined = rows_to_array(&combined, self.n_exog);
        let diffed = difference_columns(&combined, &self.order)?;
        let offset = diffed.nrows() - steps;

        // Regression mean plus the ARMA extension of the error series.
        let mut resid_ext = self.resid_tail.clone();
        let mut innov_ext = self.innov_tail.clone();
        let hist = resid_ext.len();
        let hist_innov = innov_ext.len();
        for h in 0..steps {
            let t = hist + h;
            let ti = hist_innov + h;
            let mut err = 0.0;
            for (i, coef) in self.ar.iter().enumerate() {
                let lag = i + 1;
                if t >= lag {
                    err += coef * resid_ext[t - lag];
                }
            }
            for (i, coef) in self.sar.iter().enumerate() {
                let lag = (i + 1) * self.order.period;
                if t >= lag {
                    err += coef * resid_ext[t - lag];
                }
            }
            for (j, coef) in self.ma.iter().enumerate() {
                let lag = j + 1;
                if ti >= lag {
                    err += coef * innov_ext[ti - lag];
                }
            }
            for (j, coef) in self.sma.iter().enumerate() {
                let lag = (j + 1) * self.order.period;
                if ti >= lag {
                    err += coef * innov_ext[ti - lag];
                }
            }
            resid_ext.push(err);
            // Future innovations are their expectation, zero.
            innov_ext.push(0.0);
        }

        let mut forecast: Vec<f64> = (0..steps)
            .map(|h| {
                let mut mu = self.beta[0];
                for c in 0..self.n_exog {
                    mu += self.beta[1 + c] * diffed[[offset + h, c]];
                }
                mu + resid_ext[hist + h]
            })
            .collect();

        // Undo differencing, innermost level first.
        for (lag, level_tail) in self.endog_diff_tails.iter().rev() {
            forecast = integrate(&forecast, *lag, level_tail);
        }

        Ok(forecast)
    }

    pub fn order(&self) -> SarimaxOrder {
        self.order
    }

    pub fn n_exog(&self) -> usize {
        self.n_exog
    }

    pub fn aic(&self) -> f64 {
        self.aic
    }

    pub fn sigma2(&self) -> f64 {
        self.sigma2
    }

    pub fn nobs(&self) -> usize {
        self.nobs
    }
}

fn tail(values: &[f64], keep: usize) -> Vec<f64> {
    let keep = keep.min(values.len());
    values[values.len() - keep..].to_vec()
}

fn rows_to_array(rows: &[Vec<f64>], ncols: usize) -> Array2<f64> {
    let mut out = Array2::<f64>::zeros((rows.len(), ncols));
    for (r, row) in rows.iter().enumerate() {
        for c in 0..ncols {
            out[[r, c]] = row[c];
        }
    }
    out
}

/// Applies d regular then D seasonal differences, returning the reduced
/// series and the per-level tails needed to invert the transform.
fn apply_differencing(
    values: &[f64],
    order: &SarimaxOrder,
) -> Result<(Vec<f64>, Vec<(usize, Vec<f64>)>), ModelError> {
    let mut y = values.to_vec();
    let mut tails = Vec::new();
    for _ in 0..order.d {
        if y.len() <= 1 {
            return Err(ModelError::InsufficientData {
                required: order.diff_rows() + 1,
                actual: values.len(),
            });
        }
        tails.push((1, y[y.len() - 1..].to_vec()));
        y = y.windows(2).map(|w| w[1] - w[0]).collect();
    }
    for _ in 0..order.sd {
        let s = order.period;
        if y.len() <= s {
            return Err(ModelError::InsufficientData {
                required: order.diff_rows() + 1,
                actual: values.len(),
            });
        }
        tails.push((s, y[y.len() - s..].to_vec()));
        y = (s..y.len()).map(|i| y[i] - y[i - s]).collect();
    }
    Ok((y, tails))
}

fn difference_columns(matrix: &Array2<f64>, order: &SarimaxOrder) -> Result<Array2<f64>, ModelError> {
    if order.diff_rows() == 0 {
        return Ok(matrix.clone());
    }
    let ncols = matrix.ncols();
    let out_rows = matrix.nrows().saturating_sub(order.diff_rows());
    let mut columns: Vec<Vec<f64>> = Vec::with_capacity(ncols);
    for c in 0..ncols {
        let col: Vec<f64> = matrix.column(c).to_vec();
        let (diffed, _) = apply_differencing(&col, order)?;
        columns.push(diffed);
    }
    let mut out = Array2::<f64>::zeros((out_rows, ncols));
    for (c, col) in columns.iter().enumerate() {
        for (r, v) in col.iter().enumerate() {
            out[[r, c]] = *v;
        }
    }
    Ok(out)
}

/// Inverts one differencing level: each forecast value gets the value
/// `lag` steps earlier, taken from the stored tail until the forecast
/// itself is long enough to supply it.
fn integrate(forecast: &[f64], lag: usize, level_tail: &[f64]) -> Vec<f64> {
    let mut out: Vec<f64> = Vec::with_capacity(forecast.len());
    for (h, f) in forecast.iter().enumerate() {
        let prev = if h < lag {
            level_tail[level_tail.len() - lag + h]
        } else {
            out[h - lag]
        };
        out.push(f + prev);
    }
    out
}

/// Iterated Hannan-Rissanen: innovations from a long autoregression,
/// then repeated regression of the residual on its own lags and the
/// innovation lags, recomputing innovations between rounds, up to the
/// iteration cap or coefficient convergence.
fn estimate_seasonal_arma(
    resid: &[f64],
    order: &SarimaxOrder,
    max_iterations: usize,
) -> Result<(Vec<f64>, Vec<f64>, Vec<f64>, Vec<f64>, Vec<f64>), ModelError> {
    let n_params = order.n_arma_params();
    if n_params == 0 {
        return Ok((Vec::new(), Vec::new(), Vec::new(), Vec::new(), resid.to_vec()));
    }

    let n = resid.len();
    let s = order.period;
    let t0 = order.max_resid_lag().max(order.max_innov_lag());
    if n <= t0 + n_params {
        return Err(ModelError::InsufficientData {
            required: t0 + n_params + 1,
            actual: n,
        });
    }

    let mut innov = if order.q + order.sq > 0 {
        let long_order = (2 * (order.p + order.q + s * (order.sp + order.sq)))
            .clamp(1, (n / 4).max(1));
        ar_innovations(resid, long_order)?
    } else {
        resid.to_vec()
    };

    let mut coeffs = vec![0.0; n_params];
    for _ in 0..max_iterations.max(1) {
        let rows = n - t0;
        let mut design = Array2::<f64>::zeros((rows, n_params));
        let mut target = Array1::<f64>::zeros(rows);
        for (row, t) in (t0..n).enumerate() {
            let mut col = 0;
            for i in 1..=order.p {
                design[[row, col]] = resid[t - i];
                col += 1;
            }
            for i in 1..=order.sp {
                design[[row, col]] = resid[t - i * s];
                col += 1;
            }
            for j in 1..=order.q {
                design[[row, col]] = innov[t - j];
                col += 1;
            }
            for j in 1..=order.sq {
                design[[row, col]] = innov[t - j * s];
                col += 1;
            }
            target[row] = resid[t];
        }

        let updated = solve_least_squares(&design, &target)?;
        if updated.iter().any(|c| !c.is_finite()) {
            return Err(ModelError::NonFinite);
        }
        let delta = updated
            .iter()
            .zip(coeffs.iter())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0_f64, f64::max);
        coeffs = updated.to_vec();

        let (ar, sar, ma, sma) = split_coeffs(&coeffs, order);
        innov = compute_innovations(resid, &ar, &sar, &ma, &sma, order);

        // Pure AR is a single exact least-squares pass.
        if delta < CONVERGENCE_TOL || order.q + order.sq == 0 {
            break;
        }
    }

    let (ar, sar, ma, sma) = split_coeffs(&coeffs, order);
    let innov = compute_innovations(resid, &ar, &sar, &ma, &sma, order);
    Ok((ar, sar, ma, sma, innov))
}

fn split_coeffs(coeffs: &[f64], order: &SarimaxOrder) -> (Vec<f64>, Vec<f64>, Vec<f64>, Vec<f64>) {
    let mut idx = 0;
    let ar = coeffs[idx..idx + order.p].to_vec();
    idx += order.p;
    let sar = coeffs[idx..idx + order.sp].to_vec();
    idx += order.sp;
    let ma = coeffs[idx..idx + order.q].to_vec();
    idx += order.q;
    let sma = coeffs[idx..idx + order.sq].to_vec();
    (ar, sar, ma, sma)
}

fn compute_innovations(
    resid: &[f64],
    ar: &[f64],
    sar: &[f64],
    ma: &[f64],
    sma: &[f64],
    order: &SarimaxOrder,
) -> Vec<f64> {
    let n = resid.len();
    let s = order.period;
    let mut innov = vec![0.0; n];
    for t in 0..n {
        let mut pred = 0.0;
        for (i, coef) in ar.iter().enumerate() {
            let lag = i + 1;
            if t >= lag {
                pred += coef * resid[t - lag];
            }
        }
        for (i, coef) in sar.iter().enumerate() {
            let lag = (i + 1) * s;
            if t >= lag {
                pred += coef * resid[t - lag];
            }
        }
        for (j, coef) in ma.iter().enumerate() {
            let lag = j + 1;
            if t >= lag {
                pred += coef * innov[t - lag];
            }
        }
        for (j, coef) in sma.iter().enumerate() {
            let lag = (j + 1) * s;
            if t >= lag {
                pred += coef * innov[t - lag];
            }
        }
        innov[t] = resid[t] - pred;
    }
    innov
}

/// Long-autoregression innovations for the Hannan-Rissanen first stage.
fn ar_innovations(resid: &[f64], order: usize) -> Result<Vec<f64>, ModelError> {
    let n = resid.len();
    if n <= order + 1 {
        return Err(ModelError::InsufficientData {
            required: order + 2,
            actual: n,
        });
    }
    let rows = n - order;
    let mut design = Array2::<f64>::zeros((rows, order));
    let mut target = Array1::<f64>::zeros(rows);
    for (row, t) in (order..n).enumerate() {
        for i in 1..=order {
            design[[row, i - 1]] = resid[t - i];
        }
        target[row] = resid[t];
    }
    let alpha = solve_least_squares(&design, &target)?;

    let mut innov = vec![0.0; n];
    for t in order..n {
        let mut pred = 0.0;
        for i in 1..=order {
            pred += alpha[i - 1] * resid[t - i];
        }
        innov[t] = resid[t] - pred;
    }
    Ok(innov)
}

/// Least squares through the normal equations, solved by Gaussian
/// elimination with partial pivoting.
fn solve_least_squares(x: &Array2<f64>, y: &Array1<f64>) -> Result<Array1<f64>, ModelError> {
    let xtx = x.t().dot(x);
    let xty = x.t().dot(y);
    solve_linear(xtx, xty)
}

fn solve_linear(mut a: Array2<f64>, mut b: Array1<f64>) -> Result<Array1<f64>, ModelError> {
    let n = a.nrows();
    for col in 0..n {
        let mut pivot_row = col;
        let mut pivot_val = a[[col, col]].abs();
        for row in col + 1..n {
            let v = a[[row, col]].abs();
            if v > pivot_val {
                pivot_row = row;
                pivot_val = v;
            }
        }
        if pivot_val < PIVOT_TOL {
            return Err(ModelError::SingularSystem);
        }
        if pivot_row != col {
            for k in 0..n {
                let tmp = a[[col, k]];
                a[[col, k]] = a[[pivot_row, k]];
                a[[pivot_row, k]] = tmp;
            }
            b.swap(col, pivot_row);
        }
        for row in col + 1..n {
            let factor = a[[row, col]] / a[[col, col]];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                a[[row, k]] -= factor * a[[col, k]];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut solution = Array1::<f64>::zeros(n);
    for row in (0..n).rev() {
        let mut acc = b[row];
        for k in row + 1..n {
            acc -= a[[row, k]] * solution[k];
        }
        solution[row] = acc / a[[row, row]];
    }
    Ok(solution)
}
