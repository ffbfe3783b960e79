//! Weighted nonlinear least squares (Levenberg-Marquardt) with exact model
//! gradients from dual numbers.

use crate::autodiff::Dual;
use crate::traits::Scalar;
use anyhow::{anyhow, bail, Result};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

/// A one-dimensional model y = f(x; p) to be fitted.
pub trait FitModel {
    fn parameter_count(&self) -> usize;
    fn evaluate<T: Scalar>(&self, params: &[T], x: f64) -> T;
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitSettings {
    pub max_iterations: usize,
    /// Relative change in χ² below which an accepted step ends the fit.
    pub tolerance: f64,
    pub initial_lambda: f64,
    pub max_lambda: f64,
}

impl Default for FitSettings {
    fn default() -> Self {
        Self {
            max_iterations: 500,
            tolerance: 1e-10,
            initial_lambda: 1e-3,
            max_lambda: 1e14,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FitResult {
    pub params: Vec<f64>,
    /// Unscaled covariance (JᵀJ)⁻¹ of the weighted problem.
    pub covariance: DMatrix<f64>,
    pub chi2: f64,
    pub iterations: usize,
}

pub fn fit_least_squares<M: FitModel>(
    model: &M,
    xs: &[f64],
    ys: &[f64],
    errors: &[f64],
    initial: &[f64],
    settings: FitSettings,
) -> Result<FitResult> {
    let n_params = model.parameter_count();
    if initial.len() != n_params {
        bail!(
            "Initial parameter count mismatch. Expected {}, got {}.",
            n_params,
            initial.len()
        );
    }
    if xs.len() != ys.len() || xs.len() != errors.len() {
        bail!("Data arrays have different lengths.");
    }
    if xs.len() < n_params {
        bail!(
            "Need at least {} data points to fit {} parameters, got {}.",
            n_params,
            n_params,
            xs.len()
        );
    }
    if let Some(bad) = errors.iter().find(|e| !(**e > 0.0) || !e.is_finite()) {
        bail!("Data uncertainties must be positive and finite (found {bad}).");
    }

    let mut params = initial.to_vec();
    let mut chi2 = chi_squared(model, &params, xs, ys, errors);
    if !chi2.is_finite() {
        bail!("Model is not finite at the initial parameters.");
    }
    let mut lambda = settings.initial_lambda;
    let mut iterations = 0usize;

    loop {
        if iterations >= settings.max_iterations {
            bail!(
                "Fit failed to converge in {} iterations (χ² = {}).",
                settings.max_iterations,
                chi2
            );
        }
        iterations += 1;

        let (jtj, jtr) = normal_equations(model, &params, xs, ys, errors);
        let mut improved = false;
        while lambda <= settings.max_lambda {
            let mut damped = jtj.clone();
            for k in 0..n_params {
                damped[(k, k)] += lambda * jtj[(k, k)].max(1e-300);
            }
            let Some(step) = damped.lu().solve(&jtr) else {
                lambda *= 10.0;
                continue;
            };
            let trial: Vec<f64> = params.iter().zip(step.iter()).map(|(p, d)| p + d).collect();
            let trial_chi2 = chi_squared(model, &trial, xs, ys, errors);
            if trial_chi2.is_finite() && trial_chi2 <= chi2 {
                let change = chi2 - trial_chi2;
                params = trial;
                chi2 = trial_chi2;
                lambda = (lambda * 0.1).max(1e-12);
                improved = true;
                if change <= settings.tolerance * chi2.max(1e-300) {
                    return finish(model, params, chi2, iterations, xs, errors);
                }
                break;
            }
            lambda *= 10.0;
        }

        if !improved {
            // No downhill step exists at any damping: already at the minimum.
            return finish(model, params, chi2, iterations, xs, errors);
        }
    }
}

fn finish<M: FitModel>(
    model: &M,
    params: Vec<f64>,
    chi2: f64,
    iterations: usize,
    xs: &[f64],
    errors: &[f64],
) -> Result<FitResult> {
    let jacobian = weighted_jacobian(model, &params, xs, errors);
    let covariance = (jacobian.transpose() * &jacobian)
        .try_inverse()
        .ok_or_else(|| anyhow!("Fit covariance is singular; parameters are degenerate."))?;
    Ok(FitResult {
        params,
        covariance,
        chi2,
        iterations,
    })
}

fn chi_squared<M: FitModel>(model: &M, params: &[f64], xs: &[f64], ys: &[f64], errors: &[f64]) -> f64 {
    xs.iter()
        .zip(ys)
        .zip(errors)
        .map(|((&x, &y), &e)| {
            let r = (y - model.evaluate(params, x)) / e;
            r * r
        })
        .sum()
}

/// Jacobian of the weighted model values, J_ij = ∂f(x_i)/∂p_j / σ_i.
fn weighted_jacobian<M: FitModel>(model: &M, params: &[f64], xs: &[f64], errors: &[f64]) -> DMatrix<f64> {
    let n_params = params.len();
    let mut jacobian = DMatrix::zeros(xs.len(), n_params);
    let mut dual_params = vec![Dual::new(0.0, 0.0); n_params];
    for j in 0..n_params {
        for (k, p) in params.iter().enumerate() {
            dual_params[k] = Dual::new(*p, if k == j { 1.0 } else { 0.0 });
        }
        for (i, (&x, &e)) in xs.iter().zip(errors).enumerate() {
            jacobian[(i, j)] = model.evaluate(&dual_params, x).eps / e;
        }
    }
    jacobian
}

fn normal_equations<M: FitModel>(
    model: &M,
    params: &[f64],
    xs: &[f64],
    ys: &[f64],
    errors: &[f64],
) -> (DMatrix<f64>, DVector<f64>) {
    let jacobian = weighted_jacobian(model, params, xs, errors);
    let residual = DVector::from_iterator(
        xs.len(),
        xs.iter()
            .zip(ys)
            .zip(errors)
            .map(|((&x, &y), &e)| (y - model.evaluate(params, x)) / e),
    );
    let jt = jacobian.transpose();
    (&jt * &jacobian, jt * residual)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Exponential;

    impl FitModel for Exponential {
        fn parameter_count(&self) -> usize {
            2
        }

        fn evaluate<T: Scalar>(&self, params: &[T], x: f64) -> T {
            params[0] * (params[1] * T::cst(x)).exp()
        }
    }

    fn assert_err_contains<T: std::fmt::Debug>(result: Result<T>, needle: &str) {
        let err = result.expect_err("expected error");
        let message = format!("{err}");
        assert!(
            message.contains(needle),
            "expected error to contain \"{needle}\", got \"{message}\""
        );
    }

    #[test]
    fn recovers_exact_exponential() {
        let xs: Vec<f64> = (0..20).map(|i| 0.1 * i as f64).collect();
        let ys: Vec<f64> = xs.iter().map(|x| 2.5 * (-1.3 * x).exp()).collect();
        let errors = vec![0.01; xs.len()];
        let fit = fit_least_squares(&Exponential, &xs, &ys, &errors, &[1.0, -0.5], FitSettings::default())
            .expect("fit should converge");
        assert!((fit.params[0] - 2.5).abs() < 1e-6);
        assert!((fit.params[1] + 1.3).abs() < 1e-6);
        assert!(fit.chi2 < 1e-8);
        assert_eq!(fit.covariance.nrows(), 2);
        assert!(fit.covariance[(0, 0)] > 0.0);
    }

    #[test]
    fn rejects_non_positive_errors() {
        assert_err_contains(
            fit_least_squares(
                &Exponential,
                &[0.0, 1.0, 2.0],
                &[1.0, 1.0, 1.0],
                &[0.1, 0.0, 0.1],
                &[1.0, 0.0],
                FitSettings::default(),
            ),
            "uncertainties must be positive",
        );
    }

    #[test]
    fn rejects_underdetermined_fit() {
        assert_err_contains(
            fit_least_squares(&Exponential, &[0.0], &[1.0], &[0.1], &[1.0, 0.0], FitSettings::default()),
            "at least 2 data points",
        );
    }
}
