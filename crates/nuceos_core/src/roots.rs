use crate::autodiff::{residual_jacobian, Dual};
use crate::traits::ResidualSystem;
use anyhow::{anyhow, bail, Context, Result};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NewtonSettings {
    pub max_steps: usize,
    pub damping: f64,
    pub tolerance: f64,
    /// Number of times a step may be halved when it produces a non-finite
    /// or growing residual.
    pub max_backtracks: usize,
}

impl Default for NewtonSettings {
    fn default() -> Self {
        Self {
            max_steps: 50,
            damping: 1.0,
            tolerance: 1e-10,
            max_backtracks: 12,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewtonOutcome {
    pub state: Vec<f64>,
    pub residual_norm: f64,
    pub iterations: usize,
}

/// Residual plus Jacobian access for the shared Newton loop.
trait NewtonProblem {
    fn evaluate(&mut self, x: &[f64], out: &mut [f64]) -> Result<()>;
    fn jacobian(&mut self, x: &[f64], residual: &[f64]) -> Result<DMatrix<f64>>;
}

struct DualProblem<'a, S> {
    system: &'a S,
}

impl<S> NewtonProblem for DualProblem<'_, S>
where
    S: ResidualSystem<f64> + ResidualSystem<Dual>,
{
    fn evaluate(&mut self, x: &[f64], out: &mut [f64]) -> Result<()> {
        ResidualSystem::<f64>::residual(self.system, x, out);
        Ok(())
    }

    fn jacobian(&mut self, x: &[f64], _residual: &[f64]) -> Result<DMatrix<f64>> {
        Ok(residual_jacobian(self.system, x))
    }
}

struct DifferencedProblem<F> {
    residual: F,
    shifted: Vec<f64>,
    scratch: Vec<f64>,
}

impl<F> NewtonProblem for DifferencedProblem<F>
where
    F: FnMut(&[f64], &mut [f64]) -> Result<()>,
{
    fn evaluate(&mut self, x: &[f64], out: &mut [f64]) -> Result<()> {
        (self.residual)(x, out)
    }

    fn jacobian(&mut self, x: &[f64], residual: &[f64]) -> Result<DMatrix<f64>> {
        let dim = x.len();
        let mut jacobian = DMatrix::zeros(dim, dim);
        self.shifted.clear();
        self.shifted.extend_from_slice(x);
        self.scratch.resize(dim, 0.0);
        for j in 0..dim {
            let h = 1e-7 * x[j].abs().max(1e-3);
            self.shifted[j] = x[j] + h;
            (self.residual)(&self.shifted, &mut self.scratch)
                .context("Residual failed while differencing the Jacobian.")?;
            for i in 0..dim {
                jacobian[(i, j)] = (self.scratch[i] - residual[i]) / h;
            }
            self.shifted[j] = x[j];
        }
        Ok(jacobian)
    }
}

/// Newton iteration with a forward-mode AD Jacobian.
pub fn solve_newton<S>(
    system: &S,
    initial_guess: &[f64],
    settings: NewtonSettings,
) -> Result<NewtonOutcome>
where
    S: ResidualSystem<f64> + ResidualSystem<Dual>,
{
    let dim = ResidualSystem::<f64>::dimension(system);
    newton_loop(dim, initial_guess, settings, &mut DualProblem { system })
}

/// Newton iteration for residuals that cannot be evaluated on dual numbers
/// (they call into iterative solvers). The Jacobian is built from forward
/// differences; a failing residual is treated like a non-finite step.
pub fn solve_newton_fd<F>(
    dim: usize,
    residual: F,
    initial_guess: &[f64],
    settings: NewtonSettings,
) -> Result<NewtonOutcome>
where
    F: FnMut(&[f64], &mut [f64]) -> Result<()>,
{
    let mut problem = DifferencedProblem {
        residual,
        shifted: Vec::with_capacity(dim),
        scratch: Vec::with_capacity(dim),
    };
    newton_loop(dim, initial_guess, settings, &mut problem)
}

fn newton_loop<P: NewtonProblem>(
    dim: usize,
    initial_guess: &[f64],
    settings: NewtonSettings,
    problem: &mut P,
) -> Result<NewtonOutcome> {
    if dim == 0 {
        bail!("System has zero dimension.");
    }
    if initial_guess.len() != dim {
        bail!(
            "Initial guess dimension mismatch. Expected {}, got {}.",
            dim,
            initial_guess.len()
        );
    }
    if settings.max_steps == 0 {
        bail!("max_steps must be greater than zero.");
    }
    if settings.damping <= 0.0 {
        bail!("damping must be positive.");
    }
    if settings.tolerance <= 0.0 {
        bail!("tolerance must be positive.");
    }

    let mut state = initial_guess.to_vec();
    let mut residual = vec![0.0; dim];
    problem.evaluate(&state, &mut residual).context("Residual failed at the initial guess.")?;
    let mut residual_norm = l2_norm(&residual);
    if !residual_norm.is_finite() {
        bail!("Residual is not finite at the initial guess.");
    }
    let mut iterations = 0usize;

    let mut trial = vec![0.0; dim];
    let mut trial_residual = vec![0.0; dim];

    loop {
        if residual_norm <= settings.tolerance {
            break;
        }

        if iterations >= settings.max_steps {
            bail!(
                "Newton solver failed to converge in {} steps (‖f(x)‖ = {}).",
                settings.max_steps,
                residual_norm
            );
        }

        let jacobian = problem.jacobian(&state, &residual)?;
        let delta = solve_linear_system(jacobian, &residual)
            .context("Failed to solve linear system during Newton iteration.")?;

        // Halve the step until the residual is finite and decreasing. When no
        // decrease is found the last finite trial is still taken.
        let mut step = settings.damping;
        let mut accepted: Option<f64> = None;
        let mut fallback: Option<(Vec<f64>, Vec<f64>, f64)> = None;
        for _ in 0..=settings.max_backtracks {
            for i in 0..dim {
                trial[i] = state[i] - step * delta[i];
            }
            let norm = match problem.evaluate(&trial, &mut trial_residual) {
                Ok(()) => l2_norm(&trial_residual),
                Err(_) => f64::NAN,
            };
            if norm.is_finite() {
                if norm < residual_norm {
                    accepted = Some(norm);
                    break;
                }
                if fallback.is_none() {
                    fallback = Some((trial.clone(), trial_residual.clone(), norm));
                }
            }
            step *= 0.5;
        }

        match (accepted, fallback) {
            (Some(norm), _) => {
                state.copy_from_slice(&trial);
                residual.copy_from_slice(&trial_residual);
                residual_norm = norm;
            }
            (None, Some((x, r, norm))) => {
                state = x;
                residual = r;
                residual_norm = norm;
            }
            (None, None) => bail!(
                "Newton step produced a non-finite residual after {} halvings.",
                settings.max_backtracks
            ),
        }

        iterations += 1;
    }

    Ok(NewtonOutcome {
        state,
        residual_norm,
        iterations,
    })
}

fn solve_linear_system(jacobian: DMatrix<f64>, residual: &[f64]) -> Result<Vec<f64>> {
    let rhs = DVector::from_column_slice(residual);
    jacobian
        .lu()
        .solve(&rhs)
        .map(|v| v.iter().cloned().collect())
        .ok_or_else(|| anyhow!("Jacobian is singular."))
}

pub(crate) fn l2_norm(values: &[f64]) -> f64 {
    values.iter().map(|v| v * v).sum::<f64>().sqrt()
}

/// Finds a root of `f` in `[lo, hi]` with the Illinois variant of regula falsi.
/// The endpoints must bracket a sign change.
pub fn solve_bracketed<F>(mut f: F, lo: f64, hi: f64, tolerance: f64, max_steps: usize) -> Result<f64>
where
    F: FnMut(f64) -> Result<f64>,
{
    let (mut a, mut b) = (lo, hi);
    let mut fa = f(a)?;
    let mut fb = f(b)?;
    if fa == 0.0 {
        return Ok(a);
    }
    if fb == 0.0 {
        return Ok(b);
    }
    if !(fa.is_finite() && fb.is_finite()) {
        bail!("Bracket endpoints give non-finite values ({fa}, {fb}).");
    }
    if fa.signum() == fb.signum() {
        bail!("Root is not bracketed in [{lo}, {hi}] (f = {fa}, {fb}).");
    }

    let mut side = 0i8;
    for _ in 0..max_steps {
        let c = (a * fb - b * fa) / (fb - fa);
        let fc = f(c)?;
        if fc == 0.0 || (b - a).abs() <= tolerance * (1.0 + c.abs()) {
            return Ok(c);
        }
        if fc.signum() == fb.signum() {
            b = c;
            fb = fc;
            if side == -1 {
                fa *= 0.5;
            }
            side = -1;
        } else {
            a = c;
            fa = fc;
            if side == 1 {
                fb *= 0.5;
            }
            side = 1;
        }
    }
    bail!("Bracketed solver failed to converge in {max_steps} steps.")
}

/// Widens `[lo, hi]` geometrically in the direction of the missing sign
/// change until `f` changes sign. `f` is assumed monotone increasing.
pub fn expand_bracket<F>(mut f: F, mut lo: f64, mut hi: f64, max_steps: usize) -> Result<(f64, f64)>
where
    F: FnMut(f64) -> Result<f64>,
{
    let mut width = (hi - lo).abs().max(1.0);
    for _ in 0..max_steps {
        let flo = f(lo)?;
        if flo > 0.0 {
            hi = lo;
            lo -= width;
            width *= 2.0;
            continue;
        }
        let fhi = f(hi)?;
        if fhi < 0.0 {
            lo = hi;
            hi += width;
            width *= 2.0;
            continue;
        }
        return Ok((lo, hi));
    }
    bail!("Failed to bracket root after {max_steps} expansions.")
}
