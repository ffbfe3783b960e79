//! Quadrature and special functions: Gauss-Legendre rules, complete
//! Fermi-Dirac integrals and the hypergeometric series needed by the
//! causal extension.

use crate::roots::{expand_bracket, solve_bracketed};
use anyhow::{bail, Result};
use std::f64::consts::PI;
use std::sync::OnceLock;

const GAUSS_ORDER: usize = 32;

/// Nodes and weights of the 32-point Gauss-Legendre rule on [-1, 1].
pub fn gauss_legendre() -> &'static (Vec<f64>, Vec<f64>) {
    static RULE: OnceLock<(Vec<f64>, Vec<f64>)> = OnceLock::new();
    RULE.get_or_init(|| legendre_rule(GAUSS_ORDER))
}

fn legendre_rule(n: usize) -> (Vec<f64>, Vec<f64>) {
    let mut nodes = vec![0.0; n];
    let mut weights = vec![0.0; n];
    let nf = n as f64;
    for i in 0..(n + 1) / 2 {
        let mut x = (PI * (i as f64 + 0.75) / (nf + 0.5)).cos();
        let mut dp = 0.0;
        for _ in 0..100 {
            let (p, d) = legendre_with_derivative(n, x);
            dp = d;
            let dx = p / d;
            x -= dx;
            if dx.abs() < 1e-15 {
                break;
            }
        }
        let (_, d) = legendre_with_derivative(n, x);
        if d != 0.0 {
            dp = d;
        }
        let w = 2.0 / ((1.0 - x * x) * dp * dp);
        nodes[i] = -x;
        nodes[n - 1 - i] = x;
        weights[i] = w;
        weights[n - 1 - i] = w;
    }
    (nodes, weights)
}

fn legendre_with_derivative(n: usize, x: f64) -> (f64, f64) {
    let mut p0 = 1.0;
    let mut p1 = x;
    for k in 2..=n {
        let kf = k as f64;
        let p2 = ((2.0 * kf - 1.0) * x * p1 - (kf - 1.0) * p0) / kf;
        p0 = p1;
        p1 = p2;
    }
    let dp = n as f64 * (x * p1 - p0) / (x * x - 1.0);
    (p1, dp)
}

/// Composite Gauss-Legendre integral of `f` over `[a, b]` split into `panels`.
pub fn integrate<F: Fn(f64) -> f64>(f: F, a: f64, b: f64, panels: usize) -> f64 {
    if b <= a {
        return 0.0;
    }
    let (nodes, weights) = gauss_legendre();
    let width = (b - a) / panels as f64;
    let mut total = 0.0;
    for p in 0..panels {
        let lo = a + width * p as f64;
        let mid = lo + 0.5 * width;
        let half = 0.5 * width;
        let mut sum = 0.0;
        for (x, w) in nodes.iter().zip(weights) {
            sum += w * f(mid + half * x);
        }
        total += sum * half;
    }
    total
}

/// Integral over a sequence of breakpoints, `panels` per segment.
pub fn integrate_segments<F: Fn(f64) -> f64>(f: F, breakpoints: &[f64], panels: usize) -> f64 {
    breakpoints
        .windows(2)
        .map(|w| integrate(&f, w[0], w[1], panels))
        .sum()
}

/// Fermi-Dirac occupation 1/(1 + eˣ), evaluated without overflow.
pub fn fermi_function(x: f64) -> f64 {
    if x > 0.0 {
        let e = (-x).exp();
        e / (1.0 + e)
    } else {
        1.0 / (1.0 + x.exp())
    }
}

/// Complete Fermi-Dirac integral F_j(η) = ∫₀^∞ xʲ / (1 + e^{x-η}) dx for
/// j > -1 (no 1/Γ normalisation).
pub fn fermi_dirac(j: f64, eta: f64) -> f64 {
    if eta > 200.0 {
        return sommerfeld(j, eta);
    }
    // x = t², so the integrand is 2 t^{2j+1} / (1 + e^{t²-η}).
    let integrand = |t: f64| {
        let x = t * t;
        2.0 * t.powf(2.0 * j + 1.0) * fermi_function(x - eta)
    };
    let mut breaks = vec![0.0];
    for x in [eta - 12.0, eta, eta + 12.0] {
        if x > 0.0 {
            breaks.push(x.sqrt());
        }
    }
    breaks.push((eta.max(0.0) + 60.0).sqrt());
    integrate_segments(integrand, &breaks, 4)
}

fn sommerfeld(j: f64, eta: f64) -> f64 {
    let lead = eta.powf(j + 1.0) / (j + 1.0);
    let c2 = PI * PI / 6.0 * (j + 1.0) * j;
    let c4 = 7.0 * PI.powi(4) / 360.0 * (j + 1.0) * j * (j - 1.0) * (j - 2.0);
    lead * (1.0 + c2 / (eta * eta) + c4 / eta.powi(4))
}

/// Solves F_{1/2}(η) = y for η (y > 0).
pub fn inverse_fermi_half(y: f64) -> Result<f64> {
    if !(y > 0.0) || !y.is_finite() {
        bail!("Fermi integral inversion needs a positive finite target (got {y}).");
    }
    // F_{1/2}(η) < Γ(3/2) e^η everywhere, which bounds η from below.
    let gamma_three_halves = 0.5 * PI.sqrt();
    let lo = (y / gamma_three_halves).ln();
    let hi = (1.5 * y).powf(2.0 / 3.0).max(lo) + 1.0;
    let residual = |eta: f64| -> Result<f64> { Ok(fermi_dirac(0.5, eta) / y - 1.0) };
    let (lo, hi) = expand_bracket(residual, lo, hi, 60)?;
    solve_bracketed(residual, lo, hi, 1e-14, 300)
}

/// ₂F₁(1, 1; c; x) by its power series Σ k!/(c)_k xᵏ for |x| < 1.
pub fn hyp2f1_one_one(c: f64, x: f64) -> Result<f64> {
    if c <= 0.0 && c.fract() == 0.0 {
        bail!("Hypergeometric series undefined for c = {c}.");
    }
    if x.abs() >= 1.0 {
        bail!("Hypergeometric series needs |x| < 1 (got {x}).");
    }
    let mut term = 1.0;
    let mut sum = 1.0;
    for k in 0..100_000 {
        let kf = k as f64;
        term *= (kf + 1.0) / (c + kf) * x;
        sum += term;
        if term.abs() <= 1e-16 * sum.abs() {
            return Ok(sum);
        }
    }
    bail!("Hypergeometric series did not converge (c = {c}, x = {x}).")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gauss_rule_integrates_polynomials_exactly() {
        let value = integrate(|x| x.powi(7) - 3.0 * x * x, 0.0, 2.0, 1);
        assert!((value - (32.0 - 8.0)).abs() < 1e-12);
        let (_, weights) = gauss_legendre();
        assert!((weights.iter().sum::<f64>() - 2.0).abs() < 1e-13);
    }

    #[test]
    fn fermi_function_is_stable() {
        assert_eq!(fermi_function(1e4), 0.0);
        assert_eq!(fermi_function(-1e4), 1.0);
        assert!((fermi_function(0.0) - 0.5).abs() < 1e-15);
    }

    #[test]
    fn fermi_integral_limits() {
        // Nondegenerate: F_j(η) → Γ(j+1) e^η.
        let eta = -20.0_f64;
        let expected = 0.5 * PI.sqrt() * eta.exp();
        assert!((fermi_dirac(0.5, eta) / expected - 1.0).abs() < 1e-8);
        // Degenerate: quadrature and Sommerfeld agree near the switch point.
        let quad = {
            let integrand = |t: f64| 2.0 * t.powi(2) * fermi_function(t * t - 150.0);
            integrate_segments(
                integrand,
                &[0.0, 138.0_f64.sqrt(), 150.0_f64.sqrt(), 162.0_f64.sqrt(), 210.0_f64.sqrt()],
                4,
            )
        };
        assert!((quad / sommerfeld(0.5, 150.0) - 1.0).abs() < 1e-10);
    }

    #[test]
    fn fermi_integral_inverts() {
        for eta in [-15.0, -1.0, 0.0, 3.0, 40.0, 500.0] {
            let y = fermi_dirac(0.5, eta);
            let back = inverse_fermi_half(y).expect("inversion should converge");
            assert!((back - eta).abs() < 1e-8 * (1.0 + eta.abs()), "eta = {eta}, got {back}");
        }
    }

    #[test]
    fn hypergeometric_matches_closed_form() {
        // ₂F₁(1, 1; 2; x) = -ln(1 - x) / x
        let x = 0.6_f64;
        let value = hyp2f1_one_one(2.0, x).expect("series should converge");
        assert!((value + (1.0 - x).ln() / x).abs() < 1e-12);
        assert!(hyp2f1_one_one(-2.0, 0.1).is_err());
    }
}
