//! Ideal quantum gases: the nonrelativistic nucleon quasiparticle gas used
//! by the Skyrme functionals, relativistic lepton pairs and photons.

use crate::roots::solve_bracketed;
use crate::special::{fermi_dirac, fermi_function, integrate_segments, inverse_fermi_half};
use crate::thermo::{ParticleState, Thermo};
use anyhow::{bail, Context, Result};
use std::f64::consts::PI;

/// Spin-1/2 nonrelativistic Fermi gas at density `n` with effective mass
/// `ms` and temperature `t`. Returns (ν, τ, s): the kinetic chemical
/// potential, the kinetic density and the entropy density.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KineticState {
    pub nu: f64,
    pub tau: f64,
    pub en: f64,
}

pub fn nonrelativistic_fermions(ms: f64, n: f64, t: f64) -> Result<KineticState> {
    if !(ms > 0.0) {
        bail!("Effective mass must be positive (got {ms}).");
    }
    if n < 0.0 || !n.is_finite() {
        bail!("Density must be non-negative (got {n}).");
    }
    if t < 0.0 {
        bail!("Temperature must be non-negative (got {t}).");
    }
    if n == 0.0 {
        return Ok(KineticState {
            nu: 0.0,
            tau: 0.0,
            en: 0.0,
        });
    }
    if t == 0.0 {
        let kf = (3.0 * PI * PI * n).cbrt();
        return Ok(KineticState {
            nu: kf * kf / (2.0 * ms),
            tau: kf.powi(5) / (5.0 * PI * PI),
            en: 0.0,
        });
    }

    let scale = 2.0 * ms * t;
    let target = 2.0 * PI * PI * n / scale.powf(1.5);
    let eta = inverse_fermi_half(target)
        .with_context(|| format!("Failed to invert density n = {n} at T = {t}."))?;
    let tau = scale.powf(2.5) * fermi_dirac(1.5, eta) / (2.0 * PI * PI);
    let nu = eta * t;
    let en = ((5.0 / 3.0) * tau / (2.0 * ms) - nu * n) / t;
    Ok(KineticState { nu, tau, en })
}

/// Momentum integrals for a particle-antiparticle pair at chemical potential
/// `p.mu` (rest mass included). Fills density (net), energy, pressure and entropy.
pub fn pair_mu(p: &mut ParticleState, t: f64) -> Result<()> {
    let (n, ed, pr) = pair_integrals(p.m, p.g, p.mu, t);
    if !(n.is_finite() && ed.is_finite() && pr.is_finite()) {
        bail!("Pair integrals are not finite (m = {}, mu = {}, T = {t}).", p.m, p.mu);
    }
    p.n = n;
    p.ed = ed;
    p.pr = pr;
    p.en = if t > 0.0 { (ed + pr - p.mu * n) / t } else { 0.0 };
    p.nu = p.mu;
    Ok(())
}

/// Solves for the chemical potential reproducing the net density `p.n`.
pub fn pair_density(p: &mut ParticleState, t: f64) -> Result<()> {
    let target = p.n;
    if target < 0.0 || !target.is_finite() {
        bail!("Net lepton density must be non-negative (got {target}).");
    }
    if target == 0.0 {
        p.mu = 0.0;
        return pair_mu(p, t);
    }
    let (m, g) = (p.m, p.g);
    let kf = (6.0 * PI * PI * target / g).cbrt();
    let mut hi = (kf * kf + m * m).sqrt() + 10.0 * t;
    let net = |mu: f64| pair_integrals(m, g, mu, t).0;
    let mut expansions = 0;
    while net(hi) < target {
        hi *= 2.0;
        expansions += 1;
        if expansions > 60 {
            bail!("Failed to bracket lepton chemical potential for n = {target}.");
        }
    }
    let mu = solve_bracketed(|mu| Ok(net(mu) / target - 1.0), 0.0, hi, 1e-13, 400)
        .context("Lepton chemical potential solve failed.")?;
    p.mu = mu;
    pair_mu(p, t)?;
    p.n = target;
    Ok(())
}

fn pair_integrals(m: f64, g: f64, mu: f64, t: f64) -> (f64, f64, f64) {
    let amu = mu.abs();
    if t <= 0.0 {
        if amu <= m {
            return (0.0, 0.0, 0.0);
        }
        let kf = (mu * mu - m * m).sqrt();
        let n = g * kf.powi(3) / (6.0 * PI * PI) * mu.signum();
        let ed = integrate_segments(|k| k * k * (k * k + m * m).sqrt(), &[0.0, kf], 8) * g / (2.0 * PI * PI);
        let pr = amu * n.abs() - ed;
        return (n, ed, pr);
    }

    let e_max = amu.max(m) + 60.0 * t;
    let k_of = |e: f64| (e * e - m * m).max(0.0).sqrt();
    let mut breaks = vec![0.0];
    for e in [amu - 15.0 * t, amu, amu + 15.0 * t] {
        let k = k_of(e);
        if k > *breaks.last().unwrap_or(&0.0) {
            breaks.push(k);
        }
    }
    let k_max = k_of(e_max);
    if k_max > *breaks.last().unwrap_or(&0.0) {
        breaks.push(k_max);
    }

    let occupations = |k: f64| {
        let e = (k * k + m * m).sqrt();
        (e, fermi_function((e - mu) / t), fermi_function((e + mu) / t))
    };
    let pref = g / (2.0 * PI * PI);
    let n = pref
        * integrate_segments(
            |k| {
                let (_, fp, fa) = occupations(k);
                k * k * (fp - fa)
            },
            &breaks,
            4,
        );
    let ed = pref
        * integrate_segments(
            |k| {
                let (e, fp, fa) = occupations(k);
                k * k * e * (fp + fa)
            },
            &breaks,
            4,
        );
    let pr = pref / 3.0
        * integrate_segments(
            |k| {
                let (e, fp, fa) = occupations(k);
                if e > 0.0 {
                    k.powi(4) / e * (fp + fa)
                } else {
                    0.0
                }
            },
            &breaks,
            4,
        );
    (n, ed, pr)
}

/// Photon gas (g = 2).
pub fn photons(t: f64) -> Thermo {
    let pr = PI * PI * t.powi(4) / 45.0;
    Thermo {
        ed: 3.0 * pr,
        pr,
        en: if t > 0.0 { 4.0 * pr / t } else { 0.0 },
    }
}
