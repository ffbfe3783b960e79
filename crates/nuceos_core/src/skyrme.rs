//! Homogeneous-matter Skyrme functional.
//!
//! Energy density in isoscalar/isovector form,
//!
//!   E = Σ_q τ_q/2m_q + C0τ ρ0 τ0 + C1τ ρ1 τ1
//!       + (C0ρρ + C0ρD ρ0^γ) ρ0² + (C1ρρ + C1ρD ρ0^γ) ρ1²,
//!
//! with ρ0 = n_n + n_p, ρ1 = n_n − n_p and likewise for τ. At finite
//! temperature nucleons are quasiparticles of effective mass m*_q in a
//! nonrelativistic Fermi gas. Everything is in fm units; rest masses are
//! excluded from energies and chemical potentials.

use crate::constants::{mev_to_fm, M_NEUTRON_MEV, M_PROTON_MEV};
use crate::gas::nonrelativistic_fermions;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Output of a functional evaluation (fm⁻⁴, fm⁻³, fm⁻¹).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FunctionalPoint {
    pub ed: f64,
    pub pr: f64,
    pub en: f64,
    pub mu_n: f64,
    pub mu_p: f64,
    pub ms_n: f64,
    pub ms_p: f64,
}

impl FunctionalPoint {
    pub fn free_energy(&self, t: f64) -> f64 {
        self.ed - t * self.en
    }
}

/// The mean-field service the combiner consumes.
pub trait NuclearFunctional {
    fn evaluate_zero_temperature(&self, n_n: f64, n_p: f64) -> Result<FunctionalPoint>;
    fn evaluate(&self, n_n: f64, n_p: f64, t: f64) -> Result<FunctionalPoint>;
    /// Neutron and proton effective masses (fm⁻¹). A non-positive value
    /// marks an unphysical parametrization at these densities.
    fn effective_masses(&self, n_n: f64, n_p: f64) -> (f64, f64);
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SkyrmeCouplings {
    pub c0_rr: f64,
    pub c0_rd: f64,
    pub c1_rr: f64,
    pub c1_rd: f64,
    pub c0_tau: f64,
    pub c1_tau: f64,
    pub gamma: f64,
}

/// Traditional (t_i, x_i, α) parametrization.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SkyrmeParams {
    pub t0: f64,
    pub t1: f64,
    pub t2: f64,
    pub t3: f64,
    pub x0: f64,
    pub x1: f64,
    pub x2: f64,
    pub x3: f64,
    pub alpha: f64,
}

impl SkyrmeParams {
    /// Parametrization fitted to chiral effective field theory, used for the
    /// finite-temperature corrections.
    pub fn chiral() -> Self {
        Self {
            t0: 5.067286719233e+03,
            t1: 1.749251370992e+00,
            t2: -4.721193938990e-01,
            t3: -1.945964529505e+05,
            x0: 4.197555064408e+01,
            x1: -6.947915483747e-02,
            x2: 4.192016722695e-01,
            x3: -2.877974634128e+01,
            alpha: 0.144165,
        }
    }

    pub fn couplings(&self) -> SkyrmeCouplings {
        SkyrmeCouplings {
            c0_rr: 3.0 * self.t0 / 8.0,
            c0_rd: self.t3 / 16.0,
            c1_rr: -self.t0 * (0.5 + self.x0) / 4.0,
            c1_rd: -self.t3 * (0.5 + self.x3) / 24.0,
            c0_tau: 3.0 * self.t1 / 16.0 + self.t2 * (5.0 + 4.0 * self.x2) / 16.0,
            c1_tau: -self.t1 * (0.5 + self.x1) / 8.0 + self.t2 * (0.5 + self.x2) / 8.0,
            gamma: self.alpha,
        }
    }
}

/// Bulk properties a functional is fitted to. Energies in MeV, n0 in fm⁻³,
/// effective masses as ratios m*/m.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SaturationProperties {
    pub n0: f64,
    pub eoa: f64,
    pub k: f64,
    pub ms_star: f64,
    pub mv_star: f64,
    pub s: f64,
    pub l: f64,
}

/// Isovector effective mass used when a table does not provide one.
pub const DEFAULT_MV_STAR: f64 = 1.0 / 1.249;

/// Gradient couplings of finite nuclei (MeV fm⁵). Stored for reference; they
/// vanish in homogeneous matter.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SurfaceCouplings {
    pub c_rdr0: f64,
    pub c_rdr1: f64,
    pub c_rdj0: f64,
    pub c_rdj1: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkyrmeFunctional {
    pub couplings: SkyrmeCouplings,
    pub m_n: f64,
    pub m_p: f64,
    pub surface: SurfaceCouplings,
}

impl SkyrmeFunctional {
    pub fn new(couplings: SkyrmeCouplings) -> Self {
        Self {
            couplings,
            m_n: mev_to_fm(M_NEUTRON_MEV),
            m_p: mev_to_fm(M_PROTON_MEV),
            surface: SurfaceCouplings::default(),
        }
    }

    pub fn chiral() -> Self {
        Self::new(SkyrmeParams::chiral().couplings())
    }

    /// Couplings reproducing the given saturation point, incompressibility,
    /// effective masses and symmetry energy with its slope.
    pub fn from_saturation(props: &SaturationProperties) -> Result<Self> {
        if !(props.n0 > 0.0) {
            bail!("Saturation density must be positive (got {}).", props.n0);
        }
        if !(props.ms_star > 0.0 && props.mv_star > 0.0) {
            bail!(
                "Effective mass ratios must be positive (got {}, {}).",
                props.ms_star,
                props.mv_star
            );
        }
        let m_n = mev_to_fm(M_NEUTRON_MEV);
        let m_p = mev_to_fm(M_PROTON_MEV);
        // Mean of 1/2m_q, so symmetric-matter kinetic energy is exactly hb·τ0.
        let hb = 0.25 / m_n + 0.25 / m_p;
        let n0 = props.n0;
        let ck = 0.6 * (1.5 * PI * PI).powf(2.0 / 3.0);

        let c0_tau = hb * (1.0 / props.ms_star - 1.0) / n0;
        let c1_tau = c0_tau - hb * (1.0 / props.mv_star - 1.0) / n0;

        // Kinetic plus effective-mass part of E/A in symmetric matter and its
        // first two derivatives at n0.
        let n23 = n0.powf(2.0 / 3.0);
        let ek = ck * n23 * (hb + c0_tau * n0);
        let ek1 = ck * ((2.0 / 3.0) * hb * n0.powf(-1.0 / 3.0) + (5.0 / 3.0) * c0_tau * n23);
        let ek2 = ck * (-(2.0 / 9.0) * hb * n0.powf(-4.0 / 3.0) + (10.0 / 9.0) * c0_tau * n0.powf(-1.0 / 3.0));

        let e = mev_to_fm(props.eoa);
        let kk = mev_to_fm(props.k);
        let den = ek - e - n0 * ek1;
        if den.abs() < 1e-12 {
            bail!("Saturation properties leave the density dependence undetermined.");
        }
        let gamma = (kk / 9.0 - n0 * n0 * ek2) / den - 1.0;
        if !(gamma.abs() > 1e-8) || !gamma.is_finite() {
            bail!("Saturation properties give degenerate exponent gamma = {gamma}.");
        }
        let b = den / gamma;
        let c0_rd = b / n0.powf(1.0 + gamma);
        let c0_rr = (e - ek - b) / n0;

        // Symmetry energy: kinetic plus effective-mass parts, then the two
        // isovector density couplings from S(n0) and L = 3 n0 S'(n0).
        let sk = (5.0 / 9.0) * ck * n23 * (hb + c0_tau * n0) + (5.0 / 3.0) * c1_tau * ck * n0 * n23;
        let sk1 = (5.0 / 9.0) * ck * ((2.0 / 3.0) * hb * n0.powf(-1.0 / 3.0) + (5.0 / 3.0) * c0_tau * n23)
            + (25.0 / 9.0) * c1_tau * ck * n23;
        let a1 = mev_to_fm(props.s) - sk;
        let a2 = mev_to_fm(props.l) / 3.0 - n0 * sk1;
        let n0g = n0.powf(1.0 + gamma);
        let c1_rd = (a2 - a1) / (gamma * n0g);
        let c1_rr = (a1 - c1_rd * n0g) / n0;

        let couplings = SkyrmeCouplings {
            c0_rr,
            c0_rd,
            c1_rr,
            c1_rd,
            c0_tau,
            c1_tau,
            gamma,
        };
        Ok(Self {
            couplings,
            m_n,
            m_p,
            surface: SurfaceCouplings::default(),
        })
    }

    pub fn with_surface(mut self, surface: SurfaceCouplings) -> Self {
        self.surface = surface;
        self
    }

    fn point(&self, n_n: f64, n_p: f64, t: f64) -> Result<FunctionalPoint> {
        if n_n < 0.0 || n_p < 0.0 || !(n_n.is_finite() && n_p.is_finite()) {
            bail!("Densities must be non-negative (n_n = {n_n}, n_p = {n_p}).");
        }
        let c = &self.couplings;
        let (ms_n, ms_p) = self.effective_masses(n_n, n_p);
        if !(ms_n > 0.0 && ms_p > 0.0) || !(ms_n.is_finite() && ms_p.is_finite()) {
            bail!("Non-positive effective mass at n_n = {n_n}, n_p = {n_p} ({ms_n}, {ms_p}).");
        }

        let neutrons = nonrelativistic_fermions(ms_n, n_n, t).context("Neutron gas failed.")?;
        let protons = nonrelativistic_fermions(ms_p, n_p, t).context("Proton gas failed.")?;

        let rho0 = n_n + n_p;
        let rho1 = n_n - n_p;
        let tau0 = neutrons.tau + protons.tau;
        let tau1 = neutrons.tau - protons.tau;
        let rg = if rho0 > 0.0 { rho0.powf(c.gamma) } else { 0.0 };
        let crho0 = c.c0_rr + c.c0_rd * rg;
        let crho1 = c.c1_rr + c.c1_rd * rg;

        let ed = neutrons.tau / (2.0 * self.m_n)
            + protons.tau / (2.0 * self.m_p)
            + c.c0_tau * rho0 * tau0
            + c.c1_tau * rho1 * tau1
            + crho0 * rho0 * rho0
            + crho1 * rho1 * rho1;

        // ∂E/∂ρ_q at fixed τ.
        let common = c.c0_tau * tau0
            + 2.0 * crho0 * rho0
            + c.gamma * c.c0_rd * rg * rho0
            + if rho0 > 0.0 {
                c.gamma * c.c1_rd * rg / rho0 * rho1 * rho1
            } else {
                0.0
            };
        let isovector = c.c1_tau * tau1 + 2.0 * crho1 * rho1;
        let u_n = common + isovector;
        let u_p = common - isovector;

        let mu_n = neutrons.nu + u_n;
        let mu_p = protons.nu + u_p;
        let en = neutrons.en + protons.en;
        let pr = mu_n * n_n + mu_p * n_p - (ed - t * en);

        Ok(FunctionalPoint {
            ed,
            pr,
            en,
            mu_n,
            mu_p,
            ms_n,
            ms_p,
        })
    }
}

impl NuclearFunctional for SkyrmeFunctional {
    fn evaluate_zero_temperature(&self, n_n: f64, n_p: f64) -> Result<FunctionalPoint> {
        self.point(n_n, n_p, 0.0)
    }

    fn evaluate(&self, n_n: f64, n_p: f64, t: f64) -> Result<FunctionalPoint> {
        if t < 0.0 {
            bail!("Temperature must be non-negative (got {t}).");
        }
        self.point(n_n, n_p, t)
    }

    fn effective_masses(&self, n_n: f64, n_p: f64) -> (f64, f64) {
        let c = &self.couplings;
        let rho0 = n_n + n_p;
        let rho1 = n_n - n_p;
        let inv_n = 1.0 / (2.0 * self.m_n) + c.c0_tau * rho0 + c.c1_tau * rho1;
        let inv_p = 1.0 / (2.0 * self.m_p) + c.c0_tau * rho0 - c.c1_tau * rho1;
        (0.5 / inv_n, 0.5 / inv_p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::HBAR_C;

    fn empirical() -> SaturationProperties {
        SaturationProperties {
            n0: 0.16,
            eoa: -16.0,
            k: 200.0,
            ms_star: 0.8,
            mv_star: DEFAULT_MV_STAR,
            s: 32.0,
            l: 50.0,
        }
    }

    fn energy_per_baryon(sk: &SkyrmeFunctional, n: f64, delta: f64) -> f64 {
        let th = sk
            .evaluate_zero_temperature(0.5 * n * (1.0 + delta), 0.5 * n * (1.0 - delta))
            .expect("functional should evaluate");
        th.ed / n * HBAR_C
    }

    #[test]
    fn saturation_fit_reproduces_inputs() {
        let props = empirical();
        let sk = SkyrmeFunctional::from_saturation(&props).expect("fit should succeed");
        let n0 = props.n0;
        let h = 1e-4;

        let e0 = energy_per_baryon(&sk, n0, 0.0);
        assert!((e0 + 16.0).abs() < 1e-8, "E/A = {e0}");

        let th = sk.evaluate_zero_temperature(0.5 * n0, 0.5 * n0).expect("evaluate");
        assert!(th.pr.abs() * HBAR_C < 1e-8, "P = {}", th.pr);

        let ep = energy_per_baryon(&sk, n0 + h, 0.0);
        let em = energy_per_baryon(&sk, n0 - h, 0.0);
        let k = 9.0 * n0 * n0 * (ep - 2.0 * e0 + em) / (h * h);
        assert!((k - 200.0).abs() < 0.05, "K = {k}");

        let (ms_n, _) = sk.effective_masses(0.5 * n0, 0.5 * n0);
        assert!((ms_n / sk.m_n - 0.8).abs() < 2e-3);
    }

    #[test]
    fn saturation_fit_reproduces_symmetry_energy() {
        let sk = SkyrmeFunctional::from_saturation(&empirical()).expect("fit should succeed");
        // The n-p mass difference adds a term linear in δ; the symmetric
        // difference removes it.
        let d = 1e-3;
        let sym = |n: f64| {
            (energy_per_baryon(&sk, n, d) + energy_per_baryon(&sk, n, -d) - 2.0 * energy_per_baryon(&sk, n, 0.0))
                / (2.0 * d * d)
        };
        let s0 = sym(0.16);
        assert!((s0 - 32.0).abs() < 0.05, "S = {s0}");
        let h = 1e-4;
        let l = 3.0 * 0.16 * (sym(0.16 + h) - sym(0.16 - h)) / (2.0 * h);
        assert!((l - 50.0).abs() < 0.5, "L = {l}");
    }

    #[test]
    fn chemical_potentials_are_energy_derivatives() {
        let sk = SkyrmeFunctional::chiral();
        let t = 10.0 / HBAR_C;
        let (n_n, n_p) = (0.09, 0.03);
        let free = |a: f64, b: f64| sk.evaluate(a, b, t).expect("evaluate").free_energy(t);
        let h = 1e-6;
        let th = sk.evaluate(n_n, n_p, t).expect("evaluate");
        let dn = (free(n_n + h, n_p) - free(n_n - h, n_p)) / (2.0 * h);
        let dp = (free(n_n, n_p + h) - free(n_n, n_p - h)) / (2.0 * h);
        assert!((dn - th.mu_n).abs() < 1e-6, "{dn} vs {}", th.mu_n);
        assert!((dp - th.mu_p).abs() < 1e-6, "{dp} vs {}", th.mu_p);

        let dt = 1e-6;
        let st = -(sk.evaluate(n_n, n_p, t + dt).expect("evaluate").free_energy(t + dt)
            - sk.evaluate(n_n, n_p, t - dt).expect("evaluate").free_energy(t - dt))
            / (2.0 * dt);
        assert!((st - th.en).abs() < 1e-6 * th.en.abs().max(1.0));
    }

    #[test]
    fn empty_matter_is_trivial() {
        let sk = SkyrmeFunctional::chiral();
        let th = sk.evaluate(0.0, 0.0, 0.05).expect("evaluate");
        assert_eq!(th.ed, 0.0);
        assert_eq!(th.pr, 0.0);
        assert_eq!(th.en, 0.0);
    }

    #[test]
    fn rejects_negative_density() {
        let sk = SkyrmeFunctional::chiral();
        let err = sk.evaluate(-0.1, 0.1, 0.05).expect_err("should fail");
        assert!(format!("{err}").contains("non-negative"));
    }
}
