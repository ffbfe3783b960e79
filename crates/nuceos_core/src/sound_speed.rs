//! Squared sound speeds of hadrons plus electrons and photons.
//!
//! Second derivatives of the total free energy are taken numerically from
//! the analytic first derivatives (μ_n, μ_p, s) the combiner returns.

use crate::combiner::EosModel;
use crate::constants::mev_to_fm;
use crate::deriv::{default_step, deriv_central, Derivative};
use crate::leptons::lepton_point;
use anyhow::{Context, Result};
use serde::Serialize;

/// Totals at one point: chemical potentials with rest masses, the electron
/// chemical potential folded into the proton one.
#[derive(Debug, Clone, Copy)]
struct TotalState {
    mu_n: f64,
    mu_p: f64,
    en: f64,
    ed: f64,
}

/// Second derivatives of f in the variables (n_B, n_e, T).
#[derive(Debug, Clone, Copy)]
struct Curvature {
    bb: f64,
    be: f64,
    ee: f64,
    bt: f64,
    et: f64,
    tt: f64,
}

impl EosModel {
    fn total_state(&self, nn: f64, np: f64, t: f64) -> Result<TotalState> {
        let hadrons = self.free_energy_density(nn, np, t)?;
        let leptons = lepton_point(np, t, false)?;
        Ok(TotalState {
            mu_n: hadrons.mu_n + self.skyrme.m_n,
            mu_p: hadrons.mu_p + leptons.electron.mu + self.skyrme.m_p,
            en: hadrons.thermo.en + leptons.total.en,
            ed: hadrons.thermo.ed + leptons.total.ed + self.skyrme.m_n * nn + self.skyrme.m_p * np,
        })
    }

    fn curvature(&self, nn: f64, np: f64, t: f64) -> Result<Curvature> {
        let d = |pick: fn(&TotalState) -> f64, wrt: usize| -> Result<f64> {
            let x0 = [nn, np, t][wrt];
            let derivative = deriv_central(
                |x| {
                    let mut args = [nn, np, t];
                    args[wrt] = x;
                    Ok(pick(&self.total_state(args[0], args[1], args[2])?))
                },
                x0,
                default_step(x0),
            )?;
            Ok(derivative.value)
        };
        let mun_nn = d(|s| s.mu_n, 0)?;
        let mun_np = d(|s| s.mu_n, 1)?;
        let mun_t = d(|s| s.mu_n, 2)?;
        let mup_nn = d(|s| s.mu_p, 0)?;
        let mup_np = d(|s| s.mu_p, 1)?;
        let mup_t = d(|s| s.mu_p, 2)?;
        let s_t = d(|s| s.en, 2)?;

        Ok(Curvature {
            bb: mun_nn,
            be: mun_np - mun_nn,
            ee: mup_np + mun_nn - mup_nn - mun_np,
            bt: mun_t,
            et: mup_t - mun_t,
            tt: -s_t,
        })
    }

    /// c_s² at fixed entropy and lepton chemical potential difference.
    pub fn cs2(&self, nn: f64, np: f64, t: f64) -> Result<f64> {
        let c = self
            .curvature(nn, np, t)
            .with_context(|| format!("Sound speed derivatives failed at n_n = {nn}, n_p = {np}."))?;
        let state = self.total_state(nn, np, t)?;
        let (nb, ne) = (nn + np, np);
        let mul = state.mu_p - state.mu_n;
        let pr = mul * ne + state.mu_n * nb + t * state.en - state.ed;

        let ds_dt = (-c.tt * c.ee + c.et * c.et) / c.ee;
        let ds_dv = (state.en * c.ee + c.bt * c.ee * nb - c.et * c.be * nb) / c.ee;
        let dp_dv = (-c.bb * c.ee + c.be * c.be) * nb * nb / c.ee;
        let dp_dv_s = (dp_dv * ds_dt - ds_dv * ds_dv) / ds_dt;
        let dne_dv_s = (c.tt * (c.ee * ne + c.be * nb) - (c.et * ne + c.bt * nb) * c.et) / (-c.et * c.et + c.tt * c.ee);
        let de_dv_s = -pr - state.ed + mul * dne_dv_s;
        Ok(dp_dv_s / de_dv_s)
    }

    /// c_s² at fixed entropy per baryon and electron fraction.
    pub fn cs2_fix_ye(&self, nn: f64, np: f64, t: f64) -> Result<f64> {
        let c = self
            .curvature(nn, np, t)
            .with_context(|| format!("Sound speed derivatives failed at n_n = {nn}, n_p = {np}."))?;
        let state = self.total_state(nn, np, t)?;
        let (nb, ne) = (nn + np, np);
        let mul = state.mu_p - state.mu_n;
        let pr = mul * ne + state.mu_n * nb + t * state.en - state.ed;

        let dp_dnb = c.bb * nb + c.be * ne;
        let dp_dne = c.be * nb + c.ee * ne;
        let dp_dt = c.bt * nb + c.et * ne + state.en;
        Ok((-nb * dp_dnb * c.tt - ne * dp_dne * c.tt + dp_dt * dp_dt) / ((pr + state.ed) * (-c.tt)))
    }

    /// Compares analytic μ_n, μ_p and s with numerical derivatives of the
    /// hadronic free energy at each (n_b, Y_e, T [MeV]) point.
    pub fn check_derivatives(&self, points: &[(f64, f64, f64)]) -> Result<Vec<DerivativeCheck>> {
        points
            .iter()
            .map(|&(nb, ye, t_mev)| {
                let (nn, np, t) = (nb * (1.0 - ye), nb * ye, mev_to_fm(t_mev));
                let point = self.free_energy_density(nn, np, t)?;
                let f = |nn: f64, np: f64, t: f64| -> Result<f64> { Ok(self.free_energy_density(nn, np, t)?.f_total) };
                let mu_n = deriv_central(|x| f(x, np, t), nn, default_step(nn))?;
                let mu_p = deriv_central(|x| f(nn, x, t), np, default_step(np))?;
                let df_dt = deriv_central(|x| f(nn, np, x), t, default_step(t))?;
                let entropy = Derivative {
                    value: -df_dt.value,
                    abserr: df_dt.abserr,
                };
                Ok(DerivativeCheck {
                    nb,
                    ye,
                    t_mev,
                    mu_n: Comparison::new(point.mu_n, mu_n),
                    mu_p: Comparison::new(point.mu_p, mu_p),
                    entropy: Comparison::new(point.thermo.en, entropy),
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Comparison {
    pub analytic: f64,
    pub numeric: f64,
    pub abserr: f64,
}

impl Comparison {
    fn new(analytic: f64, numeric: Derivative) -> Self {
        Self {
            analytic,
            numeric: numeric.value,
            abserr: numeric.abserr,
        }
    }

    pub fn relative_error(&self) -> f64 {
        (self.analytic - self.numeric).abs() / self.numeric.abs().max(f64::MIN_POSITIVE)
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct DerivativeCheck {
    pub nb: f64,
    pub ye: f64,
    pub t_mev: f64,
    pub mu_n: Comparison,
    pub mu_p: Comparison,
    pub entropy: Comparison,
}

impl DerivativeCheck {
    pub fn max_relative_error(&self) -> f64 {
        self.mu_n
            .relative_error()
            .max(self.mu_p.relative_error())
            .max(self.entropy.relative_error())
    }
}
