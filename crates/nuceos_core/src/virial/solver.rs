use super::coefficients::VirialCoefficients;
use crate::constants::{fm_to_mev, HBAR_C};
use crate::roots::{solve_newton, NewtonSettings};
use crate::thermo::Thermo;
use crate::traits::{ResidualSystem, Scalar};
use anyhow::{anyhow, bail, Context, Result};
use nalgebra::{Matrix2, Vector2};
use serde::Serialize;
use std::f64::consts::PI;
use tracing::warn;

/// Below this value of nλ³ for both species the virial corrections are
/// dropped and the classical Boltzmann gas is used.
pub const DILUTE_LIMIT: f64 = 1e-5;

/// A failed fugacity solve may fall back to the Boltzmann gas only while
/// corrections stay below this nλ³.
const DILUTE_FALLBACK_LIMIT: f64 = 1e-3;

/// Sensitivities of the virial chemical potentials (fm units).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ChemicalPotentialDerivatives {
    pub dmun_dnn: f64,
    pub dmun_dnp: f64,
    pub dmup_dnn: f64,
    pub dmup_dnp: f64,
    pub dmun_dt: f64,
    pub dmup_dt: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VirialPoint {
    pub mu_n: f64,
    pub mu_p: f64,
    pub z_n: f64,
    pub z_p: f64,
    pub f: f64,
    pub thermo: Thermo,
    pub derivatives: ChemicalPotentialDerivatives,
    pub dilute: bool,
}

/// Density equations n_i = (2/λ³)(z_i + 2 z_i² b_n + 2 z_n z_p b_pn) in the
/// unknowns ln z_n, ln z_p, written as relative residuals.
struct FugacityEquations {
    nn: f64,
    np: f64,
    lambda3: f64,
    b_n: f64,
    b_pn: f64,
}

impl<T: Scalar> ResidualSystem<T> for FugacityEquations {
    fn dimension(&self) -> usize {
        2
    }

    fn residual(&self, x: &[T], out: &mut [T]) {
        let zn = x[0].exp();
        let zp = x[1].exp();
        let pre = T::cst(2.0 / self.lambda3);
        let two = T::cst(2.0);
        let b_n = T::cst(self.b_n);
        let cross = two * zn * zp * T::cst(self.b_pn);
        out[0] = pre * (zn + two * zn * zn * b_n + cross) / T::cst(self.nn) - T::one();
        out[1] = pre * (zp + two * zp * zp * b_n + cross) / T::cst(self.np) - T::one();
    }
}

/// Single-species estimate: positive root of 2b z² + z = nλ³/2.
fn fugacity_guess(n: f64, lambda3: f64, b: f64) -> f64 {
    let y = n * lambda3 / 2.0;
    if b > 0.0 {
        (-1.0 + (1.0 + 8.0 * b * y).sqrt()) / (4.0 * b)
    } else {
        y
    }
}

/// Second-order virial expansion of a nucleon gas.
pub struct VirialGas<'a> {
    pub coefficients: &'a VirialCoefficients,
    pub m_n: f64,
    pub m_p: f64,
    pub newton: NewtonSettings,
}

impl VirialGas<'_> {
    /// Thermal wavelength λ = sqrt(4π / ((m_n + m_p) T)).
    pub fn wavelength(&self, t: f64) -> f64 {
        (4.0 * PI / ((self.m_n + self.m_p) * t)).sqrt()
    }

    /// Free energy, thermodynamics and chemical-potential derivatives at
    /// densities `nn`, `np` (fm⁻³, both positive) and temperature `t` (fm⁻¹).
    pub fn evaluate(&self, nn: f64, np: f64, t: f64) -> Result<VirialPoint> {
        if !(nn > 0.0 && np > 0.0) {
            bail!("Virial gas needs positive densities (n_n = {nn}, n_p = {np}).");
        }
        if !(t > 0.0) {
            bail!("Virial gas needs a positive temperature (got {t}).");
        }

        let t_mev = fm_to_mev(t);
        let b_n = self.coefficients.bn(t_mev);
        let b_pn = self.coefficients.bpn(t_mev);
        let dbn_dt = self.coefficients.dbn_dt(t_mev) * HBAR_C;
        let dbpn_dt = self.coefficients.dbpn_dt(t_mev) * HBAR_C;

        let lambda3 = self.wavelength(t).powi(3);
        let pre = 2.0 / lambda3;
        let dilute = nn * lambda3 <= DILUTE_LIMIT && np * lambda3 <= DILUTE_LIMIT;

        let coupled = if dilute {
            None
        } else {
            let equations = FugacityEquations {
                nn,
                np,
                lambda3,
                b_n,
                b_pn,
            };
            let guess = [
                fugacity_guess(nn, lambda3, b_n).ln(),
                fugacity_guess(np, lambda3, b_n).ln(),
            ];
            match solve_newton(&equations, &guess, self.newton) {
                Ok(outcome) => Some((outcome.state[0] * t, outcome.state[1] * t)),
                Err(err) if nn * lambda3 <= DILUTE_FALLBACK_LIMIT && np * lambda3 <= DILUTE_FALLBACK_LIMIT => {
                    warn!("fugacity solve failed in the near-dilute regime, using Boltzmann gas: {err:#}");
                    None
                }
                Err(err) => {
                    return Err(err).with_context(|| {
                        format!("Fugacity solve failed at n_n = {nn}, n_p = {np}, T = {t_mev} MeV.")
                    })
                }
            }
        };

        let Some((mu_n, mu_p)) = coupled else {
            return Ok(self.boltzmann(nn, np, t, lambda3));
        };

        let zn = (mu_n / t).exp();
        let zp = (mu_p / t).exp();
        let pr = t * pre * (zn + zp + (zn * zn + zp * zp) * b_n + 2.0 * zn * zp * b_pn);
        let f = mu_n * nn + mu_p * np - pr;
        let en = 5.0 * pr / (2.0 * t) - nn * zn.ln() - np * zp.ln()
            + t * pre * ((zn * zn + zp * zp) * dbn_dt + 2.0 * zn * zp * dbpn_dt);
        let thermo = Thermo {
            ed: f + t * en,
            pr,
            en,
        };

        // Implicit differentiation of the density equations in μ.
        let jacobian = Matrix2::new(
            pre * (zn + 4.0 * zn * zn * b_n + 2.0 * zn * zp * b_pn) / t,
            pre * (2.0 * zn * zp * b_pn) / t,
            pre * (2.0 * zn * zp * b_pn) / t,
            pre * (zp + 4.0 * zp * zp * b_n + 2.0 * zn * zp * b_pn) / t,
        );
        let lu = jacobian.lu();
        let solve = |rhs: Vector2<f64>| {
            lu.solve(&rhs)
                .ok_or_else(|| anyhow!("Virial density Jacobian is singular."))
        };
        let d_nn = solve(Vector2::new(1.0, 0.0))?;
        let d_np = solve(Vector2::new(0.0, 1.0))?;

        let dzn = -zn * mu_n / (t * t);
        let dzp = -zp * mu_p / (t * t);
        let dn_dt = Vector2::new(
            1.5 / t * nn
                + pre
                    * (dzn * (1.0 + 4.0 * zn * b_n + 2.0 * zp * b_pn)
                        + dzp * (2.0 * zn * b_pn)
                        + 2.0 * zn * zn * dbn_dt
                        + 2.0 * zn * zp * dbpn_dt),
            1.5 / t * np
                + pre
                    * (dzp * (1.0 + 4.0 * zp * b_n + 2.0 * zn * b_pn)
                        + dzn * (2.0 * zp * b_pn)
                        + 2.0 * zp * zp * dbn_dt
                        + 2.0 * zn * zp * dbpn_dt),
        );
        let d_t = solve(-dn_dt)?;

        Ok(VirialPoint {
            mu_n,
            mu_p,
            z_n: zn,
            z_p: zp,
            f,
            thermo,
            derivatives: ChemicalPotentialDerivatives {
                dmun_dnn: d_nn[0],
                dmup_dnn: d_nn[1],
                dmun_dnp: d_np[0],
                dmup_dnp: d_np[1],
                dmun_dt: d_t[0],
                dmup_dt: d_t[1],
            },
            dilute: false,
        })
    }

    fn boltzmann(&self, nn: f64, np: f64, t: f64, lambda3: f64) -> VirialPoint {
        let mu_n = t * (nn * lambda3 / 2.0).ln();
        let mu_p = t * (np * lambda3 / 2.0).ln();
        let zn = (mu_n / t).exp();
        let zp = (mu_p / t).exp();
        let pr = 2.0 * t / lambda3 * (zn + zp);
        let f = mu_n * nn + mu_p * np - pr;
        let en = 5.0 * pr / (2.0 * t) - nn * zn.ln() - np * zp.ln();
        VirialPoint {
            mu_n,
            mu_p,
            z_n: zn,
            z_p: zp,
            f,
            thermo: Thermo {
                ed: f + t * en,
                pr,
                en,
            },
            derivatives: ChemicalPotentialDerivatives {
                dmun_dnn: t / nn,
                dmun_dnp: 0.0,
                dmup_dnn: 0.0,
                dmup_dnp: t / np,
                dmun_dt: mu_n / t - 1.5,
                dmup_dt: mu_p / t - 1.5,
            },
            dilute: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{mev_to_fm, M_NEUTRON_MEV, M_PROTON_MEV};

    fn gas(coefficients: &VirialCoefficients) -> VirialGas<'_> {
        VirialGas {
            coefficients,
            m_n: mev_to_fm(M_NEUTRON_MEV),
            m_p: mev_to_fm(M_PROTON_MEV),
            newton: NewtonSettings::default(),
        }
    }

    #[test]
    fn densities_are_reproduced() {
        let vc = VirialCoefficients::default();
        let g = gas(&vc);
        let t = mev_to_fm(5.0);
        let (nn, np) = (0.004, 0.001);
        let point = g.evaluate(nn, np, t).expect("virial should solve");
        assert!(!point.dilute);
        let lambda3 = g.wavelength(t).powi(3);
        let (b_n, b_pn) = (vc.bn(5.0), vc.bpn(5.0));
        let (zn, zp) = (point.z_n, point.z_p);
        let model_nn = 2.0 / lambda3 * (zn + 2.0 * zn * zn * b_n + 2.0 * zn * zp * b_pn);
        assert!((model_nn / nn - 1.0).abs() < 1e-9);
        assert!((point.thermo.ed - (point.f + t * point.thermo.en)).abs() < 1e-14);
    }

    #[test]
    fn dilute_branch_is_continuous_with_coupled_solve() {
        let vc = VirialCoefficients::default();
        let g = gas(&vc);
        let t = mev_to_fm(2.0);
        let lambda3 = g.wavelength(t).powi(3);
        let below = g.evaluate(0.99e-5 / lambda3, 0.5e-5 / lambda3, t).expect("dilute point");
        let above = g.evaluate(1.01e-5 / lambda3, 0.5e-5 / lambda3, t).expect("coupled point");
        assert!(below.dilute);
        assert!(!above.dilute);
        // μ changes by T ln(1.01/0.99) across the switch plus corrections of order nλ³.
        let expected = t * (1.01_f64 / 0.99).ln();
        assert!(((above.mu_n - below.mu_n) - expected).abs() < 1e-4 * t);
    }

    #[test]
    fn implicit_derivatives_match_finite_differences() {
        let vc = VirialCoefficients::default();
        let g = gas(&vc);
        let t = mev_to_fm(8.0);
        let (nn, np) = (0.01, 0.006);
        let point = g.evaluate(nn, np, t).expect("virial should solve");
        let d = point.derivatives;

        let h = 1e-7;
        let up = g.evaluate(nn + h, np, t).expect("shifted");
        let dn = g.evaluate(nn - h, np, t).expect("shifted");
        let num_mun = (up.mu_n - dn.mu_n) / (2.0 * h);
        let num_mup = (up.mu_p - dn.mu_p) / (2.0 * h);
        assert!((num_mun / d.dmun_dnn - 1.0).abs() < 1e-4, "{num_mun} vs {}", d.dmun_dnn);
        assert!((num_mup / d.dmup_dnn - 1.0).abs() < 1e-4, "{num_mup} vs {}", d.dmup_dnn);

        let ht = 1e-6;
        let up = g.evaluate(nn, np, t + ht).expect("shifted");
        let dn = g.evaluate(nn, np, t - ht).expect("shifted");
        let num_dt = (up.mu_n - dn.mu_n) / (2.0 * ht);
        assert!((num_dt / d.dmun_dt - 1.0).abs() < 1e-4, "{num_dt} vs {}", d.dmun_dt);
        let num_s = -(up.f - dn.f) / (2.0 * ht);
        assert!((num_s / point.thermo.en - 1.0).abs() < 1e-4, "{num_s} vs {}", point.thermo.en);
    }

    #[test]
    fn boltzmann_temperature_derivative_is_exact() {
        let vc = VirialCoefficients::default();
        let g = gas(&vc);
        let t = mev_to_fm(30.0);
        let lambda3 = g.wavelength(t).powi(3);
        let (nn, np) = (1e-6 / lambda3, 2e-6 / lambda3);
        let point = g.evaluate(nn, np, t).expect("dilute point");
        assert!(point.dilute);
        let ht = 1e-6;
        let up = g.evaluate(nn, np, t + ht).expect("shifted");
        let dn = g.evaluate(nn, np, t - ht).expect("shifted");
        let numeric = (up.mu_n - dn.mu_n) / (2.0 * ht);
        assert!((numeric - point.derivatives.dmun_dt).abs() < 1e-6);
    }

    #[test]
    fn zero_density_is_rejected() {
        let vc = VirialCoefficients::default();
        let err = gas(&vc).evaluate(0.01, 0.0, 0.05).expect_err("should fail");
        assert!(format!("{err}").contains("positive densities"));
    }
}
