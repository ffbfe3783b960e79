//! The hadronic free-energy functional.
//!
//! A virial gas, valid at low density, is blended with a degenerate-matter
//! functional through g = 1/(a z_n² + a z_p² + b z_n z_p + 1). The
//! degenerate part expands quadratically in the isospin asymmetry δ around
//! symmetric Skyrme matter, with the symmetry energy taken from neutron
//! matter: QMC below ~1.5 n0 and the neutron-star EOS above, switched by a
//! logistic h(n_b). Thermal corrections come from a separate Skyrme
//! functional. Chemical potentials and entropy are total derivatives of the
//! same expression, carried analytically through every piece.

use crate::constants::QMC_SATURATION_DENSITY;
use crate::neutron_star::NeutronStarEos;
use crate::qmc::QmcNeutronMatter;
use crate::selection::ModelParameters;
use crate::settings::EosSettings;
use crate::skyrme::{NuclearFunctional, SkyrmeFunctional};
use crate::thermo::Thermo;
use crate::virial::{VirialCoefficients, VirialGas, VirialPoint};
use anyhow::{bail, Context, Result};
use serde::Serialize;

/// Steepness of the QMC / neutron-star switch (fm³).
const SWITCH_STEEPNESS: f64 = 20.0;

/// A fully selected model. Built and validated by the selector.
#[derive(Debug, Clone)]
pub struct EosModel {
    pub params: ModelParameters,
    pub settings: EosSettings,
    pub virial: VirialCoefficients,
    /// Fitted to the selected saturation point; supplies the T = 0
    /// symmetric-matter energy and the reported effective masses.
    pub skyrme: SkyrmeFunctional,
    /// Supplies the thermal corrections.
    pub thermal: SkyrmeFunctional,
    pub qmc: QmcNeutronMatter,
    pub neutron_star: NeutronStarEos,
}

/// Hadronic thermodynamics at one point, with the intermediate pieces that
/// tables report (fm units).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HadronicPoint {
    pub f_total: f64,
    pub thermo: Thermo,
    pub mu_n: f64,
    pub mu_p: f64,
    pub f_virial: f64,
    pub s_virial: f64,
    pub f_deg: f64,
    pub g_virial: f64,
    pub dg_virial_dt: f64,
    pub h: f64,
    pub ms_n: f64,
    pub ms_p: f64,
}

impl EosModel {
    pub fn virial_gas(&self) -> VirialGas<'_> {
        VirialGas {
            coefficients: &self.virial,
            m_n: self.skyrme.m_n,
            m_p: self.skyrme.m_p,
            newton: self.settings.virial_newton,
        }
    }

    /// Virial-only EOS with its chemical-potential derivatives.
    pub fn free_energy_density_virial(&self, nn: f64, np: f64, t: f64) -> Result<VirialPoint> {
        self.virial_gas().evaluate(nn, np, t)
    }

    /// QMC / neutron-star switching weight and its density derivative.
    pub fn switch(&self, nb: f64) -> (f64, f64) {
        let h = 1.0 / (1.0 + (SWITCH_STEEPNESS * (nb - 1.5 * QMC_SATURATION_DENSITY)).exp());
        (h, -SWITCH_STEEPNESS * h * (1.0 - h))
    }

    /// Free energy density of nucleons at densities `nn`, `np` (fm⁻³) and
    /// temperature `t` (fm⁻¹), with μ_n, μ_p and the entropy.
    pub fn free_energy_density(&self, nn: f64, np: f64, t: f64) -> Result<HadronicPoint> {
        if !(nn > 0.0 && np > 0.0) || !(nn.is_finite() && np.is_finite()) {
            bail!("Nucleon densities must be positive (n_n = {nn}, n_p = {np}).");
        }
        if !(t > 0.0) {
            bail!("Temperature must be positive (got {t}).");
        }
        let nb = nn + np;
        let ye = np / nb;

        let vir = self
            .free_energy_density_virial(nn, np, t)
            .context("Virial gas failed.")?;
        let d = vir.derivatives;
        let (zn, zp) = (vir.z_n, vir.z_p);
        let (a, b) = (self.settings.a_virial, self.settings.b_virial);
        let g = 1.0 / (a * zn * zn + a * zp * zp + b * zn * zp + 1.0);
        // ∂(1/g)/∂μ_q
        let wn = (2.0 * a * zn * zn + b * zn * zp) / t;
        let wp = (2.0 * a * zp * zp + b * zn * zp) / t;
        let dg_dnn = -g * g * (wn * d.dmun_dnn + wp * d.dmup_dnn);
        let dg_dnp = -g * g * (wn * d.dmun_dnp + wp * d.dmup_dnp);
        let dg_dt = -g * g * (wn * (d.dmun_dt - vir.mu_n / t) + wp * (d.dmup_dt - vir.mu_p / t));

        let half = nb / 2.0;
        let sym0 = self
            .skyrme
            .evaluate_zero_temperature(half, half)
            .context("Skyrme functional failed in symmetric matter.")?;
        let eq_t = self.thermal.evaluate(half, half, t).context("Thermal functional failed.")?;
        let eq_0 = self.thermal.evaluate_zero_temperature(half, half).context("Thermal functional failed.")?;
        let neut_t = self.thermal.evaluate(nb, 0.0, t).context("Thermal functional failed.")?;
        let neut_0 = self.thermal.evaluate_zero_temperature(nb, 0.0).context("Thermal functional failed.")?;

        let f_sym0 = sym0.ed;
        let thermal_eq = eq_t.free_energy(t) - eq_0.ed;
        let thermal_neut = neut_t.free_energy(t) - neut_0.ed;

        let e_qmc = self.qmc.energy_density(nb);
        let (e_ns, mu_ns) = self
            .neutron_star
            .evaluate(nb)
            .context("Neutron-star EOS failed.")?;
        let (h, dh) = self.switch(nb);
        let e_sym = e_qmc * h + e_ns * (1.0 - h) - f_sym0;

        let delta = 1.0 - 2.0 * ye;
        let delta2 = delta * delta;
        let ddelta2_dnn = 2.0 * delta * (2.0 * np / (nb * nb));
        let ddelta2_dnp = 2.0 * delta * (-2.0 * nn / (nb * nb));

        let f_deg = f_sym0 + delta2 * e_sym + delta2 * thermal_neut + (1.0 - delta2) * thermal_eq;
        let f_total = vir.f * g + f_deg * (1.0 - g);

        // Pieces that depend on n_b alone have equal n_n and n_p derivatives.
        let dsym0 = 0.5 * (sym0.mu_n + sym0.mu_p);
        let de_sym = self.qmc.chemical_potential(nb) * h + e_qmc * dh + mu_ns * (1.0 - h) - e_ns * dh - dsym0;
        let dthermal_eq = 0.5 * (eq_t.mu_n + eq_t.mu_p - eq_0.mu_n - eq_0.mu_p);
        let dthermal_neut = neut_t.mu_n - neut_0.mu_n;
        let common = dsym0 + delta2 * de_sym + delta2 * dthermal_neut + (1.0 - delta2) * dthermal_eq;
        let asym = e_sym + thermal_neut - thermal_eq;
        let dfdeg_dnn = common + ddelta2_dnn * asym;
        let dfdeg_dnp = common + ddelta2_dnp * asym;

        let mu_n = vir.mu_n * g + vir.f * dg_dnn + dfdeg_dnn * (1.0 - g) - f_deg * dg_dnn;
        let mu_p = vir.mu_p * g + vir.f * dg_dnp + dfdeg_dnp * (1.0 - g) - f_deg * dg_dnp;

        let s_virial = vir.thermo.en;
        let dfdeg_dt = -delta2 * neut_t.en - (1.0 - delta2) * eq_t.en;
        let en = -(-s_virial * g + vir.f * dg_dt + dfdeg_dt * (1.0 - g) - f_deg * dg_dt);
        let pr = -f_total + nn * mu_n + np * mu_p;

        let (ms_n, ms_p) = self.skyrme.effective_masses(nn, np);

        Ok(HadronicPoint {
            f_total,
            thermo: Thermo {
                ed: f_total + t * en,
                pr,
                en,
            },
            mu_n,
            mu_p,
            f_virial: vir.f,
            s_virial,
            f_deg,
            g_virial: g,
            dg_virial_dt: dg_dt,
            h,
            ms_n,
            ms_p,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::mev_to_fm;
    use crate::selection::fixtures::reference_model;

    fn assert_err_contains(err: anyhow::Error, needle: &str) {
        let message = format!("{err:#}");
        assert!(message.contains(needle), "expected '{needle}' in '{message}'");
    }

    fn central(f: impl Fn(f64) -> f64, x: f64, h: f64) -> f64 {
        (f(x + h) - f(x - h)) / (2.0 * h)
    }

    #[test]
    fn chemical_potentials_and_entropy_are_derivatives() {
        let model = reference_model();
        for &(nb, ye, t_mev) in &[(0.01, 0.3, 5.0), (0.08, 0.1, 2.0), (0.3, 0.2, 8.0), (0.9, 0.05, 15.0)] {
            let (nn, np, t) = (nb * (1.0 - ye), nb * ye, mev_to_fm(t_mev));
            let point = model.free_energy_density(nn, np, t).expect("point should evaluate");
            let f = |nn: f64, np: f64, t: f64| {
                model
                    .free_energy_density(nn, np, t)
                    .expect("point should evaluate")
                    .f_total
            };
            let mu_n = central(|x| f(x, np, t), nn, 1e-5 * nn);
            let mu_p = central(|x| f(nn, x, t), np, 1e-5 * np);
            let s = -central(|x| f(nn, np, x), t, 1e-5 * t);
            assert!((point.mu_n - mu_n).abs() < 1e-4 * mu_n.abs().max(0.01), "nb = {nb}: {} vs {mu_n}", point.mu_n);
            assert!((point.mu_p - mu_p).abs() < 1e-4 * mu_p.abs().max(0.01), "nb = {nb}: {} vs {mu_p}", point.mu_p);
            assert!((point.thermo.en - s).abs() < 1e-3 * s.abs().max(1e-3), "nb = {nb}: {} vs {s}", point.thermo.en);
        }
    }

    #[test]
    fn thermodynamic_identities_hold() {
        let model = reference_model();
        let (nn, np, t) = (0.12, 0.04, mev_to_fm(4.0));
        let point = model.free_energy_density(nn, np, t).expect("point should evaluate");
        let th = point.thermo;
        assert!((th.pr + point.f_total - nn * point.mu_n - np * point.mu_p).abs() < 1e-12);
        assert!((th.ed - point.f_total - t * th.en).abs() < 1e-12);
        assert!((point.f_total - (point.f_virial * point.g_virial + point.f_deg * (1.0 - point.g_virial))).abs() < 1e-12);
    }

    #[test]
    fn switching_weights_have_the_right_limits() {
        let model = reference_model();
        let t = mev_to_fm(5.0);
        let dilute = model.free_energy_density(1e-9, 1e-9, t).expect("dilute point");
        assert!(dilute.g_virial > 0.999_999, "g = {}", dilute.g_virial);
        // Classical gas, P = n T.
        assert!((dilute.thermo.pr - 2e-9 * t).abs() < 1e-6 * dilute.thermo.pr);

        let dense = model.free_energy_density(0.45, 0.15, t).expect("dense point");
        assert!(dense.g_virial < 1e-3, "g = {}", dense.g_virial);
        assert!(dense.h < 1e-3, "h = {}", dense.h);
        let (h_low, _) = model.switch(0.05);
        assert!(h_low > 0.99);
    }

    #[test]
    fn symmetric_and_neutron_rich_matter_differ_by_symmetry_energy() {
        let model = reference_model();
        let t = mev_to_fm(0.5);
        let nb = 0.16;
        let sym = model.free_energy_density(nb / 2.0, nb / 2.0, t).expect("symmetric");
        let rich = model.free_energy_density(0.9 * nb, 0.1 * nb, t).expect("neutron rich");
        let gap = (rich.f_deg - sym.f_deg) / nb * crate::constants::HBAR_C;
        // δ² = 0.64 of a symmetry energy near 32 MeV.
        assert!(gap > 10.0 && gap < 30.0, "gap = {gap} MeV");
    }

    #[test]
    fn invalid_inputs_are_rejected() {
        let model = reference_model();
        let err = model.free_energy_density(0.1, 0.0, 0.01).expect_err("zero proton density");
        assert_err_contains(err, "must be positive");
        let err = model.free_energy_density(0.1, 0.1, 0.0).expect_err("zero temperature");
        assert_err_contains(err, "Temperature must be positive");
    }
}
