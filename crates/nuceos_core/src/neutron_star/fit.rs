use crate::constants::{mev_to_fm, HBAR_C, M_NEUTRON_MEV};
use crate::fit::{fit_least_squares, FitModel, FitSettings};
use crate::tables::NeutronStarRow;
use crate::traits::Scalar;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Functional form of the energy-per-baryon fit E/A(n_b) in MeV.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NsFitForm {
    /// p0 √n + p1 n + p2 n^{3/2} + p3 n² + p4 n³
    HalfPowers,
    /// p0 n + p1 n² + p2 n³ + p3 n⁴ + p4 n⁵
    Polynomial,
}

impl FitModel for NsFitForm {
    fn parameter_count(&self) -> usize {
        5
    }

    fn evaluate<T: Scalar>(&self, p: &[T], nb: f64) -> T {
        let c = |x: f64| T::cst(x);
        match self {
            NsFitForm::HalfPowers => {
                let s = nb.sqrt();
                p[0] * c(s) + p[1] * c(nb) + p[2] * c(nb * s) + p[3] * c(nb * nb) + p[4] * c(nb * nb * nb)
            }
            NsFitForm::Polynomial => {
                p[0] * c(nb) + p[1] * c(nb.powi(2)) + p[2] * c(nb.powi(3)) + p[3] * c(nb.powi(4)) + p[4] * c(nb.powi(5))
            }
        }
    }
}

/// Grid on which neutron-star table rows are sampled.
pub fn sample_density(i: usize) -> f64 {
    0.04 + 0.012 * i as f64
}

const INITIAL_PARAMS: [f64; 5] = [-6.102748e3, 3.053497e3, 4.662834e3, -8.371958e2, -5.228209e2];

/// Samples with |E/A| at or below this value (fm⁻¹) are treated as missing.
const MISSING_SAMPLE: f64 = 1e-2;

/// Smooth fit to one neutron-star EOS, valid up to `nb_max`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeutronStarFit {
    pub form: NsFitForm,
    pub params: [f64; 5],
    pub chi2: f64,
    /// Upper density of validity, lowered to where the fit turns acausal.
    pub nb_max: f64,
}

impl NeutronStarFit {
    /// Fits E/A of a table row and locates the causal limit of the fit.
    pub fn from_row(row: &NeutronStarRow, form: NsFitForm, settings: FitSettings) -> Result<Self> {
        let mut xs = Vec::new();
        let mut ys = Vec::new();
        for (i, eoa) in row.eoa.iter().enumerate().take(100) {
            let nb = sample_density(i);
            if nb >= row.nb_max + 1e-6 {
                break;
            }
            if eoa.abs() > MISSING_SAMPLE {
                xs.push(nb);
                ys.push(eoa * HBAR_C);
            }
        }
        if xs.len() < 6 {
            bail!("Neutron-star row has only {} usable samples.", xs.len());
        }
        let errors: Vec<f64> = ys.iter().map(|y: &f64| y.abs() / 100.0).collect();

        let result = fit_least_squares(&form, &xs, &ys, &errors, &INITIAL_PARAMS, settings)
            .context("Neutron-star energy fit failed.")?;
        debug!(chi2 = result.chi2, points = xs.len(), "neutron-star fit converged");

        let mut params = [0.0; 5];
        params.copy_from_slice(&result.params);
        let mut fit = Self {
            form,
            params,
            chi2: result.chi2,
            nb_max: row.nb_max,
        };

        let cs2: Vec<f64> = xs.iter().map(|&nb| fit.cs2(nb)).collect();
        if let Some(nb_new) = causal_limit(&xs, &cs2) {
            fit.nb_max = nb_new;
        }
        Ok(fit)
    }

    /// Energy per baryon in MeV.
    pub fn energy_per_baryon(&self, nb: f64) -> f64 {
        self.form.evaluate(&self.params, nb)
    }

    /// Energy density without rest mass, fm⁻⁴.
    pub fn energy_density(&self, nb: f64) -> f64 {
        self.energy_per_baryon(nb) * nb / HBAR_C
    }

    /// Chemical potential without rest mass, fm⁻¹.
    pub fn chemical_potential(&self, nb: f64) -> f64 {
        let p = &self.params;
        let mev = match self.form {
            NsFitForm::HalfPowers => {
                let s = nb.sqrt();
                1.5 * s * p[0] + 2.0 * nb * p[1] + 2.5 * nb * s * p[2] + 3.0 * nb * nb * p[3] + 4.0 * nb.powi(3) * p[4]
            }
            NsFitForm::Polynomial => {
                2.0 * nb * p[0] + 3.0 * nb.powi(2) * p[1] + 4.0 * nb.powi(3) * p[2] + 5.0 * nb.powi(4) * p[3]
                    + 6.0 * nb.powi(5) * p[4]
            }
        };
        mev / HBAR_C
    }

    /// dμ/dn_b in fm².
    pub fn chemical_potential_slope(&self, nb: f64) -> f64 {
        let p = &self.params;
        let mev = match self.form {
            NsFitForm::HalfPowers => {
                let s = nb.sqrt();
                0.75 / s * p[0] + 2.0 * p[1] + 3.75 * s * p[2] + 6.0 * nb * p[3] + 12.0 * nb * nb * p[4]
            }
            NsFitForm::Polynomial => {
                2.0 * p[0] + 6.0 * nb * p[1] + 12.0 * nb.powi(2) * p[2] + 20.0 * nb.powi(3) * p[3]
                    + 30.0 * nb.powi(4) * p[4]
            }
        };
        mev / HBAR_C
    }

    /// Squared sound speed of the fit, with the neutron rest mass in the enthalpy.
    pub fn cs2(&self, nb: f64) -> f64 {
        self.chemical_potential_slope(nb) * nb / (self.chemical_potential(nb) + mev_to_fm(M_NEUTRON_MEV))
    }

    /// Extremes of cs² over 0.04 ≤ n_b < nb_max (coarse scan, plus n_b = 0.08).
    pub fn min_max_cs2(&self) -> (f64, f64) {
        let first = self.cs2(0.08);
        let mut lo = first;
        let mut hi = first;
        let mut i = 0;
        loop {
            let nb = 0.04 + 0.02 * i as f64;
            if nb >= self.nb_max {
                break;
            }
            let c = self.cs2(nb);
            lo = lo.min(c);
            hi = hi.max(c);
            i += 1;
        }
        (lo, hi)
    }
}

/// Density of the first upward crossing of c_s² = 1 in the sampled
/// sequence, linearly interpolated. Later crossings are ignored.
fn causal_limit(xs: &[f64], cs2: &[f64]) -> Option<f64> {
    let j = (0..cs2.len().saturating_sub(1)).find(|&j| cs2[j] < 1.0 && cs2[j + 1] > 1.0)?;
    let nb = xs[j] + (xs[j + 1] - xs[j]) * (1.0 - cs2[j]) / (cs2[j + 1] - cs2[j]);
    (nb > 0.01).then_some(nb)
}
