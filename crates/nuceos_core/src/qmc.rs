use crate::constants::{HBAR_C, QMC_SATURATION_DENSITY};
use serde::{Deserialize, Serialize};

/// Quantum Monte Carlo parametrization of neutron-matter energy per baryon,
/// E/N = a (n/n0)^α + b (n/n0)^β in MeV.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QmcNeutronMatter {
    pub a: f64,
    pub alpha: f64,
    pub b: f64,
    pub beta: f64,
    pub n0: f64,
}

impl Default for QmcNeutronMatter {
    fn default() -> Self {
        Self {
            a: 12.7,
            alpha: 0.48,
            b: 2.12,
            beta: 3.45,
            n0: QMC_SATURATION_DENSITY,
        }
    }
}

impl QmcNeutronMatter {
    /// Fixes b and β so that neutron matter at n0 carries E/A + S and the
    /// slope L, given the symmetric-matter binding `eoa` (all MeV).
    pub fn from_symmetry_energy(a: f64, alpha: f64, s: f64, l: f64, eoa: f64) -> Self {
        let b = s + eoa - a;
        let beta = (l / 3.0 - a * alpha) / b;
        Self {
            a,
            alpha,
            b,
            beta,
            n0: QMC_SATURATION_DENSITY,
        }
    }

    /// Energy per baryon in MeV.
    pub fn energy_per_baryon(&self, nb: f64) -> f64 {
        let x = nb / self.n0;
        self.a * x.powf(self.alpha) + self.b * x.powf(self.beta)
    }

    /// Energy density (rest mass excluded) in fm⁻⁴.
    pub fn energy_density(&self, nb: f64) -> f64 {
        self.energy_per_baryon(nb) * nb / HBAR_C
    }

    /// d(energy density)/dn_b in fm⁻¹.
    pub fn chemical_potential(&self, nb: f64) -> f64 {
        let x = nb / self.n0;
        (self.a * x.powf(self.alpha) * (self.alpha + 1.0) + self.b * x.powf(self.beta) * (self.beta + 1.0))
            / HBAR_C
    }
}
