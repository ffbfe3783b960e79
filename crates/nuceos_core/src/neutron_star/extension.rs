//! Causal continuation of the neutron-star EOS above the fit's range.
//!
//! Beyond `nb_max` the squared sound speed is made to interpolate
//! monotonically between its value at `nb_max` and the anchor φ reached at
//! n_b = 2 fm⁻³:
//!
//! - rising:   c_s² = 1 − a1 / (1 + a2 n^{a1})
//! - falling:  c_s² = a1 / (1 + a2 n^{a1})
//! - constant: c_s² = φ
//!
//! Integrating c_s² = d ln μ / d ln n twice, with energy density and
//! pressure matched at `nb_max`, gives closed forms for ε(n) and μ(n).

use super::fit::NeutronStarFit;
use crate::roots::{solve_newton, NewtonSettings};
use crate::special::hyp2f1_one_one;
use crate::traits::{ResidualSystem, Scalar};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

/// Density at which the sound speed reaches the anchor value.
pub const ANCHOR_DENSITY: f64 = 2.0;

/// |φ − c_s²(nb_max)| at or below which the constant branch is used.
pub const CONSTANT_BRANCH_TOLERANCE: f64 = 1e-6;

/// Matching conditions for the rising/falling sound-speed profiles, in
/// the unknowns (a1, a2).
struct SoundSpeedProfile {
    nb_max: f64,
    cs2_max: f64,
    cs2_anchor: f64,
    rising: bool,
}

impl SoundSpeedProfile {
    fn cs2<T: Scalar>(&self, a1: T, a2: T, nb: f64) -> T {
        let q = a2 * (a1 * T::cst(nb.ln())).exp();
        let falling = a1 / (T::one() + q);
        if self.rising {
            T::one() - falling
        } else {
            falling
        }
    }
}

impl<T: Scalar> ResidualSystem<T> for SoundSpeedProfile {
    fn dimension(&self) -> usize {
        2
    }

    fn residual(&self, x: &[T], out: &mut [T]) {
        out[0] = self.cs2(x[0], x[1], self.nb_max) - T::cst(self.cs2_max);
        out[1] = self.cs2(x[0], x[1], ANCHOR_DENSITY) - T::cst(self.cs2_anchor);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum CausalBranch {
    Rising { a1: f64, a2: f64, c1: f64, c2: f64 },
    Falling { a1: f64, a2: f64, c1: f64, c2: f64 },
    Constant { cs2: f64 },
}

/// Neutron-star EOS: the fit below `nb_max`, the causal branch above.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeutronStarEos {
    pub fit: NeutronStarFit,
    pub phi: f64,
    pub branch: CausalBranch,
    /// Rest mass used in the enthalpy (fm⁻¹).
    pub mass: f64,
    e_max: f64,
    p_max: f64,
}

impl NeutronStarEos {
    pub fn new(fit: NeutronStarFit, phi: f64, mass: f64, newton: NewtonSettings) -> Result<Self> {
        let nb_max = fit.nb_max;
        if !(nb_max > 0.0 && nb_max < ANCHOR_DENSITY) {
            bail!("Causal extension needs 0 < nb_max < {ANCHOR_DENSITY} (got {nb_max}).");
        }
        let e_max = fit.energy_density(nb_max);
        let p_max = fit.chemical_potential(nb_max) * nb_max - e_max;
        let cs2_max = fit.cs2(nb_max);
        let energy = e_max + mass * nb_max;
        let enthalpy = energy + p_max;

        let branch = if (phi - cs2_max).abs() <= CONSTANT_BRANCH_TOLERANCE {
            CausalBranch::Constant { cs2: cs2_max }
        } else {
            let rising = phi > cs2_max;
            let profile = SoundSpeedProfile {
                nb_max,
                cs2_max,
                cs2_anchor: phi,
                rising,
            };
            let guess = if rising { [1.0, 1.0] } else { [2.5, 1.0] };
            let outcome = solve_newton(&profile, &guess, newton).with_context(|| {
                format!("Sound-speed profile solve failed (cs2 = {cs2_max} at {nb_max}, phi = {phi}).")
            })?;
            let (a1, a2) = (outcome.state[0], outcome.state[1]);
            let q_max = a2 * nb_max.powf(a1);
            if rising {
                let c1 = enthalpy / (nb_max * nb_max * (a2 + nb_max.powf(-a1)));
                let c2 = 0.5 * (energy - p_max + a1 * enthalpy / ((a1 - 2.0) * (1.0 + q_max)));
                CausalBranch::Rising { a1, a2, c1, c2 }
            } else {
                let h_max = hypergeometric_factor(a1, a2, nb_max)?;
                let c1 = nb_max.powf(-a1 - 1.0) * (q_max + 1.0) * enthalpy;
                let c2 = nb_max.powf(-a1) * (q_max * energy - (q_max + 1.0) * h_max * enthalpy) / a2;
                CausalBranch::Falling { a1, a2, c1, c2 }
            }
        };

        Ok(Self {
            fit,
            phi,
            branch,
            mass,
            e_max,
            p_max,
        })
    }

    pub fn nb_max(&self) -> f64 {
        self.fit.nb_max
    }

    /// Energy density and chemical potential (rest mass excluded; fm⁻⁴, fm⁻¹).
    pub fn evaluate(&self, nb: f64) -> Result<(f64, f64)> {
        let nb_max = self.fit.nb_max;
        if nb < nb_max - 1e-6 {
            return Ok((self.fit.energy_density(nb), self.fit.chemical_potential(nb)));
        }
        let m = self.mass;
        match self.branch {
            CausalBranch::Rising { a1, a2, c1, c2 } => {
                let e = -m * nb + c1 * (a2 * nb * nb / 2.0 + nb.powf(2.0 - a1) / (2.0 - a1)) + c2;
                let mu = -m + c1 * (a2 * nb + nb.powf(1.0 - a1));
                Ok((e, mu))
            }
            CausalBranch::Falling { a1, a2, c1, c2 } => {
                let h = hypergeometric_factor(a1, a2, nb)?;
                let q = a2 * nb.powf(a1);
                let e = c1 * nb * h / a2 + c2 - m * nb;
                let mu = -(m * q - c1 * nb.powf(a1) + m) / (q + 1.0);
                Ok((e, mu))
            }
            CausalBranch::Constant { cs2 } => {
                let energy = self.e_max + m * nb_max;
                let enthalpy = energy + self.p_max;
                let ratio = nb / nb_max;
                let e = -m * nb + enthalpy / (1.0 + cs2) * ratio.powf(cs2 + 1.0) + (cs2 * energy - self.p_max) / (1.0 + cs2);
                let mu = -m + enthalpy * ratio.powf(cs2) / nb_max;
                Ok((e, mu))
            }
        }
    }
}

/// ₂F₁(1, 1; 1 − 1/a1; w/(1+w)) / (1 + w) with w = n^{-a1}/a2, the
/// Pfaff-transformed hypergeometric factor of the falling branch.
fn hypergeometric_factor(a1: f64, a2: f64, nb: f64) -> Result<f64> {
    let w = nb.powf(-a1) / a2;
    let f = hyp2f1_one_one(1.0 - 1.0 / a1, w / (1.0 + w))?;
    Ok(f / (1.0 + w))
}
