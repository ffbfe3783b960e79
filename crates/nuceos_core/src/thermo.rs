use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign};

/// Energy density, pressure and entropy density of a subsystem (fm⁻⁴, fm⁻⁴, fm⁻³).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Thermo {
    pub ed: f64,
    pub pr: f64,
    pub en: f64,
}

impl Thermo {
    pub fn is_finite(&self) -> bool {
        self.ed.is_finite() && self.pr.is_finite() && self.en.is_finite()
    }

    /// Free energy density f = ε - T s.
    pub fn free_energy(&self, t: f64) -> f64 {
        self.ed - t * self.en
    }
}

impl Add for Thermo {
    type Output = Thermo;
    fn add(self, rhs: Thermo) -> Thermo {
        Thermo {
            ed: self.ed + rhs.ed,
            pr: self.pr + rhs.pr,
            en: self.en + rhs.en,
        }
    }
}

impl AddAssign for Thermo {
    fn add_assign(&mut self, rhs: Thermo) {
        *self = *self + rhs;
    }
}

/// One particle species: its mass, degeneracy and thermodynamic state. All
/// quantities in fm-based units; `mu` includes the rest mass for leptons and
/// excludes it for nucleons.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParticleState {
    pub m: f64,
    pub g: f64,
    pub ms: f64,
    pub n: f64,
    pub mu: f64,
    pub nu: f64,
    pub ed: f64,
    pub pr: f64,
    pub en: f64,
}

impl ParticleState {
    pub fn new(m: f64, g: f64) -> Self {
        Self {
            m,
            g,
            ms: m,
            n: 0.0,
            mu: 0.0,
            nu: 0.0,
            ed: 0.0,
            pr: 0.0,
            en: 0.0,
        }
    }

    pub fn thermo(&self) -> Thermo {
        Thermo {
            ed: self.ed,
            pr: self.pr,
            en: self.en,
        }
    }
}
