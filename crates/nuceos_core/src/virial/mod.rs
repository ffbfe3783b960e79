//! Virial expansion of a dilute, hot nucleon gas.

pub mod coefficients;
pub mod solver;

pub use coefficients::{VirialCoefficients, VirialFitReport};
pub use solver::{ChemicalPotentialDerivatives, VirialGas, VirialPoint, DILUTE_LIMIT};
