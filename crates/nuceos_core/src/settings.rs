use crate::fit::FitSettings;
use crate::roots::NewtonSettings;
use serde::{Deserialize, Serialize};

/// Tunable knobs of model selection and evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EosSettings {
    /// Weight of z_n² and z_p² in the virial switching function.
    pub a_virial: f64,
    /// Weight of z_n z_p in the virial switching function.
    pub b_virial: f64,
    /// Fit neutron-star tables with half-integer powers of n_b instead of
    /// the plain polynomial.
    pub old_ns_fit: bool,
    pub include_muons: bool,
    /// Run the fixed-Ye sound-speed scan during model selection.
    pub select_cs2_test: bool,
    pub virial_newton: NewtonSettings,
    pub extension_newton: NewtonSettings,
    pub beta_newton: NewtonSettings,
    pub fit: FitSettings,
}

impl Default for EosSettings {
    fn default() -> Self {
        Self {
            a_virial: 3.0,
            b_virial: 0.0,
            old_ns_fit: true,
            include_muons: false,
            select_cs2_test: true,
            virial_newton: NewtonSettings::default(),
            extension_newton: NewtonSettings {
                max_steps: 100,
                ..NewtonSettings::default()
            },
            beta_newton: NewtonSettings {
                tolerance: 1e-9,
                ..NewtonSettings::default()
            },
            fit: FitSettings::default(),
        }
    }
}
