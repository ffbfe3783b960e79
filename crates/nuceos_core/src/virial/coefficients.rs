//! Temperature-dependent second virial coefficients b_n(T) (neutron-neutron)
//! and b_pn(T) (proton-neutron, deuteron pole removed), as smooth fits to
//! phase-shift data. Temperatures in MeV.

use crate::constants::DEUTERON_BINDING_MEV;
use crate::fit::{fit_least_squares, FitModel, FitSettings};
use crate::traits::Scalar;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const BN_TEMPERATURES: [f64; 26] = [
    0.1, 0.5, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0, 12.0, 14.0, 16.0, 18.0, 20.0,
    22.0, 24.0, 25.0, 30.0, 35.0, 40.0, 45.0, 50.0, 150.0,
];

const BN_VALUES: [f64; 25] = [
    0.207, 0.272, 0.288, 0.303, 0.306, 0.306, 0.306, 0.306, 0.307, 0.307, 0.308, 0.309, 0.310,
    0.313, 0.315, 0.318, 0.320, 0.322, 0.324, 0.325, 0.329, 0.330, 0.330, 0.328, 0.324,
];

const BPN_TEMPERATURES: [f64; 17] = [
    0.1, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0, 12.0, 14.0, 16.0, 18.0, 20.0, 150.0,
];

/// Total proton-neutron coefficients including the deuteron, T = 1..20 MeV.
const BPN_VALUES: [f64; 15] = [
    19.4, 6.1, 4.018, 3.19, 2.74, 2.46, 2.26, 2.11, 2.00, 1.91, 1.76, 1.66, 1.57, 1.51, 1.45,
];

/// Value at T = 0.1 MeV from the effective range expansion.
const BPN_LOW_TEMPERATURE: f64 = 2.046;

/// Uncertainty assigned to the b_pn(150 MeV) = 0 anchor.
const BPN_HIGH_TEMPERATURE_ERROR: f64 = 0.04;

struct NeutronNeutron;

impl FitModel for NeutronNeutron {
    fn parameter_count(&self) -> usize {
        10
    }

    fn evaluate<T: Scalar>(&self, p: &[T], t: f64) -> T {
        let tt = T::cst(t);
        let dt = tt - p[6];
        p[0] + p[1] * tt
            + p[2] * tt * tt
            + p[3] * tt * tt * tt
            + p[4] * (-(p[5] * dt * dt)).exp()
            + p[7] * (-(p[8] * (tt - p[9]))).exp()
    }
}

struct ProtonNeutron;

impl FitModel for ProtonNeutron {
    fn parameter_count(&self) -> usize {
        6
    }

    fn evaluate<T: Scalar>(&self, p: &[T], t: f64) -> T {
        let tt = T::cst(t);
        let shifted = tt + p[2];
        p[0] * (-(p[1] * shifted * shifted)).exp() + p[3] * (-(p[4] * (tt + p[5]))).exp()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VirialCoefficients {
    pub bn_params: [f64; 10],
    pub bpn_params: [f64; 6],
}

/// χ² of the last calibration, `None` for a fit that failed and left the
/// previous parameters in place.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VirialFitReport {
    pub bn_chi2: Option<f64>,
    pub bpn_chi2: Option<f64>,
}

impl Default for VirialCoefficients {
    fn default() -> Self {
        Self {
            bn_params: [
                2.874487202922e-01,
                2.200575070883e-03,
                -2.621025627694e-05,
                -6.061665959200e-08,
                1.059451872186e-02,
                5.673374476876e-02,
                3.492489364849e+00,
                -2.710552654167e-03,
                3.140521199464e+00,
                1.200987113605e+00,
            ],
            bpn_params: [
                1.527316309589e+00,
                1.748834077357e-04,
                1.754991542102e+01,
                4.510380054238e-01,
                2.751333759925e-01,
                -1.125035495140e+00,
            ],
        }
    }
}

impl VirialCoefficients {
    pub fn bn(&self, t_mev: f64) -> f64 {
        NeutronNeutron.evaluate(&self.bn_params, t_mev)
    }

    pub fn bpn(&self, t_mev: f64) -> f64 {
        ProtonNeutron.evaluate(&self.bpn_params, t_mev)
    }

    /// db_n/dT in MeV⁻¹.
    pub fn dbn_dt(&self, t_mev: f64) -> f64 {
        let p = &self.bn_params;
        let dt = t_mev - p[6];
        p[1] + 2.0 * p[2] * t_mev + 3.0 * p[3] * t_mev * t_mev
            - 2.0 * p[4] * p[5] * dt * (-p[5] * dt * dt).exp()
            - p[7] * p[8] * (-p[8] * (t_mev - p[9])).exp()
    }

    /// db_pn/dT in MeV⁻¹.
    pub fn dbpn_dt(&self, t_mev: f64) -> f64 {
        let p = &self.bpn_params;
        let shifted = t_mev + p[2];
        -2.0 * p[0] * p[1] * shifted * (-p[1] * shifted * shifted).exp()
            - p[3] * p[4] * (-p[4] * (t_mev + p[5])).exp()
    }

    /// Refits both coefficient functions to the reference data. A fit that
    /// does not converge is logged and its previous parameters are kept.
    pub fn fit(&mut self, settings: FitSettings) -> VirialFitReport {
        let (ts, values, errors) = neutron_data();
        let bn_chi2 = match fit_least_squares(&NeutronNeutron, &ts, &values, &errors, &self.bn_params, settings) {
            Ok(result) => {
                self.bn_params.copy_from_slice(&result.params);
                debug!(chi2 = result.chi2, iterations = result.iterations, "b_n fit converged");
                Some(result.chi2)
            }
            Err(err) => {
                warn!("b_n virial fit failed, keeping previous parameters: {err:#}");
                None
            }
        };

        let (ts, values, errors) = proton_neutron_data();
        let bpn_chi2 = match fit_least_squares(&ProtonNeutron, &ts, &values, &errors, &self.bpn_params, settings) {
            Ok(result) => {
                self.bpn_params.copy_from_slice(&result.params);
                debug!(chi2 = result.chi2, iterations = result.iterations, "b_pn fit converged");
                Some(result.chi2)
            }
            Err(err) => {
                warn!("b_pn virial fit failed, keeping previous parameters: {err:#}");
                None
            }
        };

        VirialFitReport { bn_chi2, bpn_chi2 }
    }
}

fn neutron_data() -> (Vec<f64>, Vec<f64>, Vec<f64>) {
    let mut values = BN_VALUES.to_vec();
    // High-temperature limit of the free Fermi gas.
    values.push(-(2.0_f64).powf(-2.5));
    let errors = values.iter().map(|v| v.abs() / 100.0).collect();
    (BN_TEMPERATURES.to_vec(), values, errors)
}

fn proton_neutron_data() -> (Vec<f64>, Vec<f64>, Vec<f64>) {
    let mut values = Vec::with_capacity(BPN_TEMPERATURES.len());
    values.push(BPN_LOW_TEMPERATURE);
    for (t, b) in BPN_TEMPERATURES[1..16].iter().zip(BPN_VALUES) {
        values.push(b - 3.0 / 2.0_f64.sqrt() * ((DEUTERON_BINDING_MEV / t).exp() - 1.0));
    }
    values.push(0.0);
    let mut errors: Vec<f64> = values[..16].iter().map(|v| v.abs() / 100.0).collect();
    errors.push(BPN_HIGH_TEMPERATURE_ERROR);
    (BPN_TEMPERATURES.to_vec(), values, errors)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_parameters_hit_high_temperature_limits() {
        let vc = VirialCoefficients::default();
        assert!((vc.bn(150.0) + 2.0_f64.powf(-2.5)).abs() < 5e-3, "bn = {}", vc.bn(150.0));
        assert!(vc.bpn(150.0).abs() < 0.05, "bpn = {}", vc.bpn(150.0));
    }

    #[test]
    fn analytic_temperature_derivatives_match_differences() {
        let vc = VirialCoefficients::default();
        for t in [0.5, 3.0, 12.0, 40.0] {
            let h = 1e-5;
            let dbn = (vc.bn(t + h) - vc.bn(t - h)) / (2.0 * h);
            let dbpn = (vc.bpn(t + h) - vc.bpn(t - h)) / (2.0 * h);
            assert!((dbn - vc.dbn_dt(t)).abs() < 1e-7, "T = {t}");
            assert!((dbpn - vc.dbpn_dt(t)).abs() < 1e-7, "T = {t}");
        }
    }

    #[test]
    fn refit_keeps_limits_and_reports_chi2() {
        let mut vc = VirialCoefficients::default();
        let report = vc.fit(FitSettings::default());
        assert!(report.bn_chi2.is_some());
        assert!(report.bpn_chi2.is_some());
        assert!((vc.bn(150.0) + 2.0_f64.powf(-2.5)).abs() < 0.01);
        assert!(vc.bpn(150.0).abs() < 0.1);
        assert!((vc.bn(10.0) - 0.309).abs() < 0.01);
    }

    #[test]
    fn failed_fit_retains_parameters() {
        let mut vc = VirialCoefficients::default();
        let before = vc.clone();
        let settings = FitSettings {
            max_iterations: 0,
            ..FitSettings::default()
        };
        let report = vc.fit(settings);
        assert_eq!(report.bn_chi2, None);
        assert_eq!(report.bpn_chi2, None);
        assert_eq!(vc, before);
    }

    #[test]
    fn deuteron_pole_is_removed_from_data() {
        let (_, values, errors) = proton_neutron_data();
        assert_eq!(values.len(), 17);
        let expected = 19.4 - 3.0 / 2.0_f64.sqrt() * ((2.224_f64).exp() - 1.0);
        assert!((values[1] - expected).abs() < 1e-12);
        assert_eq!(errors[16], 0.04);
    }
}
