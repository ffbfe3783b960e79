//! Model selection: building an [`EosModel`] from table rows and physical
//! parameters, and rejecting candidates that fail the physical checks.

use crate::combiner::{EosModel, HadronicPoint};
use crate::constants::mev_to_fm;
use crate::error::{EosError, Rejection};
use crate::gas::pair_density;
use crate::leptons::electron;
use crate::neutron_star::{NeutronStarEos, NeutronStarFit, NsFitForm};
use crate::qmc::QmcNeutronMatter;
use crate::roots::{solve_newton_fd, NewtonSettings};
use crate::settings::EosSettings;
use crate::skyrme::{NuclearFunctional, SkyrmeFunctional};
use crate::tables::{ModelTables, SkyrmeRow};
use crate::virial::VirialCoefficients;
use anyhow::{bail, Context, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Everything that identifies a model: table rows plus the QMC, symmetry
/// energy and high-density sound-speed parameters (MeV where dimensionful).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelParameters {
    pub i_ns: usize,
    pub i_skyrme: usize,
    pub qmc_alpha: f64,
    pub qmc_a: f64,
    pub l: f64,
    pub s: f64,
    /// Squared sound speed reached at n_b = 2 fm⁻³.
    pub phi: f64,
}

/// Either no model yet, or one that passed every check.
#[derive(Debug, Clone, Default)]
pub enum EosContext {
    #[default]
    Unselected,
    Selected(Box<EosModel>),
}

impl EosContext {
    pub fn is_selected(&self) -> bool {
        matches!(self, EosContext::Selected(_))
    }

    pub fn model(&self) -> Result<&EosModel, EosError> {
        match self {
            EosContext::Selected(model) => Ok(model),
            EosContext::Unselected => Err(EosError::NoModelSelected),
        }
    }

    /// Validates `params` and returns the context holding the new model.
    /// On rejection `self` is left as it was.
    pub fn select(
        &self,
        params: &ModelParameters,
        tables: &ModelTables,
        settings: &EosSettings,
        virial: &VirialCoefficients,
    ) -> Result<EosContext, EosError> {
        let model = select_internal(params, tables, settings, virial)?;
        Ok(EosContext::Selected(Box::new(model)))
    }

    pub fn free_energy_density(&self, nn: f64, np: f64, t: f64) -> Result<HadronicPoint, EosError> {
        Ok(self.model()?.free_energy_density(nn, np, t)?)
    }
}

/// Builds the model for `params` and runs the physical checks in order,
/// returning the first failure as a [`Rejection`].
pub fn select_internal(
    params: &ModelParameters,
    tables: &ModelTables,
    settings: &EosSettings,
    virial: &VirialCoefficients,
) -> Result<EosModel, EosError> {
    let ns_row = tables.neutron_star.row(params.i_ns)?;
    let sk_row = tables.skyrme.row(params.i_skyrme)?;

    let form = if settings.old_ns_fit {
        NsFitForm::HalfPowers
    } else {
        NsFitForm::Polynomial
    };
    let fit = NeutronStarFit::from_row(ns_row, form, settings.fit).map_err(neutron_star_failure)?;
    let (min_cs2, _) = fit.min_max_cs2();
    if min_cs2 < 0.0 {
        return Err(Rejection::NegativeNeutronStarSoundSpeed { min_cs2 }.into());
    }

    let (s, l) = (params.s, params.l);
    if 9.17 * s - 266.0 > l || 14.3 * s - 379.0 < l {
        return Err(Rejection::SymmetryCorridor { s, l }.into());
    }

    let qmc = QmcNeutronMatter::from_symmetry_energy(params.qmc_a, params.qmc_alpha, s, l, sk_row.eoa);
    if qmc.b < 0.0 || qmc.beta > 5.0 {
        return Err(Rejection::QmcCoefficients {
            b: qmc.b,
            beta: qmc.beta,
        }
        .into());
    }

    let skyrme = fit_skyrme(sk_row, s, l)?;
    check_neutron_matter(&skyrme)?;

    let neutron_star =
        NeutronStarEos::new(fit, params.phi, skyrme.m_n, settings.extension_newton).map_err(neutron_star_failure)?;

    let model = EosModel {
        params: *params,
        settings: *settings,
        virial: virial.clone(),
        skyrme,
        thermal: SkyrmeFunctional::chiral(),
        qmc,
        neutron_star,
    };

    let t_beta = mev_to_fm(1.0);
    for i in 0..=38 {
        let nb = 0.1 + 0.05 * i as f64;
        check_beta_equilibrium(nb, solve_beta_equilibrium(&model, nb, t_beta, settings.beta_newton))?;
    }

    if settings.select_cs2_test {
        check_causality(&model)?;
    }

    info!(?params, "model selected");
    Ok(model)
}

fn neutron_star_failure(err: anyhow::Error) -> EosError {
    Rejection::NeutronStarModel {
        message: format!("{err:#}"),
    }
    .into()
}

fn fit_skyrme(row: &SkyrmeRow, s: f64, l: f64) -> Result<SkyrmeFunctional, EosError> {
    let skyrme = SkyrmeFunctional::from_saturation(&row.saturation(s, l))
        .context("Skyrme couplings could not be fitted to the saturation point.")?;
    Ok(skyrme.with_surface(row.surface()))
}

/// Pure neutron matter must be unbound at low density, and effective
/// masses must stay positive in symmetric, neutron and proton matter.
fn check_neutron_matter(skyrme: &SkyrmeFunctional) -> Result<(), EosError> {
    for i in 0..150 {
        let nb = 0.01 + 0.001 * i as f64;
        let point = skyrme
            .evaluate_zero_temperature(nb, 0.0)
            .context("Neutron matter evaluation failed.")?;
        if point.ed / nb < 0.0 {
            return Err(Rejection::BoundNeutronMatter { nb }.into());
        }
    }

    let positive = |(n, p): (f64, f64)| n > 0.0 && p > 0.0;
    if !positive(skyrme.effective_masses(1.0, 1.0)) {
        return Err(Rejection::EffectiveMassSymmetric.into());
    }
    if !positive(skyrme.effective_masses(2.0, 0.0)) {
        return Err(Rejection::EffectiveMassNeutron.into());
    }
    if !positive(skyrme.effective_masses(0.0, 2.0)) {
        return Err(Rejection::EffectiveMassProton.into());
    }
    Ok(())
}

fn check_causality(model: &EosModel) -> Result<(), EosError> {
    scan_fixed_ye_sound_speed(|nn, np, t| model.cs2_fix_ye(nn, np, t))
}

/// First point of the (n_B, Y_e, T) scan with negative fixed-Y_e c_s².
fn scan_fixed_ye_sound_speed<F>(mut cs2_fix_ye: F) -> Result<(), EosError>
where
    F: FnMut(f64, f64, f64) -> Result<f64>,
{
    for i in 0..=38 {
        let nb = 0.1 + 0.05 * i as f64;
        for ye in [0.05, 0.15, 0.25, 0.35, 0.45] {
            for t_mev in [1.0, 10.0] {
                let cs2 = cs2_fix_ye(nb * (1.0 - ye), nb * ye, mev_to_fm(t_mev))?;
                if cs2 < 0.0 {
                    return Err(Rejection::Causality { nb, ye, t_mev, cs2 }.into());
                }
            }
        }
    }
    Ok(())
}

/// Failed solves are code 8; an electron fraction outside [0, 1] is code 9.
fn check_beta_equilibrium(nb: f64, solved: Result<f64>) -> Result<(), EosError> {
    let ye = solved.map_err(|err| {
        debug!("beta equilibrium failed at nb = {nb}: {err:#}");
        EosError::from(Rejection::BetaEquilibriumFailed { nb })
    })?;
    if !(0.0..=1.0).contains(&ye) {
        return Err(Rejection::BetaEquilibriumOutOfRange { nb, ye }.into());
    }
    Ok(())
}

/// Electron fraction at which μ_n = μ_p + μ_e for baryon density `nb` and
/// temperature `t` (fm⁻¹). Fails where the Skyrme effective masses are not
/// positive. The result lies outside (0, 1) when the equilibrium does.
pub fn solve_beta_equilibrium(model: &EosModel, nb: f64, t: f64, settings: NewtonSettings) -> Result<f64> {
    let mass_gap = model.skyrme.m_n - model.skyrme.m_p;
    let residual = |ye: f64| -> Result<f64> {
        let (nn, np) = (nb * (1.0 - ye), nb * ye);
        let (ms_n, ms_p) = model.skyrme.effective_masses(nn, np);
        if !(ms_n > 0.0 && ms_p > 0.0) {
            bail!("Non-positive effective mass (neutron {ms_n}, proton {ms_p}) at ye = {ye}.");
        }
        let hadrons = model.free_energy_density(nn, np, t)?;
        let mut e = electron();
        e.n = np;
        pair_density(&mut e, t)?;
        Ok(hadrons.mu_n - hadrons.mu_p - e.mu + mass_gap)
    };
    solve_electron_fraction(residual, settings)
        .with_context(|| format!("Beta equilibrium did not converge at nb = {nb}."))
}

/// Distance from 0 and 1 at which the residual is sampled when Newton
/// finds no root inside the interval.
const EDGE_OFFSET: f64 = 1e-6;

/// Root of `residual` in Y_e by Newton from Y_e = 0.05, kept inside
/// (0, 1). If that fails and the residual has the same sign at both edges,
/// the root of the line through the edge values is returned instead; it
/// lies outside the interval.
fn solve_electron_fraction<F>(mut residual: F, settings: NewtonSettings) -> Result<f64>
where
    F: FnMut(f64) -> Result<f64>,
{
    let newton = solve_newton_fd(
        1,
        |x: &[f64], out: &mut [f64]| -> Result<()> {
            let ye = x[0];
            if !(ye > 0.0 && ye < 1.0) {
                bail!("Electron fraction {ye} left (0, 1).");
            }
            out[0] = residual(ye)?;
            Ok(())
        },
        &[0.05],
        settings,
    );
    let err = match newton {
        Ok(outcome) => return Ok(outcome.state[0]),
        Err(err) => err,
    };

    let (lo, hi) = (EDGE_OFFSET, 1.0 - EDGE_OFFSET);
    let (Ok(y_lo), Ok(y_hi)) = (residual(lo), residual(hi)) else {
        return Err(err);
    };
    if y_lo * y_hi > 0.0 && y_lo != y_hi {
        let ye = lo - y_lo * (hi - lo) / (y_hi - y_lo);
        debug!(ye, "no electron fraction root in (0, 1); extrapolated from the edges");
        return Ok(ye);
    }
    Err(err)
}

/// Draws candidate parameters until one is accepted, giving up after
/// `max_attempts`. Returns the model and the number of attempts used.
pub fn select_random<R: Rng>(
    rng: &mut R,
    tables: &ModelTables,
    settings: &EosSettings,
    virial: &VirialCoefficients,
    max_attempts: usize,
) -> Result<(EosModel, usize), EosError> {
    let (n_ns, n_skyrme) = (tables.neutron_star.rows.len(), tables.skyrme.rows.len());
    if n_ns == 0 {
        return Err(EosError::RowOutOfRange {
            table: "neutron-star",
            row: 0,
            rows: 0,
        });
    }
    if n_skyrme == 0 {
        return Err(EosError::RowOutOfRange {
            table: "Skyrme",
            row: 0,
            rows: 0,
        });
    }

    for attempt in 1..=max_attempts {
        let params = ModelParameters {
            phi: rng.gen::<f64>(),
            i_ns: rng.gen_range(0..n_ns),
            qmc_alpha: 0.47 + 0.06 * rng.gen::<f64>(),
            qmc_a: 12.5 + rng.gen::<f64>(),
            l: 44.0 + 21.0 * rng.gen::<f64>(),
            s: 29.5 + 6.6 * rng.gen::<f64>(),
            i_skyrme: rng.gen_range(0..n_skyrme),
        };
        match select_internal(&params, tables, settings, virial) {
            Ok(model) => return Ok((model, attempt)),
            Err(EosError::Rejected(rejection)) => {
                debug!(attempt, code = rejection.code(), "candidate rejected: {rejection}");
            }
            Err(EosError::Numerical(err)) => {
                debug!(attempt, "candidate failed: {err:#}");
            }
            Err(err) => return Err(err),
        }
    }
    Err(EosError::SelectionExhausted {
        attempts: max_attempts,
    })
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use crate::neutron_star::fit::sample_density;
    use crate::skyrme::SkyrmeCouplings;
    use crate::tables::fixtures::{model_tables, neutron_star_row, skyrme_row};
    use crate::tables::{NeutronStarRow, NeutronStarTable, SkyrmeTable};
    use anyhow::anyhow;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn assert_err_contains(err: EosError, needle: &str) {
        let message = format!("{err}");
        assert!(message.contains(needle), "expected '{needle}' in '{message}'");
    }

    fn select(params: &ModelParameters) -> Result<EosContext, EosError> {
        EosContext::default().select(params, &model_tables(), &fast_settings(), &VirialCoefficients::default())
    }

    /// Row sampled from E/A(n_b) given in MeV.
    fn row_from(nb_max: f64, eoa_mev: impl Fn(f64) -> f64) -> NeutronStarRow {
        let eoa = (0..100).map(|i| mev_to_fm(eoa_mev(sample_density(i)))).collect();
        NeutronStarRow { nb_max, eoa }
    }

    fn tables_with(ns: NeutronStarRow, skyrme: SkyrmeRow) -> ModelTables {
        ModelTables {
            neutron_star: NeutronStarTable { rows: vec![ns] },
            skyrme: SkyrmeTable { rows: vec![skyrme] },
        }
    }

    /// Selection from a fresh context must fail with `code` and leave the
    /// context unselected.
    fn assert_rejected(params: &ModelParameters, tables: &ModelTables, settings: &EosSettings, code: i32) {
        let context = EosContext::Unselected;
        let err = context
            .select(params, tables, settings, &VirialCoefficients::default())
            .expect_err("candidate should be rejected");
        assert_eq!(err.rejection_code(), Some(code), "{err}");
        assert!(!context.is_selected());
    }

    #[test]
    fn unselected_context_refuses_to_evaluate() {
        let context = EosContext::Unselected;
        let err = context.free_energy_density(0.1, 0.1, 0.05).expect_err("no model");
        assert!(matches!(err, EosError::NoModelSelected));
    }

    #[test]
    fn corridor_violation_is_code_two() {
        let params = ModelParameters {
            s: 30.0,
            l: 100.0,
            ..reference_parameters()
        };
        let context = EosContext::Unselected;
        let err = context
            .select(&params, &model_tables(), &fast_settings(), &VirialCoefficients::default())
            .expect_err("corridor should reject");
        assert_eq!(err.rejection_code(), Some(2));
        assert!(!context.is_selected());
    }

    #[test]
    fn large_qmc_exponent_is_code_three() {
        // b = S + E/A - a = 1.5 MeV, so beta = (L/3 - a alpha)/b exceeds 5.
        let params = ModelParameters {
            qmc_a: 13.5,
            s: 31.0,
            l: 60.0,
            ..reference_parameters()
        };
        let err = select(&params).expect_err("QMC check should reject");
        assert_eq!(err.rejection_code(), Some(3));
    }

    #[test]
    fn softening_neutron_star_table_is_code_one() {
        // dμ/dn < 0 for 0.02 < n_b < 0.45; 50 √n - 150 n + 100 n³ is exactly
        // representable by the half-power fit.
        let ns = row_from(1.2, |n| 50.0 * n.sqrt() - 150.0 * n + 100.0 * n.powi(3));
        assert_rejected(&reference_parameters(), &tables_with(ns, skyrme_row()), &fast_settings(), 1);
    }

    #[test]
    fn bound_neutron_matter_is_code_four() {
        // A deep saturation point with a soft symmetry energy binds neutron
        // matter below n0. b = 25 - 35 + 15 = 5 keeps the QMC check quiet.
        let skyrme = SkyrmeRow {
            eoa: -35.0,
            ..skyrme_row()
        };
        let params = ModelParameters {
            s: 25.0,
            l: -30.0,
            qmc_a: -15.0,
            ..reference_parameters()
        };
        assert_rejected(&params, &tables_with(neutron_star_row(1.2), skyrme), &fast_settings(), 4);
    }

    #[test]
    fn heavy_isoscalar_mass_is_code_five() {
        // m*/m = 1/0.9: 1/(2m*) turns negative in symmetric matter at n = 2.
        let skyrme = SkyrmeRow {
            ms_inv: 0.9,
            ..skyrme_row()
        };
        assert_rejected(
            &reference_parameters(),
            &tables_with(neutron_star_row(1.2), skyrme),
            &fast_settings(),
            5,
        );
    }

    #[test]
    fn unit_isoscalar_mass_is_code_six() {
        // With m*/m = 1 only the isovector term remains, which is negative
        // for neutrons at n_n = 2.
        let skyrme = SkyrmeRow {
            ms_inv: 1.0,
            ..skyrme_row()
        };
        assert_rejected(
            &reference_parameters(),
            &tables_with(neutron_star_row(1.2), skyrme),
            &fast_settings(),
            6,
        );
    }

    #[test]
    fn effective_mass_checks_follow_matter_type() {
        let reference = reference_model().skyrme;
        assert!(check_neutron_matter(&reference).is_ok());

        let with_tau = |c0_tau: f64, c1_tau: f64| {
            let mut skyrme = reference.clone();
            skyrme.couplings.c0_tau = c0_tau;
            skyrme.couplings.c1_tau = c1_tau;
            check_neutron_matter(&skyrme).expect_err("effective mass should be rejected").rejection_code()
        };
        let SkyrmeCouplings { c0_tau, c1_tau, .. } = reference.couplings;
        // Same c0 + c1 as the reference, so neutron matter stays unbound.
        assert_eq!(with_tau(-0.1, c0_tau + c1_tau + 0.1), Some(5));
        assert_eq!(with_tau(0.0, -0.06), Some(6));
        // Neutrons in proton matter see 1/(2m_n) + 2 c0 - 2 c1, protons in
        // neutron matter the same with the lighter m_p; push only the former
        // below zero.
        let c1_edge = (0.5 / reference.m_n + 2.0 * c0_tau + 5e-5) / 2.0;
        assert_eq!(with_tau(c0_tau, c1_edge), Some(7));
    }

    #[test]
    fn stiff_table_without_causal_limit_is_code_ten() {
        // cs² stays below 0.2 on the samples, so nb_max keeps the table's 2.5
        // and no causal extension to n_b = 2 exists.
        let ns = row_from(2.5, |n| 30.0 * n.sqrt() + 20.0 * n * n);
        assert_rejected(&reference_parameters(), &tables_with(ns, skyrme_row()), &fast_settings(), 10);
    }

    #[test]
    fn negative_sound_speed_is_code_eleven() {
        let err = scan_fixed_ye_sound_speed(|nn, np, _t| {
            let nb = nn + np;
            Ok(if nb > 1.02 && np < 0.1 * nb { -0.02 } else { 0.3 })
        })
        .expect_err("scan should stop at the first negative value");
        assert_eq!(err.rejection_code(), Some(11));
        match err {
            EosError::Rejected(Rejection::Causality { nb, ye, t_mev, cs2 }) => {
                assert!((nb - 1.05).abs() < 1e-12 && ye == 0.05 && t_mev == 1.0 && cs2 == -0.02);
            }
            other => panic!("unexpected error {other}"),
        }
        assert!(scan_fixed_ye_sound_speed(|_, _, _| Ok(0.3)).is_ok());
    }

    #[test]
    fn beta_equilibrium_outcomes_map_to_codes() {
        assert!(check_beta_equilibrium(0.4, Ok(0.12)).is_ok());
        let failed = check_beta_equilibrium(0.4, Err(anyhow!("no root"))).expect_err("code 8");
        assert_eq!(failed.rejection_code(), Some(8));
        let outside = check_beta_equilibrium(0.4, Ok(1.3)).expect_err("code 9");
        assert_eq!(outside.rejection_code(), Some(9));
    }

    #[test]
    fn electron_fraction_outside_the_interval_is_extrapolated() {
        let settings = NewtonSettings::default();
        let inside = solve_electron_fraction(|ye| Ok(ye - 0.3), settings).expect("root inside");
        assert!((inside - 0.3).abs() < 1e-9);
        let above = solve_electron_fraction(|ye| Ok(ye - 1.3), settings).expect("edge extrapolation");
        assert!((above - 1.3).abs() < 1e-9, "ye = {above}");
        let below = solve_electron_fraction(|ye| Ok(ye + 0.2), settings).expect("edge extrapolation");
        assert!((below + 0.2).abs() < 1e-9, "ye = {below}");

        // A sign change Newton cannot resolve stays a failure.
        let step = solve_electron_fraction(|ye| Ok(if ye < 0.7 { -1.0 } else { 1.0 }), settings);
        assert!(step.is_err());
        // So does a residual that cannot be evaluated at an edge.
        let partial = solve_electron_fraction(
            |ye| if ye < 0.5 { Ok(ye + 0.2) } else { Err(anyhow!("unstable")) },
            settings,
        );
        assert!(partial.is_err());
    }

    #[test]
    fn beta_equilibrium_needs_positive_effective_masses() {
        let mut model = reference_model();
        model.skyrme.couplings.c0_tau = -1.0;
        model.skyrme.couplings.c1_tau = 0.0;
        let err = solve_beta_equilibrium(&model, 1.0, mev_to_fm(1.0), NewtonSettings::default())
            .expect_err("negative effective masses");
        assert!(format!("{err:#}").contains("Non-positive effective mass"), "{err:#}");
    }

    #[test]
    fn missing_rows_are_precondition_errors() {
        let params = ModelParameters {
            i_skyrme: 4,
            ..reference_parameters()
        };
        let err = select(&params).expect_err("row should be missing");
        assert_err_contains(err, "Skyrme table row 4 out of range");
    }

    #[test]
    fn reference_model_reaches_beta_equilibrium() {
        let model = reference_model();
        let t = mev_to_fm(1.0);
        let low = solve_beta_equilibrium(&model, 0.1, t, NewtonSettings::default()).expect("should converge");
        let high = solve_beta_equilibrium(&model, 1.5, t, NewtonSettings::default()).expect("should converge");
        assert!(low > 0.0 && low < 0.2, "ye = {low}");
        assert!(high > 0.0 && high < 0.5, "ye = {high}");
    }

    #[test]
    fn random_selection_retries_until_accepted() {
        let mut rng = StdRng::seed_from_u64(7);
        let (model, attempts) = select_random(
            &mut rng,
            &model_tables(),
            &fast_settings(),
            &VirialCoefficients::default(),
            200,
        )
        .expect("some candidate should pass");
        assert!(attempts >= 1);
        let p = model.params;
        assert!((29.5..36.1).contains(&p.s) && (44.0..65.0).contains(&p.l));
        assert!(9.17 * p.s - 266.0 <= p.l && p.l <= 14.3 * p.s - 379.0);
    }

    #[test]
    fn empty_tables_cannot_be_sampled() {
        let mut rng = StdRng::seed_from_u64(1);
        let err = select_random(
            &mut rng,
            &ModelTables::default(),
            &fast_settings(),
            &VirialCoefficients::default(),
            5,
        )
        .expect_err("nothing to sample");
        assert_err_contains(err, "neutron-star table row 0 out of range (0 rows)");
    }
}
