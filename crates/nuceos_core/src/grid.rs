//! Point evaluation in physical units and the tabulated sweeps over
//! (n_B, Y_e, T).

use crate::combiner::{EosModel, HadronicPoint};
use crate::constants::{fm_to_mev, mev_to_fm};
use crate::error::{invalid_state, EosError};
use crate::leptons::{lepton_point, LeptonPoint};
use crate::selection::EosContext;
use crate::thermo::Thermo;
use rayon::prelude::*;
use serde::Serialize;
use tracing::info;

pub const NB_POINTS: usize = 301;
pub const YE_POINTS: usize = 99;
pub const T_POINTS: usize = 160;

/// Baryon density of grid point `i` (fm⁻³), logarithmic from 2e-12.
pub fn nb_grid(i: usize) -> f64 {
    10f64.powf(0.04 * i as f64 - 12.0) * 2.0
}

pub fn ye_grid(i: usize) -> f64 {
    0.01 * (i + 1) as f64
}

/// Temperature of grid point `i` in MeV.
pub fn t_grid(i: usize) -> f64 {
    0.2 + 0.81 * i as f64
}

/// Axes of a sweep. Y_e is ignored by [`table_ye`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GridSpec {
    pub nb: Vec<f64>,
    pub ye: Vec<f64>,
    pub t_mev: Vec<f64>,
}

impl GridSpec {
    pub fn standard() -> Self {
        Self {
            nb: (0..NB_POINTS).map(nb_grid).collect(),
            ye: (0..YE_POINTS).map(ye_grid).collect(),
            t_mev: (0..T_POINTS).map(t_grid).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.nb.len() * self.ye.len() * self.t_mev.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Per-baryon results at one point. Hadronic values exclude nucleon rest
/// masses; totals add electrons (with rest mass), photons and muons when
/// enabled. Energies in MeV, pressures in MeV fm⁻³.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PointResult {
    pub f_hadronic: f64,
    pub f_total: f64,
    pub e_hadronic: f64,
    pub e_total: f64,
    pub p_hadronic: f64,
    pub p_total: f64,
    pub s_hadronic: f64,
    pub s_total: f64,
    pub mu_n: f64,
    pub mu_p: f64,
}

impl PointResult {
    fn new(nb: f64, t: f64, hadrons: &HadronicPoint, leptons: &LeptonPoint) -> Self {
        let h = hadrons.thermo;
        let total = h + leptons.total;
        Self {
            f_hadronic: fm_to_mev(h.free_energy(t) / nb),
            f_total: fm_to_mev(total.free_energy(t) / nb),
            e_hadronic: fm_to_mev(h.ed / nb),
            e_total: fm_to_mev(total.ed / nb),
            p_hadronic: fm_to_mev(h.pr),
            p_total: fm_to_mev(total.pr),
            s_hadronic: h.en / nb,
            s_total: total.en / nb,
            mu_n: fm_to_mev(hadrons.mu_n),
            mu_p: fm_to_mev(hadrons.mu_p),
        }
    }
}

/// Hadronic diagnostics tabulated at fixed Y_e (MeV, MeV fm⁻³, or
/// dimensionless). Nothing here includes leptons.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FixedYePoint {
    /// Hadronic free energy per baryon, (ε − T s)/n_B.
    pub f: f64,
    pub s: f64,
    /// Sign of the hadronic pressure: 1, -1 or 0.
    pub pr_sign: f64,
    /// Sign of the hadronic entropy: 1, -1 or 0.
    pub s_sign: f64,
    pub g: f64,
    pub dg_dt: f64,
    pub ms_n: f64,
    pub ms_p: f64,
    pub pr: f64,
    pub f_deg: f64,
    pub f_virial: f64,
    pub s_virial: f64,
    pub f_total: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FixedYeTable {
    pub ye: f64,
    pub nb: Vec<f64>,
    pub t_mev: Vec<f64>,
    /// Row-major in (n_B, T).
    pub points: Vec<FixedYePoint>,
}

impl FixedYeTable {
    pub fn get(&self, i_nb: usize, i_t: usize) -> Option<&FixedYePoint> {
        if i_t >= self.t_mev.len() {
            return None;
        }
        self.points.get(i_nb * self.t_mev.len() + i_t)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FullTable {
    pub grid: GridSpec,
    /// Row-major in (n_B, Y_e, T).
    pub points: Vec<PointResult>,
}

impl FullTable {
    pub fn get(&self, i_nb: usize, i_ye: usize, i_t: usize) -> Option<&PointResult> {
        let (n_ye, n_t) = (self.grid.ye.len(), self.grid.t_mev.len());
        if i_ye >= n_ye || i_t >= n_t {
            return None;
        }
        self.points.get((i_nb * n_ye + i_ye) * n_t + i_t)
    }
}

impl EosModel {
    fn evaluate_parts(&self, nb: f64, ye: f64, t: f64) -> Result<(HadronicPoint, LeptonPoint), EosError> {
        check_domain(nb, ye, t)?;
        let hadrons = self.free_energy_density(nb * (1.0 - ye), nb * ye, t)?;
        let leptons = lepton_point(nb * ye, t, self.settings.include_muons)?;
        Ok((hadrons, leptons))
    }

    /// Hadronic part only, with every thermodynamic quantity finite.
    fn finite_hadrons(&self, nb: f64, ye: f64, t_mev: f64) -> Result<HadronicPoint, EosError> {
        let t = mev_to_fm(t_mev);
        check_domain(nb, ye, t)?;
        let hadrons = self.free_energy_density(nb * (1.0 - ye), nb * ye, t)?;
        check_finite(
            ["hadronic energy density", "hadronic pressure", "hadronic entropy"],
            &hadrons.thermo,
            nb,
            ye,
            t_mev,
        )?;
        Ok(hadrons)
    }

    /// Free energy, energy, pressure and entropy per baryon plus the nucleon
    /// chemical potentials at (n_B, Y_e, T in MeV).
    pub fn evaluate_point(&self, nb: f64, ye: f64, t_mev: f64) -> Result<PointResult, EosError> {
        let t = mev_to_fm(t_mev);
        let (hadrons, leptons) = self.evaluate_parts(nb, ye, t)?;
        Ok(PointResult::new(nb, t, &hadrons, &leptons))
    }

    /// Finite hadrons and leptons, rejecting negative total entropy under
    /// positive hadronic pressure.
    fn checked_parts(&self, nb: f64, ye: f64, t_mev: f64) -> Result<(HadronicPoint, LeptonPoint), EosError> {
        let hadrons = self.finite_hadrons(nb, ye, t_mev)?;
        let leptons = lepton_point(nb * ye, mev_to_fm(t_mev), self.settings.include_muons)?;
        check_finite(
            ["lepton energy density", "lepton pressure", "lepton entropy"],
            &leptons.total,
            nb,
            ye,
            t_mev,
        )?;
        if hadrons.thermo.en + leptons.total.en < 0.0 && hadrons.thermo.pr > 0.0 {
            return Err(EosError::NegativeEntropy { nb, ye, t_mev });
        }
        Ok((hadrons, leptons))
    }
}

impl EosContext {
    pub fn evaluate_point(&self, nb: f64, ye: f64, t_mev: f64) -> Result<PointResult, EosError> {
        self.model()?.evaluate_point(nb, ye, t_mev)
    }
}

fn check_domain(nb: f64, ye: f64, t: f64) -> Result<(), EosError> {
    if !(nb > 0.0 && ye > 0.0 && ye < 1.0 && t > 0.0) {
        return Err(invalid_state(format!(
            "point needs nb > 0, 0 < ye < 1 and T > 0 (got nb = {nb}, ye = {ye}, T = {t} fm^-1)"
        )));
    }
    Ok(())
}

fn sign(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}

fn check_finite(names: [&'static str; 3], th: &Thermo, nb: f64, ye: f64, t_mev: f64) -> Result<(), EosError> {
    for (quantity, value) in names.into_iter().zip([th.ed, th.pr, th.en]) {
        if !value.is_finite() {
            return Err(EosError::NonFinite { quantity, nb, ye, t_mev });
        }
    }
    Ok(())
}

/// Hadronic diagnostics over n_B × T at fixed electron fraction. Only
/// non-finite values abort the sweep; the signs of pressure and entropy
/// are recorded instead of checked.
pub fn table_ye(model: &EosModel, ye: f64, grid: &GridSpec) -> Result<FixedYeTable, EosError> {
    let n_t = grid.t_mev.len();
    info!(ye, points = grid.nb.len() * n_t, "tabulating at fixed Ye");

    let points = (0..grid.nb.len() * n_t)
        .into_par_iter()
        .map(|idx| -> Result<FixedYePoint, EosError> {
            let (nb, t_mev) = (grid.nb[idx / n_t], grid.t_mev[idx % n_t]);
            let t = mev_to_fm(t_mev);
            let hadrons = model.finite_hadrons(nb, ye, t_mev)?;
            let th = hadrons.thermo;
            Ok(FixedYePoint {
                f: fm_to_mev(th.free_energy(t) / nb),
                s: th.en / nb,
                pr_sign: sign(th.pr),
                s_sign: sign(th.en),
                g: hadrons.g_virial,
                dg_dt: hadrons.dg_virial_dt,
                ms_n: fm_to_mev(hadrons.ms_n),
                ms_p: fm_to_mev(hadrons.ms_p),
                pr: fm_to_mev(th.pr),
                f_deg: fm_to_mev(hadrons.f_deg / nb),
                f_virial: fm_to_mev(hadrons.f_virial / nb),
                s_virial: hadrons.s_virial / nb,
                f_total: fm_to_mev(hadrons.f_total / nb),
            })
        })
        .collect::<Result<Vec<_>, EosError>>()?;

    Ok(FixedYeTable {
        ye,
        nb: grid.nb.clone(),
        t_mev: grid.t_mev.clone(),
        points,
    })
}

/// [`PointResult`] over the full n_B × Y_e × T grid.
pub fn table_full(model: &EosModel, grid: &GridSpec) -> Result<FullTable, EosError> {
    let (n_ye, n_t) = (grid.ye.len(), grid.t_mev.len());
    info!(points = grid.len(), "tabulating full grid");

    let points = (0..grid.len())
        .into_par_iter()
        .map(|idx| -> Result<PointResult, EosError> {
            let nb = grid.nb[idx / (n_ye * n_t)];
            let ye = grid.ye[(idx / n_t) % n_ye];
            let t_mev = grid.t_mev[idx % n_t];
            let (hadrons, leptons) = model.checked_parts(nb, ye, t_mev)?;
            Ok(PointResult::new(nb, mev_to_fm(t_mev), &hadrons, &leptons))
        })
        .collect::<Result<Vec<_>, EosError>>()?;

    Ok(FullTable {
        grid: grid.clone(),
        points,
    })
}
