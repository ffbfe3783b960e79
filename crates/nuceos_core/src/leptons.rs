use crate::constants::{mev_to_fm, M_ELECTRON_MEV, M_MUON_MEV};
use crate::gas::{pair_density, pair_mu, photons};
use crate::thermo::{ParticleState, Thermo};
use anyhow::{Context, Result};
use serde::Serialize;

/// Electrons (with positrons), optional muons and photons at one point.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct LeptonPoint {
    pub electron: ParticleState,
    pub muon: Option<ParticleState>,
    pub photon: Thermo,
    pub total: Thermo,
}

pub fn electron() -> ParticleState {
    ParticleState::new(mev_to_fm(M_ELECTRON_MEV), 2.0)
}

pub fn muon() -> ParticleState {
    ParticleState::new(mev_to_fm(M_MUON_MEV), 2.0)
}

/// Leptons and photons for electron density `n_e` at temperature `t` (fm⁻¹).
/// Muons, when included, share the electron chemical potential.
pub fn lepton_point(n_e: f64, t: f64, include_muons: bool) -> Result<LeptonPoint> {
    let mut e = electron();
    e.n = n_e;
    pair_density(&mut e, t).with_context(|| format!("Electron solve failed at n_e = {n_e}."))?;

    let muon = if include_muons {
        let mut mu = muon();
        mu.mu = e.mu;
        pair_mu(&mut mu, t).context("Muon integrals failed.")?;
        Some(mu)
    } else {
        None
    };

    let photon = photons(t);
    let mut total = e.thermo() + photon;
    if let Some(mu) = &muon {
        total += mu.thermo();
    }

    Ok(LeptonPoint {
        electron: e,
        muon,
        photon,
        total,
    })
}
