//! Read-only model tables: candidate neutron-star EOSs and Skyrme
//! saturation-point parametrizations, stored as JSON arrays of rows.

use crate::error::EosError;
use crate::skyrme::{SaturationProperties, SurfaceCouplings, DEFAULT_MV_STAR};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// One candidate neutron-star EOS: energy per baryon (fm⁻¹) sampled on
/// n_b = 0.04 + 0.012·i, and the density where the tabulated EOS stops.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeutronStarRow {
    pub nb_max: f64,
    pub eoa: Vec<f64>,
}

/// Saturation properties of one Skyrme model (MeV, fm⁻³, MeV fm⁵).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkyrmeRow {
    pub rho0: f64,
    pub eoa: f64,
    pub k: f64,
    pub ms_inv: f64,
    pub crdr0: f64,
    pub crdr1: f64,
    pub crdj0: f64,
    pub crdj1: f64,
    pub vp: f64,
    pub vn: f64,
}

impl SkyrmeRow {
    /// Saturation point completed with a symmetry energy and slope.
    pub fn saturation(&self, s: f64, l: f64) -> SaturationProperties {
        SaturationProperties {
            n0: self.rho0,
            eoa: self.eoa,
            k: self.k,
            ms_star: 1.0 / self.ms_inv,
            mv_star: DEFAULT_MV_STAR,
            s,
            l,
        }
    }

    pub fn surface(&self) -> SurfaceCouplings {
        SurfaceCouplings {
            c_rdr0: self.crdr0,
            c_rdr1: self.crdr1,
            c_rdj0: self.crdj0,
            c_rdj1: self.crdj1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NeutronStarTable {
    pub rows: Vec<NeutronStarRow>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SkyrmeTable {
    pub rows: Vec<SkyrmeRow>,
}

impl NeutronStarTable {
    pub fn from_path(path: &Path) -> Result<Self, EosError> {
        read_json(path)
    }

    pub fn row(&self, row: usize) -> Result<&NeutronStarRow, EosError> {
        self.rows.get(row).ok_or(EosError::RowOutOfRange {
            table: "neutron-star",
            row,
            rows: self.rows.len(),
        })
    }
}

impl SkyrmeTable {
    pub fn from_path(path: &Path) -> Result<Self, EosError> {
        read_json(path)
    }

    pub fn row(&self, row: usize) -> Result<&SkyrmeRow, EosError> {
        self.rows.get(row).ok_or(EosError::RowOutOfRange {
            table: "Skyrme",
            row,
            rows: self.rows.len(),
        })
    }
}

/// Both tables a model is selected from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelTables {
    pub neutron_star: NeutronStarTable,
    pub skyrme: SkyrmeTable,
}

impl ModelTables {
    pub fn load(neutron_star: &Path, skyrme: &Path) -> Result<Self, EosError> {
        Ok(Self {
            neutron_star: NeutronStarTable::from_path(neutron_star)?,
            skyrme: SkyrmeTable::from_path(skyrme)?,
        })
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, EosError> {
    let data_load = |message: String| EosError::DataLoad {
        path: path.display().to_string(),
        message,
    };
    let file = File::open(path).map_err(|err| data_load(err.to_string()))?;
    serde_json::from_reader(BufReader::new(file)).map_err(|err| data_load(err.to_string()))
}

/// Synthetic tables near empirical nuclear matter.
#[cfg(test)]
pub mod fixtures {
    use super::*;
    use crate::constants::mev_to_fm;
    use crate::neutron_star::fit::sample_density;

    /// E/A = 12.5 x^0.5 + 3.5 x^2.3 MeV with x = n_b/0.16; causal up to
    /// n_b ≈ 0.98.
    pub fn neutron_star_row(nb_max: f64) -> NeutronStarRow {
        let eoa = (0..100)
            .map(|i| {
                let x = sample_density(i) / 0.16;
                mev_to_fm(12.5 * x.sqrt() + 3.5 * x.powf(2.3))
            })
            .collect();
        NeutronStarRow { nb_max, eoa }
    }

    pub fn skyrme_row() -> SkyrmeRow {
        SkyrmeRow {
            rho0: 0.16,
            eoa: -16.0,
            k: 200.0,
            ms_inv: 1.25,
            crdr0: -45.0,
            crdr1: -30.0,
            crdj0: -70.0,
            crdj1: 20.0,
            vp: -250.0,
            vn: -270.0,
        }
    }

    pub fn model_tables() -> ModelTables {
        ModelTables {
            neutron_star: NeutronStarTable {
                rows: vec![neutron_star_row(1.2)],
            },
            skyrme: SkyrmeTable {
                rows: vec![skyrme_row()],
            },
        }
    }
}
