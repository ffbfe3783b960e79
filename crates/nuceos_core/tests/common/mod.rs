#![allow(dead_code)]

use nuceos_core::constants::mev_to_fm;
use nuceos_core::neutron_star::fit::sample_density;
use nuceos_core::tables::{NeutronStarRow, NeutronStarTable, SkyrmeRow, SkyrmeTable};
use nuceos_core::virial::VirialCoefficients;
use nuceos_core::{EosContext, EosSettings, ModelParameters, ModelTables};

pub fn tables() -> ModelTables {
    let eoa = (0..100)
        .map(|i| {
            let x = sample_density(i) / 0.16;
            mev_to_fm(12.5 * x.sqrt() + 3.5 * x.powf(2.3))
        })
        .collect();
    ModelTables {
        neutron_star: NeutronStarTable {
            rows: vec![NeutronStarRow { nb_max: 1.2, eoa }],
        },
        skyrme: SkyrmeTable {
            rows: vec![SkyrmeRow {
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
            }],
        },
    }
}

pub fn parameters() -> ModelParameters {
    ModelParameters {
        i_ns: 0,
        i_skyrme: 0,
        qmc_alpha: 0.49,
        qmc_a: 12.7,
        l: 50.0,
        s: 32.0,
        phi: 0.5,
    }
}

pub fn settings() -> EosSettings {
    EosSettings {
        select_cs2_test: false,
        ..EosSettings::default()
    }
}

pub fn selected_context() -> EosContext {
    EosContext::Unselected
        .select(&parameters(), &tables(), &settings(), &VirialCoefficients::default())
        .expect("reference parameters should be accepted")
}
