//! Physical constants. Internally all energies, masses and temperatures are
//! carried in fm⁻¹ (divide MeV by `HBAR_C`), densities in fm⁻³.

/// ħc in MeV·fm.
pub const HBAR_C: f64 = 197.3269804;

/// Neutron rest mass in MeV.
pub const M_NEUTRON_MEV: f64 = 939.565420;

/// Proton rest mass in MeV.
pub const M_PROTON_MEV: f64 = 938.272088;

/// Electron rest mass in MeV.
pub const M_ELECTRON_MEV: f64 = 0.51099895;

/// Muon rest mass in MeV.
pub const M_MUON_MEV: f64 = 105.6583755;

/// Deuteron binding energy in MeV; the bound-state pole in the proton-neutron
/// virial coefficient.
pub const DEUTERON_BINDING_MEV: f64 = 2.224;

/// Saturation density used to scale the QMC neutron-matter energy, fm⁻³.
pub const QMC_SATURATION_DENSITY: f64 = 0.16;

/// Converts a quantity in MeV into fm⁻¹.
pub fn mev_to_fm(value: f64) -> f64 {
    value / HBAR_C
}

/// Converts a quantity in fm⁻¹ into MeV.
pub fn fm_to_mev(value: f64) -> f64 {
    value * HBAR_C
}
