pub mod autodiff;
pub mod combiner;
pub mod constants;
pub mod deriv;
pub mod error;
pub mod fit;
pub mod gas;
pub mod grid;
pub mod leptons;
pub mod neutron_star;
pub mod qmc;
pub mod roots;
pub mod selection;
pub mod settings;
pub mod skyrme;
pub mod sound_speed;
pub mod special;
pub mod tables;
pub mod thermo;
/// The `nuceos_core` crate computes a finite-temperature nuclear equation of
/// state for homogeneous matter.
/// The free energy interpolates between a virial gas at low density and a
/// degenerate Skyrme/QMC/neutron-star model at high density, with analytic
/// first derivatives throughout.
///
/// Key components:
/// - **Traits**: `Scalar` (f64 or `Dual`) and `ResidualSystem` for generic residuals.
/// - **Numerics**: Newton and bracketed root solvers, Levenberg–Marquardt fits, numerical derivatives.
/// - **Sub-models**: virial gas, Skyrme functional, QMC neutron matter, neutron-star extension.
/// - **Combiner**: `EosModel::free_energy_density`, sound speeds and grid export.
/// - **Selection**: `EosContext` and the validator with numbered rejection codes.
pub mod traits;
pub mod virial;

pub use combiner::{EosModel, HadronicPoint};
pub use error::{EosError, Rejection};
pub use grid::{table_full, table_ye, GridSpec, PointResult};
pub use selection::{select_internal, select_random, EosContext, ModelParameters};
pub use settings::EosSettings;
pub use tables::ModelTables;
