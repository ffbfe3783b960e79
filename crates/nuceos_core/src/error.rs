use serde::Serialize;
use thiserror::Error;

/// Reasons the parameter validator turns a candidate model down. Each carries
/// the integer code reported to callers and written to logs.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
pub enum Rejection {
    #[error("neutron-star fit has negative sound speed squared (min cs² = {min_cs2})")]
    NegativeNeutronStarSoundSpeed { min_cs2: f64 },
    #[error("(S, L) = ({s}, {l}) MeV lies outside the allowed corridor")]
    SymmetryCorridor { s: f64, l: f64 },
    #[error("QMC coefficients out of range (b = {b}, beta = {beta})")]
    QmcCoefficients { b: f64, beta: f64 },
    #[error("pure neutron matter is bound at nb = {nb} fm⁻³")]
    BoundNeutronMatter { nb: f64 },
    #[error("negative effective mass in symmetric matter")]
    EffectiveMassSymmetric,
    #[error("negative neutron effective mass in neutron matter")]
    EffectiveMassNeutron,
    #[error("negative proton effective mass in proton matter")]
    EffectiveMassProton,
    #[error("beta equilibrium solve failed at nb = {nb} fm⁻³")]
    BetaEquilibriumFailed { nb: f64 },
    #[error("beta equilibrium gives Ye = {ye} outside [0, 1] at nb = {nb} fm⁻³")]
    BetaEquilibriumOutOfRange { nb: f64, ye: f64 },
    #[error("neutron-star model could not be built: {message}")]
    NeutronStarModel { message: String },
    #[error("negative sound speed squared cs² = {cs2} at nb = {nb}, ye = {ye}, T = {t_mev} MeV")]
    Causality {
        nb: f64,
        ye: f64,
        t_mev: f64,
        cs2: f64,
    },
}

impl Rejection {
    pub fn code(&self) -> i32 {
        match self {
            Rejection::NegativeNeutronStarSoundSpeed { .. } => 1,
            Rejection::SymmetryCorridor { .. } => 2,
            Rejection::QmcCoefficients { .. } => 3,
            Rejection::BoundNeutronMatter { .. } => 4,
            Rejection::EffectiveMassSymmetric => 5,
            Rejection::EffectiveMassNeutron => 6,
            Rejection::EffectiveMassProton => 7,
            Rejection::BetaEquilibriumFailed { .. } => 8,
            Rejection::BetaEquilibriumOutOfRange { .. } => 9,
            Rejection::NeutronStarModel { .. } => 10,
            Rejection::Causality { .. } => 11,
        }
    }
}

#[derive(Debug, Error)]
pub enum EosError {
    #[error("no model has been selected")]
    NoModelSelected,
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("{table} table row {row} out of range ({rows} rows)")]
    RowOutOfRange {
        table: &'static str,
        row: usize,
        rows: usize,
    },
    #[error("parameter set rejected (code {code}): {0}", code = .0.code())]
    Rejected(#[from] Rejection),
    #[error("non-finite {quantity} at nb = {nb}, ye = {ye}, T = {t_mev} MeV")]
    NonFinite {
        quantity: &'static str,
        nb: f64,
        ye: f64,
        t_mev: f64,
    },
    #[error("negative entropy with positive pressure at nb = {nb}, ye = {ye}, T = {t_mev} MeV")]
    NegativeEntropy { nb: f64, ye: f64, t_mev: f64 },
    #[error("failed to load {path}: {message}")]
    DataLoad { path: String, message: String },
    #[error("random selection found no acceptable model in {attempts} attempts")]
    SelectionExhausted { attempts: usize },
    #[error(transparent)]
    Numerical(#[from] anyhow::Error),
}

impl EosError {
    /// The validator code if this error is a rejection.
    pub fn rejection_code(&self) -> Option<i32> {
        match self {
            EosError::Rejected(rejection) => Some(rejection.code()),
            _ => None,
        }
    }
}

pub(crate) fn invalid_state(message: impl Into<String>) -> EosError {
    EosError::InvalidState(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_codes_are_distinct() {
        let all = [
            Rejection::NegativeNeutronStarSoundSpeed { min_cs2: -0.1 },
            Rejection::SymmetryCorridor { s: 30.0, l: 100.0 },
            Rejection::QmcCoefficients { b: -1.0, beta: 2.0 },
            Rejection::BoundNeutronMatter { nb: 0.02 },
            Rejection::EffectiveMassSymmetric,
            Rejection::EffectiveMassNeutron,
            Rejection::EffectiveMassProton,
            Rejection::BetaEquilibriumFailed { nb: 0.5 },
            Rejection::BetaEquilibriumOutOfRange { nb: 0.5, ye: 1.2 },
            Rejection::NeutronStarModel {
                message: "singular".into(),
            },
            Rejection::Causality {
                nb: 1.0,
                ye: 0.1,
                t_mev: 1.0,
                cs2: -0.2,
            },
        ];
        let codes: Vec<i32> = all.iter().map(Rejection::code).collect();
        assert_eq!(codes, (1..=11).collect::<Vec<_>>());
    }

    #[test]
    fn rejected_error_mentions_code() {
        let err = EosError::from(Rejection::SymmetryCorridor { s: 30.0, l: 100.0 });
        assert_eq!(err.rejection_code(), Some(2));
        assert!(format!("{err}").contains("code 2"));
        assert_eq!(EosError::NoModelSelected.rejection_code(), None);
    }
}
