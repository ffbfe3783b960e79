//! Neutron-star matter: a smooth fit to a tabulated EOS and its causal
//! extension to high density.

pub mod extension;
pub mod fit;

pub use extension::{CausalBranch, NeutronStarEos};
pub use fit::{NeutronStarFit, NsFitForm};
