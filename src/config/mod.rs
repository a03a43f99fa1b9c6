//! Simulation configuration
//!
//! Default constants plus the nested parameter structs of [`SimConfig`].

pub mod constants;
pub mod solver_params;

pub use constants::*;
pub use solver_params::*;
