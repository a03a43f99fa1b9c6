//! Error taxonomy shared by every stage of the tick.
//!
//! Numerical faults are recovered locally and reported through
//! [`TickReport`](crate::core::TickReport); only structurally impossible
//! configurations are returned as hard errors.

use thiserror::Error;

use crate::materials::MaterialId;
use crate::math::Real;

/// Pipeline stage a fault was detected in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    GridForces,
    Vorticity,
    Advection,
    Diffusion,
    Projection,
    ScalarAdvection,
    Boundary,
    Paint,
    Deposit,
    ParticleForces,
    ImplicitSolve,
    Integration,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::GridForces => "grid forces",
            Stage::Vorticity => "vorticity confinement",
            Stage::Advection => "velocity advection",
            Stage::Diffusion => "viscosity diffusion",
            Stage::Projection => "pressure projection",
            Stage::ScalarAdvection => "scalar advection",
            Stage::Boundary => "boundary response",
            Stage::Paint => "paint splat",
            Stage::Deposit => "particle deposit",
            Stage::ParticleForces => "particle forces",
            Stage::ImplicitSolve => "implicit solve",
            Stage::Integration => "particle integration",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimError {
    #[error("non-finite values produced during {stage}; step discarded")]
    NumericalDivergence { stage: Stage },

    #[error("solver hit the iteration cap ({iterations}) at relative residual {residual:.3e}")]
    SolverNonConvergence { iterations: usize, residual: Real },

    #[error("particle cap of {cap} reached ({requested} requested)")]
    ResourceExhaustion { cap: usize, requested: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("unknown material {0:?}")]
    UnknownMaterial(MaterialId),
}

impl SimError {
    /// Faults that mean a step was thrown away rather than merely degraded.
    pub fn is_discarded_step(&self) -> bool {
        matches!(self, SimError::NumericalDivergence { .. })
    }
}

pub type SimResult<T> = Result<T, SimError>;
