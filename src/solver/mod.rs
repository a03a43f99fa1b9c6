pub mod coupling;
pub mod eulerian;
pub mod implicit;
pub mod pcg;
pub mod reconstruct;
pub mod sparse;
pub mod sph;

pub use coupling::{FaceDeposit, GridParticleCoupling};
pub use eulerian::{EulerianGridSolver, GridStepReport, PoissonOperator, ProjectionReport};
pub use implicit::{ImplicitCohesionSolver, ImplicitSolveReport, PairSystem};
pub use pcg::{PcgOutcome, PcgSettings, PcgSolver};
pub use reconstruct::{DensityField, ImplicitFieldReconstructor, count_holes, count_regions};
pub use sparse::{BlockRow, BlockSparseMatrix, LinearOperator};
pub use sph::{ParticleStepReport, ParticleSystem, SpawnOutcome, SpawnRequest};

pub mod prelude {
    pub use super::coupling::GridParticleCoupling;
    pub use super::eulerian::EulerianGridSolver;
    pub use super::implicit::ImplicitCohesionSolver;
    pub use super::reconstruct::ImplicitFieldReconstructor;
    pub use super::sph::ParticleSystem;
}
