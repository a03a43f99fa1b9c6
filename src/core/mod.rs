pub mod field;
pub mod grid;
pub mod kernel;
pub mod particle;
pub mod particle_set;
pub mod sim_state;

pub use field::{DoubleBuffer, Field2, FieldData, Stencil};
pub use grid::{MacGrid, VelocityField};
pub use kernel::{COHESION_REST_RATIO, SphKernel, calibrated_mass, render_radius};
pub use particle::{Particle, update_particles_health};
pub use particle_set::ParticleSet;
pub use sim_state::{SimSnapshot, Simulation, StepContext, TickReport};
