use bevy::prelude::*;

pub mod config;
pub mod core;
pub mod error;
pub mod events;
pub mod geometry;
pub mod materials;
pub mod math;
pub mod solver;

// Public re-exports for clean API
pub use crate::config::{AttractionMode, BoundaryMode, CapPolicy, IntegrationScheme, SimConfig};
pub use crate::core::{Particle, SimSnapshot, Simulation, StepContext, TickReport};
pub use crate::error::{SimError, SimResult, Stage};
pub use crate::events::{ExternalForcing, InputQueue, JetImpulse, PaintEvent, SimInput};
pub use crate::materials::{Material, MaterialId, MaterialParameters, MaterialRegistry};

/// Steps a [`Simulation`] resource on the fixed timestep.
pub struct BlobSimPlugin {
    pub config: SimConfig,
    pub materials: MaterialRegistry,
}

impl Default for BlobSimPlugin {
    fn default() -> Self {
        Self {
            config: SimConfig::default(),
            materials: MaterialRegistry::with_defaults(),
        }
    }
}

impl Plugin for BlobSimPlugin {
    fn build(&self, app: &mut App) {
        match Simulation::new(self.config.clone(), self.materials.clone()) {
            Ok(simulation) => {
                app.insert_resource(Time::<Fixed>::from_seconds(self.config.dt as f64))
                    .insert_resource(self.config.clone())
                    .insert_resource(simulation)
                    .add_systems(FixedUpdate, step_simulation);
            }
            Err(err) => error!("blob simulation disabled: {err}"),
        }
    }
}

fn step_simulation(mut simulation: ResMut<Simulation>) {
    let report = simulation.tick();
    if report.faults.iter().any(SimError::is_discarded_step) {
        debug!(
            "tick {} recovered from {} faults",
            report.tick,
            report.faults.len()
        );
    }
}
