//! Material representations and paint routing

use rand::rngs::StdRng;

use crate::config::SimConfig;
use crate::error::SimError;
use crate::events::PaintEvent;
use crate::materials::families::{GridMaterial, ParticleMaterial};
use crate::solver::eulerian::EulerianGridSolver;
use crate::solver::sph::{ParticleSystem, SpawnRequest};

/// Handle of a registered material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct MaterialId(pub u32);

impl std::fmt::Display for MaterialId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "material#{}", self.0)
    }
}

/// The two ways a material can be simulated.
#[derive(Debug, Clone, PartialEq)]
pub enum Material {
    Grid(GridMaterial),
    Particle(ParticleMaterial),
}

impl Material {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Grid(grid) => grid.name,
            Self::Particle(particle) => particle.name,
        }
    }

    pub fn is_particle(&self) -> bool {
        matches!(self, Self::Particle(_))
    }

    pub fn as_particle(&self) -> Option<&ParticleMaterial> {
        match self {
            Self::Particle(particle) => Some(particle),
            Self::Grid(_) => None,
        }
    }
}

/// Mutable simulation state a paint event may touch.
pub struct PaintTarget<'a> {
    pub config: &'a SimConfig,
    pub particles: &'a mut ParticleSystem,
    pub grid: &'a mut EulerianGridSolver,
    pub rng: &'a mut StdRng,
}

/// What a single paint event did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PaintOutcome {
    pub spawned: usize,
    pub evicted: usize,
    pub splatted: bool,
    pub fault: Option<SimError>,
}

pub trait Paintable {
    fn paint(&self, id: MaterialId, event: &PaintEvent, target: &mut PaintTarget<'_>)
    -> PaintOutcome;
}

impl Paintable for ParticleMaterial {
    fn paint(
        &self,
        id: MaterialId,
        event: &PaintEvent,
        target: &mut PaintTarget<'_>,
    ) -> PaintOutcome {
        let radius = event.radius.min(self.spawn_radius).max(0.0);
        let request = SpawnRequest {
            center: event.position,
            radius,
            count: self.spawn_count,
            material: id,
        };
        let outcome = target
            .particles
            .spawn_batch(request, self, target.config, target.rng);
        PaintOutcome {
            spawned: outcome.spawned,
            evicted: outcome.evicted,
            splatted: false,
            fault: outcome.fault,
        }
    }
}

impl Paintable for GridMaterial {
    fn paint(
        &self,
        _id: MaterialId,
        event: &PaintEvent,
        target: &mut PaintTarget<'_>,
    ) -> PaintOutcome {
        let fault = target
            .grid
            .splat_scalar(event.position, event.radius, self.deposit, self.max_thickness)
            .err();
        PaintOutcome {
            splatted: fault.is_none(),
            fault,
            ..PaintOutcome::default()
        }
    }
}

impl Paintable for Material {
    fn paint(
        &self,
        id: MaterialId,
        event: &PaintEvent,
        target: &mut PaintTarget<'_>,
    ) -> PaintOutcome {
        match self {
            Self::Grid(grid) => grid.paint(id, event, target),
            Self::Particle(particle) => particle.paint(id, event, target),
        }
    }
}
