use std::time::Instant;

use bevy::prelude::*;
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::config::SimConfig;
use crate::core::Particle;
use crate::core::field::Field2;
use crate::core::grid::VelocityField;
use crate::error::{SimError, SimResult};
use crate::events::{ExternalForcing, InputQueue, PaintEvent, SimInput};
use crate::materials::{MaterialId, MaterialRegistry, PaintTarget, Paintable};
use crate::math::{Real, Vector};
use crate::solver::coupling::GridParticleCoupling;
use crate::solver::eulerian::{EulerianGridSolver, GridStepReport};
use crate::solver::implicit::{ImplicitCohesionSolver, ImplicitSolveReport};
use crate::solver::reconstruct::{DensityField, ImplicitFieldReconstructor};
use crate::solver::sph::ParticleSystem;

/// Read-only state handed to every component for one tick.
#[derive(Clone, Copy)]
pub struct StepContext<'a> {
    pub dt: Real,
    pub config: &'a SimConfig,
    pub materials: &'a MaterialRegistry,
    pub forcing: &'a ExternalForcing,
}

/// What happened during one tick. Faults listed here were recovered.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    pub tick: u64,
    pub faults: Vec<SimError>,
    pub spawned: usize,
    pub evicted: usize,
    pub splats: usize,
    pub removed_out_of_bounds: usize,
    pub removed_failed: usize,
    pub grid: GridStepReport,
    pub particle_solve: Option<ImplicitSolveReport>,
    pub particle_count: usize,
    /// Total particle momentum at the end of the tick.
    pub particle_momentum: Vector,
}

/// Owned copy of everything a renderer reads.
#[derive(Debug, Clone, PartialEq)]
pub struct SimSnapshot {
    pub tick: u64,
    pub grid_velocity: VelocityField,
    pub scalar: Field2,
    pub positions: Vec<Vector>,
    pub radii: Vec<Real>,
    pub materials: Vec<MaterialId>,
    pub density: DensityField,
}

/// The whole two-phase simulation.
#[derive(Resource)]
pub struct Simulation {
    config: SimConfig,
    materials: MaterialRegistry,
    grid: EulerianGridSolver,
    particles: ParticleSystem,
    implicit: ImplicitCohesionSolver,
    coupling: GridParticleCoupling,
    reconstructor: ImplicitFieldReconstructor,
    density_field: DensityField,
    inputs: InputQueue,
    forcing: ExternalForcing,
    rng: StdRng,
    tick: u64,
    last_report: TickReport,
    warnings: Vec<SimError>,
}

impl Simulation {
    /// Validates `config` and builds every component. Parameters that run but
    /// degrade the physics are logged and kept in [`Self::config_warnings`].
    pub fn new(config: SimConfig, materials: MaterialRegistry) -> SimResult<Self> {
        config.validate()?;
        let mut warnings = config.warnings();
        warnings.extend(materials.warnings(&config));
        for warning in &warnings {
            warn!("configuration: {warning}");
        }

        let reconstructor =
            ImplicitFieldReconstructor::new(config.field.clone(), config.domain_size);
        let density_field = reconstructor.sample_grid();
        info!(
            "simulation ready: {}x{} grid, {} materials, particle cap {}",
            config.grid.resolution,
            config.grid.resolution,
            materials.len(),
            config.particles.particle_cap
        );
        Ok(Self {
            grid: EulerianGridSolver::new(&config),
            particles: ParticleSystem::new(&config),
            implicit: ImplicitCohesionSolver::new(),
            coupling: GridParticleCoupling::new(),
            reconstructor,
            density_field,
            inputs: InputQueue::default(),
            forcing: ExternalForcing::default(),
            rng: StdRng::seed_from_u64(config.seed),
            tick: 0,
            last_report: TickReport::default(),
            warnings,
            config,
            materials,
        })
    }

    pub fn with_defaults() -> SimResult<Self> {
        Self::new(SimConfig::default(), MaterialRegistry::with_defaults())
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn materials(&self) -> &MaterialRegistry {
        &self.materials
    }

    pub fn config_warnings(&self) -> &[SimError] {
        &self.warnings
    }

    /// Rebuilds the grid at a new resolution. The grid fields restart from
    /// rest; particles are kept. On error nothing changes.
    pub fn set_grid_resolution(&mut self, resolution: usize) -> SimResult<()> {
        let config = self.config.clone().with_grid_resolution(resolution);
        config.validate()?;
        self.grid.resize(resolution, config.domain_size)?;
        info!("grid resized to {resolution}x{resolution}");
        self.config = config;
        Ok(())
    }

    /// Paint applied at the start of the next tick.
    pub fn queue_paint(&mut self, event: PaintEvent) {
        self.inputs.paint(event);
    }

    /// Forcing applied at the start of the next tick.
    pub fn queue_forcing(&mut self, forcing: ExternalForcing) {
        self.inputs.forcing(forcing);
    }

    pub fn pending_inputs(&self) -> usize {
        self.inputs.len()
    }

    /// Sustained rotation rate currently driving the plate.
    pub fn rotation_rate(&self) -> Real {
        self.forcing.rotation_rate
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    pub fn last_report(&self) -> &TickReport {
        &self.last_report
    }

    pub fn grid(&self) -> &EulerianGridSolver {
        &self.grid
    }

    pub fn grid_velocity(&self) -> &VelocityField {
        self.grid.velocity()
    }

    pub fn scalar_field(&self) -> &Field2 {
        self.grid.scalar()
    }

    pub fn particle_system(&self) -> &ParticleSystem {
        &self.particles
    }

    pub fn particle_system_mut(&mut self) -> &mut ParticleSystem {
        &mut self.particles
    }

    pub fn particles(&self) -> &[Particle] {
        self.particles.particles()
    }

    pub fn particle_positions(&self) -> Vec<Vector> {
        self.particles.positions()
    }

    pub fn particle_radii(&self) -> Vec<Real> {
        self.particles.radii(&self.materials)
    }

    pub fn particle_materials(&self) -> Vec<MaterialId> {
        self.particles.particles().iter().map(|p| p.material).collect()
    }

    pub fn implicit_solver(&self) -> &ImplicitCohesionSolver {
        &self.implicit
    }

    pub fn density_field(&self) -> &DensityField {
        &self.density_field
    }

    /// Density field at an arbitrary point, from the last tick's positions.
    pub fn field_at(&self, x: Real, y: Real) -> Real {
        self.reconstructor.field(x, y)
    }

    pub fn snapshot(&self) -> SimSnapshot {
        SimSnapshot {
            tick: self.tick,
            grid_velocity: self.grid.velocity().clone(),
            scalar: self.grid.scalar().clone(),
            positions: self.particle_positions(),
            radii: self.particle_radii(),
            materials: self.particle_materials(),
            density: self.density_field.clone(),
        }
    }

    fn paint(&mut self, event: PaintEvent, report: &mut TickReport) {
        let material = match self.materials.get(event.material) {
            Ok(material) => material,
            Err(fault) => {
                warn!("paint dropped: {fault}");
                report.faults.push(fault);
                return;
            }
        };
        let mut target = PaintTarget {
            config: &self.config,
            particles: &mut self.particles,
            grid: &mut self.grid,
            rng: &mut self.rng,
        };
        let outcome = material.paint(event.material, &event, &mut target);
        report.spawned += outcome.spawned;
        report.evicted += outcome.evicted;
        report.splats += usize::from(outcome.splatted);
        report.faults.extend(outcome.fault);
    }

    /// Advances one fixed step: inputs, grid, particles, deposit, field.
    pub fn tick(&mut self) -> TickReport {
        let started = Instant::now();
        self.tick += 1;
        let mut report = TickReport {
            tick: self.tick,
            ..TickReport::default()
        };

        let mut jets = Vec::new();
        let inputs: Vec<SimInput> = self.inputs.drain().collect();
        for input in inputs {
            match input {
                SimInput::Paint(event) => self.paint(event, &mut report),
                SimInput::Forcing(forcing) => {
                    self.forcing.rotation_rate = forcing.rotation_rate;
                    jets.extend(forcing.jet_impulses);
                }
            }
        }
        let forcing = ExternalForcing {
            rotation_rate: self.forcing.rotation_rate,
            jet_impulses: jets,
        };
        let ctx = StepContext {
            dt: self.config.dt,
            config: &self.config,
            materials: &self.materials,
            forcing: &forcing,
        };

        report.grid = self.grid.step(&ctx);
        report.faults.extend(report.grid.faults.iter().cloned());

        if !self.particles.is_empty() {
            let positions = self.particles.positions();
            let samples = self
                .coupling
                .sample_grid_velocity(&positions, self.grid.velocity());
            let step = self.particles.step(&ctx, &mut self.implicit, &samples);
            report.faults.extend(step.faults);
            report.particle_solve = step.solve;
            report.removed_out_of_bounds = step.removed_out_of_bounds;
            report.removed_failed = step.removed_failed;

            if let Err(fault) = self.coupling.deposit_particle_velocity(
                self.particles.particles(),
                &mut self.grid,
                &self.config.coupling,
            ) {
                warn!("deposit discarded: {fault}");
                report.faults.push(fault);
            }
        }

        self.reconstructor.rebuild(&self.particles.positions());
        self.reconstructor.sample_into(&mut self.density_field);
        report.particle_count = self.particles.len();
        report.particle_momentum = self.particles.momentum();

        debug!(
            "tick {}: {} particles, {} faults, {:.3}ms",
            self.tick,
            report.particle_count,
            report.faults.len(),
            started.elapsed().as_secs_f64() * 1000.0
        );
        self.last_report = report.clone();
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CapPolicy;

    fn small_config() -> SimConfig {
        let mut config = SimConfig::default().with_grid_resolution(16);
        config.field.resolution = 32;
        config
    }

    #[test]
    fn inputs_wait_for_the_next_tick() {
        let mut sim = Simulation::new(small_config(), MaterialRegistry::with_defaults())
            .expect("valid config");
        let Some(blob) = sim.materials().find("blob") else {
            panic!("blob preset missing");
        };
        sim.queue_paint(PaintEvent {
            position: Vector::splat(0.5),
            material: blob,
            radius: 0.01,
        });
        sim.queue_forcing(ExternalForcing::rotation(1.0));
        assert_eq!(sim.pending_inputs(), 2);
        assert!(sim.particles().is_empty());

        let report = sim.tick();
        assert_eq!(sim.pending_inputs(), 0);
        assert_eq!(report.spawned, 50);
        assert_eq!(sim.rotation_rate(), 1.0);
        assert_eq!(sim.last_report(), &report);
    }

    #[test]
    fn unknown_material_is_reported_and_dropped() {
        let mut sim = Simulation::new(small_config(), MaterialRegistry::with_defaults())
            .expect("valid config");
        sim.queue_paint(PaintEvent {
            position: Vector::splat(0.5),
            material: MaterialId(99),
            radius: 0.01,
        });
        let report = sim.tick();
        assert_eq!(report.faults, vec![SimError::UnknownMaterial(MaterialId(99))]);
        assert!(sim.particles().is_empty());
    }

    #[test]
    fn invalid_configuration_is_a_hard_error() {
        let mut config = small_config();
        config.dt = 0.0;
        assert!(matches!(
            Simulation::new(config, MaterialRegistry::with_defaults()),
            Err(SimError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn grid_resolution_can_change_between_ticks() {
        let mut sim = Simulation::new(small_config(), MaterialRegistry::with_defaults())
            .expect("valid config");
        sim.queue_forcing(ExternalForcing::rotation(2.0));
        sim.tick();

        assert!(matches!(
            sim.set_grid_resolution(0),
            Err(SimError::InvalidConfiguration(_))
        ));
        assert_eq!(sim.config().grid.resolution, 16);
        assert_eq!(sim.grid_velocity().resolution(), 16);

        sim.set_grid_resolution(24).expect("valid resolution");
        assert_eq!(sim.config().grid.resolution, 24);
        assert_eq!(sim.grid_velocity().resolution(), 24);
        assert_eq!(sim.grid_velocity().max_abs(), 0.0);

        let report = sim.tick();
        assert!(report.faults.iter().all(|f| !f.is_discarded_step()));
        assert!(sim.grid_velocity().max_abs() > 0.0);
    }

    #[test]
    fn report_carries_particle_momentum() {
        let mut sim = Simulation::new(small_config(), MaterialRegistry::with_defaults())
            .expect("valid config");
        let Some(blob) = sim.materials().find("blob") else {
            panic!("blob preset missing");
        };
        sim.queue_paint(PaintEvent {
            position: Vector::splat(0.5),
            material: blob,
            radius: 0.01,
        });
        let report = sim.tick();
        let expected = sim
            .particles()
            .iter()
            .fold(Vector::ZERO, |acc, p| acc + p.velocity * p.mass);
        assert!((report.particle_momentum - expected).length() <= 1e-6);
    }

    #[test]
    fn snapshot_matches_accessors() {
        let config = small_config().with_particle_cap(500, CapPolicy::EvictOldest);
        let mut sim =
            Simulation::new(config, MaterialRegistry::with_defaults()).expect("valid config");
        let Some(honey) = sim.materials().find("honey") else {
            panic!("honey preset missing");
        };
        sim.queue_paint(PaintEvent {
            position: Vector::new(0.4, 0.5),
            material: honey,
            radius: 0.01,
        });
        sim.tick();
        let snapshot = sim.snapshot();
        assert_eq!(snapshot.tick, 1);
        assert_eq!(snapshot.positions, sim.particle_positions());
        assert_eq!(snapshot.radii.len(), snapshot.positions.len());
        assert!(snapshot.materials.iter().all(|&m| m == honey));
        assert!(sim.field_at(0.4, 0.5) > 0.0);
        assert_eq!(&snapshot.density, sim.density_field());
    }
}
