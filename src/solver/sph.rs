//! SPH particle system for cohesive blob materials.
//!
//! Per step: neighbour rebuild, density and pressure, stiff pair forces
//! (pressure and cohesion), explicit body forces (attraction, long-range
//! cohesion, grid drag), then a velocity update through the implicit solver
//! or the explicit reference scheme, position integration and lifecycle.

use bevy::log::{debug, info, warn};
use rand::Rng;
use rand::rngs::StdRng;
use rayon::prelude::*;

use crate::config::{AttractionMode, BoundaryMode, CapPolicy, IntegrationScheme, SimConfig};
use crate::core::kernel::{COHESION_REST_RATIO, SphKernel, calibrated_mass, render_radius};
use crate::core::particle::update_particles_health;
use crate::core::{Particle, ParticleSet, StepContext};
use crate::error::{SimError, Stage};
use crate::geometry::{Neighbor, SpatialHashGrid};
use crate::materials::{MaterialId, MaterialParameters, MaterialRegistry, ParticleMaterial};
use crate::math::{Real, Vector, harmonic_mean, zero_vector};
use crate::solver::implicit::{ImplicitCohesionSolver, ImplicitSolveReport, PairSystem};

/// Coefficients of a particle's material, resolved once per step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParticleCoefficients {
    pub material: MaterialId,
    pub params: MaterialParameters,
    pub eos_power: i32,
    pub long_range_cohesion: Real,
}

impl ParticleCoefficients {
    pub fn resolve(materials: &MaterialRegistry, id: MaterialId) -> Self {
        let material = materials
            .particle(id)
            .copied()
            .unwrap_or_else(ParticleMaterial::blob);
        Self {
            material: id,
            params: material.params,
            eos_power: material.eos_power,
            long_range_cohesion: material.long_range_cohesion,
        }
    }
}

/// Force on `i` from `j` plus the linearized stiffness of the pair.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PairTerms {
    pub force: Vector,
    /// Stiffness along the pair axis, clamped non-negative.
    pub longitudinal: Real,
    /// Stiffness across the pair axis, clamped non-negative.
    pub transverse: Real,
    /// Viscous coupling coefficient.
    pub damping: Real,
}

/// Pressure, cohesion and viscosity terms of the pair `(a, b)` with
/// `offset = x_a - x_b`.
///
/// Every product is formed from operands that are symmetric in `(a, b)`, so
/// swapping the pair flips `force` and leaves the stiffnesses bit-identical.
pub fn pair_terms(
    kernel: &SphKernel,
    a: &Particle,
    ca: &ParticleCoefficients,
    b: &Particle,
    cb: &ParticleCoefficients,
    offset: Vector,
    distance: Real,
) -> PairTerms {
    let h = kernel.radius();
    if distance >= h || distance <= 1e-6 * h {
        return PairTerms::default();
    }
    let normal = offset / distance;

    let pressure = (a.mass * b.mass)
        * (a.pressure / (a.density * a.density) + b.pressure / (b.density * b.density));
    let mut force = -pressure * kernel.spiky_gradient(distance) * normal;
    let mut longitudinal = pressure.max(0.0) * kernel.spiky_gradient_derivative(distance);
    let mut transverse = 0.0;

    if ca.material == cb.material {
        let k = ca.params.cohesion_stiffness;
        let reduced_mass = harmonic_mean(a.mass, b.mass);
        let shape = kernel.cohesion(distance);
        let magnitude = k * reduced_mass * h * shape;
        force -= magnitude * normal;

        let q = distance / h;
        let tangent = k * reduced_mass * kernel.cohesion_slope(distance);
        let secant = if (q - COHESION_REST_RATIO).abs() > 1e-4 {
            magnitude / (distance - COHESION_REST_RATIO * h)
        } else {
            tangent
        };
        longitudinal += tangent.max(secant).max(0.0);
        transverse = (magnitude / distance).max(0.0);
    }

    let mu = 0.5 * (ca.params.viscosity + cb.params.viscosity);
    let damping =
        mu * (a.mass * b.mass) * kernel.viscosity_laplacian(distance) * 2.0 / (a.density + b.density);

    PairTerms {
        force,
        longitudinal,
        transverse,
        damping: damping.max(0.0),
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpawnRequest {
    pub center: Vector,
    /// Radius of the jitter disk.
    pub radius: Real,
    pub count: usize,
    pub material: MaterialId,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpawnOutcome {
    pub spawned: usize,
    pub evicted: usize,
    pub fault: Option<SimError>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParticleStepReport {
    pub faults: Vec<SimError>,
    pub solve: Option<ImplicitSolveReport>,
    pub repaired: usize,
    pub removed_out_of_bounds: usize,
    pub removed_failed: usize,
}

pub struct ParticleSystem {
    particles: ParticleSet,
    hash: SpatialHashGrid,
    neighbors: Vec<Vec<Neighbor>>,
    coefficients: Vec<ParticleCoefficients>,
    stiff_forces: Vec<Vector>,
    explicit_forces: Vec<Vector>,
    velocities: Vec<Vector>,
    kernel: SphKernel,
}

impl ParticleSystem {
    pub fn new(config: &SimConfig) -> Self {
        let h = config.particles.smoothing_radius;
        Self {
            particles: ParticleSet::new(),
            hash: SpatialHashGrid::new(h),
            neighbors: Vec::new(),
            coefficients: Vec::new(),
            stiff_forces: Vec::new(),
            explicit_forces: Vec::new(),
            velocities: Vec::new(),
            kernel: SphKernel::new(h),
        }
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    pub fn particles(&self) -> &[Particle] {
        self.particles.particles()
    }

    pub fn positions(&self) -> Vec<Vector> {
        self.particles.positions()
    }

    pub fn kernel(&self) -> &SphKernel {
        &self.kernel
    }

    pub fn neighbors(&self) -> &[Vec<Neighbor>] {
        &self.neighbors
    }

    pub fn stiff_forces(&self) -> &[Vector] {
        &self.stiff_forces
    }

    pub fn explicit_forces(&self) -> &[Vector] {
        &self.explicit_forces
    }

    /// Draw radius of each particle.
    pub fn radii(&self, materials: &MaterialRegistry) -> Vec<Real> {
        self.particles
            .iter()
            .map(|p| {
                let rest = ParticleCoefficients::resolve(materials, p.material)
                    .params
                    .rest_density;
                render_radius(p.mass, rest)
            })
            .collect()
    }

    pub fn insert(&mut self, particle: Particle) -> usize {
        self.particles.insert(particle)
    }

    /// Adds a jittered batch, applying the cap policy first.
    pub fn spawn_batch(
        &mut self,
        request: SpawnRequest,
        material: &ParticleMaterial,
        config: &SimConfig,
        rng: &mut StdRng,
    ) -> SpawnOutcome {
        let requested = request.count;
        if requested == 0 {
            return SpawnOutcome::default();
        }
        let cap = config.particles.particle_cap;
        let mut count = requested;
        let mut outcome = SpawnOutcome::default();

        if self.len() + requested > cap {
            match config.particles.cap_policy {
                CapPolicy::RejectSpawn => {
                    let fault = SimError::ResourceExhaustion { cap, requested };
                    warn!("spawn rejected: {fault}");
                    outcome.fault = Some(fault);
                    return outcome;
                }
                CapPolicy::EvictOldest => {
                    count = requested.min(cap);
                    let excess = (self.len() + count).saturating_sub(cap);
                    outcome.evicted = self.particles.evict_oldest(excess);
                    info!(
                        "particle cap {cap} reached, evicted {} oldest",
                        outcome.evicted
                    );
                    if count < requested {
                        outcome.fault = Some(SimError::ResourceExhaustion { cap, requested });
                    }
                }
            }
        }

        let h = config.particles.smoothing_radius;
        let rest_density = material.params.rest_density;
        let mass = calibrated_mass(rest_density, h);
        let batch = (0..count)
            .map(|_| {
                let r = request.radius * rng.random::<Real>().sqrt();
                let theta = std::f32::consts::TAU * rng.random::<Real>();
                let position = request.center + r * Vector::new(theta.cos(), theta.sin());
                Particle::new(position, request.material).with_rest_state(mass, rest_density)
            })
            .collect();
        self.particles.insert_batch(batch);
        outcome.spawned = count;
        debug!(
            "spawned {count} {} particles at {:?}",
            material.name, request.center
        );
        outcome
    }

    fn resolve_coefficients(&mut self, materials: &MaterialRegistry) {
        self.coefficients.clear();
        self.coefficients.extend(
            self.particles
                .iter()
                .map(|p| ParticleCoefficients::resolve(materials, p.material)),
        );
    }

    /// Rebuilds the hash and per-particle neighbour lists.
    pub fn rebuild_neighbors(&mut self) {
        let h = self.kernel.radius();
        let long_range = self.coefficients.iter().any(|c| c.long_range_cohesion > 0.0);
        let radius = if long_range { 2.0 * h } else { h };
        let positions = self.particles.positions();
        self.hash.rebuild(&positions, h);
        self.neighbors = self.hash.neighbor_lists(radius);
    }

    /// Poly6 density; particles without neighbours sit at rest density.
    pub fn compute_density(&mut self) {
        let h = self.kernel.radius();
        let kernel = self.kernel;
        let particles = self.particles.particles();
        let densities: Vec<Real> = particles
            .par_iter()
            .zip(self.neighbors.par_iter())
            .zip(self.coefficients.par_iter())
            .map(|((particle, neighbors), coefficients)| {
                let mut density = particle.mass * kernel.poly6(0.0);
                let mut found = false;
                for neighbor in neighbors.iter().filter(|n| n.distance < h) {
                    found = true;
                    density += particles[neighbor.index].mass
                        * kernel.poly6(neighbor.distance * neighbor.distance);
                }
                if found {
                    density
                } else {
                    coefficients.params.rest_density
                }
            })
            .collect();
        for (particle, density) in self.particles.iter_mut().zip(densities) {
            particle.density = density;
        }
    }

    /// Tait equation of state, clamped so that it never pulls.
    pub fn compute_pressure(&mut self) {
        for (particle, coefficients) in self.particles.iter_mut().zip(&self.coefficients) {
            let params = &coefficients.params;
            let ratio = particle.density / params.rest_density;
            particle.pressure =
                (params.pressure_stiffness * (ratio.powi(coefficients.eos_power) - 1.0)).max(0.0);
        }
    }

    /// Pressure and cohesion at the current positions.
    pub fn compute_stiff_forces(&mut self) {
        let kernel = self.kernel;
        let particles = self.particles.particles();
        let coefficients = &self.coefficients;
        self.stiff_forces = particles
            .par_iter()
            .enumerate()
            .map(|(i, particle)| {
                self.neighbors[i]
                    .iter()
                    .map(|n| {
                        pair_terms(
                            &kernel,
                            particle,
                            &coefficients[i],
                            &particles[n.index],
                            &coefficients[n.index],
                            n.offset,
                            n.distance,
                        )
                        .force
                    })
                    .sum()
            })
            .collect();
    }

    /// Attraction, long-range cohesion and drag toward the sampled grid velocity.
    pub fn compute_explicit_forces(&mut self, config: &SimConfig, grid_velocities: &[Vector]) {
        let h = self.kernel.radius();
        let center = config.plate_center();
        let attraction = config.particles.attraction;
        let particles = self.particles.particles();
        let coefficients = &self.coefficients;
        self.explicit_forces = particles
            .par_iter()
            .enumerate()
            .map(|(i, particle)| {
                let params = &coefficients[i].params;
                let direction = match attraction {
                    AttractionMode::Center => (center - particle.position).normalize_or_zero(),
                    AttractionMode::Direction(direction) => direction.normalize_or_zero(),
                };
                let mut force = direction * params.center_attraction_magnitude * particle.mass;

                let grid_velocity = grid_velocities.get(i).copied().unwrap_or(particle.velocity);
                force += params.drag_coefficient * particle.mass * (grid_velocity - particle.velocity);

                let strength = coefficients[i].long_range_cohesion * params.cohesion_stiffness * h;
                if strength > 0.0 {
                    for n in &self.neighbors[i] {
                        if coefficients[n.index].material != coefficients[i].material
                            || n.distance <= 1e-6 * h
                        {
                            continue;
                        }
                        let q = n.distance / (2.0 * h);
                        if q < 1.0 {
                            let shape = 4.0 * q * (1.0 - q);
                            force -= strength * shape * particle.mass * (n.offset / n.distance);
                        }
                    }
                }
                force
            })
            .collect();
    }

    /// Viscous force `sum_j e_ij (v_j - v_i)`, only used by the explicit scheme.
    fn viscous_forces(&self) -> Vec<Vector> {
        let kernel = self.kernel;
        let particles = self.particles.particles();
        let coefficients = &self.coefficients;
        particles
            .par_iter()
            .enumerate()
            .map(|(i, particle)| {
                self.neighbors[i]
                    .iter()
                    .map(|n| {
                        let other = &particles[n.index];
                        let terms = pair_terms(
                            &kernel,
                            particle,
                            &coefficients[i],
                            other,
                            &coefficients[n.index],
                            n.offset,
                            n.distance,
                        );
                        terms.damping * (other.velocity - particle.velocity)
                    })
                    .sum()
            })
            .collect()
    }

    pub fn step(
        &mut self,
        ctx: &StepContext<'_>,
        solver: &mut ImplicitCohesionSolver,
        grid_velocities: &[Vector],
    ) -> ParticleStepReport {
        let mut report = ParticleStepReport::default();
        if self.particles.is_empty() {
            return report;
        }
        let dt = ctx.dt;

        self.resolve_coefficients(ctx.materials);
        self.rebuild_neighbors();
        self.compute_density();
        self.compute_pressure();
        self.compute_stiff_forces();
        self.compute_explicit_forces(ctx.config, grid_velocities);

        let forces: Vec<Vector> = self
            .stiff_forces
            .iter()
            .zip(&self.explicit_forces)
            .map(|(a, b)| *a + *b)
            .collect();

        match ctx.config.particles.integration {
            IntegrationScheme::BackwardEuler => {
                self.velocities.clear();
                self.velocities
                    .extend(self.particles.iter().map(|p| p.velocity));
                let system = PairSystem {
                    kernel: &self.kernel,
                    particles: self.particles.particles(),
                    coefficients: &self.coefficients,
                    neighbors: &self.neighbors,
                    forces: &forces,
                };
                match solver.solve(ctx, &system, &mut self.velocities) {
                    Ok(solve) => {
                        if let Some(fault) = solve.outcome.as_fault() {
                            debug!("implicit solve degraded: {fault}");
                            report.faults.push(fault);
                        }
                        report.solve = Some(solve);
                        for (particle, velocity) in
                            self.particles.iter_mut().zip(&self.velocities)
                        {
                            particle.velocity = *velocity;
                        }
                    }
                    Err(fault) => {
                        warn!("implicit solve discarded: {fault}");
                        report.faults.push(fault);
                    }
                }
                for particle in self.particles.iter_mut() {
                    particle.position += dt * particle.velocity;
                }
            }
            IntegrationScheme::ExplicitEuler => {
                let viscous = self.viscous_forces();
                for ((particle, force), viscous) in
                    self.particles.iter_mut().zip(&forces).zip(viscous)
                {
                    particle.position += dt * particle.velocity;
                    particle.velocity += dt * (*force + viscous) / particle.mass;
                }
            }
        }

        for particle in self.particles.iter_mut() {
            particle.age += dt;
        }
        report.repaired = update_particles_health(self.particles.particles_mut());
        if report.repaired > 0 {
            let fault = SimError::NumericalDivergence {
                stage: Stage::Integration,
            };
            warn!("{} particles reset: {fault}", report.repaired);
            report.faults.push(fault);
        }

        self.apply_boundary(ctx.config, dt);
        let (out_of_bounds, failed) = self.remove_lost(ctx.config);
        report.removed_out_of_bounds = out_of_bounds;
        report.removed_failed = failed;
        report
    }

    /// Plate-edge response, same modes as the grid walls.
    pub fn apply_boundary(&mut self, config: &SimConfig, dt: Real) {
        let center = config.plate_center();
        let radius = config.plate_radius;
        let params = config.boundary;
        if params.band <= 0.0 {
            return;
        }
        for particle in self.particles.iter_mut() {
            let offset = particle.position - center;
            let r = offset.length();
            if r < radius - params.band || r <= 0.0 {
                continue;
            }
            let outward = offset / r;
            let depth = ((r - (radius - params.band)) / params.band).clamp(0.0, 1.0);
            match params.mode {
                BoundaryMode::Reflect => {
                    let normal_speed = particle.velocity.dot(outward);
                    if r >= radius && normal_speed > 0.0 {
                        particle.velocity -= (1.0 + params.restitution) * normal_speed * outward;
                    }
                }
                BoundaryMode::ViscousDrag => {
                    particle.velocity *= 1.0 - (params.strength * dt * depth).min(1.0);
                }
                BoundaryMode::SoftRepulsion => {
                    particle.velocity -= params.strength * dt * depth * outward;
                }
            }
        }
    }

    /// Deletes particles past the removal radius and failed particles.
    pub fn remove_lost(&mut self, config: &SimConfig) -> (usize, usize) {
        let center = config.plate_center();
        let removal_sq = config.removal_radius() * config.removal_radius();
        let failed = self.particles.remove_where(|p| p.failed);
        let out_of_bounds = self
            .particles
            .remove_where(|p| (p.position - center).length_squared() > removal_sq);
        if out_of_bounds > 0 {
            debug!("removed {out_of_bounds} particles past the plate edge");
        }
        (out_of_bounds, failed)
    }

    /// Total linear momentum, reported with every tick.
    pub fn momentum(&self) -> Vector {
        self.particles
            .iter()
            .fold(zero_vector(), |acc, p| acc + p.momentum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ExternalForcing;
    use crate::materials::Material;
    use rand::SeedableRng;

    const H: Real = 0.008;

    fn blob_coefficients() -> ParticleCoefficients {
        ParticleCoefficients {
            material: MaterialId(0),
            params: MaterialParameters::defaults(),
            eos_power: 4,
            long_range_cohesion: 0.0,
        }
    }

    fn particle_at(position: Vector) -> Particle {
        Particle::new(position, MaterialId(0)).with_rest_state(calibrated_mass(1000.0, H), 1000.0)
    }

    fn still_registry() -> MaterialRegistry {
        let mut registry = MaterialRegistry::new();
        let params = MaterialParameters::defaults()
            .with_cohesion(0.0)
            .with_attraction(0.0)
            .with_drag(0.0);
        let mut material = ParticleMaterial::new("still", params);
        material.forms_blobs = false;
        material.long_range_cohesion = 0.0;
        registry.register(Material::Particle(material));
        registry
    }

    #[test]
    fn pair_terms_are_antisymmetric_in_force() {
        let kernel = SphKernel::new(H);
        let mut a = particle_at(Vector::new(0.5, 0.5));
        let mut b = particle_at(Vector::new(0.5 + 0.4 * H, 0.5 + 0.1 * H));
        a.density = 1100.0;
        a.pressure = 3.0;
        b.density = 1050.0;
        b.pressure = 1.0;
        let c = blob_coefficients();
        let offset = a.position - b.position;
        let d = offset.length();
        let ab = pair_terms(&kernel, &a, &c, &b, &c, offset, d);
        let ba = pair_terms(&kernel, &b, &c, &a, &c, -offset, d);
        assert_eq!(ab.force, -ba.force);
        assert_eq!(ab.longitudinal, ba.longitudinal);
        assert_eq!(ab.transverse, ba.transverse);
        assert_eq!(ab.damping, ba.damping);
        assert!(ab.longitudinal > 0.0 && ab.damping > 0.0);
    }

    #[test]
    fn ring_cohesion_cancels_at_center() {
        let kernel = SphKernel::new(H);
        let c = blob_coefficients();
        let center = particle_at(Vector::new(0.5, 0.5));
        let ring: Vec<Particle> = (0..8)
            .map(|k| {
                let theta = k as Real * std::f32::consts::TAU / 8.0;
                particle_at(center.position + 0.6 * H * Vector::new(theta.cos(), theta.sin()))
            })
            .collect();

        let net: Vector = ring
            .iter()
            .map(|other| {
                let offset = center.position - other.position;
                pair_terms(&kernel, &center, &c, other, &c, offset, offset.length()).force
            })
            .sum();
        let single = {
            let offset = center.position - ring[0].position;
            pair_terms(&kernel, &center, &c, &ring[0], &c, offset, offset.length()).force
        };
        assert!(single.length() > 0.0);
        assert!(net.length() < 1e-4 * single.length(), "net {net:?}");
    }

    #[test]
    fn isolated_particle_has_rest_density_and_no_pressure() {
        let config = SimConfig::default();
        let registry = MaterialRegistry::with_defaults();
        let mut system = ParticleSystem::new(&config);
        system.insert(particle_at(Vector::new(0.3, 0.3)));
        system.insert(particle_at(Vector::new(0.7, 0.7)));
        system.resolve_coefficients(&registry);
        system.rebuild_neighbors();
        system.compute_density();
        system.compute_pressure();
        for particle in system.particles() {
            assert_eq!(particle.density, 1000.0);
            assert_eq!(particle.pressure, 0.0);
        }
    }

    #[test]
    fn lattice_at_rest_stays_at_rest() {
        let config = SimConfig::default();
        let registry = still_registry();
        let forcing = ExternalForcing::default();
        let ctx = StepContext {
            dt: config.dt,
            config: &config,
            materials: &registry,
            forcing: &forcing,
        };
        let mut system = ParticleSystem::new(&config);
        let drift = Vector::new(0.01, -0.02);
        for iy in -6..=6 {
            for ix in -6..=6 {
                let position = Vector::new(0.5, 0.5) + 0.5 * H * Vector::new(ix as Real, iy as Real);
                system.insert(particle_at(position).with_velocity(drift));
            }
        }
        system.resolve_coefficients(&registry);
        system.rebuild_neighbors();
        system.compute_density();
        let center_density = system
            .particles()
            .iter()
            .find(|p| (p.position - Vector::new(0.5, 0.5)).length() < 1e-6)
            .map(|p| p.density)
            .unwrap_or_default();
        assert!((center_density - 1000.0).abs() < 1.0, "{center_density}");

        let mut solver = ImplicitCohesionSolver::new();
        let grid = vec![drift; system.len()];
        let report = system.step(&ctx, &mut solver, &grid);
        assert!(report.faults.is_empty(), "{:?}", report.faults);
        for particle in system.particles() {
            assert!((particle.velocity - drift).length() < 1e-4);
        }
    }

    #[test]
    fn attraction_direction_is_configurable() {
        let registry = MaterialRegistry::with_defaults();
        for (mode, expected) in [
            (AttractionMode::Center, Vector::new(1.0, 0.0)),
            (AttractionMode::Direction(Vector::new(0.0, -3.0)), Vector::new(0.0, -1.0)),
        ] {
            let config = SimConfig::default().with_attraction(mode);
            let mut system = ParticleSystem::new(&config);
            system.insert(particle_at(Vector::new(0.2, 0.5)));
            system.resolve_coefficients(&registry);
            system.rebuild_neighbors();
            system.compute_explicit_forces(&config, &[Vector::ZERO]);
            let force = system.explicit_forces()[0];
            assert!(force.normalize().dot(expected) > 0.999, "{mode:?}: {force:?}");
        }
    }

    #[test]
    fn cap_policies() {
        let registry = MaterialRegistry::with_defaults();
        let Some(blob) = registry.find("blob") else {
            panic!("blob material missing");
        };
        let material = *registry.particle(blob).expect("particle material");
        let mut rng = StdRng::seed_from_u64(1);
        let request = SpawnRequest {
            center: Vector::splat(0.5),
            radius: 0.01,
            count: 50,
            material: blob,
        };

        let config = SimConfig::default().with_particle_cap(120, CapPolicy::EvictOldest);
        let mut system = ParticleSystem::new(&config);
        for _ in 0..3 {
            system.spawn_batch(request, &material, &config, &mut rng);
        }
        assert_eq!(system.len(), 120);
        let outcome = system.spawn_batch(request, &material, &config, &mut rng);
        assert_eq!((outcome.spawned, outcome.evicted), (50, 50));
        assert_eq!(system.len(), 120);

        let config = SimConfig::default().with_particle_cap(120, CapPolicy::RejectSpawn);
        let mut system = ParticleSystem::new(&config);
        system.spawn_batch(request, &material, &config, &mut rng);
        system.spawn_batch(request, &material, &config, &mut rng);
        let outcome = system.spawn_batch(request, &material, &config, &mut rng);
        assert_eq!(outcome.spawned, 0);
        assert_eq!(
            outcome.fault,
            Some(SimError::ResourceExhaustion {
                cap: 120,
                requested: 50
            })
        );
        assert_eq!(system.len(), 100);
    }

    #[test]
    fn spawn_stays_inside_jitter_disk() {
        let registry = MaterialRegistry::with_defaults();
        let config = SimConfig::default();
        let material = ParticleMaterial::blob();
        let mut system = ParticleSystem::new(&config);
        let mut rng = StdRng::seed_from_u64(9);
        let request = SpawnRequest {
            center: Vector::new(0.4, 0.6),
            radius: 0.01,
            count: 200,
            material: MaterialId(0),
        };
        system.spawn_batch(request, &material, &config, &mut rng);
        assert!(
            system
                .particles()
                .iter()
                .all(|p| (p.position - request.center).length() <= 0.01 + 1e-6)
        );
        assert!(system.radii(&registry).iter().all(|&r| r > 0.0 && r < H));
    }

    #[test]
    fn particles_past_the_plate_are_removed() {
        let config = SimConfig::default();
        let mut system = ParticleSystem::new(&config);
        system.insert(particle_at(Vector::new(0.5, 0.5)));
        system.insert(particle_at(Vector::new(0.5 + config.removal_radius() + 0.01, 0.5)));
        let mut lost = particle_at(Vector::new(0.5, 0.5));
        lost.failed = true;
        system.insert(lost);
        assert_eq!(system.remove_lost(&config), (1, 1));
        assert_eq!(system.len(), 1);
    }

    #[test]
    fn plate_band_modes() {
        let inside = Vector::new(0.6, 0.5);
        let rim = Vector::new(0.94, 0.5);

        let config = SimConfig::default().with_boundary_mode(BoundaryMode::ViscousDrag);
        let mut system = ParticleSystem::new(&config);
        system.insert(particle_at(inside).with_velocity(Vector::new(1.0, 0.0)));
        system.insert(particle_at(rim).with_velocity(Vector::new(1.0, 0.0)));
        system.apply_boundary(&config, config.dt);
        let speeds: Vec<Real> = system.particles().iter().map(|p| p.velocity.x).collect();
        assert_eq!(speeds[0], 1.0);
        assert!(speeds[1] > 0.0 && speeds[1] < 1.0, "{}", speeds[1]);

        let config = SimConfig::default().with_boundary_mode(BoundaryMode::SoftRepulsion);
        let mut system = ParticleSystem::new(&config);
        system.insert(particle_at(inside));
        system.insert(particle_at(rim));
        system.apply_boundary(&config, config.dt);
        assert_eq!(system.particles()[0].velocity, Vector::ZERO);
        let pushed = system.particles()[1].velocity;
        assert!(pushed.x < 0.0 && pushed.y.abs() < 1e-6, "{pushed:?}");
    }
}
