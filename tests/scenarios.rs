use bevy::math::Vec2;
use rand::SeedableRng;
use rand::rngs::StdRng;

use blobsim2d::config::{CapPolicy, IntegrationScheme, SimConfig};
use blobsim2d::core::kernel::calibrated_mass;
use blobsim2d::materials::{GridMaterial, Material, MaterialId, MaterialRegistry, ParticleMaterial};
use blobsim2d::math::{Real, cross};
use blobsim2d::solver::{ImplicitCohesionSolver, ParticleSystem, SpawnRequest};
use blobsim2d::{ExternalForcing, PaintEvent, Particle, SimError, Simulation, StepContext};

const H: Real = 0.008;
const CENTER: Vec2 = Vec2::new(0.5, 0.5);

fn quick_config() -> SimConfig {
    let mut config = SimConfig::default().with_grid_resolution(32);
    config.field.resolution = 32;
    config
}

fn rest_particle(position: Vec2, material: MaterialId) -> Particle {
    Particle::new(position, material).with_rest_state(calibrated_mass(1000.0, H), 1000.0)
}

fn bounding_radius(positions: &[Vec2]) -> Real {
    let centroid = positions.iter().copied().sum::<Vec2>() / positions.len() as Real;
    positions
        .iter()
        .map(|p| p.distance(centroid))
        .fold(0.0, Real::max)
}

fn single_material(material: ParticleMaterial) -> (MaterialRegistry, MaterialId) {
    let mut registry = MaterialRegistry::new();
    let id = registry.register(Material::Particle(material));
    (registry, id)
}

/// Runs `steps` particle-only steps against a still grid and returns the
/// largest particle speed seen.
fn run_pair(config: &SimConfig, steps: usize) -> (Real, ParticleSystem) {
    let mut material = ParticleMaterial::blob();
    material.params = material.params.with_attraction(0.0);
    let (registry, id) = single_material(material);
    let forcing = ExternalForcing::default();
    let ctx = StepContext {
        dt: config.dt,
        config,
        materials: &registry,
        forcing: &forcing,
    };

    let mut system = ParticleSystem::new(config);
    system.insert(rest_particle(CENTER - Vec2::new(0.25 * H, 0.0), id));
    system.insert(rest_particle(CENTER + Vec2::new(0.25 * H, 0.0), id));
    let mut solver = ImplicitCohesionSolver::new();
    let still = vec![Vec2::ZERO; 2];

    let mut max_speed: Real = 0.0;
    for _ in 0..steps {
        system.step(&ctx, &mut solver, &still);
        for particle in system.particles() {
            max_speed = max_speed.max(particle.velocity.length());
        }
    }
    (max_speed, system)
}

#[test]
fn explicit_pair_outruns_the_smoothing_radius() {
    let config = SimConfig::default().with_integration(IntegrationScheme::ExplicitEuler);
    let (max_speed, _) = run_pair(&config, 50);
    assert!(
        max_speed > H / config.dt,
        "explicit max speed {max_speed} stayed below {}",
        H / config.dt
    );
}

#[test]
fn implicit_pair_stays_bound() {
    let config = SimConfig::default();
    let (max_speed, system) = run_pair(&config, 10_000);
    assert!(max_speed < H / config.dt, "implicit max speed {max_speed}");
    let particles = system.particles();
    assert_eq!(particles.len(), 2);
    let separation = particles[0].position.distance(particles[1].position);
    assert!(separation < H, "pair drifted apart: {}h", separation / H);
    assert!(separation > 0.05 * H);
}

#[test]
fn cohesive_blob_stays_round() {
    let mut sim =
        Simulation::new(quick_config(), MaterialRegistry::with_defaults()).expect("valid config");
    let Some(blob) = sim.materials().find("blob") else {
        panic!("blob preset missing");
    };
    let material = *sim.materials().particle(blob).expect("particle material");
    let config = sim.config().clone();
    let request = SpawnRequest {
        center: CENTER,
        radius: 0.01,
        count: 50,
        material: blob,
    };
    let outcome = sim.particle_system_mut().spawn_batch(
        request,
        &material,
        &config,
        &mut StdRng::seed_from_u64(7),
    );
    assert_eq!(outcome.spawned, 50);

    let initial = bounding_radius(&sim.particle_positions());
    for tick in 0..100 {
        let report = sim.tick();
        assert!(
            report.faults.iter().all(|f| !f.is_discarded_step()),
            "tick {tick}: {:?}",
            report.faults
        );
        let radius = bounding_radius(&sim.particle_positions());
        assert!(radius <= 3.0 * initial, "tick {tick}: {radius} vs {initial}");
    }
    assert_eq!(sim.particles().len(), 50);
    let last = bounding_radius(&sim.particle_positions());
    assert!(last <= 1.2 * initial, "final {last} vs initial {initial}");
}

#[test]
fn lattice_at_rest_keeps_density_and_relative_velocity() {
    let mut material = ParticleMaterial::new(
        "still",
        blobsim2d::MaterialParameters::defaults()
            .with_cohesion(0.0)
            .with_attraction(0.0)
            .with_drag(0.0),
    );
    material.long_range_cohesion = 0.0;
    material.forms_blobs = false;
    let (registry, id) = single_material(material);
    let config = SimConfig::default();
    let forcing = ExternalForcing::default();
    let ctx = StepContext {
        dt: config.dt,
        config: &config,
        materials: &registry,
        forcing: &forcing,
    };

    let drift = Vec2::new(0.02, 0.01);
    let mut system = ParticleSystem::new(&config);
    for iy in -8..=8 {
        for ix in -8..=8 {
            let offset = 0.5 * H * Vec2::new(ix as Real, iy as Real);
            system.insert(rest_particle(CENTER + offset, id).with_velocity(drift));
        }
    }
    let report = system.step(&ctx, &mut ImplicitCohesionSolver::new(), &[drift; 289]);
    assert!(report.faults.is_empty(), "{:?}", report.faults);

    for particle in system.particles() {
        let interior = (particle.position - CENTER).abs().max_element() < 2.0 * H;
        if interior {
            let error = (particle.density - 1000.0).abs() / 1000.0;
            assert!(error < 1e-3, "density {}", particle.density);
        }
        assert!((particle.velocity - drift).length() < 1e-4 * drift.length().max(1.0));
    }
}

#[test]
fn symmetric_ring_exerts_no_net_force() {
    let mut material = ParticleMaterial::blob();
    material.params = material.params.with_attraction(0.0).with_drag(0.0);
    material.long_range_cohesion = 0.0;
    let (registry, id) = single_material(material);
    let config = SimConfig::default();
    let forcing = ExternalForcing::default();
    let ctx = StepContext {
        dt: config.dt,
        config: &config,
        materials: &registry,
        forcing: &forcing,
    };

    let mut system = ParticleSystem::new(&config);
    system.insert(rest_particle(CENTER, id));
    for k in 0..8 {
        let theta = k as Real * std::f32::consts::TAU / 8.0;
        system.insert(rest_particle(CENTER + 0.6 * H * Vec2::from_angle(theta), id));
    }
    system.step(&ctx, &mut ImplicitCohesionSolver::new(), &[Vec2::ZERO; 9]);

    let forces = system.stiff_forces();
    let scale = forces[1].length();
    assert!(scale > 0.0);
    assert!(forces[0].length() < 1e-3 * scale, "center {:?}", forces[0]);
    let total: Vec2 = forces.iter().copied().sum();
    assert!(total.length() < 1e-3 * scale, "total {total:?}");
    let particles = system.particles();
    let ring_speed = particles[1].velocity.length().max(1e-6);
    assert!(particles[0].velocity.length() < 1e-3 * ring_speed);
}

#[test]
fn plate_rotation_reaches_particles() {
    let omega = 2.0;
    let mut sim =
        Simulation::new(quick_config(), MaterialRegistry::with_defaults()).expect("valid config");
    let Some(spray) = sim.materials().find("spray") else {
        panic!("spray preset missing");
    };
    sim.queue_paint(PaintEvent {
        position: Vec2::new(0.7, 0.5),
        material: spray,
        radius: 0.01,
    });
    sim.queue_forcing(ExternalForcing::rotation(omega));
    for _ in 0..60 {
        sim.tick();
    }

    let particles = sim.particles();
    assert!(!particles.is_empty());
    let mean_rate = particles
        .iter()
        .map(|p| {
            let r = p.position - CENTER;
            cross(r, p.velocity) / r.length_squared()
        })
        .sum::<Real>()
        / particles.len() as Real;
    assert!(mean_rate > 0.05 * omega, "mean angular rate {mean_rate}");
}

#[test]
fn cap_policies_evict_or_reject() {
    let paint = |sim: &mut Simulation, material| {
        sim.queue_paint(PaintEvent {
            position: CENTER,
            material,
            radius: 0.01,
        });
        sim.tick()
    };

    let config = quick_config().with_particle_cap(120, CapPolicy::EvictOldest);
    let mut sim = Simulation::new(config, MaterialRegistry::with_defaults()).expect("valid");
    let blob = sim.materials().find("blob").expect("blob preset");
    let mut evicted = 0;
    for _ in 0..4 {
        evicted += paint(&mut sim, blob).evicted;
    }
    assert_eq!(sim.particles().len(), 120);
    assert_eq!(evicted, 80);

    let config = quick_config().with_particle_cap(120, CapPolicy::RejectSpawn);
    let mut sim = Simulation::new(config, MaterialRegistry::with_defaults()).expect("valid");
    paint(&mut sim, blob);
    paint(&mut sim, blob);
    let report = paint(&mut sim, blob);
    assert_eq!(report.spawned, 0);
    assert!(report.faults.contains(&SimError::ResourceExhaustion {
        cap: 120,
        requested: 50
    }));
    assert_eq!(sim.particles().len(), 100);
}

#[test]
fn particles_leaving_the_plate_are_removed() {
    let mut sim =
        Simulation::new(quick_config(), MaterialRegistry::with_defaults()).expect("valid config");
    let spray = sim.materials().find("spray").expect("spray preset");
    let edge = sim.config().removal_radius() - 0.005;
    sim.particle_system_mut().insert(
        rest_particle(CENTER + Vec2::new(edge, 0.0), spray).with_velocity(Vec2::new(1.0, 0.0)),
    );
    sim.particle_system_mut().insert(rest_particle(CENTER, spray));
    let report = sim.tick();
    assert_eq!(report.removed_out_of_bounds, 1);
    assert_eq!(sim.particles().len(), 1);
}

#[test]
fn grid_paint_splats_thickness_without_particles() {
    let mut sim =
        Simulation::new(quick_config(), MaterialRegistry::with_defaults()).expect("valid config");
    let ink = sim.materials().find("ink").expect("ink preset");
    sim.queue_paint(PaintEvent {
        position: CENTER,
        material: ink,
        radius: 0.05,
    });
    let report = sim.tick();
    assert_eq!(report.splats, 1);
    assert!(sim.particles().is_empty());
    assert!(sim.scalar_field().sum() > 0.0);
    let (_, peak) = sim.scalar_field().min_max();
    assert!(peak <= GridMaterial::ink().max_thickness + 1e-6);
}

#[test]
fn grid_steps_while_only_particles_are_painted() {
    let mut sim =
        Simulation::new(quick_config(), MaterialRegistry::with_defaults()).expect("valid config");
    let blob = sim.materials().find("blob").expect("blob preset");
    sim.queue_paint(PaintEvent {
        position: Vec2::new(0.6, 0.5),
        material: blob,
        radius: 0.01,
    });
    sim.queue_forcing(ExternalForcing::rotation(1.0));
    for _ in 0..5 {
        let report = sim.tick();
        assert!(report.grid.projection.divergence_after.is_finite());
    }
    assert!(sim.grid_velocity().max_abs() > 0.0);
    assert!(sim.scalar_field().max_abs() == 0.0);
    assert!(sim.density_field().values().iter().any(|&v| v > 1.0));
}

#[test]
fn degrading_parameters_are_warned_not_rejected() {
    let mut registry = MaterialRegistry::new();
    let weak = blobsim2d::MaterialParameters::defaults()
        .with_cohesion(100.0)
        .with_drag(120.0);
    registry.register(Material::Particle(ParticleMaterial::new("weak", weak)));
    let mut config = quick_config();
    config.particles.jacobian_radius_factor = 2.0;

    let sim = Simulation::new(config, registry).expect("warnings are not errors");
    let warnings = sim.config_warnings();
    assert!(warnings.len() >= 3, "{warnings:?}");
    assert!(
        warnings
            .iter()
            .all(|w| matches!(w, SimError::InvalidConfiguration(_)))
    );
    assert_eq!(sim.config().particles.jacobian_radius_factor, 2.0);
}
