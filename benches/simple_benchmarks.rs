/// Simple custom benchmarking without criterion
use std::time::Instant;

use bevy::math::Vec2;
use blobsim2d::core::Particle;
use blobsim2d::core::kernel::calibrated_mass;
use blobsim2d::geometry::SpatialHashGrid;
use blobsim2d::solver::{EulerianGridSolver, PcgSettings, PcgSolver, PoissonOperator};
use blobsim2d::{ExternalForcing, MaterialId, MaterialRegistry, SimConfig, Simulation, Stage};

fn time_it<F: FnMut()>(name: &str, iterations: usize, mut f: F) {
    // Warmup
    for _ in 0..3 {
        f();
    }

    let start = Instant::now();
    for _ in 0..iterations {
        f();
    }
    let elapsed = start.elapsed();

    let avg_ms = elapsed.as_secs_f64() * 1000.0 / iterations as f64;
    println!("{}: {:.3}ms avg ({} iterations)", name, avg_ms, iterations);
}

/// Square lattice of blob particles at rest spacing around the plate center.
fn lattice(count: usize, h: f32) -> Vec<Particle> {
    let side = (count as f32).sqrt().ceil() as usize;
    let spacing = 0.5 * h;
    let origin = Vec2::splat(0.5) - Vec2::splat(0.5 * spacing * side as f32);
    let mass = calibrated_mass(1000.0, h);
    (0..count)
        .map(|k| {
            let position = origin + spacing * Vec2::new((k % side) as f32, (k / side) as f32);
            Particle::new(position, MaterialId(0)).with_rest_state(mass, 1000.0)
        })
        .collect()
}

fn main() {
    println!("\n=== blobsim2d Benchmarks ===\n");
    let h = SimConfig::default().particles.smoothing_radius;

    println!("--- Spatial Hash ---");
    for &count in &[1000, 5000, 10000, 20000] {
        let positions: Vec<Vec2> = lattice(count, h).iter().map(|p| p.position).collect();
        let mut hash = SpatialHashGrid::new(h);
        time_it(&format!("rebuild (n={})", count), 50, || {
            hash.rebuild(&positions, h);
        });
        time_it(&format!("neighbor_lists (n={})", count), 20, || {
            std::hint::black_box(hash.neighbor_lists(h));
        });
    }

    println!("\n--- Pressure Projection ---");
    for &resolution in &[64, 128] {
        let n = resolution * resolution;
        let operator = PoissonOperator::new(resolution);
        let rhs: Vec<f32> = (0..n).map(|i| ((i % 7) as f32 - 3.0) * 1e-3).collect();
        let mean = rhs.iter().sum::<f32>() / n as f32;
        let rhs: Vec<f32> = rhs.iter().map(|v| v - mean).collect();
        let mut solver = PcgSolver::new();
        let settings = PcgSettings {
            tolerance: 1e-4,
            max_iterations: 200,
        };
        time_it(&format!("poisson pcg ({}^2)", resolution), 10, || {
            let mut x = vec![0.0; n];
            let _ = solver.solve(&operator, &rhs, &mut x, settings, Stage::Projection);
        });
    }

    println!("\n--- Grid Step ---");
    for &resolution in &[64, 128] {
        let config = SimConfig::default().with_grid_resolution(resolution);
        let materials = MaterialRegistry::with_defaults();
        let forcing = ExternalForcing::rotation(2.0);
        let mut grid = EulerianGridSolver::new(&config);
        let ctx = blobsim2d::StepContext {
            dt: config.dt,
            config: &config,
            materials: &materials,
            forcing: &forcing,
        };
        time_it(&format!("grid step ({}^2)", resolution), 20, || {
            grid.step(&ctx);
        });
    }

    println!("\n--- Full Tick ---");
    for &count in &[500, 2000, 5000] {
        let Ok(mut simulation) = Simulation::with_defaults() else {
            println!("default configuration rejected");
            return;
        };
        for particle in lattice(count, h) {
            simulation.particle_system_mut().insert(particle);
        }
        simulation.queue_forcing(ExternalForcing::rotation(1.0));
        time_it(&format!("tick (n={})", count), 10, || {
            simulation.tick();
        });
    }

    println!("\n=== Benchmark Complete ===\n");
}
