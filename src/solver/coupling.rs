//! Grid/particle velocity exchange.
//!
//! Grid to particle: bilinear MAC sampling, consumed as the drag target.
//! Particle to grid: bilinear splat of mass-weighted velocity onto the u and v
//! faces, blended into the grid through its double buffer.

use rayon::prelude::*;

use crate::config::CouplingParams;
use crate::core::Particle;
use crate::core::field::Field2;
use crate::core::grid::VelocityField;
use crate::error::{SimResult, Stage};
use crate::math::{Real, Vector};
use crate::solver::eulerian::EulerianGridSolver;

/// Per-face accumulators of one component lattice.
#[derive(Debug, Clone, Default)]
struct FaceSums {
    momentum: Vec<Real>,
    mass: Vec<Real>,
    /// Unweighted kernel coverage, drives the blend factor.
    coverage: Vec<Real>,
}

impl FaceSums {
    fn reset(&mut self, len: usize) {
        for values in [&mut self.momentum, &mut self.mass, &mut self.coverage] {
            values.clear();
            values.resize(len, 0.0);
        }
    }

    fn splat(&mut self, lattice: &Field2, position: Vector, component: Real, mass: Real) {
        let stencil = lattice.stencil(position);
        for (&index, weight) in stencil.indices.iter().zip(stencil.weights) {
            self.momentum[index] += weight * mass * component;
            self.mass[index] += weight * mass;
            self.coverage[index] += weight;
        }
    }

    /// Normalized face value, `None` for untouched faces.
    fn target(&self, index: usize) -> Option<Real> {
        let mass = self.mass[index];
        (mass > Real::EPSILON).then(|| self.momentum[index] / mass)
    }

    fn blend_into(&self, src: &Field2, dst: &mut Field2, blend: Real) {
        dst.data_mut()
            .par_iter_mut()
            .zip(src.data().par_iter())
            .enumerate()
            .for_each(|(index, (out, &current))| {
                *out = match self.target(index) {
                    Some(target) => {
                        let alpha = blend * self.coverage[index].min(1.0);
                        current + alpha * (target - current)
                    }
                    None => current,
                };
            });
    }
}

/// Particle velocities splatted onto the faces of a MAC grid.
#[derive(Debug, Clone, Default)]
pub struct FaceDeposit {
    u: FaceSums,
    v: FaceSums,
}

impl FaceDeposit {
    pub fn accumulate(&mut self, particles: &[Particle], layout: &VelocityField) {
        self.u.reset(layout.u.data().len());
        self.v.reset(layout.v.data().len());
        for particle in particles {
            self.u
                .splat(&layout.u, particle.position, particle.velocity.x, particle.mass);
            self.v
                .splat(&layout.v, particle.position, particle.velocity.y, particle.mass);
        }
    }

    /// Faces that received any particle weight.
    pub fn touched_faces(&self) -> usize {
        let touched = |sums: &FaceSums| sums.mass.iter().filter(|&&m| m > Real::EPSILON).count();
        touched(&self.u) + touched(&self.v)
    }

    /// Writes `src` blended toward the normalized deposit into `dst`.
    pub fn blend(&self, src: &VelocityField, dst: &mut VelocityField, blend: Real) {
        self.u.blend_into(&src.u, &mut dst.u, blend);
        self.v.blend_into(&src.v, &mut dst.v, blend);
        dst.enforce_walls();
    }

    /// Normalized deposit on touched faces, `base` elsewhere.
    pub fn normalized(&self, base: &VelocityField) -> VelocityField {
        let mut out = base.clone();
        for (sums, field) in [(&self.u, &mut out.u), (&self.v, &mut out.v)] {
            for (index, value) in field.data_mut().iter_mut().enumerate() {
                if let Some(target) = sums.target(index) {
                    *value = target;
                }
            }
        }
        out
    }
}

#[derive(Debug, Clone, Default)]
pub struct GridParticleCoupling {
    deposit: FaceDeposit,
}

impl GridParticleCoupling {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grid velocity at each position, u and v interpolated on their own
    /// staggered lattices.
    pub fn sample_grid_velocity(
        &self,
        positions: &[Vector],
        velocity: &VelocityField,
    ) -> Vec<Vector> {
        positions
            .par_iter()
            .map(|&position| velocity.sample(position))
            .collect()
    }

    /// Blends particle velocity into the grid faces they touch.
    pub fn deposit_particle_velocity(
        &mut self,
        particles: &[Particle],
        grid: &mut EulerianGridSolver,
        params: &CouplingParams,
    ) -> SimResult<()> {
        if !params.deposit_enabled || particles.is_empty() || params.deposit_blend <= 0.0 {
            return Ok(());
        }
        self.deposit.accumulate(particles, grid.velocity());
        let deposit = &self.deposit;
        let blend = params.deposit_blend.min(1.0);
        grid.update_velocity(Stage::Deposit, |src, dst| deposit.blend(src, dst, blend))
    }

    pub fn last_deposit(&self) -> &FaceDeposit {
        &self.deposit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use crate::core::grid::MacGrid;
    use crate::materials::MaterialId;
    use crate::math::{cross, rigid_rotation};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn spinning_annulus(count: usize, omega: Real) -> Vec<Particle> {
        let center = Vector::splat(0.5);
        let mut rng = StdRng::seed_from_u64(42);
        (0..count)
            .map(|_| {
                let r: Real = rng.random_range(0.1..0.2);
                let theta: Real = rng.random_range(0.0..std::f32::consts::TAU);
                let position = center + r * Vector::new(theta.cos(), theta.sin());
                Particle::new(position, MaterialId(0))
                    .with_mass(0.01)
                    .with_velocity(rigid_rotation(omega, center, position))
            })
            .collect()
    }

    fn angular_momentum(particles: &[Particle], velocities: &[Vector]) -> Real {
        let center = Vector::splat(0.5);
        particles
            .iter()
            .zip(velocities)
            .map(|(p, v)| p.mass * cross(p.position - center, *v))
            .sum()
    }

    #[test]
    fn uniform_grid_samples_exactly() {
        let grid = MacGrid::new(16, 1.0);
        let mut velocity = grid.velocity_field();
        velocity.fill(Vector::new(0.3, -0.2));
        let positions = [
            Vector::new(0.11, 0.73),
            Vector::new(0.5, 0.5),
            Vector::new(0.97, 0.02),
        ];
        let samples = GridParticleCoupling::new().sample_grid_velocity(&positions, &velocity);
        for sample in samples {
            assert!((sample - Vector::new(0.3, -0.2)).length() < 1e-6);
        }
    }

    #[test]
    fn deposit_then_resample_keeps_angular_momentum() {
        let omega = 1.5;
        let particles = spinning_annulus(400, omega);
        let layout = MacGrid::new(64, 1.0).velocity_field();
        let mut deposit = FaceDeposit::default();
        deposit.accumulate(&particles, &layout);
        let deposited = deposit.normalized(&layout);

        let positions: Vec<Vector> = particles.iter().map(|p| p.position).collect();
        let resampled = GridParticleCoupling::new().sample_grid_velocity(&positions, &deposited);
        let original: Vec<Vector> = particles.iter().map(|p| p.velocity).collect();

        let before = angular_momentum(&particles, &original);
        let after = angular_momentum(&particles, &resampled);
        assert!(before > 0.0);
        assert!(((after - before) / before).abs() < 0.02, "{before} -> {after}");
    }

    #[test]
    fn deposit_blends_only_touched_faces() {
        let config = SimConfig::default().with_grid_resolution(16);
        let mut grid = EulerianGridSolver::new(&config);
        let particles = vec![
            Particle::new(Vector::new(0.5, 0.5), MaterialId(0))
                .with_mass(0.01)
                .with_velocity(Vector::new(1.0, 0.0)),
        ];
        let params = CouplingParams {
            deposit_blend: 0.5,
            deposit_enabled: true,
        };
        let mut coupling = GridParticleCoupling::new();
        coupling
            .deposit_particle_velocity(&particles, &mut grid, &params)
            .expect("finite deposit");

        let u = &grid.velocity().u;
        let touched = u.data().iter().filter(|&&value| value != 0.0).count();
        assert!(touched > 0 && touched <= 4);
        assert!(u.max_abs() <= 0.5 + 1e-6);
        assert!(grid.velocity().v.max_abs() < 1e-6);
        assert!(coupling.last_deposit().touched_faces() > 0);
    }

    #[test]
    fn disabled_deposit_leaves_grid_alone() {
        let config = SimConfig::default().with_grid_resolution(16);
        let mut grid = EulerianGridSolver::new(&config);
        let particles = spinning_annulus(50, 2.0);
        let params = CouplingParams {
            deposit_blend: 1.0,
            deposit_enabled: false,
        };
        GridParticleCoupling::new()
            .deposit_particle_velocity(&particles, &mut grid, &params)
            .expect("no-op");
        assert_eq!(grid.velocity().max_abs(), 0.0);
    }
}
