//! Eulerian MAC-grid solver for thin, miscible materials.
//!
//! One step runs: external forces, optional vorticity confinement,
//! semi-Lagrangian self-advection, Jacobi viscosity, pressure projection,
//! MacCormack scalar transport and the wall response. Every pass goes through
//! a [`DoubleBuffer`], so a pass that produces NaN/Inf is dropped and the
//! fields keep their previous values.

use bevy::log::{debug, warn};
use rayon::prelude::*;

use crate::config::constants::MIN_GRID_RESOLUTION;
use crate::config::{BoundaryMode, BoundaryParams, GridParams, SimConfig};
use crate::core::StepContext;
use crate::core::field::{DoubleBuffer, Field2};
use crate::core::grid::{MacGrid, VelocityField};
use crate::error::{SimError, SimResult, Stage};
use crate::events::JetImpulse;
use crate::math::{Real, Vector, rigid_rotation};
use crate::solver::pcg::{PcgOutcome, PcgSettings, PcgSolver};
use crate::solver::sparse::LinearOperator;

/// Divergence bookkeeping of one projection.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProjectionReport {
    pub divergence_before: Real,
    pub divergence_after: Real,
    pub solve: PcgOutcome,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GridStepReport {
    pub faults: Vec<SimError>,
    pub projection: ProjectionReport,
}

impl GridStepReport {
    fn note(&mut self, result: SimResult<()>) {
        if let Err(fault) = result {
            warn!("grid: {fault}");
            self.faults.push(fault);
        }
    }
}

/// 5-point Neumann Laplacian on the cell lattice, walls excluded.
pub struct PoissonOperator {
    resolution: usize,
}

impl PoissonOperator {
    pub fn new(resolution: usize) -> Self {
        Self { resolution }
    }

    #[inline]
    fn neighbor_count(&self, i: usize, j: usize) -> usize {
        let n = self.resolution;
        usize::from(i > 0) + usize::from(i + 1 < n) + usize::from(j > 0) + usize::from(j + 1 < n)
    }
}

impl LinearOperator for PoissonOperator {
    fn dim(&self) -> usize {
        self.resolution * self.resolution
    }

    fn apply(&self, x: &[Real], y: &mut [Real]) {
        let n = self.resolution;
        y.par_chunks_mut(n).enumerate().for_each(|(j, row)| {
            for (i, out) in row.iter_mut().enumerate() {
                let c = i + j * n;
                let mut sum = 0.0;
                if i > 0 {
                    sum += x[c - 1];
                }
                if i + 1 < n {
                    sum += x[c + 1];
                }
                if j > 0 {
                    sum += x[c - n];
                }
                if j + 1 < n {
                    sum += x[c + n];
                }
                *out = self.neighbor_count(i, j) as Real * x[c] - sum;
            }
        });
    }

    fn diagonal(&self, out: &mut [Real]) {
        let n = self.resolution;
        for j in 0..n {
            for i in 0..n {
                out[i + j * n] = self.neighbor_count(i, j) as Real;
            }
        }
    }
}

/// RK2 backtrace clamped to the domain.
#[inline]
fn backtrace(velocity: &VelocityField, grid: &MacGrid, position: Vector, dt: Real) -> Vector {
    let first = velocity.sample(position);
    let mid = grid.clamp_to_domain(position - 0.5 * dt * first);
    let second = velocity.sample(mid);
    grid.clamp_to_domain(position - dt * second)
}

#[inline]
fn jet_weight(jet: &JetImpulse, position: Vector) -> Real {
    if jet.radius <= 0.0 {
        return 0.0;
    }
    let d2 = (position - jet.position).length_squared() / (jet.radius * jet.radius);
    if d2 <= 9.0 { (-d2).exp() } else { 0.0 }
}

pub struct EulerianGridSolver {
    grid: MacGrid,
    velocity: DoubleBuffer<VelocityField>,
    pressure: DoubleBuffer<Field2>,
    divergence: DoubleBuffer<Field2>,
    scalar: DoubleBuffer<Field2>,
    pcg: PcgSolver,
    rhs: Vec<Real>,
    potential: Vec<Real>,
}

impl EulerianGridSolver {
    pub fn new(config: &SimConfig) -> Self {
        let grid = MacGrid::new(config.grid.resolution, config.domain_size);
        Self {
            velocity: DoubleBuffer::new(grid.velocity_field()),
            pressure: DoubleBuffer::new(grid.scalar_field()),
            divergence: DoubleBuffer::new(grid.scalar_field()),
            scalar: DoubleBuffer::new(grid.scalar_field()),
            pcg: PcgSolver::new(),
            rhs: Vec::new(),
            potential: Vec::new(),
            grid,
        }
    }

    /// Reallocates every field at a new resolution, clearing them.
    pub fn resize(&mut self, resolution: usize, domain_size: Real) -> SimResult<()> {
        if resolution < MIN_GRID_RESOLUTION {
            return Err(SimError::InvalidConfiguration(format!(
                "grid resolution {resolution} below {MIN_GRID_RESOLUTION}"
            )));
        }
        if !(domain_size.is_finite() && domain_size > 0.0) {
            return Err(SimError::InvalidConfiguration(
                "domain size must be positive and finite".to_string(),
            ));
        }
        self.grid = MacGrid::new(resolution, domain_size);
        self.velocity.reset(self.grid.velocity_field());
        self.pressure.reset(self.grid.scalar_field());
        self.divergence.reset(self.grid.scalar_field());
        self.scalar.reset(self.grid.scalar_field());
        self.rhs.clear();
        self.potential.clear();
        Ok(())
    }

    pub fn grid(&self) -> &MacGrid {
        &self.grid
    }

    pub fn velocity(&self) -> &VelocityField {
        self.velocity.current()
    }

    pub fn pressure(&self) -> &Field2 {
        self.pressure.current()
    }

    pub fn divergence(&self) -> &Field2 {
        self.divergence.current()
    }

    pub fn scalar(&self) -> &Field2 {
        self.scalar.current()
    }

    /// Runs an arbitrary pass over the velocity buffers.
    pub fn update_velocity<F>(&mut self, stage: Stage, pass: F) -> SimResult<()>
    where
        F: FnOnce(&VelocityField, &mut VelocityField),
    {
        self.velocity.step(stage, pass)
    }

    /// Runs an arbitrary pass over the scalar buffers.
    pub fn update_scalar<F>(&mut self, stage: Stage, pass: F) -> SimResult<()>
    where
        F: FnOnce(&Field2, &mut Field2),
    {
        self.scalar.step(stage, pass)
    }

    pub fn step(&mut self, ctx: &StepContext<'_>) -> GridStepReport {
        let dt = ctx.dt;
        let params = &ctx.config.grid;
        let mut report = GridStepReport::default();

        report.note(self.apply_forces(ctx));
        if params.vorticity_strength > 0.0 {
            report.note(self.confine_vorticity(dt, params.vorticity_strength));
        }
        report.note(self.advect_velocity(dt));
        report.note(self.diffuse_velocity(dt, params));
        match self.project(params) {
            Ok(projection) => {
                if let Some(fault) = projection.solve.as_fault() {
                    debug!("grid: {fault}");
                    report.faults.push(fault);
                }
                report.projection = projection;
            }
            Err(fault) => report.note(Err(fault)),
        }
        report.note(self.advect_scalar(dt));
        report.note(self.apply_boundary(dt, &ctx.config.boundary));
        report
    }

    /// Plate rotation drag and one-shot jets.
    pub fn apply_forces(&mut self, ctx: &StepContext<'_>) -> SimResult<()> {
        let omega = ctx.forcing.rotation_rate;
        let blend = 1.0 - (-ctx.config.grid.plate_coupling * ctx.dt).exp();
        let center = ctx.config.plate_center();
        let plate_radius_sq = ctx.config.plate_radius * ctx.config.plate_radius;
        let jets = &ctx.forcing.jet_impulses;

        let forced = |position: Vector, current: Vector| -> Vector {
            let mut velocity = current;
            if (position - center).length_squared() <= plate_radius_sq {
                velocity += blend * (rigid_rotation(omega, center, position) - current);
            }
            for jet in jets {
                velocity += jet.impulse * jet_weight(jet, position);
            }
            velocity
        };

        self.velocity.step(Stage::GridForces, |src, dst| {
            dst.u.par_fill_with(|i, j| {
                let p = src.u.position(i, j);
                forced(p, Vector::new(src.u.get(i, j), src.v.sample(p))).x
            });
            dst.v.par_fill_with(|i, j| {
                let p = src.v.position(i, j);
                forced(p, Vector::new(src.u.sample(p), src.v.get(i, j))).y
            });
            dst.enforce_walls();
        })
    }

    /// Adds `epsilon * dx * (N x omega)` to re-inject small-scale swirl.
    pub fn confine_vorticity(&mut self, dt: Real, epsilon: Real) -> SimResult<()> {
        let grid = self.grid;
        let n = grid.resolution;
        let dx = grid.spacing;
        let velocity = self.velocity.current();

        let span = |k: usize| (k.saturating_sub(1), (k + 1).min(n - 1));
        let mut curl = grid.scalar_field();
        curl.par_fill_with(|i, j| {
            let (il, ir) = span(i);
            let (jl, jr) = span(j);
            let dvdx = (velocity.cell_velocity(ir, j).y - velocity.cell_velocity(il, j).y)
                / ((ir - il).max(1) as Real * dx);
            let dudy = (velocity.cell_velocity(i, jr).x - velocity.cell_velocity(i, jl).x)
                / ((jr - jl).max(1) as Real * dx);
            dvdx - dudy
        });

        let confinement = |i: usize, j: usize| -> Vector {
            let (il, ir) = span(i);
            let (jl, jr) = span(j);
            let gradient = Vector::new(
                curl.get(ir, j).abs() - curl.get(il, j).abs(),
                curl.get(i, jr).abs() - curl.get(i, jl).abs(),
            );
            let normal = gradient.normalize_or_zero();
            let omega = curl.get(i, j);
            epsilon * dx * Vector::new(normal.y * omega, -normal.x * omega)
        };

        self.velocity.step(Stage::Vorticity, |src, dst| {
            dst.u.par_fill_with(|i, j| {
                if i == 0 || i == n {
                    return 0.0;
                }
                let force = 0.5 * (confinement(i - 1, j).x + confinement(i, j).x);
                src.u.get(i, j) + dt * force
            });
            dst.v.par_fill_with(|i, j| {
                if j == 0 || j == n {
                    return 0.0;
                }
                let force = 0.5 * (confinement(i, j - 1).y + confinement(i, j).y);
                src.v.get(i, j) + dt * force
            });
        })
    }

    /// Semi-Lagrangian self-advection.
    pub fn advect_velocity(&mut self, dt: Real) -> SimResult<()> {
        let grid = self.grid;
        self.velocity.step(Stage::Advection, |src, dst| {
            dst.u.par_fill_with(|i, j| {
                let back = backtrace(src, &grid, src.u.position(i, j), dt);
                src.u.sample(back)
            });
            dst.v.par_fill_with(|i, j| {
                let back = backtrace(src, &grid, src.v.position(i, j), dt);
                src.v.sample(back)
            });
            dst.enforce_walls();
        })
    }

    /// Fixed-iteration Jacobi relaxation of `(I - nu dt lap) u = u0`.
    pub fn diffuse_velocity(&mut self, dt: Real, params: &GridParams) -> SimResult<()> {
        let alpha = params.viscosity * dt / (self.grid.spacing * self.grid.spacing);
        if alpha <= 0.0 || params.viscosity_iterations == 0 {
            return Ok(());
        }
        let iterations = params.viscosity_iterations;

        self.velocity.step(Stage::Diffusion, |src, dst| {
            dst.copy_from(src);
            let mut scratch = src.clone();
            for _ in 0..iterations {
                jacobi_sweep(&src.u, &dst.u, &mut scratch.u, alpha);
                jacobi_sweep(&src.v, &dst.v, &mut scratch.v, alpha);
                std::mem::swap(dst, &mut scratch);
            }
            dst.enforce_walls();
        })
    }

    /// Makes the velocity field discretely divergence free.
    pub fn project(&mut self, params: &GridParams) -> SimResult<ProjectionReport> {
        let n = self.grid.resolution;
        let dx = self.grid.spacing;

        let velocity = self.velocity.current();
        self.divergence.step(Stage::Projection, |_, dst| {
            dst.par_fill_with(|i, j| velocity.divergence(i, j));
        })?;
        let divergence = self.divergence.current();
        let divergence_before = rms(divergence.data());

        self.rhs.clear();
        self.rhs.extend(divergence.data().iter().map(|d| -d * dx * dx));
        self.potential.clear();
        self.potential.resize(n * n, 0.0);

        let settings = PcgSettings {
            tolerance: params.pressure_tolerance,
            max_iterations: params.pressure_iterations,
        };
        let solve = self.pcg.solve(
            &PoissonOperator::new(n),
            &self.rhs,
            &mut self.potential,
            settings,
            Stage::Projection,
        )?;

        let potential = &self.potential;
        self.velocity.step(Stage::Projection, |src, dst| {
            dst.u.par_fill_with(|i, j| {
                if i == 0 || i == n {
                    return 0.0;
                }
                src.u.get(i, j) - (potential[i + j * n] - potential[i - 1 + j * n]) / dx
            });
            dst.v.par_fill_with(|i, j| {
                if j == 0 || j == n {
                    return 0.0;
                }
                src.v.get(i, j) - (potential[i + j * n] - potential[i + (j - 1) * n]) / dx
            });
        })?;

        // Stored as a pressure-like quantity for inspection only.
        self.pressure.step(Stage::Projection, |_, dst| {
            dst.data_mut().copy_from_slice(potential);
        })?;

        Ok(ProjectionReport {
            divergence_before,
            divergence_after: self.velocity.current().divergence_rms(),
            solve,
        })
    }

    /// MacCormack transport of the scalar field, limited to the local extrema
    /// of the source neighbourhood.
    pub fn advect_scalar(&mut self, dt: Real) -> SimResult<()> {
        let grid = self.grid;
        let velocity = self.velocity.current();
        self.scalar.step(Stage::ScalarAdvection, |src, dst| {
            let mut forward = src.clone();
            forward.par_fill_with(|i, j| {
                src.sample(backtrace(velocity, &grid, src.position(i, j), dt))
            });
            dst.par_fill_with(|i, j| {
                let position = src.position(i, j);
                let back = backtrace(velocity, &grid, position, dt);
                let reverse = forward.sample(backtrace(velocity, &grid, position, -dt));
                let corrected = forward.get(i, j) + 0.5 * (src.get(i, j) - reverse);
                let (lo, hi) = src.sample_bounds(back);
                corrected.max(lo).min(hi)
            });
        })
    }

    /// Response inside the wall band.
    pub fn apply_boundary(&mut self, dt: Real, params: &BoundaryParams) -> SimResult<()> {
        if params.band <= 0.0 {
            return Ok(());
        }
        let size = self.grid.domain_size();
        let params = *params;

        // Returns the adjusted normal component for a face at coordinate `x`
        // along its own axis.
        let respond = move |x: Real, value: Real| -> Real {
            let (distance, inward) = if x < 0.5 * size {
                (x, 1.0)
            } else {
                (size - x, -1.0)
            };
            if distance >= params.band {
                return value;
            }
            let depth = 1.0 - distance / params.band;
            match params.mode {
                BoundaryMode::Reflect => {
                    if value * inward < 0.0 {
                        -params.restitution * value
                    } else {
                        value
                    }
                }
                BoundaryMode::ViscousDrag => {
                    value * (1.0 - (params.strength * dt * depth).min(1.0))
                }
                BoundaryMode::SoftRepulsion => value + inward * params.strength * dt * depth,
            }
        };
        let damp_tangential = move |x: Real, value: Real| -> Real {
            let distance = x.min(size - x);
            if params.mode != BoundaryMode::ViscousDrag || distance >= params.band {
                return value;
            }
            let depth = 1.0 - distance / params.band;
            value * (1.0 - (params.strength * dt * depth).min(1.0))
        };

        self.velocity.step(Stage::Boundary, |src, dst| {
            dst.u.par_fill_with(|i, j| {
                let p = src.u.position(i, j);
                damp_tangential(p.y, respond(p.x, src.u.get(i, j)))
            });
            dst.v.par_fill_with(|i, j| {
                let p = src.v.position(i, j);
                damp_tangential(p.x, respond(p.y, src.v.get(i, j)))
            });
            dst.enforce_walls();
        })
    }

    /// Gaussian splat of a grid material into the scalar field.
    pub fn splat_scalar(
        &mut self,
        center: Vector,
        radius: Real,
        amount: Real,
        ceiling: Real,
    ) -> SimResult<()> {
        if !(center.is_finite() && radius.is_finite() && amount.is_finite()) {
            return Err(SimError::NumericalDivergence { stage: Stage::Paint });
        }
        if radius <= 0.0 {
            return Ok(());
        }
        let inv_r2 = 1.0 / (radius * radius);
        self.scalar.step(Stage::Paint, |src, dst| {
            dst.par_fill_with(|i, j| {
                let current = src.get(i, j);
                let d2 = (src.position(i, j) - center).length_squared() * inv_r2;
                if !(d2 <= 9.0) {
                    return current;
                }
                (current + amount * (-d2).exp()).min(ceiling).max(current)
            });
        })
    }
}

fn jacobi_sweep(base: &Field2, previous: &Field2, next: &mut Field2, alpha: Real) {
    let width = base.width();
    let height = base.height();
    next.par_fill_with(|i, j| {
        let mut sum = 0.0;
        let mut count = 0.0;
        if i > 0 {
            sum += previous.get(i - 1, j);
            count += 1.0;
        }
        if i + 1 < width {
            sum += previous.get(i + 1, j);
            count += 1.0;
        }
        if j > 0 {
            sum += previous.get(i, j - 1);
            count += 1.0;
        }
        if j + 1 < height {
            sum += previous.get(i, j + 1);
            count += 1.0;
        }
        (base.get(i, j) + alpha * sum) / (1.0 + alpha * count)
    });
}

fn rms(values: &[Real]) -> Real {
    if values.is_empty() {
        return 0.0;
    }
    (values.iter().map(|v| v * v).sum::<Real>() / values.len() as Real).sqrt()
}
