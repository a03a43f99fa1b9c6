//! Backward-Euler velocity update for the stiff particle forces.
//!
//! Solves `(M - dt^2 K - dt D) v' = M v + dt f` where `K` is the linearized
//! stiffness of pressure and cohesion and `D` the pairwise viscous coupling.
//! The system is assembled as symmetric 2x2 blocks over neighbour pairs and
//! handed to Jacobi-preconditioned CG, warm-started from the current velocity.

use bevy::log::debug;
use rayon::prelude::*;

use crate::core::kernel::SphKernel;
use crate::core::{Particle, StepContext};
use crate::error::{SimError, SimResult, Stage};
use crate::geometry::Neighbor;
use crate::math::{Block, Real, Vector, block_identity, outer_product};
use crate::solver::pcg::{PcgOutcome, PcgSettings, PcgSolver};
use crate::solver::sph::{ParticleCoefficients, pair_terms};
use crate::solver::sparse::{BlockRow, BlockSparseMatrix};

/// Particle state the solver reads; all slices are indexed by particle.
pub struct PairSystem<'a> {
    pub kernel: &'a SphKernel,
    pub particles: &'a [Particle],
    pub coefficients: &'a [ParticleCoefficients],
    pub neighbors: &'a [Vec<Neighbor>],
    /// Stiff plus explicit force at the current positions.
    pub forces: &'a [Vector],
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ImplicitSolveReport {
    pub outcome: PcgOutcome,
    pub stored_blocks: usize,
    pub mean_row_blocks: Real,
    /// Pair blocks below the entry threshold, counted once per pair.
    pub dropped_blocks: usize,
}

#[derive(Debug, Default)]
pub struct ImplicitCohesionSolver {
    matrix: BlockSparseMatrix,
    rows: Vec<BlockRow>,
    rhs: Vec<Real>,
    solution: Vec<Real>,
    pcg: PcgSolver,
}

/// Jacobian block of one pair, evaluated in `(lo, hi)` index order so the
/// `(i, j)` and `(j, i)` blocks are bit-identical.
fn pair_block(system: &PairSystem<'_>, i: usize, j: usize, dt: Real) -> Block {
    let (lo, hi) = if i < j { (i, j) } else { (j, i) };
    let a = &system.particles[lo];
    let b = &system.particles[hi];
    let offset = a.position - b.position;
    let distance = offset.length();
    let terms = pair_terms(
        system.kernel,
        a,
        &system.coefficients[lo],
        b,
        &system.coefficients[hi],
        offset,
        distance,
    );
    if distance <= 0.0 {
        return Block::zeros();
    }
    let normal = offset / distance;
    let axial = outer_product(normal, normal);
    let transverse = block_identity() - axial;
    (axial * terms.longitudinal + transverse * terms.transverse) * (dt * dt)
        + block_identity() * (dt * terms.damping)
}

impl ImplicitCohesionSolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// System matrix of the last solve.
    pub fn matrix(&self) -> &BlockSparseMatrix {
        &self.matrix
    }

    /// Assembles the system matrix for the current particle state.
    ///
    /// Returns the number of dropped pairs.
    pub fn assemble(
        &mut self,
        system: &PairSystem<'_>,
        dt: Real,
        radius: Real,
        threshold: Real,
    ) -> usize {
        let particles = system.particles;
        let rows: Vec<(BlockRow, usize)> = (0..particles.len())
            .into_par_iter()
            .map(|i| {
                let mut row = BlockRow {
                    diagonal: block_identity() * particles[i].mass,
                    entries: Vec::with_capacity(system.neighbors[i].len()),
                };
                let mut dropped = 0;
                for neighbor in &system.neighbors[i] {
                    let j = neighbor.index;
                    if neighbor.distance > radius {
                        continue;
                    }
                    let block = pair_block(system, i, j, dt);
                    let floor = threshold * particles[i].mass.min(particles[j].mass);
                    if block.norm() < floor {
                        if i < j {
                            dropped += 1;
                        }
                        continue;
                    }
                    row.diagonal += block;
                    row.entries.push((j, -block));
                }
                row.entries.sort_unstable_by_key(|&(column, _)| column);
                (row, dropped)
            })
            .collect();

        let dropped = rows.iter().map(|(_, dropped)| dropped).sum();
        self.rows.clear();
        self.rows.extend(rows.into_iter().map(|(row, _)| row));
        self.matrix.assign_rows(&self.rows);
        dropped
    }

    /// Replaces `velocities` with the backward-Euler update.
    ///
    /// On `Err` the velocities are left untouched. A solve that hits the
    /// iteration cap still returns `Ok` with the best iterate applied.
    pub fn solve(
        &mut self,
        ctx: &StepContext<'_>,
        system: &PairSystem<'_>,
        velocities: &mut [Vector],
    ) -> SimResult<ImplicitSolveReport> {
        let diverged = SimError::NumericalDivergence {
            stage: Stage::ImplicitSolve,
        };
        let params = &ctx.config.particles;
        let dt = ctx.dt;
        let n = system.particles.len();
        if velocities.len() != n || system.forces.len() != n || system.neighbors.len() != n {
            return Err(SimError::InvalidConfiguration(format!(
                "implicit solve over {n} particles given {} velocities",
                velocities.len()
            )));
        }

        let dropped_blocks = self.assemble(
            system,
            dt,
            ctx.config.jacobian_radius(),
            params.jacobian_entry_threshold,
        );
        if !self.matrix.all_finite() {
            return Err(diverged);
        }

        self.rhs.clear();
        self.solution.clear();
        let state = system.particles.iter().zip(system.forces).zip(velocities.iter());
        for ((particle, force), velocity) in state {
            let b = particle.mass * *velocity + dt * *force;
            self.rhs.extend([b.x, b.y]);
            self.solution.extend([velocity.x, velocity.y]);
        }

        let outcome = self.pcg.solve(
            &self.matrix,
            &self.rhs,
            &mut self.solution,
            PcgSettings {
                tolerance: params.cg_tolerance,
                max_iterations: params.cg_max_iterations,
            },
            Stage::ImplicitSolve,
        )?;
        if !self.solution.iter().all(|v| v.is_finite()) {
            return Err(diverged);
        }

        for (velocity, solved) in velocities.iter_mut().zip(self.solution.chunks_exact(2)) {
            *velocity = Vector::new(solved[0], solved[1]);
        }

        let report = ImplicitSolveReport {
            outcome,
            stored_blocks: self.matrix.stored_blocks(),
            mean_row_blocks: self.matrix.mean_row_blocks(),
            dropped_blocks,
        };
        debug!(
            "implicit solve: {} iterations, residual {:.2e}, {:.1} blocks/row",
            outcome.iterations, outcome.relative_residual, report.mean_row_blocks
        );
        Ok(report)
    }
}
