//! Jacobi-preconditioned conjugate gradient over any [`LinearOperator`].
//!
//! Shared by the implicit particle solve and the grid pressure projection.

use nalgebra::DVector;
use rayon::prelude::*;

use crate::error::{SimError, SimResult, Stage};
use crate::math::Real;
use crate::solver::sparse::LinearOperator;

/// Vectors shorter than this are reduced serially. 1024 unknowns is a
/// 32x32 grid or 512 particles.
const PAR_MIN_LEN: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PcgSettings {
    /// Stop once `|r| / |b|` drops to this value.
    pub tolerance: Real,
    pub max_iterations: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PcgOutcome {
    pub iterations: usize,
    pub relative_residual: Real,
    pub converged: bool,
}

impl PcgOutcome {
    /// Degraded-quality fault when the cap was hit.
    pub fn as_fault(&self) -> Option<SimError> {
        (!self.converged).then_some(SimError::SolverNonConvergence {
            iterations: self.iterations,
            residual: self.relative_residual,
        })
    }
}

/// Scratch vectors kept between solves.
#[derive(Debug, Clone)]
pub struct PcgSolver {
    residual: DVector<Real>,
    preconditioned: DVector<Real>,
    direction: DVector<Real>,
    product: DVector<Real>,
    inv_diagonal: DVector<Real>,
    best: DVector<Real>,
}

impl Default for PcgSolver {
    fn default() -> Self {
        Self::new()
    }
}

fn resize(vector: &mut DVector<Real>, len: usize) {
    if vector.len() != len {
        *vector = DVector::zeros(len);
    }
}

#[inline]
pub fn dot(a: &[Real], b: &[Real]) -> Real {
    if a.len() >= PAR_MIN_LEN {
        a.par_iter().zip(b.par_iter()).map(|(x, y)| x * y).sum()
    } else {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }
}

#[inline]
pub fn norm(a: &[Real]) -> Real {
    dot(a, a).sqrt()
}

/// `y += alpha * x`
#[inline]
fn axpy(alpha: Real, x: &[Real], y: &mut [Real]) {
    if y.len() >= PAR_MIN_LEN {
        y.par_iter_mut().zip(x.par_iter()).for_each(|(y, x)| *y += alpha * x);
    } else {
        y.iter_mut().zip(x).for_each(|(y, x)| *y += alpha * x);
    }
}

impl PcgSolver {
    pub fn new() -> Self {
        Self {
            residual: DVector::zeros(0),
            preconditioned: DVector::zeros(0),
            direction: DVector::zeros(0),
            product: DVector::zeros(0),
            inv_diagonal: DVector::zeros(0),
            best: DVector::zeros(0),
        }
    }

    /// Solves `A x = b` starting from the contents of `x`.
    ///
    /// On hitting the iteration cap the iterate with the smallest residual is
    /// left in `x` and the outcome reports `converged == false`. Non-finite
    /// input or iterates abort with `NumericalDivergence` and leave `x` in an
    /// unspecified state.
    pub fn solve<A: LinearOperator>(
        &mut self,
        operator: &A,
        b: &[Real],
        x: &mut [Real],
        settings: PcgSettings,
        stage: Stage,
    ) -> SimResult<PcgOutcome> {
        let n = operator.dim();
        let diverged = Err(SimError::NumericalDivergence { stage });
        if b.len() != n || x.len() != n {
            return Err(SimError::InvalidConfiguration(format!(
                "system of size {n} given vectors of {} and {}",
                b.len(),
                x.len()
            )));
        }
        if !b.iter().chain(x.iter()).all(|v| v.is_finite()) {
            return diverged;
        }

        let b_norm = norm(b);
        if b_norm <= Real::MIN_POSITIVE {
            x.fill(0.0);
            return Ok(PcgOutcome {
                iterations: 0,
                relative_residual: 0.0,
                converged: true,
            });
        }

        for vector in [
            &mut self.residual,
            &mut self.preconditioned,
            &mut self.direction,
            &mut self.product,
            &mut self.inv_diagonal,
            &mut self.best,
        ] {
            resize(vector, n);
        }

        operator.diagonal(self.inv_diagonal.as_mut_slice());
        for d in self.inv_diagonal.iter_mut() {
            *d = if *d > Real::EPSILON { 1.0 / *d } else { 1.0 };
        }

        // r = b - A x
        operator.apply(x, self.product.as_mut_slice());
        for ((r, b), ax) in self.residual.iter_mut().zip(b).zip(self.product.iter()) {
            *r = b - ax;
        }

        let mut relative = norm(self.residual.as_slice()) / b_norm;
        if !relative.is_finite() {
            return diverged;
        }
        let mut best_relative = relative;
        self.best.as_mut_slice().copy_from_slice(x);
        if relative <= settings.tolerance {
            return Ok(PcgOutcome {
                iterations: 0,
                relative_residual: relative,
                converged: true,
            });
        }

        self.preconditioned
            .zip_zip_apply(&self.residual, &self.inv_diagonal, |z, r, d| *z = r * d);
        self.direction.copy_from(&self.preconditioned);
        let mut rz = dot(self.residual.as_slice(), self.preconditioned.as_slice());

        let mut iterations = 0;
        while iterations < settings.max_iterations {
            iterations += 1;
            operator.apply(self.direction.as_slice(), self.product.as_mut_slice());
            let curvature = dot(self.direction.as_slice(), self.product.as_slice());
            if !curvature.is_finite() {
                return diverged;
            }
            if curvature <= 0.0 {
                break;
            }

            let alpha = rz / curvature;
            axpy(alpha, self.direction.as_slice(), x);
            axpy(-alpha, self.product.as_slice(), self.residual.as_mut_slice());

            relative = norm(self.residual.as_slice()) / b_norm;
            if !relative.is_finite() {
                return diverged;
            }
            if relative < best_relative {
                best_relative = relative;
                self.best.as_mut_slice().copy_from_slice(x);
            }
            if relative <= settings.tolerance {
                return Ok(PcgOutcome {
                    iterations,
                    relative_residual: relative,
                    converged: true,
                });
            }

            self.preconditioned
                .zip_zip_apply(&self.residual, &self.inv_diagonal, |z, r, d| *z = r * d);
            let rz_next = dot(self.residual.as_slice(), self.preconditioned.as_slice());
            let beta = rz_next / rz;
            rz = rz_next;
            self.direction
                .zip_apply(&self.preconditioned, |p, z| *p = z + beta * *p);
        }

        if best_relative < relative {
            x.copy_from_slice(self.best.as_slice());
        }
        Ok(PcgOutcome {
            iterations,
            relative_residual: best_relative,
            converged: best_relative <= settings.tolerance,
        })
    }
}
