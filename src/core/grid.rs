//! Staggered (MAC) grid layout.
//!
//! `u` lives on vertical faces at `(i * dx, (j + 0.5) * dx)`, `v` on
//! horizontal faces at `((i + 0.5) * dx, j * dx)`, scalars at cell centers.

use crate::core::field::{Field2, FieldData};
use crate::math::{Real, Vector};

/// Geometry of a square `resolution x resolution` MAC grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MacGrid {
    pub resolution: usize,
    pub spacing: Real,
}

impl MacGrid {
    pub fn new(resolution: usize, domain_size: Real) -> Self {
        Self {
            resolution,
            spacing: domain_size / resolution.max(1) as Real,
        }
    }

    #[inline]
    pub fn domain_size(&self) -> Real {
        self.spacing * self.resolution as Real
    }

    #[inline]
    pub fn cell_center(&self, i: usize, j: usize) -> Vector {
        Vector::new((i as Real + 0.5) * self.spacing, (j as Real + 0.5) * self.spacing)
    }

    pub fn scalar_field(&self) -> Field2 {
        let half = 0.5 * self.spacing;
        Field2::new(
            self.resolution,
            self.resolution,
            self.spacing,
            Vector::splat(half),
        )
    }

    pub fn velocity_field(&self) -> VelocityField {
        let half = 0.5 * self.spacing;
        let n = self.resolution;
        VelocityField {
            u: Field2::new(n + 1, n, self.spacing, Vector::new(0.0, half)),
            v: Field2::new(n, n + 1, self.spacing, Vector::new(half, 0.0)),
        }
    }

    /// Clamps a world position into the domain.
    #[inline]
    pub fn clamp_to_domain(&self, position: Vector) -> Vector {
        position.clamp(Vector::ZERO, Vector::splat(self.domain_size()))
    }
}

/// Face-centered velocity components.
#[derive(Debug, Clone, PartialEq)]
pub struct VelocityField {
    pub u: Field2,
    pub v: Field2,
}

impl VelocityField {
    /// Bilinear velocity at a world position, each component sampled on its
    /// own staggered lattice.
    #[inline]
    pub fn sample(&self, position: Vector) -> Vector {
        Vector::new(self.u.sample(position), self.v.sample(position))
    }

    pub fn resolution(&self) -> usize {
        self.v.width()
    }

    pub fn spacing(&self) -> Real {
        self.u.spacing()
    }

    pub fn copy_from(&mut self, other: &VelocityField) {
        self.u.copy_from(&other.u);
        self.v.copy_from(&other.v);
    }

    pub fn fill(&mut self, value: Vector) {
        self.u.fill(value.x);
        self.v.fill(value.y);
    }

    /// Largest face speed, a cheap CFL indicator.
    pub fn max_abs(&self) -> Real {
        self.u.max_abs().max(self.v.max_abs())
    }

    /// Velocity at the center of cell `(i, j)` from the four surrounding faces.
    #[inline]
    pub fn cell_velocity(&self, i: usize, j: usize) -> Vector {
        Vector::new(
            0.5 * (self.u.get(i, j) + self.u.get(i + 1, j)),
            0.5 * (self.v.get(i, j) + self.v.get(i, j + 1)),
        )
    }

    /// Discrete divergence of cell `(i, j)`.
    #[inline]
    pub fn divergence(&self, i: usize, j: usize) -> Real {
        let dx = self.spacing();
        (self.u.get(i + 1, j) - self.u.get(i, j) + self.v.get(i, j + 1) - self.v.get(i, j)) / dx
    }

    /// Root-mean-square divergence over all cells.
    pub fn divergence_rms(&self) -> Real {
        let n = self.resolution();
        if n == 0 {
            return 0.0;
        }
        let mut sum = 0.0;
        for j in 0..n {
            for i in 0..n {
                let d = self.divergence(i, j);
                sum += d * d;
            }
        }
        (sum / (n * n) as Real).sqrt()
    }

    /// Zeroes the wall-normal faces.
    pub fn enforce_walls(&mut self) {
        let n = self.resolution();
        for j in 0..n {
            self.u.set(0, j, 0.0);
            self.u.set(n, j, 0.0);
        }
        for i in 0..n {
            self.v.set(i, 0, 0.0);
            self.v.set(i, n, 0.0);
        }
    }
}

impl FieldData for VelocityField {
    fn all_finite(&self) -> bool {
        self.u.all_finite() && self.v.all_finite()
    }
}
