//! 2D SPH smoothing kernels and the blob cohesion kernel.
//!
//! All kernels have compact support `h` and are evaluated from the pair
//! distance, so every pair quantity is symmetric in `(i, j)`.

use std::f32::consts::PI;

use crate::math::Real;

/// Distance ratio `q = d / h` where the cohesion kernel changes sign.
/// Below it cohesion repels, above it attracts.
pub const COHESION_REST_RATIO: Real = 0.272_9;

/// Smoothing kernels for a fixed radius `h`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SphKernel {
    h: Real,
    h2: Real,
    poly6: Real,
    spiky: Real,
    viscosity: Real,
}

impl SphKernel {
    pub fn new(h: Real) -> Self {
        Self {
            h,
            h2: h * h,
            poly6: 4.0 / (PI * h.powi(8)),
            spiky: 30.0 / (PI * h.powi(5)),
            viscosity: 40.0 / (PI * h.powi(5)),
        }
    }

    #[inline]
    pub fn radius(&self) -> Real {
        self.h
    }

    /// Poly6 density kernel `4 / (pi h^8) (h^2 - r^2)^3`.
    #[inline]
    pub fn poly6(&self, distance_sq: Real) -> Real {
        if distance_sq >= self.h2 {
            return 0.0;
        }
        let diff = self.h2 - distance_sq;
        self.poly6 * diff * diff * diff
    }

    /// Signed radial derivative of the spiky kernel, `-30 / (pi h^5) (h - d)^2`.
    #[inline]
    pub fn spiky_gradient(&self, distance: Real) -> Real {
        if distance >= self.h {
            return 0.0;
        }
        let diff = self.h - distance;
        -self.spiky * diff * diff
    }

    /// d/dd of [`Self::spiky_gradient`], non-negative inside the support.
    #[inline]
    pub fn spiky_gradient_derivative(&self, distance: Real) -> Real {
        if distance >= self.h {
            return 0.0;
        }
        2.0 * self.spiky * (self.h - distance)
    }

    /// Laplacian of the viscosity kernel, `40 / (pi h^5) (h - d)`.
    #[inline]
    pub fn viscosity_laplacian(&self, distance: Real) -> Real {
        if distance >= self.h {
            return 0.0;
        }
        self.viscosity * (self.h - distance)
    }

    /// Normalized cohesion kernel at distance `d`, see [`cohesion_shape`].
    #[inline]
    pub fn cohesion(&self, distance: Real) -> Real {
        cohesion_shape(distance / self.h)
    }

    /// d/dq of the cohesion kernel at distance `d`.
    #[inline]
    pub fn cohesion_slope(&self, distance: Real) -> Real {
        cohesion_shape_slope(distance / self.h)
    }
}

/// Piecewise polynomial cohesion shape on `q = d / h`, peak value 1 at
/// `q = 0.5`, value -1 at contact and zero at `q >= 1`.
#[inline]
pub fn cohesion_shape(q: Real) -> Real {
    if !(0.0..1.0).contains(&q) {
        return 0.0;
    }
    let s = (1.0 - q).powi(3) * q.powi(3);
    if q > 0.5 { 64.0 * s } else { 128.0 * s - 1.0 }
}

#[inline]
pub fn cohesion_shape_slope(q: Real) -> Real {
    if !(0.0..1.0).contains(&q) {
        return 0.0;
    }
    let one_minus = 1.0 - q;
    let ds = 3.0 * one_minus * one_minus * q * q * (1.0 - 2.0 * q);
    if q > 0.5 { 64.0 * ds } else { 128.0 * ds }
}

/// Particle mass that makes a square lattice at spacing `h / 2` sit exactly
/// at `rest_density` under the poly6 kernel.
pub fn calibrated_mass(rest_density: Real, h: Real) -> Real {
    let kernel = SphKernel::new(h);
    let spacing = 0.5 * h;
    let mut sum = 0.0;
    for iy in -2..=2 {
        for ix in -2..=2 {
            let x = ix as Real * spacing;
            let y = iy as Real * spacing;
            sum += kernel.poly6(x * x + y * y);
        }
    }
    if sum > 0.0 { rest_density / sum } else { 0.0 }
}

/// Radius of a disk holding `mass` at `rest_density`, used for drawing.
pub fn render_radius(mass: Real, rest_density: Real) -> Real {
    if rest_density > 0.0 {
        (mass / (PI * rest_density)).sqrt()
    } else {
        0.0
    }
}
