//! Helper functions for materials

/// Sanity ranges for material coefficients
pub mod check {
    #[inline]
    pub fn density_ok(density: f32) -> bool {
        density > 0.0 && density < 50000.0 && density.is_finite()
    }

    #[inline]
    pub fn viscosity_ok(viscosity: f32) -> bool {
        viscosity >= 0.0 && viscosity < 1e6 && viscosity.is_finite()
    }

    #[inline]
    pub fn stiffness_ok(stiffness: f32) -> bool {
        stiffness >= 0.0 && stiffness < 1e9 && stiffness.is_finite()
    }

    /// Explicit drag `v += c * dt * (v_grid - v)` overshoots once `c * dt >= 1`.
    #[inline]
    pub fn drag_ok(drag_coefficient: f32, dt: f32) -> bool {
        drag_coefficient >= 0.0 && drag_coefficient * dt < 1.0
    }

    /// Blob materials hold together only when cohesion dominates pressure.
    #[inline]
    pub fn cohesion_ratio_ok(cohesion: f32, pressure: f32, min_ratio: f32) -> bool {
        cohesion >= pressure * min_ratio
    }
}
