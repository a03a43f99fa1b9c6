use bevy::prelude::*;

use crate::config::constants::*;
use crate::error::{SimError, SimResult};
use crate::math::{Real, Vector};

/// Time integration used for the particle velocity update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IntegrationScheme {
    /// Linearized backward Euler solved with preconditioned CG.
    #[default]
    BackwardEuler,
    /// Forward explicit Euler. Only stable for soft materials.
    ExplicitEuler,
}

/// Response applied to grid faces and particles close to the walls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BoundaryMode {
    /// Elastic reflection of the wall-normal velocity component.
    #[default]
    Reflect,
    /// Velocity damping that grows toward the wall.
    ViscousDrag,
    /// Inward push proportional to the penetration depth into the band.
    SoftRepulsion,
}

/// What happens when a spawn batch would exceed the particle cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CapPolicy {
    #[default]
    EvictOldest,
    RejectSpawn,
}

/// Direction of the body force pulling particles together.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum AttractionMode {
    /// Toward the plate center.
    #[default]
    Center,
    /// Constant direction, like conventional gravity. The vector is normalized.
    Direction(Vector),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundaryParams {
    pub mode: BoundaryMode,
    /// Width of the response band in world units.
    pub band: Real,
    /// Damping rate (1/s) for `ViscousDrag`, push acceleration for `SoftRepulsion`.
    pub strength: Real,
    /// Fraction of normal speed kept by `Reflect`.
    pub restitution: Real,
}

impl Default for BoundaryParams {
    fn default() -> Self {
        Self {
            mode: BoundaryMode::Reflect,
            band: 2.0 * DOMAIN_SIZE / GRID_RESOLUTION as Real,
            strength: 20.0,
            restitution: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GridParams {
    /// Cells per side of the square MAC grid.
    pub resolution: usize,
    /// Kinematic viscosity of the grid fluid.
    pub viscosity: Real,
    pub viscosity_iterations: usize,
    pub pressure_iterations: usize,
    /// Relative residual the pressure solve stops at.
    pub pressure_tolerance: Real,
    /// Vorticity confinement strength, zero disables the pass.
    pub vorticity_strength: Real,
    /// Rate (1/s) at which the rotating plate drags the fluid toward rigid rotation.
    pub plate_coupling: Real,
}

impl Default for GridParams {
    fn default() -> Self {
        Self {
            resolution: GRID_RESOLUTION,
            viscosity: 1e-4,
            viscosity_iterations: 20,
            pressure_iterations: PRESSURE_ITERATIONS,
            pressure_tolerance: PRESSURE_TOLERANCE,
            vorticity_strength: 0.0,
            plate_coupling: 4.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParticleParams {
    /// SPH smoothing radius `h`, also the spatial hash cell size.
    pub smoothing_radius: Real,
    pub particle_cap: usize,
    pub cap_policy: CapPolicy,
    pub attraction: AttractionMode,
    pub integration: IntegrationScheme,
    /// Jacobian assembly radius as a fraction of `h` (0, 1].
    pub jacobian_radius_factor: Real,
    /// Blocks below `threshold * mass` are dropped from the system matrix.
    pub jacobian_entry_threshold: Real,
    pub cg_tolerance: Real,
    pub cg_max_iterations: usize,
}

impl Default for ParticleParams {
    fn default() -> Self {
        Self {
            smoothing_radius: SMOOTHING_RADIUS,
            particle_cap: PARTICLE_CAP,
            cap_policy: CapPolicy::EvictOldest,
            attraction: AttractionMode::Center,
            integration: IntegrationScheme::BackwardEuler,
            jacobian_radius_factor: 1.0,
            jacobian_entry_threshold: JACOBIAN_ENTRY_THRESHOLD,
            cg_tolerance: CG_TOLERANCE,
            cg_max_iterations: CG_MAX_ITERATIONS,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CouplingParams {
    /// Fraction of the normalized particle velocity blended into touched faces.
    pub deposit_blend: Real,
    pub deposit_enabled: bool,
}

impl Default for CouplingParams {
    fn default() -> Self {
        Self {
            deposit_blend: 0.2,
            deposit_enabled: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldParams {
    /// Sampling grid cells per side.
    pub resolution: usize,
    /// Metaball kernel radius `R`.
    pub kernel_radius: Real,
    /// Exponent of `(1 - (d/R)^2)`.
    pub falloff_exponent: i32,
    /// Iso-value the renderer treats as the blob surface.
    pub surface_threshold: Real,
}

impl Default for FieldParams {
    fn default() -> Self {
        Self {
            resolution: FIELD_RESOLUTION,
            kernel_radius: 2.5 * SMOOTHING_RADIUS,
            falloff_exponent: 2,
            surface_threshold: SURFACE_THRESHOLD,
        }
    }
}

/// Top-level simulation configuration.
#[derive(Resource, Debug, Clone, PartialEq)]
pub struct SimConfig {
    pub dt: Real,
    /// Side of the square domain `[0, domain_size]^2`.
    pub domain_size: Real,
    pub plate_radius: Real,
    /// Distance past the plate edge at which particles are deleted.
    pub removal_tolerance: Real,
    /// Seed for spawn jitter.
    pub seed: u64,
    pub boundary: BoundaryParams,
    pub grid: GridParams,
    pub particles: ParticleParams,
    pub coupling: CouplingParams,
    pub field: FieldParams,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            dt: TIMESTEP,
            domain_size: DOMAIN_SIZE,
            plate_radius: PLATE_RADIUS,
            removal_tolerance: REMOVAL_TOLERANCE,
            seed: 0x5eed,
            boundary: BoundaryParams::default(),
            grid: GridParams::default(),
            particles: ParticleParams::default(),
            coupling: CouplingParams::default(),
            field: FieldParams::default(),
        }
    }
}

impl SimConfig {
    pub fn plate_center(&self) -> Vector {
        Vec2::splat(self.domain_size * 0.5)
    }

    /// Radius past which particles are deleted.
    pub fn removal_radius(&self) -> Real {
        self.plate_radius + self.removal_tolerance
    }

    pub fn grid_spacing(&self) -> Real {
        self.domain_size / self.grid.resolution.max(1) as Real
    }

    /// Absolute radius used for Jacobian assembly.
    pub fn jacobian_radius(&self) -> Real {
        self.particles.smoothing_radius * self.particles.jacobian_radius_factor.clamp(0.0, 1.0)
    }

    pub fn with_grid_resolution(mut self, resolution: usize) -> Self {
        self.grid.resolution = resolution;
        self.boundary.band = 2.0 * self.domain_size / resolution.max(1) as Real;
        self
    }

    pub fn with_integration(mut self, integration: IntegrationScheme) -> Self {
        self.particles.integration = integration;
        self
    }

    pub fn with_attraction(mut self, attraction: AttractionMode) -> Self {
        self.particles.attraction = attraction;
        self
    }

    pub fn with_boundary_mode(mut self, mode: BoundaryMode) -> Self {
        self.boundary.mode = mode;
        self
    }

    pub fn with_particle_cap(mut self, cap: usize, policy: CapPolicy) -> Self {
        self.particles.particle_cap = cap;
        self.particles.cap_policy = policy;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Rejects configurations the solver cannot run with at all.
    pub fn validate(&self) -> SimResult<()> {
        let fail = |msg: &str| Err(SimError::InvalidConfiguration(msg.to_string()));
        if !(self.dt.is_finite() && self.dt > 0.0) {
            return fail("timestep must be positive and finite");
        }
        if !(self.domain_size.is_finite() && self.domain_size > 0.0) {
            return fail("domain size must be positive and finite");
        }
        if self.grid.resolution < MIN_GRID_RESOLUTION {
            return fail("grid resolution must be at least 4");
        }
        if !(self.particles.smoothing_radius.is_finite() && self.particles.smoothing_radius > 0.0)
        {
            return fail("smoothing radius must be positive and finite");
        }
        let kernel_radius = self.field.kernel_radius;
        if self.field.resolution == 0 || kernel_radius.is_nan() || kernel_radius <= 0.0 {
            return fail("field sampling needs a resolution and a positive kernel radius");
        }
        Ok(())
    }

    /// Parameters that run but degrade the result. Reported, never corrected.
    pub fn warnings(&self) -> Vec<SimError> {
        let mut warnings = Vec::new();
        let factor = self.particles.jacobian_radius_factor;
        if !(factor > 0.0 && factor <= 1.0) {
            warnings.push(SimError::InvalidConfiguration(format!(
                "jacobian radius factor {factor} outside (0, 1], clamped at assembly"
            )));
        }
        if self.particles.particle_cap == 0 {
            warnings.push(SimError::InvalidConfiguration(
                "particle cap is zero, every spawn will be dropped".to_string(),
            ));
        }
        if self.plate_radius * 2.0 > self.domain_size {
            warnings.push(SimError::InvalidConfiguration(
                "plate is larger than the domain".to_string(),
            ));
        }
        if self.coupling.deposit_blend > 1.0 || self.coupling.deposit_blend < 0.0 {
            warnings.push(SimError::InvalidConfiguration(format!(
                "deposit blend {} outside [0, 1]",
                self.coupling.deposit_blend
            )));
        }
        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid_and_quiet() {
        let config = SimConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.warnings().is_empty());
        assert!((config.jacobian_radius() - SMOOTHING_RADIUS).abs() < 1e-9);
    }

    #[test]
    fn zero_timestep_is_rejected() {
        let mut config = SimConfig::default();
        config.dt = 0.0;
        assert!(matches!(
            config.validate(),
            Err(SimError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn oversized_jacobian_radius_is_only_a_warning() {
        let mut config = SimConfig::default();
        config.particles.jacobian_radius_factor = 1.5;
        assert!(config.validate().is_ok());
        assert_eq!(config.warnings().len(), 1);
        assert!((config.jacobian_radius() - config.particles.smoothing_radius).abs() < 1e-9);
    }
}
