//! Parameter packs for the two material families.
//!
//! Particle materials carry the SPH and cohesion coefficients resolved at
//! spawn time and on every step. Grid materials only describe how paint is
//! splatted into the transported scalar field.

use crate::config;
use crate::math::Real;

/// Physical coefficients of a particle material.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaterialParameters {
    pub rest_density: Real,
    /// Pairwise cohesion stiffness `k`.
    pub cohesion_stiffness: Real,
    /// Equation-of-state stiffness `B`.
    pub pressure_stiffness: Real,
    /// Dynamic viscosity `mu` of the SPH viscosity term.
    pub viscosity: Real,
    /// Rate (1/s) at which particles relax toward the local grid velocity.
    pub drag_coefficient: Real,
    /// Acceleration of the configured attraction body force.
    pub center_attraction_magnitude: Real,
}

impl MaterialParameters {
    pub const fn new(
        rest_density: Real,
        cohesion_stiffness: Real,
        pressure_stiffness: Real,
        viscosity: Real,
        drag_coefficient: Real,
        center_attraction_magnitude: Real,
    ) -> Self {
        Self {
            rest_density,
            cohesion_stiffness,
            pressure_stiffness,
            viscosity,
            drag_coefficient,
            center_attraction_magnitude,
        }
    }

    /// Defaults of the cohesive blob material.
    pub const fn defaults() -> Self {
        Self::new(
            config::constants::REST_DENSITY,
            config::constants::COHESION_STIFFNESS,
            config::constants::EOS_STIFFNESS,
            0.0005,
            2.0,
            0.5,
        )
    }

    pub const fn with_viscosity(mut self, viscosity: Real) -> Self {
        self.viscosity = viscosity;
        self
    }

    pub const fn with_drag(mut self, drag_coefficient: Real) -> Self {
        self.drag_coefficient = drag_coefficient;
        self
    }

    pub const fn with_attraction(mut self, magnitude: Real) -> Self {
        self.center_attraction_magnitude = magnitude;
        self
    }

    pub const fn with_cohesion(mut self, cohesion_stiffness: Real) -> Self {
        self.cohesion_stiffness = cohesion_stiffness;
        self
    }

    pub const fn with_pressure(mut self, pressure_stiffness: Real) -> Self {
        self.pressure_stiffness = pressure_stiffness;
        self
    }
}

impl Default for MaterialParameters {
    fn default() -> Self {
        Self::defaults()
    }
}

/// A material simulated as SPH particles.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParticleMaterial {
    pub name: &'static str,
    pub params: MaterialParameters,
    /// Exponent `gamma` of the Tait equation of state.
    pub eos_power: i32,
    /// Strength of the explicit long-range cohesion relative to `k`.
    pub long_range_cohesion: Real,
    /// Particles created by one paint event.
    pub spawn_count: usize,
    /// Upper bound of the spawn jitter disk.
    pub spawn_radius: Real,
    /// Blob materials must hold together, which constrains `k / B`.
    pub forms_blobs: bool,
}

impl ParticleMaterial {
    pub const fn new(name: &'static str, params: MaterialParameters) -> Self {
        Self {
            name,
            params,
            eos_power: config::constants::EOS_POWER,
            long_range_cohesion: config::constants::LONG_RANGE_COHESION,
            spawn_count: 50,
            spawn_radius: 0.01,
            forms_blobs: true,
        }
    }

    pub const fn blob() -> Self {
        Self::new("blob", MaterialParameters::defaults())
    }

    /// Thicker, slower blob.
    pub const fn honey() -> Self {
        Self::new(
            "honey",
            MaterialParameters::defaults()
                .with_viscosity(0.002)
                .with_drag(1.0),
        )
    }

    /// Loose droplets without cohesion.
    pub const fn spray() -> Self {
        Self {
            long_range_cohesion: 0.0,
            spawn_count: 20,
            forms_blobs: false,
            ..Self::new(
                "spray",
                MaterialParameters::defaults()
                    .with_cohesion(0.0)
                    .with_attraction(0.0),
            )
        }
    }

    pub const fn with_spawn(mut self, count: usize, radius: Real) -> Self {
        self.spawn_count = count;
        self.spawn_radius = radius;
        self
    }
}

/// A material carried by the grid's scalar field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridMaterial {
    pub name: &'static str,
    /// Scalar added at the center of a splat.
    pub deposit: Real,
    /// Ceiling of the scalar field after a splat.
    pub max_thickness: Real,
}

impl GridMaterial {
    pub const fn new(name: &'static str, deposit: Real, max_thickness: Real) -> Self {
        Self {
            name,
            deposit,
            max_thickness,
        }
    }

    pub const fn ink() -> Self {
        Self::new("ink", 0.6, 1.0)
    }

    pub const fn oil_film() -> Self {
        Self::new("oil film", 0.25, 0.5)
    }
}
