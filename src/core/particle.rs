//! SPH particles
//!
//! Particles carry position, velocity, mass and the per-tick density and
//! pressure of their material.

use crate::materials::MaterialId;
use crate::math::{Real, Vector, zero_vector};

#[derive(Clone, Debug, PartialEq)]
pub struct Particle {
    pub position: Vector,
    pub velocity: Vector,
    pub mass: Real,
    pub density: Real,
    pub pressure: Real,
    pub material: MaterialId,
    /// Seconds since spawn.
    pub age: Real,

    // Health tracking
    pub failed: bool,
}

impl Particle {
    pub fn new(position: Vector, material: MaterialId) -> Self {
        Self {
            position,
            velocity: zero_vector(),
            mass: 1.0,
            density: 1.0,
            pressure: 0.0,
            material,
            age: 0.0,
            failed: false,
        }
    }

    pub fn with_velocity(mut self, velocity: Vector) -> Self {
        self.velocity = velocity;
        self
    }

    pub fn with_mass(mut self, mass: Real) -> Self {
        self.mass = mass;
        self
    }

    /// Sets mass and starts the particle at its rest density.
    pub fn with_rest_state(mut self, mass: Real, rest_density: Real) -> Self {
        self.mass = mass;
        self.density = rest_density;
        self
    }

    #[inline(always)]
    pub fn momentum(&self) -> Vector {
        self.velocity * self.mass
    }

    /// Zeroes a non-finite velocity and flags particles that cannot be
    /// recovered. Returns true when anything had to be repaired.
    #[inline(always)]
    pub fn update_health(&mut self) -> bool {
        let mut repaired = false;
        if !self.velocity.is_finite() {
            self.velocity = zero_vector();
            repaired = true;
        }
        if !self.density.is_finite() || self.density <= 0.0 || !self.pressure.is_finite() {
            self.pressure = 0.0;
            repaired = true;
        }
        if !self.position.is_finite() || !self.mass.is_finite() || self.mass <= 0.0 {
            self.failed = true;
            repaired = true;
        }
        repaired
    }
}

pub fn update_particles_health(particles: &mut [Particle]) -> usize {
    particles
        .iter_mut()
        .map(|particle| particle.update_health() as usize)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nan_velocity_is_reset_not_failed() {
        let mut particle =
            Particle::new(Vector::new(0.5, 0.5), MaterialId(0)).with_velocity(Vector::NAN);
        assert!(particle.update_health());
        assert_eq!(particle.velocity, Vector::ZERO);
        assert!(!particle.failed);
    }

    #[test]
    fn nan_position_fails_particle() {
        let mut particles = vec![
            Particle::new(Vector::new(Real::NAN, 0.0), MaterialId(0)),
            Particle::new(Vector::new(0.5, 0.5), MaterialId(0)),
        ];
        assert_eq!(update_particles_health(&mut particles), 1);
        assert!(particles[0].failed);
        assert!(!particles[1].failed);
    }
}
