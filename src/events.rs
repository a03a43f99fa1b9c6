//! User input consumed by the simulation.
//!
//! Input can arrive at any time from the host; it is queued and applied
//! atomically at the start of the next tick.

use std::collections::VecDeque;

use crate::materials::MaterialId;
use crate::math::{Real, Vector};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PaintEvent {
    pub position: Vector,
    pub material: MaterialId,
    pub radius: Real,
}

/// Gaussian velocity impulse applied to the grid once.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JetImpulse {
    pub position: Vector,
    /// Velocity change at the jet center.
    pub impulse: Vector,
    pub radius: Real,
}

/// Forcing applied to the grid. The rotation rate persists until replaced;
/// jets fire on the tick they are applied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExternalForcing {
    /// Plate angular velocity in rad/s, counter-clockwise positive.
    pub rotation_rate: Real,
    pub jet_impulses: Vec<JetImpulse>,
}

impl ExternalForcing {
    pub fn rotation(rotation_rate: Real) -> Self {
        Self {
            rotation_rate,
            jet_impulses: Vec::new(),
        }
    }

    pub fn with_jet(mut self, jet: JetImpulse) -> Self {
        self.jet_impulses.push(jet);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SimInput {
    Paint(PaintEvent),
    Forcing(ExternalForcing),
}

/// FIFO of pending inputs.
#[derive(Debug, Clone, Default)]
pub struct InputQueue {
    pending: VecDeque<SimInput>,
}

impl InputQueue {
    pub fn push(&mut self, input: SimInput) {
        self.pending.push_back(input);
    }

    pub fn paint(&mut self, event: PaintEvent) {
        self.push(SimInput::Paint(event));
    }

    pub fn forcing(&mut self, forcing: ExternalForcing) {
        self.push(SimInput::Forcing(forcing));
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Takes every pending input in arrival order.
    pub fn drain(&mut self) -> impl Iterator<Item = SimInput> + '_ {
        self.pending.drain(..)
    }
}
