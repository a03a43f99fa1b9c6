//! Sampled scalar fields and the double-buffer wrapper every grid pass
//! writes through.

use rayon::prelude::*;

use crate::error::{SimError, SimResult, Stage};
use crate::math::{Real, Vector};

/// Data that can be checked for NaN/Inf after a pass.
pub trait FieldData {
    fn all_finite(&self) -> bool;
}

/// Bilinear stencil of a sample position: four flat indices and weights.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stencil {
    pub indices: [usize; 4],
    pub weights: [Real; 4],
}

/// Regular `width x height` lattice of samples with spacing `spacing`,
/// sample `(0, 0)` sitting at `origin`.
#[derive(Debug, Clone, PartialEq)]
pub struct Field2 {
    width: usize,
    height: usize,
    spacing: Real,
    origin: Vector,
    data: Vec<Real>,
}

impl Field2 {
    pub fn new(width: usize, height: usize, spacing: Real, origin: Vector) -> Self {
        Self {
            width,
            height,
            spacing,
            origin,
            data: vec![0.0; width * height],
        }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn spacing(&self) -> Real {
        self.spacing
    }

    #[inline]
    pub fn index(&self, i: usize, j: usize) -> usize {
        i + j * self.width
    }

    #[inline]
    pub fn get(&self, i: usize, j: usize) -> Real {
        self.data[self.index(i, j)]
    }

    #[inline]
    pub fn set(&mut self, i: usize, j: usize, value: Real) {
        let index = self.index(i, j);
        self.data[index] = value;
    }

    /// World position of sample `(i, j)`.
    #[inline]
    pub fn position(&self, i: usize, j: usize) -> Vector {
        self.origin + Vector::new(i as Real, j as Real) * self.spacing
    }

    pub fn data(&self) -> &[Real] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [Real] {
        &mut self.data
    }

    pub fn fill(&mut self, value: Real) {
        self.data.fill(value);
    }

    pub fn copy_from(&mut self, other: &Field2) {
        self.data.copy_from_slice(&other.data);
    }

    pub fn max_abs(&self) -> Real {
        self.data.iter().fold(0.0, |acc: Real, v| acc.max(v.abs()))
    }

    pub fn sum(&self) -> Real {
        self.data.iter().sum()
    }

    pub fn min_max(&self) -> (Real, Real) {
        self.data
            .iter()
            .fold((Real::INFINITY, Real::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            })
    }

    /// Writes `f(i, j)` into every sample, one rayon task per row.
    pub fn par_fill_with<F>(&mut self, f: F)
    where
        F: Fn(usize, usize) -> Real + Sync,
    {
        let width = self.width;
        self.data
            .par_chunks_mut(width.max(1))
            .enumerate()
            .for_each(|(j, row)| {
                for (i, value) in row.iter_mut().enumerate() {
                    *value = f(i, j);
                }
            });
    }

    /// Bilinear stencil around `position`, clamped to the sampled region.
    pub fn stencil(&self, position: Vector) -> Stencil {
        let local = (position - self.origin) / self.spacing;
        let (i0, fx) = axis_stencil(local.x, self.width);
        let (j0, fy) = axis_stencil(local.y, self.height);
        let i1 = (i0 + 1).min(self.width - 1);
        let j1 = (j0 + 1).min(self.height - 1);
        Stencil {
            indices: [
                self.index(i0, j0),
                self.index(i1, j0),
                self.index(i0, j1),
                self.index(i1, j1),
            ],
            weights: [
                (1.0 - fx) * (1.0 - fy),
                fx * (1.0 - fy),
                (1.0 - fx) * fy,
                fx * fy,
            ],
        }
    }

    /// Bilinear interpolation, clamped at the lattice edges.
    pub fn sample(&self, position: Vector) -> Real {
        let stencil = self.stencil(position);
        stencil
            .indices
            .iter()
            .zip(stencil.weights)
            .map(|(&index, weight)| self.data[index] * weight)
            .sum()
    }

    /// Extremes of the four samples around `position`.
    pub fn sample_bounds(&self, position: Vector) -> (Real, Real) {
        let stencil = self.stencil(position);
        stencil
            .indices
            .iter()
            .fold((Real::INFINITY, Real::NEG_INFINITY), |(lo, hi), &index| {
                (lo.min(self.data[index]), hi.max(self.data[index]))
            })
    }
}

#[inline]
fn axis_stencil(coord: Real, len: usize) -> (usize, Real) {
    if len < 2 || !coord.is_finite() {
        return (0, 0.0);
    }
    let max = (len - 1) as Real;
    let clamped = coord.clamp(0.0, max);
    let base = (clamped.floor() as usize).min(len - 2);
    (base, clamped - base as Real)
}

impl FieldData for Field2 {
    fn all_finite(&self) -> bool {
        self.data.iter().all(|v| v.is_finite())
    }
}

/// Read/write buffer pair. A pass reads the front buffer and writes the back
/// buffer; the two are swapped only if every written value is finite.
///
/// The back buffer holds stale data when a pass starts, so passes must write
/// every sample.
#[derive(Debug, Clone)]
pub struct DoubleBuffer<T> {
    front: T,
    back: T,
}

impl<T: FieldData + Clone> DoubleBuffer<T> {
    pub fn new(value: T) -> Self {
        Self {
            back: value.clone(),
            front: value,
        }
    }

    #[inline]
    pub fn current(&self) -> &T {
        &self.front
    }

    /// Runs one pass and swaps. A pass with non-finite output is discarded
    /// and the front buffer stays untouched.
    pub fn step<F>(&mut self, stage: Stage, pass: F) -> SimResult<()>
    where
        F: FnOnce(&T, &mut T),
    {
        pass(&self.front, &mut self.back);
        if self.back.all_finite() {
            std::mem::swap(&mut self.front, &mut self.back);
            Ok(())
        } else {
            Err(SimError::NumericalDivergence { stage })
        }
    }

    /// Replaces both buffers.
    pub fn reset(&mut self, value: T) {
        self.back = value.clone();
        self.front = value;
    }
}
