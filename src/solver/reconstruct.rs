//! Implicit density field over particle positions, consumed by the renderer
//! to draw merged blob surfaces.

use rayon::prelude::*;

use crate::config::FieldParams;
use crate::core::field::Field2;
use crate::geometry::SpatialHashGrid;
use crate::math::{Real, Vector};

/// Render-resolution samples of the density field.
#[derive(Debug, Clone, PartialEq)]
pub struct DensityField {
    values: Field2,
}

impl DensityField {
    pub fn width(&self) -> usize {
        self.values.width()
    }

    pub fn height(&self) -> usize {
        self.values.height()
    }

    pub fn spacing(&self) -> Real {
        self.values.spacing()
    }

    pub fn values(&self) -> &[Real] {
        self.values.data()
    }

    pub fn get(&self, i: usize, j: usize) -> Real {
        self.values.get(i, j)
    }

    /// Position of sample `(i, j)`.
    pub fn position(&self, i: usize, j: usize) -> Vector {
        self.values.position(i, j)
    }

    /// Bilinear interpolation between samples.
    pub fn sample(&self, position: Vector) -> Real {
        self.values.sample(position)
    }
}

#[derive(Debug, Clone)]
pub struct ImplicitFieldReconstructor {
    hash: SpatialHashGrid,
    params: FieldParams,
    domain_size: Real,
}

impl ImplicitFieldReconstructor {
    pub fn new(params: FieldParams, domain_size: Real) -> Self {
        Self {
            hash: SpatialHashGrid::new(params.kernel_radius),
            params,
            domain_size,
        }
    }

    pub fn params(&self) -> &FieldParams {
        &self.params
    }

    /// Snapshots positions; later evaluations ignore particle motion.
    pub fn rebuild(&mut self, positions: &[Vector]) {
        self.hash.rebuild(positions, self.params.kernel_radius);
    }

    /// `sum_j (1 - (d / R)^2)^falloff` over snapshotted particles within `R`.
    pub fn field(&self, x: Real, y: Real) -> Real {
        let radius = self.params.kernel_radius;
        let inv_r2 = 1.0 / (radius * radius);
        let falloff = self.params.falloff_exponent;
        let mut value = 0.0;
        self.hash
            .for_each_neighbor(Vector::new(x, y), radius, |_, _, distance_sq| {
                value += (1.0 - distance_sq * inv_r2).max(0.0).powi(falloff);
            });
        value
    }

    /// Evaluates the field at the cell centers of a `resolution^2` grid
    /// covering the domain.
    pub fn sample_grid(&self) -> DensityField {
        let resolution = self.params.resolution.max(1);
        let spacing = self.domain_size / resolution as Real;
        let origin = 0.5 * spacing;
        let mut values = Field2::new(resolution, resolution, spacing, Vector::splat(origin));
        values.par_fill_with(|i, j| {
            self.field(origin + i as Real * spacing, origin + j as Real * spacing)
        });
        DensityField { values }
    }

    /// Same as [`Self::sample_grid`] but reusing `out`'s allocation.
    pub fn sample_into(&self, out: &mut DensityField) {
        let resolution = self.params.resolution.max(1);
        if out.width() != resolution || out.height() != resolution {
            *out = self.sample_grid();
            return;
        }
        let spacing = out.spacing();
        let origin = 0.5 * spacing;
        out.values.par_fill_with(|i, j| {
            self.field(origin + i as Real * spacing, origin + j as Real * spacing)
        });
    }
}

/// Number of 4-connected regions of samples at or above `threshold`.
pub fn count_regions(field: &DensityField, threshold: Real) -> usize {
    flood_labels(field, |value| value >= threshold).1
}

/// Below-threshold regions that do not touch the field border.
pub fn count_holes(field: &DensityField, threshold: Real) -> usize {
    let (labels, count) = flood_labels(field, |value| value < threshold);
    let (w, h) = (field.width(), field.height());
    let mut touches_border = vec![false; count];
    for j in 0..h {
        for i in 0..w {
            if i == 0 || j == 0 || i + 1 == w || j + 1 == h {
                if let Some(label) = labels[i + j * w] {
                    touches_border[label] = true;
                }
            }
        }
    }
    touches_border.iter().filter(|&&border| !border).count()
}

fn flood_labels<F>(field: &DensityField, inside: F) -> (Vec<Option<usize>>, usize)
where
    F: Fn(Real) -> bool,
{
    let (w, h) = (field.width(), field.height());
    let values = field.values();
    let mut labels = vec![None; w * h];
    let mut count = 0;
    let mut stack = Vec::new();
    for start in 0..w * h {
        if labels[start].is_some() || !inside(values[start]) {
            continue;
        }
        labels[start] = Some(count);
        stack.push(start);
        while let Some(index) = stack.pop() {
            let (i, j) = (index % w, index / w);
            let mut visit = |next: usize| {
                if labels[next].is_none() && inside(values[next]) {
                    labels[next] = Some(count);
                    stack.push(next);
                }
            };
            if i > 0 {
                visit(index - 1);
            }
            if i + 1 < w {
                visit(index + 1);
            }
            if j > 0 {
                visit(index - w);
            }
            if j + 1 < h {
                visit(index + w);
            }
        }
        count += 1;
    }
    (labels, count)
}
