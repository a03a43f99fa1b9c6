use std::collections::HashMap;

use bevy::prelude::IVec2;
use rayon::prelude::*;

use crate::math::{Real, Vector};

pub type PackedCell = u64;

#[inline]
pub fn pack_coords(ix: i32, iy: i32) -> PackedCell {
    ((ix as u32 as u64) << 32) | (iy as u32 as u64)
}

#[inline]
pub fn unpack_coords(id: PackedCell) -> (i32, i32) {
    let ix = (id >> 32) as u32 as i32;
    let iy = id as u32 as i32;
    (ix, iy)
}

/// Neighbour of a particle with the offset `x_i - x_j` and its length.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub index: usize,
    pub offset: Vector,
    pub distance: Real,
}

/// Uniform-cell index over a snapshot of positions.
///
/// Cells are keyed by floor division of the position by the cell size, so a
/// point lying exactly on a cell boundary belongs to the cell above it and is
/// never counted twice. Buckets are filled in index order, which keeps query
/// results deterministic.
#[derive(Clone, Debug)]
pub struct SpatialHashGrid {
    cell_size: Real,
    positions: Vec<Vector>,
    cells: HashMap<PackedCell, Vec<usize>>,
}

impl Default for SpatialHashGrid {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl SpatialHashGrid {
    pub fn new(cell_size: Real) -> Self {
        Self {
            cell_size,
            positions: Vec::new(),
            cells: HashMap::new(),
        }
    }

    pub fn cell_size(&self) -> Real {
        self.cell_size
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn positions(&self) -> &[Vector] {
        &self.positions
    }

    pub fn occupied_cells(&self) -> usize {
        self.cells.len()
    }

    #[inline]
    pub fn cell_of(&self, position: Vector) -> IVec2 {
        (position / self.cell_size).floor().as_ivec2()
    }

    /// Replaces the index with `positions`. Non-finite positions are kept in
    /// the snapshot but never inserted into a cell.
    pub fn rebuild(&mut self, positions: &[Vector], cell_size: Real) {
        self.cell_size = cell_size;
        self.positions.clear();
        self.positions.extend_from_slice(positions);
        self.cells.clear();

        for (index, &position) in positions.iter().enumerate() {
            if !position.is_finite() {
                continue;
            }
            let cell = self.cell_of(position);
            self.cells
                .entry(pack_coords(cell.x, cell.y))
                .or_default()
                .push(index);
        }
    }

    /// Calls `f(index, position - x_index, distance_squared)` for every
    /// indexed point within `radius` of `position`.
    pub fn for_each_neighbor<F>(&self, position: Vector, radius: Real, mut f: F)
    where
        F: FnMut(usize, Vector, Real),
    {
        if radius.is_nan() || radius < 0.0 || !position.is_finite() || self.cells.is_empty() {
            return;
        }
        let radius_sq = radius * radius;
        let lo = self.cell_of(position - Vector::splat(radius));
        let hi = self.cell_of(position + Vector::splat(radius));

        for cy in lo.y..=hi.y {
            for cx in lo.x..=hi.x {
                let Some(bucket) = self.cells.get(&pack_coords(cx, cy)) else {
                    continue;
                };
                for &index in bucket {
                    let offset = position - self.positions[index];
                    let distance_sq = offset.length_squared();
                    if distance_sq <= radius_sq {
                        f(index, offset, distance_sq);
                    }
                }
            }
        }
    }

    pub fn query_neighbors_into(&self, position: Vector, radius: Real, out: &mut Vec<usize>) {
        out.clear();
        self.for_each_neighbor(position, radius, |index, _, _| out.push(index));
    }

    /// All indexed points with `|x - position| <= radius`.
    pub fn query_neighbors(&self, position: Vector, radius: Real) -> Vec<usize> {
        let mut out = Vec::new();
        self.query_neighbors_into(position, radius, &mut out);
        out
    }

    /// Neighbour lists of every indexed point, excluding the point itself.
    pub fn neighbor_lists(&self, radius: Real) -> Vec<Vec<Neighbor>> {
        self.positions
            .par_iter()
            .enumerate()
            .map(|(i, &position)| {
                let mut neighbors = Vec::new();
                self.for_each_neighbor(position, radius, |j, offset, distance_sq| {
                    if j != i {
                        neighbors.push(Neighbor {
                            index: j,
                            offset,
                            distance: distance_sq.sqrt(),
                        });
                    }
                });
                neighbors
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn brute_force(positions: &[Vector], position: Vector, radius: Real) -> Vec<usize> {
        positions
            .iter()
            .enumerate()
            .filter(|(_, p)| (position - **p).length_squared() <= radius * radius)
            .map(|(i, _)| i)
            .collect()
    }

    #[test]
    fn pack_roundtrip_keeps_negative_coordinates() {
        for &(x, y) in &[(0, 0), (-1, 5), (7, -3), (i32::MIN, i32::MAX)] {
            assert_eq!(unpack_coords(pack_coords(x, y)), (x, y));
        }
    }

    #[test]
    fn boundary_points_land_in_exactly_one_cell() {
        let mut hash = SpatialHashGrid::new(0.5);
        let positions = [
            Vector::new(0.5, 0.5),
            Vector::new(1.0, 0.0),
            Vector::new(-0.5, -0.5),
        ];
        hash.rebuild(&positions, 0.5);
        let total: usize = hash.cells.values().map(Vec::len).sum();
        assert_eq!(total, positions.len());
        assert_eq!(hash.cell_of(positions[0]), IVec2::new(1, 1));
        assert_eq!(hash.cell_of(positions[2]), IVec2::new(-1, -1));
    }

    #[test]
    fn queries_match_brute_force() {
        let mut rng = StdRng::seed_from_u64(7);
        for trial in 0..20 {
            let count = rng.random_range(1..400);
            let spread: Real = if trial % 2 == 0 { 1.0 } else { 0.05 };
            let positions: Vec<Vector> = (0..count)
                .map(|_| {
                    Vector::new(
                        rng.random_range(-spread..spread),
                        rng.random_range(-spread..spread),
                    )
                })
                .collect();
            let cell_size = rng.random_range(0.005..0.2);
            let mut hash = SpatialHashGrid::new(cell_size);
            hash.rebuild(&positions, cell_size);

            for _ in 0..25 {
                let query = Vector::new(
                    rng.random_range(-spread..spread),
                    rng.random_range(-spread..spread),
                );
                let radius = rng.random_range(0.0..3.0 * cell_size);
                let mut found = hash.query_neighbors(query, radius);
                found.sort_unstable();
                assert_eq!(found, brute_force(&positions, query, radius));
            }
        }
    }

    #[test]
    fn neighbor_lists_are_symmetric_and_exclude_self() {
        let mut rng = StdRng::seed_from_u64(3);
        let positions: Vec<Vector> = (0..200)
            .map(|_| Vector::new(rng.random_range(0.0..0.1), rng.random_range(0.0..0.1)))
            .collect();
        let mut hash = SpatialHashGrid::new(0.01);
        hash.rebuild(&positions, 0.01);
        let lists = hash.neighbor_lists(0.01);
        for (i, list) in lists.iter().enumerate() {
            for neighbor in list {
                assert_ne!(neighbor.index, i);
                assert!(lists[neighbor.index].iter().any(|n| n.index == i));
            }
        }
    }

    #[test]
    fn non_finite_positions_are_skipped() {
        let mut hash = SpatialHashGrid::new(0.1);
        hash.rebuild(&[Vector::new(Real::NAN, 0.0), Vector::ZERO], 0.1);
        assert_eq!(hash.query_neighbors(Vector::ZERO, 1.0), vec![1]);
        assert!(hash.query_neighbors(Vector::new(Real::NAN, 0.0), 1.0).is_empty());
    }
}
