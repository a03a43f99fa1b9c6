//! Block-sparse symmetric matrix with 2x2 blocks, stored as block CSR.
//!
//! Both triangles are stored so that a matrix-vector product is a
//! row-parallel gather with no write conflicts.

use rayon::prelude::*;

use crate::math::{Block, Real, block_is_finite};

/// Rows below this count are multiplied serially.
pub const PAR_MIN_ROWS: usize = 256;

/// Square operator `y = A x` the conjugate-gradient solver can drive.
pub trait LinearOperator: Sync {
    /// Number of scalar unknowns.
    fn dim(&self) -> usize;

    fn apply(&self, x: &[Real], y: &mut [Real]);

    /// Scalar diagonal of the operator, used by the Jacobi preconditioner.
    fn diagonal(&self, out: &mut [Real]);
}

/// One assembled row: the diagonal block and the off-diagonal blocks sorted
/// by column.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlockRow {
    pub diagonal: Block,
    pub entries: Vec<(usize, Block)>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlockSparseMatrix {
    diagonal: Vec<Block>,
    row_offsets: Vec<usize>,
    columns: Vec<usize>,
    blocks: Vec<Block>,
}

impl BlockSparseMatrix {
    pub fn new() -> Self {
        Self {
            row_offsets: vec![0],
            ..Self::default()
        }
    }

    /// Replaces the contents with `rows`, reusing the allocations.
    pub fn assign_rows(&mut self, rows: &[BlockRow]) {
        self.diagonal.clear();
        self.columns.clear();
        self.blocks.clear();
        self.row_offsets.clear();
        self.row_offsets.push(0);

        for row in rows {
            self.diagonal.push(row.diagonal);
            for &(column, block) in &row.entries {
                self.columns.push(column);
                self.blocks.push(block);
            }
            self.row_offsets.push(self.columns.len());
        }
    }

    pub fn from_rows(rows: &[BlockRow]) -> Self {
        let mut matrix = Self::new();
        matrix.assign_rows(rows);
        matrix
    }

    /// Number of block rows (particles).
    pub fn block_rows(&self) -> usize {
        self.diagonal.len()
    }

    /// Off-diagonal blocks plus diagonal blocks.
    pub fn stored_blocks(&self) -> usize {
        self.blocks.len() + self.diagonal.len()
    }

    /// Average number of stored blocks per row.
    pub fn mean_row_blocks(&self) -> Real {
        if self.diagonal.is_empty() {
            0.0
        } else {
            self.stored_blocks() as Real / self.diagonal.len() as Real
        }
    }

    pub fn diagonal_block(&self, row: usize) -> &Block {
        &self.diagonal[row]
    }

    pub fn row(&self, row: usize) -> (&[usize], &[Block]) {
        let range = self.row_offsets[row]..self.row_offsets[row + 1];
        (&self.columns[range.clone()], &self.blocks[range])
    }

    pub fn block(&self, row: usize, column: usize) -> Option<Block> {
        if row == column {
            return self.diagonal.get(row).copied();
        }
        let (columns, blocks) = self.row(row);
        columns
            .binary_search(&column)
            .ok()
            .map(|position| blocks[position])
    }

    pub fn all_finite(&self) -> bool {
        self.diagonal.iter().all(block_is_finite) && self.blocks.iter().all(block_is_finite)
    }

    /// Checks `A_ij == A_ji^T` for every stored block.
    pub fn is_symmetric(&self, tolerance: Real) -> bool {
        let diagonal_ok = self
            .diagonal
            .iter()
            .all(|block| (block - block.transpose()).amax() <= tolerance);
        diagonal_ok
            && (0..self.block_rows()).all(|row| {
                let (columns, blocks) = self.row(row);
                columns.iter().zip(blocks).all(|(&column, block)| {
                    self.block(column, row)
                        .is_some_and(|mirror| (block - mirror.transpose()).amax() <= tolerance)
                })
            })
    }

    fn apply_row(&self, row: usize, x: &[Real], out: &mut [Real]) {
        let xi = nalgebra::Vector2::new(x[2 * row], x[2 * row + 1]);
        let mut acc = self.diagonal[row] * xi;
        let (columns, blocks) = self.row(row);
        for (&column, block) in columns.iter().zip(blocks) {
            acc += block * nalgebra::Vector2::new(x[2 * column], x[2 * column + 1]);
        }
        out[0] = acc.x;
        out[1] = acc.y;
    }
}

impl LinearOperator for BlockSparseMatrix {
    fn dim(&self) -> usize {
        2 * self.diagonal.len()
    }

    fn apply(&self, x: &[Real], y: &mut [Real]) {
        if self.diagonal.len() >= PAR_MIN_ROWS {
            y.par_chunks_mut(2)
                .enumerate()
                .for_each(|(row, out)| self.apply_row(row, x, out));
        } else {
            y.chunks_mut(2)
                .enumerate()
                .for_each(|(row, out)| self.apply_row(row, x, out));
        }
    }

    fn diagonal(&self, out: &mut [Real]) {
        for (row, block) in self.diagonal.iter().enumerate() {
            out[2 * row] = block[(0, 0)];
            out[2 * row + 1] = block[(1, 1)];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coupled_pair() -> BlockSparseMatrix {
        let coupling = Block::new(0.5, 0.1, 0.1, 0.25);
        BlockSparseMatrix::from_rows(&[
            BlockRow {
                diagonal: Block::identity() * 2.0 + coupling,
                entries: vec![(1, -coupling)],
            },
            BlockRow {
                diagonal: Block::identity() * 3.0 + coupling,
                entries: vec![(0, -coupling)],
            },
        ])
    }

    #[test]
    fn matvec_matches_dense_product() {
        let matrix = coupled_pair();
        let x = [1.0, -2.0, 0.5, 4.0];
        let mut y = [0.0; 4];
        matrix.apply(&x, &mut y);

        let mut dense = nalgebra::DMatrix::<Real>::zeros(4, 4);
        for row in 0..2 {
            for column in 0..2 {
                if let Some(block) = matrix.block(row, column) {
                    dense
                        .fixed_view_mut::<2, 2>(2 * row, 2 * column)
                        .copy_from(&block);
                }
            }
        }
        let expected = dense * nalgebra::DVector::from_row_slice(&x);
        for (a, b) in y.iter().zip(expected.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn symmetry_and_density_are_reported() {
        let matrix = coupled_pair();
        assert!(matrix.is_symmetric(0.0));
        assert_eq!(matrix.stored_blocks(), 4);
        assert!((matrix.mean_row_blocks() - 2.0).abs() < 1e-6);

        let mut diagonal = [0.0; 4];
        matrix.diagonal(&mut diagonal);
        assert_eq!(diagonal, [2.5, 2.25, 3.5, 3.25]);
    }
}
