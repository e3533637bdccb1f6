//! Coordinate codec: conversion between chunk coordinates and linear
//! positions in the chunk grid.
//!
//! Positions enumerate every possible chunk in row-major order (last axis
//! fastest), whether or not it has been written.

use crate::error::{Error, Result};

/// The grid of chunk slots covering a dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkGrid {
    shape: Vec<u64>,
    chunk_shape: Vec<u64>,
    grid_shape: Vec<u64>,
    num_chunks: u64,
}

impl ChunkGrid {
    /// Build the grid for a dataset of `shape` split into `chunk_shape` chunks.
    ///
    /// Fails with [`Error::LayoutUnavailable`] on a rank mismatch, a zero
    /// chunk extent, or a slot count that does not fit in `u64`.
    pub fn new(shape: Vec<u64>, chunk_shape: Vec<u64>) -> Result<Self> {
        if shape.len() != chunk_shape.len() {
            return Err(Error::LayoutUnavailable(format!(
                "chunk rank {} does not match dataset rank {}",
                chunk_shape.len(),
                shape.len()
            )));
        }
        if chunk_shape.contains(&0) {
            return Err(Error::LayoutUnavailable(format!(
                "zero chunk extent in {chunk_shape:?}"
            )));
        }
        let grid_shape: Vec<u64> = shape
            .iter()
            .zip(&chunk_shape)
            .map(|(&d, &c)| d.div_ceil(c))
            .collect();
        let num_chunks = grid_shape
            .iter()
            .try_fold(1u64, |acc, &g| acc.checked_mul(g))
            .ok_or_else(|| {
                Error::LayoutUnavailable(format!("chunk grid {grid_shape:?} overflows"))
            })?;
        Ok(ChunkGrid {
            shape,
            chunk_shape,
            grid_shape,
            num_chunks,
        })
    }

    pub fn shape(&self) -> &[u64] {
        &self.shape
    }

    pub fn chunk_shape(&self) -> &[u64] {
        &self.chunk_shape
    }

    /// Number of chunks along each axis.
    pub fn grid_shape(&self) -> &[u64] {
        &self.grid_shape
    }

    /// Number of chunk slots, written or not.
    pub fn num_chunks(&self) -> u64 {
        self.num_chunks
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// Elements in one full chunk.
    pub fn chunk_elements(&self) -> u64 {
        self.chunk_shape.iter().product()
    }

    /// Linear position of the chunk whose origin is `coordinate`.
    pub fn linear_index(&self, coordinate: &[u64]) -> Result<u64> {
        if coordinate.len() != self.rank() {
            return Err(Error::InvalidCoordinate {
                coordinate: coordinate.to_vec(),
                reason: "rank does not match the dataset",
            });
        }
        let mut index = 0u64;
        for ((&c, &extent), &slots) in coordinate.iter().zip(&self.chunk_shape).zip(&self.grid_shape)
        {
            if c % extent != 0 {
                return Err(Error::InvalidCoordinate {
                    coordinate: coordinate.to_vec(),
                    reason: "not aligned to a chunk boundary",
                });
            }
            let g = c / extent;
            if g >= slots {
                return Err(Error::coordinate_out_of_range(coordinate, self.num_chunks));
            }
            // bounded by num_chunks, which fits
            index = index * slots + g;
        }
        Ok(index)
    }

    /// Array-space origin of the chunk at linear position `index`.
    pub fn coordinate(&self, index: u64) -> Result<Vec<u64>> {
        if index >= self.num_chunks {
            return Err(Error::index_out_of_range(index, self.num_chunks));
        }
        let mut rest = index;
        let mut coordinate = vec![0u64; self.rank()];
        for d in (0..self.rank()).rev() {
            coordinate[d] = (rest % self.grid_shape[d]) * self.chunk_shape[d];
            rest /= self.grid_shape[d];
        }
        Ok(coordinate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> ChunkGrid {
        ChunkGrid::new(vec![24, 16], vec![6, 4]).unwrap()
    }

    #[test]
    fn grid_geometry() {
        let g = grid();
        assert_eq!(g.grid_shape(), &[4, 4]);
        assert_eq!(g.num_chunks(), 16);
        assert_eq!(g.rank(), 2);
        assert_eq!(g.chunk_elements(), 24);
    }

    #[test]
    fn partial_edge_chunks_count() {
        let g = ChunkGrid::new(vec![10, 7], vec![4, 4]).unwrap();
        assert_eq!(g.grid_shape(), &[3, 2]);
        assert_eq!(g.num_chunks(), 6);
        assert_eq!(g.linear_index(&[8, 4]).unwrap(), 5);
    }

    #[test]
    fn row_major_last_axis_fastest() {
        let g = grid();
        assert_eq!(g.linear_index(&[0, 0]).unwrap(), 0);
        assert_eq!(g.linear_index(&[0, 4]).unwrap(), 1);
        assert_eq!(g.linear_index(&[0, 8]).unwrap(), 2);
        assert_eq!(g.linear_index(&[6, 8]).unwrap(), 6);
        assert_eq!(g.linear_index(&[18, 12]).unwrap(), 15);
    }

    #[test]
    fn coordinate_inverts_linear_index() {
        let g = ChunkGrid::new(vec![5, 9, 7], vec![2, 3, 4]).unwrap();
        for i in 0..g.num_chunks() {
            let c = g.coordinate(i).unwrap();
            assert_eq!(g.linear_index(&c).unwrap(), i);
        }
        assert_eq!(g.coordinate(7).unwrap(), vec![2, 0, 4]);
    }

    #[test]
    fn unaligned_coordinate() {
        let err = grid().linear_index(&[3, 4]).unwrap_err();
        assert!(matches!(err, Error::InvalidCoordinate { .. }));
    }

    #[test]
    fn rank_mismatch_coordinate() {
        let err = grid().linear_index(&[0, 0, 0]).unwrap_err();
        assert!(matches!(err, Error::InvalidCoordinate { .. }));
    }

    #[test]
    fn aligned_coordinate_beyond_grid() {
        let err = grid().linear_index(&[24, 0]).unwrap_err();
        assert!(matches!(err, Error::IndexOutOfRange { num_chunks: 16, .. }));
    }

    #[test]
    fn index_beyond_grid() {
        let err = grid().coordinate(16).unwrap_err();
        assert!(matches!(err, Error::IndexOutOfRange { num_chunks: 16, .. }));
    }

    #[test]
    fn invalid_grids() {
        assert!(matches!(
            ChunkGrid::new(vec![4, 4], vec![2]),
            Err(Error::LayoutUnavailable(_))
        ));
        assert!(matches!(
            ChunkGrid::new(vec![4], vec![0]),
            Err(Error::LayoutUnavailable(_))
        ));
        assert!(matches!(
            ChunkGrid::new(vec![u64::MAX, u64::MAX], vec![1, 1]),
            Err(Error::LayoutUnavailable(_))
        ));
    }

    #[test]
    fn empty_extent_has_no_slots() {
        let g = ChunkGrid::new(vec![0, 16], vec![6, 4]).unwrap();
        assert_eq!(g.num_chunks(), 0);
        assert!(g.coordinate(0).is_err());
    }
}
