//! Sparse map from chunk-grid positions to stored chunk locations.

use std::collections::BTreeMap;

use h5store_format::ChunkRecord;
use log::debug;

use crate::error::{Error, Result};
use crate::grid::ChunkGrid;
use crate::store_info::StoreInfo;

/// Lookup policy knobs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirectoryOptions {
    /// Also report the linear index when a coordinate lookup hits an
    /// unwritten chunk. Off by default: a miss echoes only the coordinate.
    pub index_on_coordinate_miss: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StoredChunk {
    address: u64,
    size: u64,
    filter_mask: u32,
}

/// Written chunks of one dataset, keyed by linear grid position.
#[derive(Debug, Clone)]
pub struct ChunkDirectory {
    grid: ChunkGrid,
    chunks: BTreeMap<u64, StoredChunk>,
    options: DirectoryOptions,
}

impl ChunkDirectory {
    /// Index `records` against `grid`.
    ///
    /// A record whose offset is not a chunk origin inside the grid, or that
    /// repeats another record's position, means the container's index is
    /// corrupt and fails the build with [`Error::LayoutUnavailable`].
    pub fn build<I>(grid: ChunkGrid, records: I, options: DirectoryOptions) -> Result<Self>
    where
        I: IntoIterator<Item = ChunkRecord>,
    {
        let mut chunks = BTreeMap::new();
        for record in records {
            let index = grid.linear_index(&record.offset).map_err(|e| {
                Error::LayoutUnavailable(format!(
                    "chunk index holds offset {:?}: {e}",
                    record.offset
                ))
            })?;
            let stored = StoredChunk {
                address: record.address,
                size: record.size,
                filter_mask: record.filter_mask,
            };
            if chunks.insert(index, stored).is_some() {
                return Err(Error::LayoutUnavailable(format!(
                    "chunk index lists offset {:?} twice",
                    record.offset
                )));
            }
        }
        debug!(
            "chunk directory: {} of {} chunks written",
            chunks.len(),
            grid.num_chunks()
        );
        Ok(ChunkDirectory {
            grid,
            chunks,
            options,
        })
    }

    pub fn grid(&self) -> &ChunkGrid {
        &self.grid
    }

    pub fn options(&self) -> DirectoryOptions {
        self.options
    }

    /// Number of written chunks.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Every written chunk, ascending by index.
    pub fn list_all(&self) -> Vec<StoreInfo> {
        self.chunks
            .iter()
            .map(|(&index, stored)| self.written(index, None, stored))
            .collect()
    }

    /// The chunk at grid position `index`.
    pub fn get_by_index(&self, index: u64) -> Result<StoreInfo> {
        if index >= self.grid.num_chunks() {
            return Err(Error::index_out_of_range(index, self.grid.num_chunks()));
        }
        Ok(match self.chunks.get(&index) {
            Some(stored) => self.written(index, None, stored),
            None => StoreInfo::unwritten(Some(index), None),
        })
    }

    /// The chunk whose origin is `coordinate`.
    pub fn get_by_coordinate(&self, coordinate: &[u64]) -> Result<StoreInfo> {
        let index = self.grid.linear_index(coordinate)?;
        Ok(match self.chunks.get(&index) {
            Some(stored) => self.written(index, Some(coordinate.to_vec()), stored),
            None => {
                let reported = self.options.index_on_coordinate_miss.then_some(index);
                StoreInfo::unwritten(reported, Some(coordinate.to_vec()))
            }
        })
    }

    fn written(&self, index: u64, coordinate: Option<Vec<u64>>, stored: &StoredChunk) -> StoreInfo {
        // every key was produced by linear_index, so it is inside the grid
        let chunk_offset = coordinate.or_else(|| self.grid.coordinate(index).ok());
        StoreInfo {
            index: Some(index),
            chunk_offset,
            file_offset: Some(stored.address),
            size: stored.size,
            filter_mask: stored.filter_mask,
        }
    }
}
