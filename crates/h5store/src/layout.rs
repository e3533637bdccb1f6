//! Dataset storage layouts and the provider seam that supplies them.

use h5store_format::ChunkRecord;

use crate::error::Result;
use crate::grid::ChunkGrid;

/// The single byte run of a contiguous dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extent {
    /// Absolute byte offset in the container.
    pub address: u64,
    pub size: u64,
}

/// How a dataset's bytes are arranged, fixed for the dataset's lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatasetLayout {
    /// No declared shape; there is never anything stored.
    Shapeless,
    /// Whole-dataset storage as one byte run, `extent` unset until allocated.
    Contiguous {
        shape: Vec<u64>,
        dtype_size: u64,
        extent: Option<Extent>,
    },
    /// Fixed-shape chunks on a grid.
    Chunked { grid: ChunkGrid, dtype_size: u64 },
}

impl DatasetLayout {
    /// Dataset extent, `None` for a shapeless dataset. Rank 0 is a scalar.
    pub fn shape(&self) -> Option<&[u64]> {
        match self {
            DatasetLayout::Shapeless => None,
            DatasetLayout::Contiguous { shape, .. } => Some(shape),
            DatasetLayout::Chunked { grid, .. } => Some(grid.shape()),
        }
    }

    pub fn dtype_size(&self) -> Option<u64> {
        match self {
            DatasetLayout::Shapeless => None,
            DatasetLayout::Contiguous { dtype_size, .. }
            | DatasetLayout::Chunked { dtype_size, .. } => Some(*dtype_size),
        }
    }

    /// Number of elements, `None` if shapeless or if the count overflows.
    pub fn element_count(&self) -> Option<u64> {
        self.shape()?
            .iter()
            .try_fold(1u64, |acc, &d| acc.checked_mul(d))
    }

    /// Short name of the layout class.
    pub fn kind(&self) -> &'static str {
        match self {
            DatasetLayout::Shapeless => "shapeless",
            DatasetLayout::Contiguous { .. } => "contiguous",
            DatasetLayout::Chunked { .. } => "chunked",
        }
    }
}

/// Supplies a dataset's layout and its persisted chunk-address map.
///
/// [`crate::Dataset`] implements this for HDF5 files; [`StaticLayout`]
/// serves layouts assembled in memory.
pub trait LayoutProvider {
    fn layout(&self) -> Result<DatasetLayout>;

    /// One record per allocated chunk, with absolute addresses. Only
    /// consulted for chunked layouts.
    fn chunk_addresses(&self) -> Result<Vec<ChunkRecord>>;
}

/// A layout and chunk map held in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticLayout {
    pub layout: DatasetLayout,
    pub chunks: Vec<ChunkRecord>,
}

impl StaticLayout {
    pub fn new(layout: DatasetLayout, chunks: Vec<ChunkRecord>) -> Self {
        StaticLayout { layout, chunks }
    }
}

impl LayoutProvider for StaticLayout {
    fn layout(&self) -> Result<DatasetLayout> {
        Ok(self.layout.clone())
    }

    fn chunk_addresses(&self) -> Result<Vec<ChunkRecord>> {
        Ok(self.chunks.clone())
    }
}
