//! Error types for chunk-store queries.

use h5store_format::FormatError;

/// Errors returned by the chunk directory, the store-info accessor, the
/// byte-range readers and the HDF5 binding.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Coordinate rank differs from the dataset rank, or an axis is not a
    /// multiple of the chunk extent.
    #[error("invalid chunk coordinate {coordinate:?}: {reason}")]
    InvalidCoordinate {
        coordinate: Vec<u64>,
        reason: &'static str,
    },

    /// Index (or aligned coordinate) beyond the chunk grid, or any point
    /// query on a shapeless dataset.
    #[error("chunk {requested} is out of range for a grid of {num_chunks} chunks")]
    IndexOutOfRange { requested: String, num_chunks: u64 },

    /// The backing bytes end before the recorded range does.
    #[error("short read at byte {offset}: wanted {expected} bytes, {available} available")]
    ShortRead {
        offset: u64,
        expected: u64,
        available: u64,
    },

    /// The container's chunk index is missing, corrupt or of a kind this
    /// crate cannot enumerate.
    #[error("storage layout unavailable: {0}")]
    LayoutUnavailable(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HDF5 format error: {0}")]
    Format(#[source] FormatError),

    /// The object at the given path has no data layout message.
    #[error("not a dataset: {0}")]
    NotADataset(String),

    #[error("byte stream is not seekable")]
    NotSeekable,
}

impl Error {
    pub(crate) fn index_out_of_range(index: u64, num_chunks: u64) -> Self {
        Error::IndexOutOfRange {
            requested: format!("index {index}"),
            num_chunks,
        }
    }

    /// Any failure to enumerate a dataset's chunk index.
    pub(crate) fn chunk_index(path: &str, cause: FormatError) -> Self {
        Error::LayoutUnavailable(format!("{path}: chunk index: {cause}"))
    }

    pub(crate) fn coordinate_out_of_range(coordinate: &[u64], num_chunks: u64) -> Self {
        Error::IndexOutOfRange {
            requested: format!("at {coordinate:?}"),
            num_chunks,
        }
    }
}

impl From<FormatError> for Error {
    fn from(e: FormatError) -> Self {
        match e {
            FormatError::DenseLinkStorage
            | FormatError::UnsupportedChunkIndex(_)
            | FormatError::PagedFixedArray => Error::LayoutUnavailable(e.to_string()),
            other => Error::Format(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
