//! Chunk-store metadata index for HDF5 datasets.
//!
//! For every dataset in a file this crate answers where each chunk's bytes
//! are, how many bytes are stored, and which filters were skipped, without
//! decoding any of the data.
//!
//! ```no_run
//! use h5store::File;
//!
//! let file = File::open("data.h5").unwrap();
//! let ds = file.dataset("sensors/temperature").unwrap();
//! for info in ds.store().unwrap() {
//!     println!("{:?} at byte {:?}, {} bytes", info.chunk_offset, info.file_offset, info.size);
//! }
//! ```
//!
//! The pieces also work without a file: build a [`DatasetLayout`] and a
//! list of [`ChunkRecord`]s, or implement [`LayoutProvider`], and query a
//! [`StoreInfoAccessor`].

pub mod directory;
pub mod error;
pub mod file;
pub mod grid;
pub mod layout;
pub mod range;
pub mod store_info;

pub use directory::{ChunkDirectory, DirectoryOptions};
pub use error::{Error, Result};
pub use file::{Dataset, File};
pub use grid::ChunkGrid;
pub use layout::{DatasetLayout, Extent, LayoutProvider, StaticLayout};
pub use range::{
    digest_range, ByteRangeReader, ChunkDigest, FileRangeReader, SliceRangeReader,
    DIGEST_ALGORITHM,
};
pub use store_info::{StoreInfo, StoreInfoAccessor};

pub use h5store_format::ChunkRecord;
