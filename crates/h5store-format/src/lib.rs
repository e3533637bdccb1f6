//! Read-only parsing of the HDF5 structures that locate dataset storage.
//!
//! This crate understands just enough of the HDF5 file format to walk the
//! group hierarchy, read a dataset's dataspace, datatype size and data
//! layout, and enumerate the chunk addresses recorded in its chunk index.
//! It supports `no_std` environments with the `alloc` crate.

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(not(feature = "std"))]
extern crate alloc;

pub mod btree_v1;
pub mod btree_v2;
pub mod chunk_index;
pub mod data_layout;
pub mod dataspace;
pub mod datatype;
pub mod error;
pub mod extensible_array;
pub mod fixed_array;
pub mod group_v1;
pub mod link_message;
pub mod local_heap;
pub mod message_type;
pub mod object_header;
pub mod shared_message;
pub mod signature;
pub mod superblock;
pub mod symbol_table;
#[cfg(feature = "writer")]
pub mod writer;

mod util;

pub use chunk_index::ChunkRecord;
pub use error::FormatError;
