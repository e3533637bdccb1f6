//! Error types for HDF5 format parsing.

#[cfg(not(feature = "std"))]
use alloc::string::String;

use core::fmt;

/// Errors that can occur when parsing HDF5 binary format structures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    /// The HDF5 magic signature was not found at any valid offset.
    SignatureNotFound,
    /// The superblock version is not supported.
    UnsupportedVersion(u8),
    /// Unexpected end of data.
    UnexpectedEof {
        /// Number of bytes expected.
        expected: usize,
        /// Number of bytes actually available.
        available: usize,
    },
    /// Invalid offset size (must be 2, 4, or 8).
    InvalidOffsetSize(u8),
    /// Invalid length size (must be 2, 4, or 8).
    InvalidLengthSize(u8),
    /// A variable-width integer field wider than 8 bytes (or empty).
    InvalidFieldWidth(usize),
    /// A file address that does not fit in memory on this platform.
    AddressOverflow(u64),
    /// Invalid object header signature.
    InvalidObjectHeaderSignature,
    /// Invalid object header version.
    InvalidObjectHeaderVersion(u8),
    /// Unknown message type that is marked as must-understand.
    UnsupportedMessage(u16),
    /// An object header chains more continuation blocks than allowed.
    ContinuationLimit,
    /// Unsupported dataspace message version.
    InvalidDataspaceVersion(u8),
    /// Unknown dataspace type.
    InvalidDataspaceType(u8),
    /// Unsupported datatype message version.
    InvalidDatatypeVersion(u8),
    /// Unknown datatype class.
    InvalidDatatypeClass(u8),
    /// Unsupported data layout message version.
    InvalidLayoutVersion(u8),
    /// Unknown data layout class.
    InvalidLayoutClass(u8),
    /// The chunk dimensions in the layout do not match the dataspace rank.
    ChunkRankMismatch {
        /// Spatial dimensions recorded in the layout message.
        layout: usize,
        /// Rank of the dataspace.
        dataspace: usize,
    },
    /// A chunk dimension of zero.
    ZeroChunkDimension,
    /// Chunk index type this crate cannot enumerate.
    UnsupportedChunkIndex(u8),
    /// Invalid B-tree node signature.
    InvalidBTreeSignature,
    /// Unexpected B-tree node type.
    InvalidBTreeNodeType(u8),
    /// A B-tree child is not exactly one level below its parent.
    InvalidBTreeLevel {
        /// Level of the parent node.
        parent: u8,
        /// Level found in the child node.
        child: u8,
    },
    /// Invalid symbol table node signature.
    InvalidSymbolTableSignature,
    /// Invalid local heap signature.
    InvalidLocalHeapSignature,
    /// Unsupported local heap version.
    InvalidLocalHeapVersion(u8),
    /// A link name in the local heap is unterminated or not UTF-8.
    InvalidHeapString(u64),
    /// Unsupported link or link info message version.
    InvalidLinkVersion(u8),
    /// Unsupported shared message version.
    InvalidSharedMessageVersion(u8),
    /// Shared message stored in the shared object header message heap.
    UnsupportedSharedMessage(u8),
    /// Invalid fixed array header or data block signature.
    InvalidFixedArraySignature,
    /// Unsupported fixed array version.
    UnsupportedFixedArrayVersion(u8),
    /// Fixed array data block split into pages.
    PagedFixedArray,
    /// Invalid extensible array header, index, super or data block signature.
    InvalidExtensibleArraySignature,
    /// Unsupported extensible array version.
    UnsupportedExtensibleArrayVersion(u8),
    /// Extensible array creation parameters that describe no valid array.
    InvalidExtensibleArrayParameters,
    /// An extensible array index needs exactly one unlimited dimension.
    UnlimitedDimensionCount(usize),
    /// Invalid version 2 B-tree header or node signature.
    InvalidBTreeV2Signature,
    /// Unsupported version 2 B-tree version.
    UnsupportedBTreeV2Version(u8),
    /// Version 2 B-tree record type other than the one expected.
    UnexpectedBTreeV2Type(u8),
    /// Version 2 B-tree node or record sizes that cannot hold a record.
    InvalidBTreeV2Parameters,
    /// Group links are stored in a fractal heap (dense link storage).
    DenseLinkStorage,
    /// A path component could not be resolved.
    PathNotFound(String),
    /// An intermediate path component is not a group.
    NotAGroup(String),
}

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatError::SignatureNotFound => {
                write!(f, "HDF5 signature not found at any valid offset")
            }
            FormatError::UnsupportedVersion(v) => {
                write!(f, "unsupported superblock version: {v}")
            }
            FormatError::UnexpectedEof {
                expected,
                available,
            } => {
                write!(f, "unexpected EOF: need {expected} bytes, have {available}")
            }
            FormatError::InvalidOffsetSize(s) => {
                write!(f, "invalid offset size: {s} (must be 2, 4, or 8)")
            }
            FormatError::InvalidLengthSize(s) => {
                write!(f, "invalid length size: {s} (must be 2, 4, or 8)")
            }
            FormatError::InvalidFieldWidth(w) => {
                write!(f, "invalid integer field width: {w} bytes")
            }
            FormatError::AddressOverflow(a) => {
                write!(f, "file address {a:#x} exceeds addressable memory")
            }
            FormatError::InvalidObjectHeaderSignature => {
                write!(f, "invalid object header signature")
            }
            FormatError::InvalidObjectHeaderVersion(v) => {
                write!(f, "invalid object header version: {v}")
            }
            FormatError::UnsupportedMessage(id) => {
                write!(
                    f,
                    "unsupported message type {id:#06x} marked as must-understand"
                )
            }
            FormatError::ContinuationLimit => {
                write!(f, "too many object header continuation blocks")
            }
            FormatError::InvalidDataspaceVersion(v) => {
                write!(f, "unsupported dataspace version: {v}")
            }
            FormatError::InvalidDataspaceType(t) => write!(f, "invalid dataspace type: {t}"),
            FormatError::InvalidDatatypeVersion(v) => {
                write!(f, "unsupported datatype version: {v}")
            }
            FormatError::InvalidDatatypeClass(c) => write!(f, "invalid datatype class: {c}"),
            FormatError::InvalidLayoutVersion(v) => {
                write!(f, "unsupported data layout version: {v}")
            }
            FormatError::InvalidLayoutClass(c) => write!(f, "invalid data layout class: {c}"),
            FormatError::ChunkRankMismatch { layout, dataspace } => {
                write!(
                    f,
                    "layout has {layout} chunk dimensions but dataspace rank is {dataspace}"
                )
            }
            FormatError::ZeroChunkDimension => write!(f, "chunk dimension of zero"),
            FormatError::UnsupportedChunkIndex(t) => {
                write!(f, "unsupported chunk index type: {t}")
            }
            FormatError::InvalidBTreeSignature => write!(f, "invalid B-tree node signature"),
            FormatError::InvalidBTreeNodeType(t) => write!(f, "unexpected B-tree node type: {t}"),
            FormatError::InvalidBTreeLevel { parent, child } => {
                write!(
                    f,
                    "B-tree child at level {child} under parent at level {parent}"
                )
            }
            FormatError::InvalidSymbolTableSignature => {
                write!(f, "invalid symbol table node signature")
            }
            FormatError::InvalidLocalHeapSignature => write!(f, "invalid local heap signature"),
            FormatError::InvalidLocalHeapVersion(v) => {
                write!(f, "unsupported local heap version: {v}")
            }
            FormatError::InvalidHeapString(off) => {
                write!(f, "invalid link name at local heap offset {off}")
            }
            FormatError::InvalidLinkVersion(v) => write!(f, "unsupported link message version: {v}"),
            FormatError::InvalidSharedMessageVersion(v) => {
                write!(f, "unsupported shared message version: {v}")
            }
            FormatError::UnsupportedSharedMessage(t) => {
                write!(f, "shared message of type {t} stored in the shared message heap")
            }
            FormatError::InvalidFixedArraySignature => write!(f, "invalid fixed array signature"),
            FormatError::UnsupportedFixedArrayVersion(v) => {
                write!(f, "unsupported fixed array version: {v}")
            }
            FormatError::PagedFixedArray => write!(f, "paged fixed array data blocks"),
            FormatError::InvalidExtensibleArraySignature => {
                write!(f, "invalid extensible array signature")
            }
            FormatError::UnsupportedExtensibleArrayVersion(v) => {
                write!(f, "unsupported extensible array version: {v}")
            }
            FormatError::InvalidExtensibleArrayParameters => {
                write!(f, "invalid extensible array creation parameters")
            }
            FormatError::UnlimitedDimensionCount(n) => {
                write!(
                    f,
                    "extensible array index needs one unlimited dimension, found {n}"
                )
            }
            FormatError::InvalidBTreeV2Signature => write!(f, "invalid v2 B-tree signature"),
            FormatError::UnsupportedBTreeV2Version(v) => {
                write!(f, "unsupported v2 B-tree version: {v}")
            }
            FormatError::UnexpectedBTreeV2Type(t) => {
                write!(f, "unexpected v2 B-tree record type: {t}")
            }
            FormatError::InvalidBTreeV2Parameters => {
                write!(f, "v2 B-tree node size cannot hold its records")
            }
            FormatError::DenseLinkStorage => {
                write!(f, "group links are kept in dense (fractal heap) storage")
            }
            FormatError::PathNotFound(p) => write!(f, "path not found: {p}"),
            FormatError::NotAGroup(p) => write!(f, "not a group: {p}"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for FormatError {}
