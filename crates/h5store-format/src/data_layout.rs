//! HDF5 data layout message parsing (message type 0x0008).

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

use crate::error::FormatError;
use crate::util::{ensure_len, read_address, read_u16, read_u32, read_uint, read_var_uint};

/// Where a chunked dataset keeps its chunk index, and what kind it is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkIndexAddress {
    /// Version 1 B-tree of chunk records (layout v3).
    BTreeV1 { address: Option<u64> },
    /// A single chunk covering the whole dataset.
    SingleChunk {
        address: Option<u64>,
        /// Stored size when the chunk passed through filters.
        filtered_size: Option<u64>,
        filter_mask: u32,
    },
    /// Chunks laid out back to back with no index.
    Implicit { address: Option<u64> },
    /// Fixed array index.
    FixedArray { address: Option<u64>, page_bits: u8 },
    /// Extensible array index.
    ExtensibleArray { address: Option<u64> },
    /// Version 2 B-tree index.
    BTreeV2 { address: Option<u64> },
}

impl ChunkIndexAddress {
    /// Address of the index structure, `None` when no chunk was ever written.
    pub fn address(&self) -> Option<u64> {
        match self {
            ChunkIndexAddress::BTreeV1 { address }
            | ChunkIndexAddress::SingleChunk { address, .. }
            | ChunkIndexAddress::Implicit { address }
            | ChunkIndexAddress::FixedArray { address, .. }
            | ChunkIndexAddress::ExtensibleArray { address }
            | ChunkIndexAddress::BTreeV2 { address } => *address,
        }
    }

    /// The numeric index type used by layout v4 messages.
    pub fn index_type(&self) -> u8 {
        match self {
            ChunkIndexAddress::BTreeV1 { .. } => 0,
            ChunkIndexAddress::SingleChunk { .. } => 1,
            ChunkIndexAddress::Implicit { .. } => 2,
            ChunkIndexAddress::FixedArray { .. } => 3,
            ChunkIndexAddress::ExtensibleArray { .. } => 4,
            ChunkIndexAddress::BTreeV2 { .. } => 5,
        }
    }
}

/// Chunked storage properties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedLayout {
    /// Layout message version (3 or 4).
    pub version: u8,
    /// Layout v4 flags (0 for v3).
    pub flags: u8,
    /// Chunk dimensions followed by the element size in bytes.
    pub dimensions: Vec<u64>,
    /// The chunk index.
    pub index: ChunkIndexAddress,
}

impl ChunkedLayout {
    /// Chunk extent along each dataspace dimension.
    pub fn chunk_shape(&self) -> &[u64] {
        &self.dimensions[..self.dimensions.len() - 1]
    }

    /// Size in bytes of one element as recorded in the layout.
    pub fn element_size(&self) -> u64 {
        self.dimensions[self.dimensions.len() - 1]
    }
}

/// Parsed HDF5 data layout message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataLayout {
    /// Raw data stored inside the message itself.
    Compact {
        /// Size of the inline data.
        size: u64,
    },
    /// Raw data stored in one contiguous block.
    Contiguous {
        /// File address, `None` when the storage was never allocated.
        address: Option<u64>,
        /// Size of the block in bytes.
        size: u64,
    },
    /// Raw data stored in chunks.
    Chunked(ChunkedLayout),
    /// Virtual dataset mapping (layout v4).
    Virtual,
}

impl DataLayout {
    /// Parse a data layout message body.
    ///
    /// `offset_size` and `length_size` come from the superblock.
    pub fn parse(data: &[u8], offset_size: u8, length_size: u8) -> Result<DataLayout, FormatError> {
        ensure_len(data, 0, 2)?;
        let version = data[0];
        if !(3..=4).contains(&version) {
            return Err(FormatError::InvalidLayoutVersion(version));
        }

        match data[1] {
            0 => Ok(DataLayout::Compact {
                size: read_u16(data, 2)? as u64,
            }),
            1 => Ok(DataLayout::Contiguous {
                address: read_address(data, 2, offset_size)?,
                size: read_uint(data, 2 + offset_size as usize, length_size)?,
            }),
            2 if version == 3 => Self::parse_chunked_v3(data, offset_size),
            2 => Self::parse_chunked_v4(data, offset_size, length_size),
            3 if version == 4 => Ok(DataLayout::Virtual),
            c => Err(FormatError::InvalidLayoutClass(c)),
        }
    }

    fn parse_chunked_v3(data: &[u8], offset_size: u8) -> Result<DataLayout, FormatError> {
        ensure_len(data, 2, 1)?;
        let ndims = data[2] as usize;
        if ndims < 2 {
            return Err(FormatError::ChunkRankMismatch {
                layout: ndims.saturating_sub(1),
                dataspace: 0,
            });
        }
        let address = read_address(data, 3, offset_size)?;
        let mut pos = 3 + offset_size as usize;
        let mut dimensions = Vec::with_capacity(ndims);
        for _ in 0..ndims {
            dimensions.push(read_u32(data, pos)? as u64);
            pos += 4;
        }
        Ok(DataLayout::Chunked(ChunkedLayout {
            version: 3,
            flags: 0,
            dimensions,
            index: ChunkIndexAddress::BTreeV1 { address },
        }))
    }

    fn parse_chunked_v4(
        data: &[u8],
        offset_size: u8,
        length_size: u8,
    ) -> Result<DataLayout, FormatError> {
        // flags(1) + dimensionality(1) + encoded dimension width(1)
        ensure_len(data, 2, 3)?;
        let flags = data[2];
        let ndims = data[3] as usize;
        let width = data[4] as usize;
        if ndims < 2 {
            return Err(FormatError::ChunkRankMismatch {
                layout: ndims.saturating_sub(1),
                dataspace: 0,
            });
        }
        let mut pos = 5;
        let mut dimensions = Vec::with_capacity(ndims);
        for _ in 0..ndims {
            dimensions.push(read_var_uint(data, pos, width)?);
            pos += width;
        }

        ensure_len(data, pos, 1)?;
        let index_type = data[pos];
        pos += 1;
        let os = offset_size as usize;
        let index = match index_type {
            1 => {
                let (filtered_size, filter_mask) = if flags & 0x02 != 0 {
                    let size = read_uint(data, pos, length_size)?;
                    let mask = read_u32(data, pos + length_size as usize)?;
                    pos += length_size as usize + 4;
                    (Some(size), mask)
                } else {
                    (None, 0)
                };
                ChunkIndexAddress::SingleChunk {
                    address: read_address(data, pos, offset_size)?,
                    filtered_size,
                    filter_mask,
                }
            }
            2 => ChunkIndexAddress::Implicit {
                address: read_address(data, pos, offset_size)?,
            },
            3 => {
                ensure_len(data, pos, 1 + os)?;
                ChunkIndexAddress::FixedArray {
                    page_bits: data[pos],
                    address: read_address(data, pos + 1, offset_size)?,
                }
            }
            // max bits, index elements, min pointers, min elements, page bits
            4 => ChunkIndexAddress::ExtensibleArray {
                address: read_address(data, pos + 5, offset_size)?,
            },
            // node size(4), split percent, merge percent
            5 => ChunkIndexAddress::BTreeV2 {
                address: read_address(data, pos + 6, offset_size)?,
            },
            t => return Err(FormatError::UnsupportedChunkIndex(t)),
        };

        Ok(DataLayout::Chunked(ChunkedLayout {
            version: 4,
            flags,
            dimensions,
            index,
        }))
    }
}
