//! HDF5 dataspace message parsing (message type 0x0001).

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

use crate::error::FormatError;
use crate::util::{ensure_len, read_address, read_uint};

/// Maximum dimension size of an unlimited dimension.
pub const UNLIMITED: u64 = u64::MAX;

/// Type of dataspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataspaceType {
    /// A single element with rank 0.
    Scalar,
    /// An N-dimensional array.
    Simple,
    /// No elements at all.
    Null,
}

/// Parsed HDF5 dataspace message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dataspace {
    /// The type of this dataspace.
    pub space_type: DataspaceType,
    /// Current dimension sizes (empty for scalar and null).
    pub dimensions: Vec<u64>,
    /// Maximum dimension sizes, if present. [`UNLIMITED`] marks an
    /// unlimited dimension whatever the file's length size.
    pub max_dimensions: Option<Vec<u64>>,
}

impl Dataspace {
    /// Parse a dataspace message body.
    ///
    /// `length_size` is the width of each dimension value.
    pub fn parse(data: &[u8], length_size: u8) -> Result<Dataspace, FormatError> {
        ensure_len(data, 0, 4)?;
        let version = data[0];
        let rank = data[1] as usize;
        let flags = data[2];

        let (space_type, mut pos) = match version {
            // v1: reserved(1) + reserved(4); null is not expressible
            1 => {
                let st = if rank == 0 {
                    DataspaceType::Scalar
                } else {
                    DataspaceType::Simple
                };
                (st, 8usize)
            }
            2 => {
                let st = match data[3] {
                    0 => DataspaceType::Scalar,
                    1 => DataspaceType::Simple,
                    2 => DataspaceType::Null,
                    t => return Err(FormatError::InvalidDataspaceType(t)),
                };
                (st, 4usize)
            }
            v => return Err(FormatError::InvalidDataspaceVersion(v)),
        };

        let ls = length_size as usize;
        let mut dimensions = Vec::with_capacity(rank);
        for _ in 0..rank {
            dimensions.push(read_uint(data, pos, length_size)?);
            pos += ls;
        }
        let max_dimensions = if flags & 0x01 != 0 {
            let mut max = Vec::with_capacity(rank);
            for _ in 0..rank {
                max.push(read_address(data, pos, length_size)?.unwrap_or(UNLIMITED));
                pos += ls;
            }
            Some(max)
        } else {
            None
        };

        Ok(Dataspace {
            space_type,
            dimensions,
            max_dimensions,
        })
    }

    /// Number of dimensions.
    pub fn rank(&self) -> usize {
        self.dimensions.len()
    }

    /// Total number of elements, or `None` on overflow.
    pub fn num_elements(&self) -> Option<u64> {
        match self.space_type {
            DataspaceType::Null => Some(0),
            DataspaceType::Scalar => Some(1),
            DataspaceType::Simple => self
                .dimensions
                .iter()
                .try_fold(1u64, |acc, &d| acc.checked_mul(d)),
        }
    }
}
