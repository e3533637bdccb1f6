//! HDF5 local heap parsing.

#[cfg(not(feature = "std"))]
use alloc::string::String;

use crate::error::FormatError;
use crate::util::{ensure_len, read_uint, to_pos};

const HEAP_SIGNATURE: [u8; 4] = *b"HEAP";

/// Parsed local heap header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalHeap {
    /// Size of the data segment in bytes.
    pub data_segment_size: u64,
    /// File address of the data segment.
    pub data_segment_address: u64,
}

impl LocalHeap {
    /// Parse the local heap header at `address`.
    pub fn parse(
        data: &[u8],
        address: u64,
        offset_size: u8,
        length_size: u8,
    ) -> Result<LocalHeap, FormatError> {
        let offset = to_pos(address)?;
        let ls = length_size as usize;
        // signature(4) + version(1) + reserved(3) + segment size + free list + segment address
        ensure_len(data, offset, 8 + 2 * ls + offset_size as usize)?;
        if data[offset..offset + 4] != HEAP_SIGNATURE {
            return Err(FormatError::InvalidLocalHeapSignature);
        }
        let version = data[offset + 4];
        if version != 0 {
            return Err(FormatError::InvalidLocalHeapVersion(version));
        }
        Ok(LocalHeap {
            data_segment_size: read_uint(data, offset + 8, length_size)?,
            data_segment_address: read_uint(data, offset + 8 + 2 * ls, offset_size)?,
        })
    }

    /// Read the NUL-terminated name stored at `name_offset` in the data segment.
    pub fn read_name(&self, data: &[u8], name_offset: u64) -> Result<String, FormatError> {
        let invalid = || FormatError::InvalidHeapString(name_offset);
        if name_offset >= self.data_segment_size {
            return Err(invalid());
        }
        let segment = to_pos(self.data_segment_address)?;
        let size = to_pos(self.data_segment_size)?;
        ensure_len(data, segment, size)?;
        let start = segment + to_pos(name_offset)?;
        let bytes = &data[start..segment + size];
        let len = bytes.iter().position(|&b| b == 0).ok_or_else(invalid)?;
        core::str::from_utf8(&bytes[..len])
            .map(String::from)
            .map_err(|_| invalid())
    }
}
