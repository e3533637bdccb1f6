//! Fixed array chunk index (layout v4 index type 3).

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

use crate::chunk_index::{ArrayElement, FILTERED_CHUNKS};
use crate::error::FormatError;
use crate::util::{ensure_len, read_address, read_uint, to_pos};

const FAHD_SIGNATURE: [u8; 4] = *b"FAHD";
const FADB_SIGNATURE: [u8; 4] = *b"FADB";

/// Parsed fixed array header (FAHD).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedArrayHeader {
    /// 0 for unfiltered chunks, 1 for filtered chunks.
    pub client_id: u8,
    /// Size of each element in bytes.
    pub element_size: u8,
    /// Log2 of the maximum number of elements in a data block page.
    pub page_bits: u8,
    /// Number of elements, one per chunk slot.
    pub num_elements: u64,
    /// Address of the data block, `None` if never allocated.
    pub data_block_address: Option<u64>,
}

impl FixedArrayHeader {
    pub fn parse(
        data: &[u8],
        address: u64,
        offset_size: u8,
        length_size: u8,
    ) -> Result<FixedArrayHeader, FormatError> {
        let offset = to_pos(address)?;
        // signature(4) + version(1) + client(1) + element size(1) + page bits(1)
        ensure_len(data, offset, 8)?;
        if data[offset..offset + 4] != FAHD_SIGNATURE {
            return Err(FormatError::InvalidFixedArraySignature);
        }
        let version = data[offset + 4];
        if version != 0 {
            return Err(FormatError::UnsupportedFixedArrayVersion(version));
        }
        Ok(FixedArrayHeader {
            client_id: data[offset + 5],
            element_size: data[offset + 6],
            page_bits: data[offset + 7],
            num_elements: read_uint(data, offset + 8, length_size)?,
            data_block_address: read_address(
                data,
                offset + 8 + length_size as usize,
                offset_size,
            )?,
        })
    }
}

/// Read every element of a non-paged fixed array, in slot order.
pub fn read_fixed_array(
    data: &[u8],
    header_address: u64,
    offset_size: u8,
    length_size: u8,
) -> Result<Vec<ArrayElement>, FormatError> {
    let header = FixedArrayHeader::parse(data, header_address, offset_size, length_size)?;
    let Some(block_address) = header.data_block_address else {
        return Ok(Vec::new());
    };
    if header.num_elements > 1u64.checked_shl(header.page_bits as u32).unwrap_or(u64::MAX) {
        return Err(FormatError::PagedFixedArray);
    }

    let offset = to_pos(block_address)?;
    let os = offset_size as usize;
    // signature(4) + version(1) + client(1) + header address
    ensure_len(data, offset, 6 + os)?;
    if data[offset..offset + 4] != FADB_SIGNATURE {
        return Err(FormatError::InvalidFixedArraySignature);
    }
    let version = data[offset + 4];
    if version != 0 {
        return Err(FormatError::UnsupportedFixedArrayVersion(version));
    }

    let count = to_pos(header.num_elements)?;
    let elem = header.element_size as usize;
    let start = offset + 6 + os;
    ensure_len(data, start, count.saturating_mul(elem))?;

    let filtered = header.client_id == FILTERED_CHUNKS;
    (0..count)
        .map(|i| ArrayElement::read(data, start + i * elem, elem, filtered, offset_size))
        .collect()
}
