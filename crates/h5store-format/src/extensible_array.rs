//! Extensible array chunk index (layout v4 index type 4).
//!
//! HDF5 uses this index for chunked datasets with exactly one unlimited
//! dimension. The first elements live in the index block itself. The rest
//! live in data blocks grouped into super block levels, where level `u` has
//! `2^(u/2)` blocks of `2^((u+1)/2) * min` elements. Data blocks of the
//! first levels hang directly off the index block; later ones are reached
//! through super blocks, and large data blocks there are split into pages.

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

use crate::chunk_index::{ArrayElement, FILTERED_CHUNKS};
use crate::error::FormatError;
use crate::util::{ensure_len, read_address, read_uint, to_pos};

const EAHD_SIGNATURE: [u8; 4] = *b"EAHD";
const EAIB_SIGNATURE: [u8; 4] = *b"EAIB";
const EASB_SIGNATURE: [u8; 4] = *b"EASB";
const EADB_SIGNATURE: [u8; 4] = *b"EADB";

/// signature(4) + version(1) + client(1)
const PREFIX_LEN: usize = 6;
const CHECKSUM_LEN: usize = 4;

/// Parsed extensible array header (EAHD).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtensibleArrayHeader {
    /// 0 for unfiltered chunks, 1 for filtered chunks.
    pub client_id: u8,
    /// Size of each element in bytes.
    pub element_size: u8,
    /// Log2 of the most elements the array can ever hold.
    pub max_elements_bits: u8,
    /// Elements stored in the index block itself.
    pub index_block_elements: u8,
    /// Elements per data block on the first super block level.
    pub data_block_min_elements: u8,
    /// Data block pointers on the first super block level that has a super block.
    pub super_block_min_pointers: u8,
    /// Log2 of the elements in one data block page.
    pub page_bits: u8,
    /// One past the highest element index ever written.
    pub max_index_set: u64,
    /// Address of the index block, `None` if never allocated.
    pub index_block_address: Option<u64>,
}

impl ExtensibleArrayHeader {
    pub fn parse(
        data: &[u8],
        address: u64,
        offset_size: u8,
        length_size: u8,
    ) -> Result<ExtensibleArrayHeader, FormatError> {
        let offset = to_pos(address)?;
        // prefix + element size, max bits, index block elements, data block
        // minimum, super block minimum, page bits
        ensure_len(data, offset, PREFIX_LEN + 6)?;
        if data[offset..offset + 4] != EAHD_SIGNATURE {
            return Err(FormatError::InvalidExtensibleArraySignature);
        }
        let version = data[offset + 4];
        if version != 0 {
            return Err(FormatError::UnsupportedExtensibleArrayVersion(version));
        }

        // six statistics follow: super blocks, super block bytes, data
        // blocks, data block bytes, max index set, element count
        let ls = length_size as usize;
        let stats = offset + PREFIX_LEN + 6;
        let header = ExtensibleArrayHeader {
            client_id: data[offset + 5],
            element_size: data[offset + 6],
            max_elements_bits: data[offset + 7],
            index_block_elements: data[offset + 8],
            data_block_min_elements: data[offset + 9],
            super_block_min_pointers: data[offset + 10],
            page_bits: data[offset + 11],
            max_index_set: read_uint(data, stats + 4 * ls, length_size)?,
            index_block_address: read_address(data, stats + 6 * ls, offset_size)?,
        };
        header.validate(offset_size)?;
        Ok(header)
    }

    fn validate(&self, offset_size: u8) -> Result<(), FormatError> {
        let min = self.data_block_min_elements;
        let pointers = self.super_block_min_pointers;
        let valid = (self.element_size as usize) >= offset_size as usize
            && min.is_power_of_two()
            && pointers.is_power_of_two()
            && (1..=64).contains(&self.max_elements_bits)
            && u32::from(self.max_elements_bits) >= min.trailing_zeros()
            && self.page_bits < 64;
        if valid {
            Ok(())
        } else {
            Err(FormatError::InvalidExtensibleArrayParameters)
        }
    }

    /// Bytes of the block offset field in super and data blocks.
    fn block_offset_size(&self) -> usize {
        (self.max_elements_bits as usize).div_ceil(8)
    }

    fn levels(&self) -> Vec<SuperBlockLevel> {
        let count = 1 + u32::from(self.max_elements_bits)
            - self.data_block_min_elements.trailing_zeros();
        let mut start = 0u64;
        let mut first_block = 0u64;
        (0..count)
            .map(|u| {
                let block_elements =
                    (1u64 << u.div_ceil(2)) * u64::from(self.data_block_min_elements);
                let level = SuperBlockLevel {
                    data_blocks: 1u64 << (u / 2),
                    block_elements,
                    start,
                    first_block,
                };
                start = start.saturating_add(level.data_blocks.saturating_mul(block_elements));
                first_block += level.data_blocks;
                level
            })
            .collect()
    }
}

/// Data block layout of one super block level.
#[derive(Debug, Clone, Copy)]
struct SuperBlockLevel {
    data_blocks: u64,
    block_elements: u64,
    /// First element index of the level, not counting index block elements.
    start: u64,
    /// Data blocks on all lower levels.
    first_block: u64,
}

/// Collects allocated elements below `max_index_set` while walking the blocks.
struct ElementReader<'a> {
    data: &'a [u8],
    header: ExtensibleArrayHeader,
    offset_size: u8,
    found: Vec<(u64, ArrayElement)>,
}

impl ElementReader<'_> {
    fn check_prefix(&self, pos: usize, signature: [u8; 4]) -> Result<(), FormatError> {
        ensure_len(self.data, pos, PREFIX_LEN + self.offset_size as usize)?;
        if self.data[pos..pos + 4] != signature {
            return Err(FormatError::InvalidExtensibleArraySignature);
        }
        let version = self.data[pos + 4];
        if version != 0 {
            return Err(FormatError::UnsupportedExtensibleArrayVersion(version));
        }
        Ok(())
    }

    /// Read `count` consecutive elements at `pos`, the first being `first_index`.
    fn elements(&mut self, pos: usize, first_index: u64, count: u64) -> Result<(), FormatError> {
        let count = count.min(self.header.max_index_set.saturating_sub(first_index));
        let elem = self.header.element_size as usize;
        ensure_len(self.data, pos, to_pos(count)?.saturating_mul(elem))?;
        let filtered = self.header.client_id == FILTERED_CHUNKS;
        for i in 0..count {
            let at = pos + i as usize * elem;
            let element = ArrayElement::read(self.data, at, elem, filtered, self.offset_size)?;
            if element.address.is_some() {
                self.found.push((first_index + i, element));
            }
        }
        Ok(())
    }

    fn addresses(&self, pos: usize, count: usize) -> Result<Vec<Option<u64>>, FormatError> {
        let os = self.offset_size as usize;
        ensure_len(self.data, pos, count.saturating_mul(os))?;
        (0..count)
            .map(|i| read_address(self.data, pos + i * os, self.offset_size))
            .collect()
    }

    fn data_block(
        &mut self,
        address: u64,
        first_index: u64,
        count: u64,
    ) -> Result<(), FormatError> {
        let pos = to_pos(address)?;
        self.check_prefix(pos, EADB_SIGNATURE)?;
        let start =
            pos + PREFIX_LEN + self.offset_size as usize + self.header.block_offset_size();
        self.elements(start, first_index, count)
    }

    fn super_block(
        &mut self,
        address: u64,
        first_index: u64,
        level: SuperBlockLevel,
    ) -> Result<(), FormatError> {
        let pos = to_pos(address)?;
        self.check_prefix(pos, EASB_SIGNATURE)?;
        let os = self.offset_size as usize;
        let mut at = pos + PREFIX_LEN + os + self.header.block_offset_size();

        let page_elements = 1u64 << self.header.page_bits;
        let pages = if level.block_elements > page_elements {
            level.block_elements / page_elements
        } else {
            0
        };
        let blocks = to_pos(level.data_blocks)?;
        let bitmap_at = at;
        if pages > 0 {
            at += to_pos(level.data_blocks.saturating_mul(pages))?.div_ceil(8);
        }
        let block_addresses = self.addresses(at, blocks)?;

        for (d, block_address) in block_addresses.into_iter().enumerate() {
            let block_start = first_index + d as u64 * level.block_elements;
            if block_start >= self.header.max_index_set {
                break;
            }
            let Some(block_address) = block_address else {
                continue;
            };
            if pages == 0 {
                self.data_block(block_address, block_start, level.block_elements)?;
                continue;
            }

            let block = to_pos(block_address)?;
            self.check_prefix(block, EADB_SIGNATURE)?;
            // pages follow the block prefix and its checksum
            let first_page =
                block + PREFIX_LEN + os + self.header.block_offset_size() + CHECKSUM_LEN;
            let page_len = to_pos(page_elements)?
                .saturating_mul(self.header.element_size as usize)
                .saturating_add(CHECKSUM_LEN);
            for p in 0..pages {
                let bit = to_pos(d as u64 * pages + p)?;
                ensure_len(self.data, bitmap_at, bit / 8 + 1)?;
                // bits are numbered from the most significant end
                if self.data[bitmap_at + bit / 8] & (0x80 >> (bit % 8)) == 0 {
                    continue;
                }
                let page_at = first_page.saturating_add(to_pos(p)?.saturating_mul(page_len));
                self.elements(page_at, block_start + p * page_elements, page_elements)?;
            }
        }
        Ok(())
    }
}

/// Read every allocated element of an extensible array as
/// `(element index, element)` pairs in index order.
pub fn read_extensible_array(
    data: &[u8],
    header_address: u64,
    offset_size: u8,
    length_size: u8,
) -> Result<Vec<(u64, ArrayElement)>, FormatError> {
    let header = ExtensibleArrayHeader::parse(data, header_address, offset_size, length_size)?;
    let Some(index_block) = header.index_block_address else {
        return Ok(Vec::new());
    };
    let mut reader = ElementReader {
        data,
        header,
        offset_size,
        found: Vec::new(),
    };

    let pos = to_pos(index_block)?;
    reader.check_prefix(pos, EAIB_SIGNATURE)?;
    let inline = u64::from(header.index_block_elements);
    let mut at = pos + PREFIX_LEN + offset_size as usize;
    reader.elements(at, 0, inline)?;
    at += header.index_block_elements as usize * header.element_size as usize;

    let levels = header.levels();
    let direct_levels = 2 * header.super_block_min_pointers.trailing_zeros() as usize;
    let direct_count = 2 * (header.super_block_min_pointers as usize - 1);
    let direct = reader.addresses(at, direct_count)?;
    at += direct_count * offset_size as usize;
    let supers = reader.addresses(at, levels.len().saturating_sub(direct_levels))?;

    for (u, level) in levels.iter().enumerate() {
        let level_start = inline.saturating_add(level.start);
        if level_start >= header.max_index_set {
            break;
        }
        if u >= direct_levels {
            if let Some(Some(address)) = supers.get(u - direct_levels) {
                reader.super_block(*address, level_start, *level)?;
            }
            continue;
        }
        for d in 0..level.data_blocks {
            let block_start = level_start + d * level.block_elements;
            if block_start >= header.max_index_set {
                break;
            }
            if let Some(Some(address)) = direct.get(to_pos(level.first_block + d)?) {
                reader.data_block(*address, block_start, level.block_elements)?;
            }
        }
    }
    Ok(reader.found)
}

#[cfg(test)]
mod tests {
    use super::*;

    const NONE: u64 = u64::MAX;

    /// Little-endian block builder with 8-byte addresses and lengths.
    #[derive(Default)]
    struct Blocks {
        buf: Vec<u8>,
    }

    impl Blocks {
        fn at(&self) -> u64 {
            self.buf.len() as u64
        }

        fn prefix(&mut self, signature: &[u8; 4], client: u8) {
            self.buf.extend_from_slice(signature);
            self.buf.extend_from_slice(&[0, client]);
            self.buf.extend_from_slice(&0u64.to_le_bytes());
        }

        fn u64s(&mut self, values: &[u64]) {
            for v in values {
                self.buf.extend_from_slice(&v.to_le_bytes());
            }
        }

        fn header(&mut self, params: [u8; 5], max_index_set: u64, index_block: u64) {
            self.buf.extend_from_slice(b"EAHD");
            self.buf.extend_from_slice(&[0, 0, 8]);
            self.buf.extend_from_slice(&params);
            self.u64s(&[0, 0, 0, 0, max_index_set, 0, index_block]);
            self.buf.extend_from_slice(&[0; 4]);
        }
    }

    #[test]
    fn index_block_only() {
        let mut b = Blocks::default();
        b.header([8, 4, 4, 4, 4], 3, 72);
        assert_eq!(b.at(), 72);
        b.prefix(b"EAIB", 0);
        // four inline elements, the fourth past max_index_set
        b.u64s(&[700, NONE, 900, 1000]);
        // six direct data blocks, three super blocks
        b.u64s(&[NONE; 9]);
        b.buf.extend_from_slice(&[0; 4]);

        let found = read_extensible_array(&b.buf, 0, 8, 8).unwrap();
        let indices: Vec<_> = found.iter().map(|(i, e)| (*i, e.address)).collect();
        assert_eq!(indices, vec![(0, Some(700)), (2, Some(900))]);
    }

    #[test]
    fn direct_super_and_paged_blocks() {
        // max bits 8, 2 inline elements, data block minimum 2, super block
        // minimum 2, 4 elements per page. Levels 0 and 1 hang off the index
        // block (elements 2..4 and 4..8); level 2 has two blocks of 4
        // (8..16); level 3 has two paged blocks of 8 (16..32).
        let mut b = Blocks::default();
        b.header([8, 2, 2, 2, 2], 32, 72);

        b.prefix(b"EAIB", 0);
        b.u64s(&[NONE, 101]);
        let direct_at = b.buf.len();
        b.u64s(&[0, NONE]);
        let supers_at = b.buf.len();
        b.u64s(&[NONE; 6]);
        b.buf.extend_from_slice(&[0; 4]);

        // level 0 data block: elements 2 and 3
        let level0 = b.at();
        b.prefix(b"EADB", 0);
        b.buf.push(0);
        b.u64s(&[NONE, 103]);
        b.buf.extend_from_slice(&[0; 4]);

        // level 2 data blocks: elements 8..12 and 12..16
        let level2_first = b.at();
        b.prefix(b"EADB", 0);
        b.buf.push(0);
        b.u64s(&[NONE, 109, NONE, NONE]);
        b.buf.extend_from_slice(&[0; 4]);
        let level2_second = b.at();
        b.prefix(b"EADB", 0);
        b.buf.push(0);
        b.u64s(&[NONE, 113, NONE, NONE]);
        b.buf.extend_from_slice(&[0; 4]);
        let level2 = b.at();
        b.prefix(b"EASB", 0);
        b.buf.push(0);
        b.u64s(&[level2_first, level2_second]);
        b.buf.extend_from_slice(&[0; 4]);

        // level 3 paged blocks: elements 16..24 and 24..32, two pages each
        let mut paged = Vec::new();
        let pages = [
            ([NONE; 4], [120, NONE, NONE, NONE]),
            ([1, 2, 3, 4], [NONE, NONE, 130, NONE]),
        ];
        for (first, second) in pages {
            paged.push(b.at());
            b.prefix(b"EADB", 0);
            b.buf.push(0);
            b.buf.extend_from_slice(&[0; 4]);
            b.u64s(&first);
            b.buf.extend_from_slice(&[0; 4]);
            b.u64s(&second);
            b.buf.extend_from_slice(&[0; 4]);
        }
        let level3 = b.at();
        b.prefix(b"EASB", 0);
        b.buf.push(0);
        // block 0 has page 1 initialized; block 1 has only page 1, so the
        // stale bytes in its page 0 are never read
        b.buf.push(0b0101_0000);
        b.u64s(&paged);
        b.buf.extend_from_slice(&[0; 4]);

        b.buf[direct_at..direct_at + 8].copy_from_slice(&level0.to_le_bytes());
        b.buf[supers_at..supers_at + 8].copy_from_slice(&level2.to_le_bytes());
        b.buf[supers_at + 8..supers_at + 16].copy_from_slice(&level3.to_le_bytes());

        let found = read_extensible_array(&b.buf, 0, 8, 8).unwrap();
        let indices: Vec<_> = found.iter().map(|(i, e)| (*i, e.address)).collect();
        assert_eq!(
            indices,
            vec![
                (1, Some(101)),
                (3, Some(103)),
                (9, Some(109)),
                (13, Some(113)),
                (20, Some(120)),
                (30, Some(130)),
            ]
        );
    }

    #[test]
    fn filtered_elements_carry_size_and_mask() {
        let mut b = Blocks::default();
        b.buf.extend_from_slice(b"EAHD");
        b.buf.extend_from_slice(&[0, 1, 16, 8, 1, 4, 4, 0]);
        b.u64s(&[0, 0, 0, 0, 1, 1, 72]);
        b.buf.extend_from_slice(&[0; 4]);
        b.prefix(b"EAIB", 1);
        b.u64s(&[4000]);
        b.buf.extend_from_slice(&[0x90, 0x01, 0, 0]);
        b.buf.extend_from_slice(&1u32.to_le_bytes());
        b.u64s(&[NONE; 9]);
        b.buf.extend_from_slice(&[0; 4]);

        let found = read_extensible_array(&b.buf, 0, 8, 8).unwrap();
        assert_eq!(
            found,
            vec![(
                0,
                ArrayElement {
                    address: Some(4000),
                    filtered_size: Some(400),
                    filter_mask: 1
                }
            )]
        );
    }

    #[test]
    fn unallocated_index_block() {
        let mut b = Blocks::default();
        b.header([32, 4, 16, 4, 10], 0, NONE);
        assert!(read_extensible_array(&b.buf, 0, 8, 8).unwrap().is_empty());
    }

    #[test]
    fn rejects_bad_signature_and_parameters() {
        let mut b = Blocks::default();
        b.header([32, 4, 16, 4, 10], 0, NONE);
        let mut wrong = b.buf.clone();
        wrong[0] = b'X';
        assert_eq!(
            ExtensibleArrayHeader::parse(&wrong, 0, 8, 8),
            Err(FormatError::InvalidExtensibleArraySignature)
        );
        // data block minimum must be a power of two
        let mut odd = b.buf.clone();
        odd[9] = 12;
        assert_eq!(
            ExtensibleArrayHeader::parse(&odd, 0, 8, 8),
            Err(FormatError::InvalidExtensibleArrayParameters)
        );
    }
}
