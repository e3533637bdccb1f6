//! Version 2 B-trees and the chunk index built on them (layout v4 index
//! type 5, used when more than one dimension is unlimited).

#[cfg(not(feature = "std"))]
use alloc::{vec, vec::Vec};

use crate::chunk_index::ChunkRecord;
use crate::error::FormatError;
use crate::util::{
    ensure_len, read_address, read_u16, read_u32, read_uint, read_var_uint, to_pos,
};

const BTHD_SIGNATURE: [u8; 4] = *b"BTHD";
const BTIN_SIGNATURE: [u8; 4] = *b"BTIN";
const BTLF_SIGNATURE: [u8; 4] = *b"BTLF";

/// signature(4) + version(1) + type(1)
const NODE_PREFIX_LEN: usize = 6;
/// Node prefix plus checksum, the bytes of a node not available to records.
const NODE_OVERHEAD: u64 = 10;

/// Chunk records of datasets without filters.
pub const CHUNK_RECORDS: u8 = 10;
/// Chunk records of filtered datasets.
pub const FILTERED_CHUNK_RECORDS: u8 = 11;

/// Parsed version 2 B-tree header (BTHD).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BTreeV2Header {
    /// Record type stored in the tree.
    pub tree_type: u8,
    /// Size of every node in bytes.
    pub node_size: u32,
    /// Size of one record in bytes.
    pub record_size: u16,
    /// 0 when the root is a leaf.
    pub depth: u16,
    pub root_address: Option<u64>,
    pub root_records: u16,
    pub total_records: u64,
}

impl BTreeV2Header {
    pub fn parse(
        data: &[u8],
        address: u64,
        offset_size: u8,
        length_size: u8,
    ) -> Result<BTreeV2Header, FormatError> {
        let offset = to_pos(address)?;
        // prefix + node size(4) + record size(2) + depth(2) + split(1) + merge(1)
        ensure_len(data, offset, NODE_PREFIX_LEN + 10)?;
        if data[offset..offset + 4] != BTHD_SIGNATURE {
            return Err(FormatError::InvalidBTreeV2Signature);
        }
        let version = data[offset + 4];
        if version != 0 {
            return Err(FormatError::UnsupportedBTreeV2Version(version));
        }
        let root = offset + NODE_PREFIX_LEN + 10;
        let os = offset_size as usize;
        Ok(BTreeV2Header {
            tree_type: data[offset + 5],
            node_size: read_u32(data, offset + 6)?,
            record_size: read_u16(data, offset + 10)?,
            depth: read_u16(data, offset + 12)?,
            root_address: read_address(data, root, offset_size)?,
            root_records: read_u16(data, root + os)?,
            total_records: read_uint(data, root + os + 2, length_size)?,
        })
    }
}

/// Bytes needed to store counts up to `limit`.
pub(crate) fn count_width(limit: u64) -> usize {
    (63 - limit.max(1).leading_zeros() as usize) / 8 + 1
}

/// Field widths of child pointers, which depend on how many records fit
/// below each level.
#[derive(Debug, PartialEq, Eq)]
struct NodeWidths {
    /// Width of a child's own record count.
    records: usize,
    /// Width of the record count of a whole subtree, by depth of its root.
    totals: Vec<usize>,
}

impl NodeWidths {
    fn new(header: &BTreeV2Header, offset_size: u8) -> Result<NodeWidths, FormatError> {
        let node = u64::from(header.node_size);
        let record = u64::from(header.record_size);
        if record == 0 || node < NODE_OVERHEAD + record {
            return Err(FormatError::InvalidBTreeV2Parameters);
        }
        let leaf_max = (node - NODE_OVERHEAD) / record;
        let records = count_width(leaf_max);

        let mut totals = vec![0usize];
        let mut below = leaf_max;
        for depth in 1..=header.depth as usize {
            let pointer = offset_size as usize
                + records
                + if depth > 1 { totals[depth - 1] } else { 0 };
            let pointer = pointer as u64;
            let max = (node - NODE_OVERHEAD)
                .checked_sub(pointer)
                .map(|room| room / (record + pointer))
                .filter(|&max| max > 0)
                .ok_or(FormatError::InvalidBTreeV2Parameters)?;
            below = (max + 1).saturating_mul(below).saturating_add(max);
            totals.push(count_width(below));
        }
        Ok(NodeWidths { records, totals })
    }

    fn pointer(&self, depth: usize, offset_size: u8) -> usize {
        offset_size as usize + self.records + if depth > 1 { self.totals[depth - 1] } else { 0 }
    }
}

struct Walker<'a> {
    data: &'a [u8],
    header: BTreeV2Header,
    widths: NodeWidths,
    offset_size: u8,
    records: Vec<&'a [u8]>,
}

impl<'a> Walker<'a> {
    fn node(&mut self, address: u64, count: usize, depth: usize) -> Result<(), FormatError> {
        let pos = to_pos(address)?;
        let signature = if depth == 0 {
            BTLF_SIGNATURE
        } else {
            BTIN_SIGNATURE
        };
        ensure_len(self.data, pos, NODE_PREFIX_LEN)?;
        if self.data[pos..pos + 4] != signature {
            return Err(FormatError::InvalidBTreeV2Signature);
        }
        let version = self.data[pos + 4];
        if version != 0 {
            return Err(FormatError::UnsupportedBTreeV2Version(version));
        }
        if self.data[pos + 5] != self.header.tree_type {
            return Err(FormatError::UnexpectedBTreeV2Type(self.data[pos + 5]));
        }

        let record_size = self.header.record_size as usize;
        let records_at = pos + NODE_PREFIX_LEN;
        ensure_len(self.data, records_at, count.saturating_mul(record_size))?;
        let data = self.data;
        let record = move |i: usize| -> &'a [u8] {
            let start = records_at + i * record_size;
            &data[start..start + record_size]
        };
        if depth == 0 {
            self.records.extend((0..count).map(record));
            return Ok(());
        }

        let pointer = self.widths.pointer(depth, self.offset_size);
        let children_at = records_at + count * record_size;
        ensure_len(self.data, children_at, (count + 1).saturating_mul(pointer))?;
        for i in 0..=count {
            let at = children_at + i * pointer;
            let child = read_var_uint(self.data, at, self.offset_size as usize)?;
            let child_count =
                read_var_uint(self.data, at + self.offset_size as usize, self.widths.records)?;
            self.node(child, to_pos(child_count)?, depth - 1)?;
            if i < count {
                self.records.push(record(i));
            }
        }
        Ok(())
    }
}

/// Collect the raw records of a version 2 B-tree in key order.
pub fn collect_btree_v2_records<'a>(
    data: &'a [u8],
    header: &BTreeV2Header,
    offset_size: u8,
) -> Result<Vec<&'a [u8]>, FormatError> {
    let Some(root) = header.root_address else {
        return Ok(Vec::new());
    };
    let mut walker = Walker {
        data,
        header: *header,
        widths: NodeWidths::new(header, offset_size)?,
        offset_size,
        records: Vec::new(),
    };
    walker.node(root, header.root_records as usize, header.depth as usize)?;
    Ok(walker.records)
}

/// Read the chunk records of a type 10 or 11 tree. `chunk_bytes` is the
/// stored size of an unfiltered chunk.
pub fn read_chunk_btree_v2(
    data: &[u8],
    header_address: u64,
    chunk_shape: &[u64],
    chunk_bytes: u64,
    offset_size: u8,
    length_size: u8,
) -> Result<Vec<ChunkRecord>, FormatError> {
    let header = BTreeV2Header::parse(data, header_address, offset_size, length_size)?;
    let filtered = match header.tree_type {
        CHUNK_RECORDS => false,
        FILTERED_CHUNK_RECORDS => true,
        other => return Err(FormatError::UnexpectedBTreeV2Type(other)),
    };
    let os = offset_size as usize;
    let scaled_len = 8 * chunk_shape.len();
    let size_width = (header.record_size as usize).saturating_sub(os + 4 + scaled_len);
    let needed = os + scaled_len + if filtered { size_width + 4 } else { 0 };
    if (header.record_size as usize) < needed {
        return Err(FormatError::InvalidBTreeV2Parameters);
    }

    collect_btree_v2_records(data, &header, offset_size)?
        .into_iter()
        .map(|record| {
            let address = read_var_uint(record, 0, os)?;
            let (size, filter_mask, mut at) = if filtered {
                (
                    read_var_uint(record, os, size_width)?,
                    read_u32(record, os + size_width)?,
                    os + size_width + 4,
                )
            } else {
                (chunk_bytes, 0, os)
            };
            let mut offset = Vec::with_capacity(chunk_shape.len());
            for &extent in chunk_shape {
                let scaled = read_var_uint(record, at, 8)?;
                offset.push(
                    scaled
                        .checked_mul(extent)
                        .ok_or(FormatError::AddressOverflow(scaled))?,
                );
                at += 8;
            }
            Ok(ChunkRecord {
                offset,
                address,
                size,
                filter_mask,
            })
        })
        .collect()
}
