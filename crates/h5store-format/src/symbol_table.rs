//! Symbol table message (0x0011), symbol table entries and SNOD nodes.

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

use crate::error::FormatError;
use crate::superblock::CachedSymbolTable;
use crate::util::{ensure_len, read_u16, read_u32, read_uint, to_pos};

const SNOD_SIGNATURE: [u8; 4] = *b"SNOD";

/// Symbol table message: where a v1 group keeps its B-tree and local heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymbolTableMessage {
    pub btree_address: u64,
    pub heap_address: u64,
}

impl SymbolTableMessage {
    pub fn parse(data: &[u8], offset_size: u8) -> Result<SymbolTableMessage, FormatError> {
        Ok(SymbolTableMessage {
            btree_address: read_uint(data, 0, offset_size)?,
            heap_address: read_uint(data, offset_size as usize, offset_size)?,
        })
    }
}

impl From<CachedSymbolTable> for SymbolTableMessage {
    fn from(cached: CachedSymbolTable) -> Self {
        SymbolTableMessage {
            btree_address: cached.btree_address,
            heap_address: cached.heap_address,
        }
    }
}

/// One entry of a symbol table node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymbolTableEntry {
    /// Offset of the link name in the group's local heap.
    pub link_name_offset: u64,
    /// Object header address of the child.
    pub object_header_address: u64,
    /// Scratch-pad cache type (1 means the child is a group).
    pub cache_type: u32,
}

impl SymbolTableEntry {
    /// Encoded size: two addresses, cache type, reserved and a 16-byte scratch pad.
    pub fn encoded_size(offset_size: u8) -> usize {
        2 * offset_size as usize + 24
    }
}

/// A parsed symbol table node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolTableNode {
    pub entries: Vec<SymbolTableEntry>,
}

impl SymbolTableNode {
    /// Parse the SNOD at `address`.
    pub fn parse(
        data: &[u8],
        address: u64,
        offset_size: u8,
    ) -> Result<SymbolTableNode, FormatError> {
        let offset = to_pos(address)?;
        // signature(4) + version(1) + reserved(1) + symbol count(2)
        ensure_len(data, offset, 8)?;
        if data[offset..offset + 4] != SNOD_SIGNATURE {
            return Err(FormatError::InvalidSymbolTableSignature);
        }
        let count = read_u16(data, offset + 6)? as usize;
        let os = offset_size as usize;
        let entry_size = SymbolTableEntry::encoded_size(offset_size);
        ensure_len(data, offset + 8, count * entry_size)?;

        let entries = (0..count)
            .map(|i| {
                let pos = offset + 8 + i * entry_size;
                Ok(SymbolTableEntry {
                    link_name_offset: read_uint(data, pos, offset_size)?,
                    object_header_address: read_uint(data, pos + os, offset_size)?,
                    cache_type: read_u32(data, pos + 2 * os)?,
                })
            })
            .collect::<Result<Vec<_>, FormatError>>()?;
        Ok(SymbolTableNode { entries })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message() {
        let mut d = Vec::new();
        d.extend_from_slice(&136u64.to_le_bytes());
        d.extend_from_slice(&680u64.to_le_bytes());
        let m = SymbolTableMessage::parse(&d, 8).unwrap();
        assert_eq!(m.btree_address, 136);
        assert_eq!(m.heap_address, 680);
    }

    #[test]
    fn node_with_two_entries() {
        let mut d = Vec::new();
        d.extend_from_slice(&SNOD_SIGNATURE);
        d.extend_from_slice(&[1, 0]);
        d.extend_from_slice(&2u16.to_le_bytes());
        for (name, header, cache) in [(8u64, 800u64, 0u32), (16, 1200, 1)] {
            d.extend_from_slice(&name.to_le_bytes());
            d.extend_from_slice(&header.to_le_bytes());
            d.extend_from_slice(&cache.to_le_bytes());
            d.extend_from_slice(&[0; 20]);
        }
        let node = SymbolTableNode::parse(&d, 0, 8).unwrap();
        assert_eq!(node.entries.len(), 2);
        assert_eq!(node.entries[1].link_name_offset, 16);
        assert_eq!(node.entries[1].object_header_address, 1200);
        assert_eq!(node.entries[1].cache_type, 1);
    }

    #[test]
    fn bad_signature() {
        assert_eq!(
            SymbolTableNode::parse(&[0u8; 16], 0, 8),
            Err(FormatError::InvalidSymbolTableSignature)
        );
    }
}
