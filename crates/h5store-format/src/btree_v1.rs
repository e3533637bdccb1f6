//! HDF5 version 1 B-tree parsing.
//!
//! Type 0 trees index the symbol table nodes of a group; type 1 trees index
//! the raw data chunks of a dataset.

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

use crate::chunk_index::ChunkRecord;
use crate::error::FormatError;
use crate::util::{ensure_len, read_address, read_u16, read_u32, read_uint, to_pos};

const TREE_SIGNATURE: [u8; 4] = *b"TREE";

/// Node type of a group B-tree.
pub const GROUP_NODE: u8 = 0;
/// Node type of a chunk B-tree.
pub const CHUNK_NODE: u8 = 1;

/// A B-tree v1 key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BTreeKey {
    /// Group key: offset of a link name in the group's local heap.
    Group { heap_offset: u64 },
    /// Chunk key: stored size, filter mask and chunk offset in elements.
    Chunk {
        size: u32,
        filter_mask: u32,
        offsets: Vec<u64>,
    },
}

/// A parsed B-tree v1 node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BTreeV1Node {
    /// Node type: 0 for groups, 1 for raw data chunks.
    pub node_type: u8,
    /// Node level: 0 for leaves.
    pub level: u8,
    /// Left sibling address, or `None` if undefined.
    pub left_sibling: Option<u64>,
    /// Right sibling address, or `None` if undefined.
    pub right_sibling: Option<u64>,
    /// Keys (one more than children).
    pub keys: Vec<BTreeKey>,
    /// Child node addresses, or chunk / symbol table node addresses in leaves.
    pub children: Vec<u64>,
}

impl BTreeV1Node {
    /// Parse a node at `address`.
    ///
    /// `chunk_dims` is the layout dimensionality (dataspace rank + 1) and is
    /// required to size the keys of chunk nodes.
    pub fn parse(
        data: &[u8],
        address: u64,
        offset_size: u8,
        length_size: u8,
        chunk_dims: usize,
    ) -> Result<BTreeV1Node, FormatError> {
        let offset = to_pos(address)?;
        let os = offset_size as usize;
        ensure_len(data, offset, 8 + 2 * os)?;
        if data[offset..offset + 4] != TREE_SIGNATURE {
            return Err(FormatError::InvalidBTreeSignature);
        }

        let node_type = data[offset + 4];
        let level = data[offset + 5];
        let entries = read_u16(data, offset + 6)? as usize;
        let left_sibling = read_address(data, offset + 8, offset_size)?;
        let right_sibling = read_address(data, offset + 8 + os, offset_size)?;

        let key_size = match node_type {
            GROUP_NODE => length_size as usize,
            // size(4) + filter mask(4) + 8-byte offset per dimension
            CHUNK_NODE => 8 + 8 * chunk_dims,
            t => return Err(FormatError::InvalidBTreeNodeType(t)),
        };
        let mut pos = offset + 8 + 2 * os;
        ensure_len(data, pos, entries * (key_size + os) + key_size)?;

        let read_key = |pos: usize| -> Result<BTreeKey, FormatError> {
            if node_type == GROUP_NODE {
                return Ok(BTreeKey::Group {
                    heap_offset: read_uint(data, pos, length_size)?,
                });
            }
            let mut offsets = Vec::with_capacity(chunk_dims);
            for i in 0..chunk_dims {
                offsets.push(read_uint(data, pos + 8 + 8 * i, 8)?);
            }
            Ok(BTreeKey::Chunk {
                size: read_u32(data, pos)?,
                filter_mask: read_u32(data, pos + 4)?,
                offsets,
            })
        };

        let mut keys = Vec::with_capacity(entries + 1);
        let mut children = Vec::with_capacity(entries);
        for _ in 0..entries {
            keys.push(read_key(pos)?);
            pos += key_size;
            children.push(read_uint(data, pos, offset_size)?);
            pos += os;
        }
        keys.push(read_key(pos)?);

        Ok(BTreeV1Node {
            node_type,
            level,
            left_sibling,
            right_sibling,
            keys,
            children,
        })
    }
}

#[allow(clippy::too_many_arguments)]
fn walk<F>(
    data: &[u8],
    address: u64,
    expected: Option<(u8, u8)>,
    node_type: u8,
    offset_size: u8,
    length_size: u8,
    chunk_dims: usize,
    visit_leaf: &mut F,
) -> Result<(), FormatError>
where
    F: FnMut(&BTreeV1Node) -> Result<(), FormatError>,
{
    let node = BTreeV1Node::parse(data, address, offset_size, length_size, chunk_dims)?;
    if node.node_type != node_type {
        return Err(FormatError::InvalidBTreeNodeType(node.node_type));
    }
    if let Some((parent, child)) = expected {
        if node.level != child {
            return Err(FormatError::InvalidBTreeLevel {
                parent,
                child: node.level,
            });
        }
    }
    if node.level == 0 {
        return visit_leaf(&node);
    }
    for &child in &node.children {
        walk(
            data,
            child,
            Some((node.level, node.level - 1)),
            node_type,
            offset_size,
            length_size,
            chunk_dims,
            visit_leaf,
        )?;
    }
    Ok(())
}

/// Collect the symbol table node addresses of a group B-tree, left to right.
pub fn collect_symbol_table_nodes(
    data: &[u8],
    btree_address: u64,
    offset_size: u8,
    length_size: u8,
) -> Result<Vec<u64>, FormatError> {
    let mut nodes = Vec::new();
    walk(
        data,
        btree_address,
        None,
        GROUP_NODE,
        offset_size,
        length_size,
        0,
        &mut |leaf| {
            nodes.extend_from_slice(&leaf.children);
            Ok(())
        },
    )?;
    Ok(nodes)
}

/// Collect every chunk recorded in a chunk B-tree, in key order.
///
/// `chunk_dims` is the layout dimensionality; the trailing element-size
/// offset of each key is dropped from the returned records.
pub fn collect_chunk_records(
    data: &[u8],
    btree_address: u64,
    offset_size: u8,
    length_size: u8,
    chunk_dims: usize,
) -> Result<Vec<ChunkRecord>, FormatError> {
    let rank = chunk_dims.saturating_sub(1);
    let mut records = Vec::new();
    walk(
        data,
        btree_address,
        None,
        CHUNK_NODE,
        offset_size,
        length_size,
        chunk_dims,
        &mut |leaf| {
            for (key, &child) in leaf.keys.iter().zip(&leaf.children) {
                if let BTreeKey::Chunk {
                    size,
                    filter_mask,
                    offsets,
                } = key
                {
                    records.push(ChunkRecord {
                        offset: offsets[..rank].to_vec(),
                        address: child,
                        size: *size as u64,
                        filter_mask: *filter_mask,
                    });
                }
            }
            Ok(())
        },
    )?;
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node_header(node_type: u8, level: u8, entries: u16) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&TREE_SIGNATURE);
        buf.push(node_type);
        buf.push(level);
        buf.extend_from_slice(&entries.to_le_bytes());
        buf.extend_from_slice(&u64::MAX.to_le_bytes());
        buf.extend_from_slice(&u64::MAX.to_le_bytes());
        buf
    }

    fn chunk_key(buf: &mut Vec<u8>, size: u32, mask: u32, offsets: &[u64]) {
        buf.extend_from_slice(&size.to_le_bytes());
        buf.extend_from_slice(&mask.to_le_bytes());
        for o in offsets {
            buf.extend_from_slice(&o.to_le_bytes());
        }
    }

    #[test]
    fn group_leaf() {
        let mut buf = node_header(GROUP_NODE, 0, 2);
        for (key, child) in [(0u64, 500u64), (8, 600)] {
            buf.extend_from_slice(&key.to_le_bytes());
            buf.extend_from_slice(&child.to_le_bytes());
        }
        buf.extend_from_slice(&16u64.to_le_bytes());

        let node = BTreeV1Node::parse(&buf, 0, 8, 8, 0).unwrap();
        assert_eq!(node.level, 0);
        assert_eq!(node.children, vec![500, 600]);
        assert_eq!(node.keys[2], BTreeKey::Group { heap_offset: 16 });
        assert_eq!(node.left_sibling, None);
        assert_eq!(collect_symbol_table_nodes(&buf, 0, 8, 8).unwrap(), vec![500, 600]);
    }

    #[test]
    fn chunk_leaf_records() {
        let mut buf = node_header(CHUNK_NODE, 0, 2);
        chunk_key(&mut buf, 80, 0, &[0, 0, 0]);
        buf.extend_from_slice(&4000u64.to_le_bytes());
        chunk_key(&mut buf, 64, 2, &[0, 10, 0]);
        buf.extend_from_slice(&4080u64.to_le_bytes());
        chunk_key(&mut buf, 0, 0, &[0, 20, 0]);

        let records = collect_chunk_records(&buf, 0, 8, 8, 3).unwrap();
        assert_eq!(
            records,
            vec![
                ChunkRecord {
                    offset: vec![0, 0],
                    address: 4000,
                    size: 80,
                    filter_mask: 0
                },
                ChunkRecord {
                    offset: vec![0, 10],
                    address: 4080,
                    size: 64,
                    filter_mask: 2
                },
            ]
        );
    }

    #[test]
    fn chunk_tree_two_levels() {
        // root at 0 pointing at two leaves
        let mut root = node_header(CHUNK_NODE, 1, 2);
        // header(24) + keys of 24 bytes + 8-byte children
        let leaf_len = 24 + 2 * 24 + 8;
        let first = root.len() + 3 * 24 + 2 * 8;
        chunk_key(&mut root, 0, 0, &[0, 0]);
        root.extend_from_slice(&(first as u64).to_le_bytes());
        chunk_key(&mut root, 0, 0, &[5, 0]);
        root.extend_from_slice(&((first + leaf_len) as u64).to_le_bytes());
        chunk_key(&mut root, 0, 0, &[10, 0]);
        assert_eq!(root.len(), first);

        for (start, addr) in [(0u64, 7000u64), (5, 7040)] {
            let mut leaf = node_header(CHUNK_NODE, 0, 1);
            chunk_key(&mut leaf, 40, 0, &[start, 0]);
            leaf.extend_from_slice(&addr.to_le_bytes());
            chunk_key(&mut leaf, 0, 0, &[start + 5, 0]);
            assert_eq!(leaf.len(), leaf_len);
            root.extend_from_slice(&leaf);
        }

        let records = collect_chunk_records(&root, 0, 8, 8, 2).unwrap();
        let offsets: Vec<_> = records.iter().map(|r| r.offset.clone()).collect();
        assert_eq!(offsets, vec![vec![0], vec![5]]);
        assert_eq!(records[1].address, 7040);
    }

    #[test]
    fn level_mismatch_rejected() {
        // root at level 1 pointing back at itself
        let mut root = node_header(CHUNK_NODE, 1, 1);
        chunk_key(&mut root, 0, 0, &[0, 0]);
        root.extend_from_slice(&0u64.to_le_bytes());
        chunk_key(&mut root, 0, 0, &[1, 0]);
        assert_eq!(
            collect_chunk_records(&root, 0, 8, 8, 2),
            Err(FormatError::InvalidBTreeLevel {
                parent: 1,
                child: 1
            })
        );
    }

    #[test]
    fn wrong_node_type() {
        let mut buf = node_header(GROUP_NODE, 0, 0);
        buf.extend_from_slice(&[0; 24]);
        assert_eq!(
            collect_chunk_records(&buf, 0, 8, 8, 2),
            Err(FormatError::InvalidBTreeNodeType(0))
        );
    }

    #[test]
    fn bad_signature() {
        let buf = [0u8; 64];
        assert_eq!(
            BTreeV1Node::parse(&buf, 0, 8, 8, 2),
            Err(FormatError::InvalidBTreeSignature)
        );
    }
}
