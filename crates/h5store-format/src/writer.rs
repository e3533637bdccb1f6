//! Minimal HDF5 writer for building fixture files.
//!
//! Objects are appended bottom-up: raw data and children first, then the
//! headers that point at them, so no address ever needs patching except
//! the superblock, which is written last into space reserved at offset 0.
//!
//! Two layouts are produced. `Classic` files match what the HDF5 library
//! writes by default (superblock v0, v1 object headers, symbol-table groups,
//! layout v3 with a v1 chunk B-tree). `Modern` files use superblock v2,
//! v2 object headers, link-message groups and layout v4, whose chunk index
//! is a fixed array, an extensible array or a version 2 B-tree depending on
//! how many dimensions are unlimited. Metadata checksums in modern files
//! are left zero.

#[cfg(not(feature = "std"))]
use alloc::{string::String, vec, vec::Vec};

use crate::btree_v2::{count_width, CHUNK_RECORDS, FILTERED_CHUNK_RECORDS};
use crate::message_type::MessageType;
use crate::signature::HDF5_SIGNATURE;

const UNDEF: u64 = u64::MAX;
const GROUP_LEAF_K: usize = 4;
const GROUP_INTERNAL_K: usize = 16;
const CHUNK_K: usize = 32;
const FIXED_ARRAY_PAGE_BITS: u8 = 10;
const EA_MAX_BITS: u8 = 32;
const EA_INDEX_ELEMENTS: usize = 4;
const EA_MIN_POINTERS: usize = 4;
const EA_MIN_ELEMENTS: usize = 16;
const BTREE_V2_NODE_SIZE: usize = 512;

const CLASSIC_SUPERBLOCK_LEN: usize = 96;
const MODERN_SUPERBLOCK_LEN: usize = 48;

/// Which generation of on-disk structures to write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterStyle {
    Classic,
    Modern,
}

/// A chunk to store in a chunked dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenChunk {
    /// Array-space origin of the chunk.
    pub offset: Vec<u64>,
    /// Stored bytes.
    pub data: Vec<u8>,
    pub filter_mask: u32,
}

impl WrittenChunk {
    pub fn new(offset: &[u64], data: Vec<u8>) -> Self {
        WrittenChunk {
            offset: offset.to_vec(),
            data,
            filter_mask: 0,
        }
    }

    pub fn with_filter_mask(mut self, filter_mask: u32) -> Self {
        self.filter_mask = filter_mask;
        self
    }
}

/// Builds an HDF5 file in memory.
#[derive(Debug, Clone)]
pub struct FileWriter {
    buf: Vec<u8>,
    style: WriterStyle,
    userblock: usize,
    committed_type: Option<u64>,
}

impl Default for FileWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl FileWriter {
    /// A writer producing classic files.
    pub fn new() -> Self {
        Self::with_style(WriterStyle::Classic)
    }

    pub fn with_style(style: WriterStyle) -> Self {
        let reserved = match style {
            WriterStyle::Classic => CLASSIC_SUPERBLOCK_LEN,
            WriterStyle::Modern => MODERN_SUPERBLOCK_LEN,
        };
        FileWriter {
            buf: vec![0; reserved],
            style,
            userblock: 0,
            committed_type: None,
        }
    }

    /// Prefix the file with a zero-filled user block of `size` bytes
    /// (a power of two, at least 512).
    pub fn with_userblock(mut self, size: usize) -> Self {
        self.userblock = size;
        self
    }

    pub fn style(&self) -> WriterStyle {
        self.style
    }

    fn append(&mut self, bytes: &[u8]) -> u64 {
        self.buf.resize((self.buf.len() + 7) & !7, 0);
        let at = self.buf.len() as u64;
        self.buf.extend_from_slice(bytes);
        at
    }

    /// Append raw bytes and return their address.
    pub fn raw(&mut self, bytes: &[u8]) -> u64 {
        self.append(bytes)
    }

    /// Write a named (committed) fixed-point datatype and return its header address.
    pub fn committed_datatype(&mut self, element_size: u32) -> u64 {
        self.object_header(&[(MessageType::Datatype, 0, datatype_body(element_size))])
    }

    /// Make subsequent datasets reference the committed datatype at `header`
    /// instead of carrying their own datatype message.
    pub fn use_committed_datatype(&mut self, header: Option<u64>) {
        self.committed_type = header;
    }

    /// Write a contiguous dataset. `None` data leaves the storage unallocated.
    pub fn contiguous(&mut self, shape: &[u64], element_size: u32, data: Option<&[u8]>) -> u64 {
        let (address, size) = match data {
            Some(bytes) => (self.raw(bytes), bytes.len() as u64),
            None => (UNDEF, shape.iter().product::<u64>() * element_size as u64),
        };
        let mut layout = vec![self.layout_version(), 1];
        layout.extend_from_slice(&address.to_le_bytes());
        layout.extend_from_slice(&size.to_le_bytes());
        self.dataset_header(self.dataspace_body(shape, None, false), element_size, layout)
    }

    /// Write a dataset with a null dataspace.
    pub fn null(&mut self, element_size: u32) -> u64 {
        let mut layout = vec![self.layout_version(), 1];
        layout.extend_from_slice(&UNDEF.to_le_bytes());
        layout.extend_from_slice(&0u64.to_le_bytes());
        self.dataset_header(self.dataspace_body(&[], None, true), element_size, layout)
    }

    /// Write a dataset whose data lives inside its layout message.
    pub fn compact(&mut self, shape: &[u64], element_size: u32, data: &[u8]) -> u64 {
        let mut layout = vec![self.layout_version(), 0];
        layout.extend_from_slice(&(data.len() as u16).to_le_bytes());
        layout.extend_from_slice(data);
        self.dataset_header(self.dataspace_body(shape, None, false), element_size, layout)
    }

    /// Write a chunked dataset holding `chunks`; slots not listed stay unwritten.
    pub fn chunked(
        &mut self,
        shape: &[u64],
        chunk_shape: &[u64],
        element_size: u32,
        chunks: &[WrittenChunk],
    ) -> u64 {
        self.write_chunked(shape, None, chunk_shape, element_size, chunks)
    }

    /// Write a chunked dataset that may grow to `max_shape`, where `None`
    /// marks an unlimited dimension.
    pub fn chunked_resizable(
        &mut self,
        shape: &[u64],
        max_shape: &[Option<u64>],
        chunk_shape: &[u64],
        element_size: u32,
        chunks: &[WrittenChunk],
    ) -> u64 {
        self.write_chunked(shape, Some(max_shape), chunk_shape, element_size, chunks)
    }

    fn write_chunked(
        &mut self,
        shape: &[u64],
        max_shape: Option<&[Option<u64>]>,
        chunk_shape: &[u64],
        element_size: u32,
        chunks: &[WrittenChunk],
    ) -> u64 {
        let stored: Vec<(&WrittenChunk, u64)> =
            chunks.iter().map(|c| (c, self.raw(&c.data))).collect();
        let full = chunk_shape.iter().product::<u64>() * element_size as u64;
        let filtered = stored
            .iter()
            .any(|(c, _)| c.filter_mask != 0 || c.data.len() as u64 != full);

        let layout = match self.style {
            WriterStyle::Classic => {
                let btree = self.chunk_btree(chunk_shape, &stored);
                let mut layout = vec![3, 2, chunk_shape.len() as u8 + 1];
                layout.extend_from_slice(&btree.to_le_bytes());
                for &c in chunk_shape {
                    layout.extend_from_slice(&(c as u32).to_le_bytes());
                }
                layout.extend_from_slice(&element_size.to_le_bytes());
                layout
            }
            WriterStyle::Modern => {
                let mut layout = vec![4, 2, 0, chunk_shape.len() as u8 + 1, 8];
                for &c in chunk_shape {
                    layout.extend_from_slice(&c.to_le_bytes());
                }
                layout.extend_from_slice(&(element_size as u64).to_le_bytes());
                let unlimited = max_shape.map_or(0, |m| m.iter().filter(|d| d.is_none()).count());
                let index = match (max_shape, unlimited) {
                    (Some(max_shape), 1) => {
                        layout.push(4);
                        layout.extend_from_slice(&[
                            EA_MAX_BITS,
                            EA_INDEX_ELEMENTS as u8,
                            EA_MIN_POINTERS as u8,
                            EA_MIN_ELEMENTS as u8,
                            EA_MAX_BITS,
                        ]);
                        self.extensible_array(max_shape, chunk_shape, filtered, &stored)
                    }
                    (Some(_), _) if unlimited > 1 => {
                        let (index, node_size) =
                            self.chunk_btree_v2(chunk_shape, filtered, &stored);
                        layout.push(5);
                        layout.extend_from_slice(&node_size.to_le_bytes());
                        layout.extend_from_slice(&[100, 40]);
                        index
                    }
                    _ => {
                        let extents: Vec<u64> = match max_shape {
                            Some(max_shape) => max_shape
                                .iter()
                                .zip(shape)
                                .map(|(m, &s)| m.unwrap_or(s))
                                .collect(),
                            None => shape.to_vec(),
                        };
                        let (index, page_bits) =
                            self.fixed_array(&extents, chunk_shape, filtered, &stored);
                        layout.push(3);
                        layout.push(page_bits);
                        index
                    }
                };
                layout.extend_from_slice(&index.to_le_bytes());
                layout
            }
        };
        let dataspace = self.dataspace_body(shape, max_shape, false);
        self.dataset_header(dataspace, element_size, layout)
    }

    /// Write a group holding `members` (name, object header address).
    pub fn group(&mut self, members: &[(&str, u64)]) -> u64 {
        match self.style {
            WriterStyle::Classic => self.symbol_table_group(members).0,
            WriterStyle::Modern => self.link_group(members),
        }
    }

    /// Write the root group and the superblock, returning the file bytes.
    pub fn finish(mut self, root_members: &[(&str, u64)]) -> Vec<u8> {
        let base = self.userblock as u64;
        let mut sb = Vec::new();
        sb.extend_from_slice(&HDF5_SIGNATURE);
        match self.style {
            WriterStyle::Classic => {
                let (root, btree, heap) = self.symbol_table_group(root_members);
                let eof = self.buf.len() as u64;
                sb.extend_from_slice(&[0, 0, 0, 0, 0, 8, 8, 0]);
                sb.extend_from_slice(&(GROUP_LEAF_K as u16).to_le_bytes());
                sb.extend_from_slice(&(GROUP_INTERNAL_K as u16).to_le_bytes());
                sb.extend_from_slice(&0u32.to_le_bytes());
                for addr in [base, UNDEF, eof, UNDEF, 0, root] {
                    sb.extend_from_slice(&addr.to_le_bytes());
                }
                sb.extend_from_slice(&1u32.to_le_bytes());
                sb.extend_from_slice(&0u32.to_le_bytes());
                sb.extend_from_slice(&btree.to_le_bytes());
                sb.extend_from_slice(&heap.to_le_bytes());
            }
            WriterStyle::Modern => {
                let root = self.link_group(root_members);
                let eof = self.buf.len() as u64;
                sb.extend_from_slice(&[2, 8, 8, 0]);
                for addr in [base, UNDEF, eof, root] {
                    sb.extend_from_slice(&addr.to_le_bytes());
                }
                sb.extend_from_slice(&[0; 4]);
            }
        }
        self.buf[..sb.len()].copy_from_slice(&sb);

        let mut out = vec![0u8; self.userblock];
        out.extend_from_slice(&self.buf);
        out
    }

    fn layout_version(&self) -> u8 {
        match self.style {
            WriterStyle::Classic => 3,
            WriterStyle::Modern => 4,
        }
    }

    fn dataspace_body(
        &self,
        shape: &[u64],
        max_shape: Option<&[Option<u64>]>,
        null: bool,
    ) -> Vec<u8> {
        let flags = max_shape.is_some() as u8;
        let mut body = if self.style == WriterStyle::Classic && !null {
            vec![1, shape.len() as u8, flags, 0, 0, 0, 0, 0]
        } else {
            let space_type = match (null, shape.is_empty()) {
                (true, _) => 2,
                (false, true) => 0,
                (false, false) => 1,
            };
            vec![2, shape.len() as u8, flags, space_type]
        };
        for &d in shape {
            body.extend_from_slice(&d.to_le_bytes());
        }
        for &m in max_shape.unwrap_or(&[]) {
            body.extend_from_slice(&m.unwrap_or(UNDEF).to_le_bytes());
        }
        body
    }

    fn dataset_header(&mut self, dataspace: Vec<u8>, element_size: u32, layout: Vec<u8>) -> u64 {
        let datatype = match self.committed_type {
            Some(address) => {
                let mut body = match self.style {
                    WriterStyle::Classic => vec![2, 0],
                    WriterStyle::Modern => vec![3, 2],
                };
                body.extend_from_slice(&address.to_le_bytes());
                (MessageType::Datatype, 0x02, body)
            }
            None => (MessageType::Datatype, 0, datatype_body(element_size)),
        };
        self.object_header(&[
            (MessageType::Dataspace, 0, dataspace),
            datatype,
            (MessageType::DataLayout, 0, layout),
        ])
    }

    fn object_header(&mut self, messages: &[(MessageType, u8, Vec<u8>)]) -> u64 {
        let mut out = Vec::new();
        match self.style {
            WriterStyle::Classic => {
                let mut body = Vec::new();
                for (msg_type, flags, data) in messages {
                    let padded = (data.len() + 7) & !7;
                    body.extend_from_slice(&msg_type.id().to_le_bytes());
                    body.extend_from_slice(&(padded as u16).to_le_bytes());
                    body.extend_from_slice(&[*flags, 0, 0, 0]);
                    body.extend_from_slice(data);
                    body.resize(body.len() + padded - data.len(), 0);
                }
                out.extend_from_slice(&[1, 0]);
                out.extend_from_slice(&(messages.len() as u16).to_le_bytes());
                out.extend_from_slice(&1u32.to_le_bytes());
                out.extend_from_slice(&(body.len() as u32).to_le_bytes());
                out.extend_from_slice(&[0; 4]);
                out.extend_from_slice(&body);
            }
            WriterStyle::Modern => {
                let mut body = Vec::new();
                for (msg_type, flags, data) in messages {
                    body.push(msg_type.id() as u8);
                    body.extend_from_slice(&(data.len() as u16).to_le_bytes());
                    body.push(*flags);
                    body.extend_from_slice(data);
                }
                out.extend_from_slice(b"OHDR");
                out.extend_from_slice(&[2, 0x02]);
                out.extend_from_slice(&(body.len() as u32).to_le_bytes());
                out.extend_from_slice(&body);
                out.extend_from_slice(&[0; 4]);
            }
        }
        self.append(&out)
    }

    /// Write a v1 B-tree over `items` (left key, child) and return its root.
    fn btree(
        &mut self,
        node_type: u8,
        mut items: Vec<(Vec<u8>, u64)>,
        final_key: Vec<u8>,
        fanout: usize,
    ) -> u64 {
        let mut level = 0u8;
        loop {
            let groups: Vec<Vec<(Vec<u8>, u64)>> =
                items.chunks(fanout.max(1)).map(|g| g.to_vec()).collect();
            if groups.is_empty() {
                return self.btree_node(node_type, level, &[], &final_key);
            }
            let mut parents = Vec::with_capacity(groups.len());
            for (i, group) in groups.iter().enumerate() {
                let right = groups.get(i + 1).map_or(&final_key, |next| &next[0].0);
                let address = self.btree_node(node_type, level, group, right);
                parents.push((group[0].0.clone(), address));
            }
            if parents.len() == 1 {
                return parents[0].1;
            }
            items = parents;
            level += 1;
        }
    }

    fn btree_node(
        &mut self,
        node_type: u8,
        level: u8,
        entries: &[(Vec<u8>, u64)],
        right_key: &[u8],
    ) -> u64 {
        let mut node = Vec::new();
        node.extend_from_slice(b"TREE");
        node.push(node_type);
        node.push(level);
        node.extend_from_slice(&(entries.len() as u16).to_le_bytes());
        node.extend_from_slice(&UNDEF.to_le_bytes());
        node.extend_from_slice(&UNDEF.to_le_bytes());
        for (key, child) in entries {
            node.extend_from_slice(key);
            node.extend_from_slice(&child.to_le_bytes());
        }
        node.extend_from_slice(right_key);
        self.append(&node)
    }

    fn chunk_btree(&mut self, chunk_shape: &[u64], stored: &[(&WrittenChunk, u64)]) -> u64 {
        if stored.is_empty() {
            return UNDEF;
        }
        let key = |size: u32, mask: u32, offset: &[u64]| {
            let mut k = Vec::new();
            k.extend_from_slice(&size.to_le_bytes());
            k.extend_from_slice(&mask.to_le_bytes());
            for &o in offset {
                k.extend_from_slice(&o.to_le_bytes());
            }
            k.extend_from_slice(&0u64.to_le_bytes());
            k
        };
        let mut sorted: Vec<_> = stored.to_vec();
        sorted.sort_by(|a, b| a.0.offset.cmp(&b.0.offset));
        let items = sorted
            .iter()
            .map(|(c, addr)| (key(c.data.len() as u32, c.filter_mask, &c.offset), *addr))
            .collect();
        let mut end = sorted[sorted.len() - 1].0.offset.clone();
        if let (Some(first), Some(&extent)) = (end.first_mut(), chunk_shape.first()) {
            *first += extent;
        }
        self.btree(1, items, key(0, 0, &end), 2 * CHUNK_K)
    }

    /// Slots are numbered over the grid of `extents`, the maximum shape.
    fn fixed_array(
        &mut self,
        extents: &[u64],
        chunk_shape: &[u64],
        filtered: bool,
        stored: &[(&WrittenChunk, u64)],
    ) -> (u64, u8) {
        let grid: Vec<u64> = extents
            .iter()
            .zip(chunk_shape)
            .map(|(&d, &c)| d.div_ceil(c))
            .collect();
        let slots: u64 = grid.iter().product();
        let mut page_bits = FIXED_ARRAY_PAGE_BITS;
        while (1u64 << page_bits) < slots {
            page_bits += 1;
        }
        if stored.is_empty() {
            return (UNDEF, page_bits);
        }

        let element_len: u8 = if filtered { 8 + 4 + 4 } else { 8 };

        let mut entries = vec![None; slots as usize];
        for (chunk, address) in stored {
            let slot = chunk
                .offset
                .iter()
                .zip(chunk_shape)
                .zip(&grid)
                .fold(0u64, |acc, ((&o, &c), &g)| acc * g + o / c);
            entries[slot as usize] = Some((*address, chunk.data.len() as u32, chunk.filter_mask));
        }

        // header: signature, version, client, element size, page bits,
        // element count, data block address, checksum
        self.buf.resize((self.buf.len() + 7) & !7, 0);
        let header_address = self.buf.len() as u64;
        let block_address = header_address + 28;
        let mut out = Vec::new();
        out.extend_from_slice(b"FAHD");
        out.extend_from_slice(&[0, filtered as u8, element_len, page_bits]);
        out.extend_from_slice(&slots.to_le_bytes());
        out.extend_from_slice(&block_address.to_le_bytes());
        out.extend_from_slice(&[0; 4]);
        out.extend_from_slice(b"FADB");
        out.extend_from_slice(&[0, filtered as u8]);
        out.extend_from_slice(&header_address.to_le_bytes());
        for entry in entries {
            array_element(&mut out, entry, filtered);
        }
        out.extend_from_slice(&[0; 4]);
        self.buf.extend_from_slice(&out);
        (header_address, page_bits)
    }

    /// Write an extensible array over `stored`, numbering slots with the
    /// unlimited axis first. Data blocks are never paged.
    fn extensible_array(
        &mut self,
        max_shape: &[Option<u64>],
        chunk_shape: &[u64],
        filtered: bool,
        stored: &[(&WrittenChunk, u64)],
    ) -> u64 {
        if stored.is_empty() {
            return UNDEF;
        }
        let axis = max_shape.iter().position(Option::is_none).unwrap_or(0);
        let mut order = vec![axis];
        order.extend((0..chunk_shape.len()).filter(|&d| d != axis));
        let mut slots: Vec<Option<(u64, u32, u32)>> = Vec::new();
        for (chunk, address) in stored {
            let slot = order.iter().fold(0u64, |acc, &d| {
                let extent = max_shape[d].map_or(1, |m| m.div_ceil(chunk_shape[d]));
                acc * extent + chunk.offset[d] / chunk_shape[d]
            }) as usize;
            if slots.len() <= slot {
                slots.resize(slot + 1, None);
            }
            slots[slot] = Some((*address, chunk.data.len() as u32, chunk.filter_mask));
        }

        let client = filtered as u8;
        // the header back-pointer in every block is patched once the header exists
        let mut back_refs = Vec::new();
        let prefix = |signature: &[u8; 4]| {
            let mut out = signature.to_vec();
            out.extend_from_slice(&[0, client]);
            out.extend_from_slice(&UNDEF.to_le_bytes());
            out
        };

        let levels = 1 + EA_MAX_BITS as u32 - EA_MIN_ELEMENTS.trailing_zeros();
        let direct_levels = 2 * EA_MIN_POINTERS.trailing_zeros();
        let mut direct = vec![UNDEF; 2 * (EA_MIN_POINTERS - 1)];
        let mut next_direct = 0;
        let mut supers = vec![UNDEF; (levels - direct_levels) as usize];
        let mut start = EA_INDEX_ELEMENTS;
        for u in 0..levels {
            if start >= slots.len() {
                break;
            }
            let count = 1usize << (u / 2);
            let per = (1usize << u.div_ceil(2)) * EA_MIN_ELEMENTS;
            let mut blocks = Vec::with_capacity(count);
            for d in 0..count {
                let first = start + d * per;
                let entries = slots
                    .get(first..(first + per).min(slots.len()))
                    .unwrap_or(&[]);
                if entries.iter().all(Option::is_none) {
                    blocks.push(UNDEF);
                    continue;
                }
                let mut out = prefix(b"EADB");
                out.extend_from_slice(&((first - EA_INDEX_ELEMENTS) as u32).to_le_bytes());
                for i in 0..per {
                    array_element(&mut out, entries.get(i).copied().flatten(), filtered);
                }
                out.extend_from_slice(&[0; 4]);
                let at = self.append(&out);
                back_refs.push(at);
                blocks.push(at);
            }
            if u < direct_levels {
                direct[next_direct..next_direct + count].copy_from_slice(&blocks);
                next_direct += count;
            } else if blocks.iter().any(|&b| b != UNDEF) {
                let mut out = prefix(b"EASB");
                out.extend_from_slice(&((start - EA_INDEX_ELEMENTS) as u32).to_le_bytes());
                for block in blocks {
                    out.extend_from_slice(&block.to_le_bytes());
                }
                out.extend_from_slice(&[0; 4]);
                let at = self.append(&out);
                back_refs.push(at);
                supers[(u - direct_levels) as usize] = at;
            }
            start += count * per;
        }

        let mut out = prefix(b"EAIB");
        for i in 0..EA_INDEX_ELEMENTS {
            array_element(&mut out, slots.get(i).copied().flatten(), filtered);
        }
        for address in direct.iter().chain(&supers) {
            out.extend_from_slice(&address.to_le_bytes());
        }
        out.extend_from_slice(&[0; 4]);
        let index_block = self.append(&out);
        back_refs.push(index_block);

        let element_len: u8 = if filtered { 8 + 4 + 4 } else { 8 };
        let mut out = b"EAHD".to_vec();
        out.extend_from_slice(&[
            0,
            client,
            element_len,
            EA_MAX_BITS,
            EA_INDEX_ELEMENTS as u8,
            EA_MIN_ELEMENTS as u8,
            EA_MIN_POINTERS as u8,
            EA_MAX_BITS,
        ]);
        let allocated = slots.iter().flatten().count() as u64;
        for stat in [0, 0, 0, 0, slots.len() as u64, allocated, index_block] {
            out.extend_from_slice(&stat.to_le_bytes());
        }
        out.extend_from_slice(&[0; 4]);
        let header = self.append(&out);
        for block in back_refs {
            let at = block as usize + 6;
            self.buf[at..at + 8].copy_from_slice(&header.to_le_bytes());
        }
        header
    }

    /// Write a version 2 B-tree of chunk records of depth 0 or 1, doubling
    /// the node size until the records fit. Returns (header, node size).
    fn chunk_btree_v2(
        &mut self,
        chunk_shape: &[u64],
        filtered: bool,
        stored: &[(&WrittenChunk, u64)],
    ) -> (u64, u32) {
        let tree_type = if filtered {
            FILTERED_CHUNK_RECORDS
        } else {
            CHUNK_RECORDS
        };
        let record_size = 8 + if filtered { 4 + 4 } else { 0 } + 8 * chunk_shape.len();
        let mut keyed: Vec<(Vec<u64>, Vec<u8>)> = stored
            .iter()
            .map(|(c, address)| {
                let scaled: Vec<u64> = c
                    .offset
                    .iter()
                    .zip(chunk_shape)
                    .map(|(&o, &e)| o / e)
                    .collect();
                let mut record = address.to_le_bytes().to_vec();
                if filtered {
                    record.extend_from_slice(&(c.data.len() as u32).to_le_bytes());
                    record.extend_from_slice(&c.filter_mask.to_le_bytes());
                }
                for s in &scaled {
                    record.extend_from_slice(&s.to_le_bytes());
                }
                (scaled, record)
            })
            .collect();
        keyed.sort_by(|a, b| a.0.cmp(&b.0));
        let records: Vec<Vec<u8>> = keyed.into_iter().map(|(_, r)| r).collect();
        let n = records.len();

        let mut node_size = BTREE_V2_NODE_SIZE;
        let (leaf_max, depth) = loop {
            let leaf_max = (node_size - 10) / record_size;
            if n <= leaf_max {
                break (leaf_max, 0u16);
            }
            let pointer = 8 + count_width(leaf_max as u64);
            let internal_max = (node_size - 10).saturating_sub(pointer) / (record_size + pointer);
            if n <= (internal_max + 1) * leaf_max + internal_max {
                break (leaf_max, 1);
            }
            node_size *= 2;
        };

        let (root, root_records) = if n == 0 {
            (UNDEF, 0)
        } else if depth == 0 {
            (self.btree_v2_node(b"BTLF", tree_type, &records, &[]), n)
        } else {
            let children = (n + 1).div_ceil(leaf_max + 1);
            let in_leaves = n - (children - 1);
            let width = count_width(leaf_max as u64);
            let mut pointers = Vec::new();
            let mut separators = Vec::new();
            let mut at = 0;
            for i in 0..children {
                let size = in_leaves / children + usize::from(i < in_leaves % children);
                let leaf = self.btree_v2_node(b"BTLF", tree_type, &records[at..at + size], &[]);
                pointers.extend_from_slice(&leaf.to_le_bytes());
                pointers.extend_from_slice(&(size as u64).to_le_bytes()[..width]);
                at += size;
                if i + 1 < children {
                    separators.push(records[at].clone());
                    at += 1;
                }
            }
            (
                self.btree_v2_node(b"BTIN", tree_type, &separators, &pointers),
                children - 1,
            )
        };

        let mut out = b"BTHD".to_vec();
        out.extend_from_slice(&[0, tree_type]);
        out.extend_from_slice(&(node_size as u32).to_le_bytes());
        out.extend_from_slice(&(record_size as u16).to_le_bytes());
        out.extend_from_slice(&depth.to_le_bytes());
        out.extend_from_slice(&[100, 40]);
        out.extend_from_slice(&root.to_le_bytes());
        out.extend_from_slice(&(root_records as u16).to_le_bytes());
        out.extend_from_slice(&(n as u64).to_le_bytes());
        out.extend_from_slice(&[0; 4]);
        (self.append(&out), node_size as u32)
    }

    fn btree_v2_node(
        &mut self,
        signature: &[u8; 4],
        tree_type: u8,
        records: &[Vec<u8>],
        pointers: &[u8],
    ) -> u64 {
        let mut node = signature.to_vec();
        node.extend_from_slice(&[0, tree_type]);
        for record in records {
            node.extend_from_slice(record);
        }
        node.extend_from_slice(pointers);
        node.extend_from_slice(&[0; 4]);
        self.append(&node)
    }

    /// Returns (object header, B-tree, local heap) addresses.
    fn symbol_table_group(&mut self, members: &[(&str, u64)]) -> (u64, u64, u64) {
        let mut sorted: Vec<(&str, u64)> = members.to_vec();
        sorted.sort_by(|a, b| a.0.cmp(b.0));

        // heap data segment: offset 0 holds the empty name
        let mut segment = vec![0u8; 8];
        let mut name_offsets = Vec::with_capacity(sorted.len());
        for (name, _) in &sorted {
            name_offsets.push(segment.len() as u64);
            segment.extend_from_slice(name.as_bytes());
            segment.push(0);
            segment.resize((segment.len() + 7) & !7, 0);
        }
        self.buf.resize((self.buf.len() + 7) & !7, 0);
        let heap_address = self.buf.len() as u64;
        let mut heap = Vec::new();
        heap.extend_from_slice(b"HEAP");
        heap.extend_from_slice(&[0; 4]);
        heap.extend_from_slice(&(segment.len() as u64).to_le_bytes());
        heap.extend_from_slice(&UNDEF.to_le_bytes());
        heap.extend_from_slice(&(heap_address + 32).to_le_bytes());
        heap.extend_from_slice(&segment);
        self.append(&heap);

        let capacity = 2 * GROUP_LEAF_K;
        let mut items = Vec::new();
        let mut left_key = 0u64;
        let mut right_key = 0u64;
        for (members, offsets) in sorted.chunks(capacity).zip(name_offsets.chunks(capacity)) {
            let mut node = Vec::new();
            node.extend_from_slice(b"SNOD");
            node.extend_from_slice(&[1, 0]);
            node.extend_from_slice(&(members.len() as u16).to_le_bytes());
            for ((_, header), name_offset) in members.iter().zip(offsets) {
                node.extend_from_slice(&name_offset.to_le_bytes());
                node.extend_from_slice(&header.to_le_bytes());
                node.extend_from_slice(&[0; 24]);
            }
            node.resize(8 + capacity * 40, 0);
            let address = self.append(&node);
            items.push((left_key.to_le_bytes().to_vec(), address));
            right_key = offsets[offsets.len() - 1];
            left_key = right_key;
        }
        let btree = self.btree(
            0,
            items,
            right_key.to_le_bytes().to_vec(),
            2 * GROUP_INTERNAL_K,
        );

        let mut table = Vec::new();
        table.extend_from_slice(&btree.to_le_bytes());
        table.extend_from_slice(&heap_address.to_le_bytes());
        let header = self.object_header(&[(MessageType::SymbolTable, 0, table)]);
        (header, btree, heap_address)
    }

    fn link_group(&mut self, members: &[(&str, u64)]) -> u64 {
        let mut info = vec![0, 0];
        info.extend_from_slice(&UNDEF.to_le_bytes());
        info.extend_from_slice(&UNDEF.to_le_bytes());
        let mut messages = vec![
            (MessageType::LinkInfo, 0, info),
            (MessageType::GroupInfo, 0, vec![0, 0]),
        ];
        for (name, address) in members {
            let mut link = vec![1, 0, name.len() as u8];
            link.extend_from_slice(name.as_bytes());
            link.extend_from_slice(&address.to_le_bytes());
            messages.push((MessageType::Link, 0, link));
        }
        self.object_header(&messages)
    }
}

fn array_element(out: &mut Vec<u8>, entry: Option<(u64, u32, u32)>, filtered: bool) {
    let (address, size, mask) = entry.unwrap_or((UNDEF, 0, 0));
    out.extend_from_slice(&address.to_le_bytes());
    if filtered {
        out.extend_from_slice(&size.to_le_bytes());
        out.extend_from_slice(&mask.to_le_bytes());
    }
}

fn datatype_body(element_size: u32) -> Vec<u8> {
    // fixed-point, version 1, little-endian unsigned
    let mut body = vec![0x10, 0, 0, 0];
    body.extend_from_slice(&element_size.to_le_bytes());
    body.extend_from_slice(&0u16.to_le_bytes());
    body.extend_from_slice(&((element_size * 8) as u16).to_le_bytes());
    body
}

/// Owned member list helper for callers that build names dynamically.
pub fn members<'a>(names: &'a [String], addresses: &[u64]) -> Vec<(&'a str, u64)> {
    names
        .iter()
        .map(String::as_str)
        .zip(addresses.iter().copied())
        .collect()
}
