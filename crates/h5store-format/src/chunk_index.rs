//! Enumerate the chunks recorded by any supported chunk index.

#[cfg(not(feature = "std"))]
use alloc::{vec, vec::Vec};

use crate::btree_v1::collect_chunk_records;
use crate::btree_v2::read_chunk_btree_v2;
use crate::data_layout::{ChunkIndexAddress, ChunkedLayout};
use crate::dataspace::UNLIMITED;
use crate::error::FormatError;
use crate::extensible_array::read_extensible_array;
use crate::fixed_array::read_fixed_array;
use crate::util::{read_address, read_u32, read_var_uint};

/// Client ID of an array index whose chunks went through filters.
pub(crate) const FILTERED_CHUNKS: u8 = 1;

/// One allocated chunk as recorded in a chunk index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkRecord {
    /// Array-space origin of the chunk, one entry per dataspace dimension.
    pub offset: Vec<u64>,
    /// File address of the stored bytes, relative to the base address.
    pub address: u64,
    /// Number of bytes stored.
    pub size: u64,
    /// Bit `i` set means filter `i` of the pipeline was skipped.
    pub filter_mask: u32,
}

/// One element of a fixed or extensible array index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArrayElement {
    /// Chunk address, `None` for an unallocated slot.
    pub address: Option<u64>,
    /// Stored chunk size, present for filtered chunks only.
    pub filtered_size: Option<u64>,
    pub filter_mask: u32,
}

impl ArrayElement {
    /// Decode the `element_size`-byte element at `pos`. Filtered elements
    /// carry the stored size and filter mask after the address.
    pub(crate) fn read(
        data: &[u8],
        pos: usize,
        element_size: usize,
        filtered: bool,
        offset_size: u8,
    ) -> Result<ArrayElement, FormatError> {
        let os = offset_size as usize;
        let address = read_address(data, pos, offset_size)?;
        if !filtered {
            return Ok(ArrayElement {
                address,
                filtered_size: None,
                filter_mask: 0,
            });
        }
        let size_width = element_size.saturating_sub(os + 4);
        Ok(ArrayElement {
            address,
            filtered_size: Some(read_var_uint(data, pos + os, size_width)?),
            filter_mask: read_u32(data, pos + os + size_width)?,
        })
    }
}

/// Numbering of chunk slots in array-based indexes.
///
/// Slots count chunks row-major over the grid of the maximum dimensions,
/// visiting dataset axes in `order`. The current dimensions only decide
/// which slots can hold data.
struct SlotGeometry<'a> {
    chunk_shape: &'a [u64],
    dims: &'a [u64],
    /// Dataset axis of each slot axis, slowest first.
    order: Vec<usize>,
    /// Chunks along each slot axis.
    grid: Vec<u64>,
    chunk_bytes: u64,
}

impl<'a> SlotGeometry<'a> {
    fn new(
        layout: &'a ChunkedLayout,
        dims: &'a [u64],
        max_dims: Option<&[u64]>,
    ) -> Result<Self, FormatError> {
        let chunk_shape = layout.chunk_shape();
        if chunk_shape.len() != dims.len() {
            return Err(FormatError::ChunkRankMismatch {
                layout: chunk_shape.len(),
                dataspace: dims.len(),
            });
        }
        if chunk_shape.contains(&0) {
            return Err(FormatError::ZeroChunkDimension);
        }
        let max_dims = max_dims.filter(|m| m.len() == dims.len()).unwrap_or(dims);
        let grid = max_dims
            .iter()
            .zip(dims)
            .zip(chunk_shape)
            .map(|((&max, &d), &c)| {
                let extent = if max == UNLIMITED { d } else { max };
                extent.div_ceil(c)
            })
            .collect();
        let chunk_bytes = chunk_shape
            .iter()
            .try_fold(layout.element_size(), |acc, &c| acc.checked_mul(c))
            .ok_or(FormatError::AddressOverflow(u64::MAX))?;
        Ok(SlotGeometry {
            chunk_shape,
            dims,
            order: (0..dims.len()).collect(),
            grid,
            chunk_bytes,
        })
    }

    /// Extensible array numbering: the unlimited axis first, the others
    /// after it in dataset order.
    fn unlimited_first(mut self, max_dims: Option<&[u64]>) -> Result<Self, FormatError> {
        let max_dims = max_dims
            .filter(|m| m.len() == self.dims.len())
            .unwrap_or(&[]);
        let unlimited: Vec<usize> = (0..max_dims.len())
            .filter(|&d| max_dims[d] == UNLIMITED)
            .collect();
        let &[axis] = unlimited.as_slice() else {
            return Err(FormatError::UnlimitedDimensionCount(unlimited.len()));
        };
        let mut order = vec![axis];
        order.extend((0..self.dims.len()).filter(|&d| d != axis));
        self.grid = order
            .iter()
            .map(|&d| {
                if d == axis {
                    UNLIMITED
                } else {
                    max_dims[d].div_ceil(self.chunk_shape[d])
                }
            })
            .collect();
        self.order = order;
        Ok(self)
    }

    /// Chunks of the current dimensions, in row-major dataset order, as
    /// scaled coordinates.
    fn current_chunks(&self) -> impl Iterator<Item = Vec<u64>> + '_ {
        let grid: Vec<u64> = self
            .dims
            .iter()
            .zip(self.chunk_shape)
            .map(|(&d, &c)| d.div_ceil(c))
            .collect();
        let count = grid
            .iter()
            .try_fold(1u64, |acc, &g| acc.checked_mul(g))
            .unwrap_or(u64::MAX);
        (0..count).map(move |mut i| {
            let mut scaled = vec![0u64; grid.len()];
            for d in (0..grid.len()).rev() {
                scaled[d] = i % grid[d];
                i /= grid[d];
            }
            scaled
        })
    }

    /// Slot of the chunk at scaled coordinates `scaled`.
    fn slot(&self, scaled: &[u64]) -> Option<u64> {
        self.order
            .iter()
            .zip(&self.grid)
            .try_fold(0u64, |acc, (&axis, &g)| {
                acc.checked_mul(g)?.checked_add(scaled[axis])
            })
    }

    /// Array-space origin of `slot`, `None` when it lies outside the
    /// current dimensions.
    fn origin(&self, mut slot: u64) -> Option<Vec<u64>> {
        let mut origin = vec![0u64; self.dims.len()];
        for (k, &axis) in self.order.iter().enumerate().rev() {
            let scaled = if k == 0 {
                slot
            } else {
                let g = self.grid[k];
                if g == 0 {
                    return None;
                }
                let s = slot % g;
                slot /= g;
                s
            };
            let at = scaled.checked_mul(self.chunk_shape[axis])?;
            if at >= self.dims[axis] {
                return None;
            }
            origin[axis] = at;
        }
        Some(origin)
    }

    fn array_records(
        &self,
        elements: impl IntoIterator<Item = (u64, ArrayElement)>,
    ) -> Vec<ChunkRecord> {
        elements
            .into_iter()
            .filter_map(|(slot, element)| {
                Some(ChunkRecord {
                    address: element.address?,
                    offset: self.origin(slot)?,
                    size: element.filtered_size.unwrap_or(self.chunk_bytes),
                    filter_mask: element.filter_mask,
                })
            })
            .collect()
    }
}

/// Read the chunk records of a chunked dataset.
///
/// `dims` are the current dataspace dimensions and `max_dims` the maximum
/// ones, which array-based indexes number their slots by. Records come
/// back in the order the index stores them; slots that were never written
/// or lie outside the current dimensions are absent.
pub fn read_chunk_records(
    data: &[u8],
    layout: &ChunkedLayout,
    dims: &[u64],
    max_dims: Option<&[u64]>,
    offset_size: u8,
    length_size: u8,
) -> Result<Vec<ChunkRecord>, FormatError> {
    let Some(address) = layout.index.address() else {
        return Ok(Vec::new());
    };

    match &layout.index {
        ChunkIndexAddress::BTreeV1 { .. } => collect_chunk_records(
            data,
            address,
            offset_size,
            length_size,
            layout.dimensions.len(),
        ),
        ChunkIndexAddress::SingleChunk {
            filtered_size,
            filter_mask,
            ..
        } => {
            let geometry = SlotGeometry::new(layout, dims, max_dims)?;
            Ok(vec![ChunkRecord {
                offset: vec![0; dims.len()],
                address,
                size: filtered_size.unwrap_or(geometry.chunk_bytes),
                filter_mask: *filter_mask,
            }])
        }
        ChunkIndexAddress::Implicit { .. } => {
            let geometry = SlotGeometry::new(layout, dims, max_dims)?;
            geometry
                .current_chunks()
                .map(|scaled| {
                    let chunk_address = geometry
                        .slot(&scaled)
                        .and_then(|slot| slot.checked_mul(geometry.chunk_bytes))
                        .and_then(|o| o.checked_add(address))
                        .ok_or(FormatError::AddressOverflow(address))?;
                    let offset = scaled
                        .iter()
                        .zip(geometry.chunk_shape)
                        .map(|(&s, &c)| s * c)
                        .collect();
                    Ok(ChunkRecord {
                        offset,
                        address: chunk_address,
                        size: geometry.chunk_bytes,
                        filter_mask: 0,
                    })
                })
                .collect()
        }
        ChunkIndexAddress::FixedArray { .. } => {
            let geometry = SlotGeometry::new(layout, dims, max_dims)?;
            let entries = read_fixed_array(data, address, offset_size, length_size)?;
            Ok(geometry.array_records((0u64..).zip(entries)))
        }
        ChunkIndexAddress::ExtensibleArray { .. } => {
            let geometry = SlotGeometry::new(layout, dims, max_dims)?.unlimited_first(max_dims)?;
            let elements = read_extensible_array(data, address, offset_size, length_size)?;
            Ok(geometry.array_records(elements))
        }
        ChunkIndexAddress::BTreeV2 { .. } => {
            let geometry = SlotGeometry::new(layout, dims, max_dims)?;
            read_chunk_btree_v2(
                data,
                address,
                geometry.chunk_shape,
                geometry.chunk_bytes,
                offset_size,
                length_size,
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(index: ChunkIndexAddress) -> ChunkedLayout {
        ChunkedLayout {
            version: 4,
            flags: 0,
            dimensions: vec![6, 4, 8],
            index,
        }
    }

    /// A fixed array of unfiltered 8-byte elements at address 0.
    fn fixed_array(addresses: &[u64]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"FAHD");
        buf.extend_from_slice(&[0, 0, 8, 10]);
        buf.extend_from_slice(&(addresses.len() as u64).to_le_bytes());
        buf.extend_from_slice(&40u64.to_le_bytes());
        buf.resize(40, 0);
        buf.extend_from_slice(b"FADB");
        buf.extend_from_slice(&[0, 0]);
        buf.extend_from_slice(&0u64.to_le_bytes());
        for addr in addresses {
            buf.extend_from_slice(&addr.to_le_bytes());
        }
        buf
    }

    fn fixed_array_layout() -> ChunkedLayout {
        layout(ChunkIndexAddress::FixedArray {
            address: Some(0),
            page_bits: 10,
        })
    }

    #[test]
    fn unallocated_index_has_no_records() {
        let l = layout(ChunkIndexAddress::FixedArray {
            address: None,
            page_bits: 10,
        });
        assert!(read_chunk_records(&[], &l, &[24, 16], None, 8, 8)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn single_chunk_unfiltered() {
        let l = layout(ChunkIndexAddress::SingleChunk {
            address: Some(4096),
            filtered_size: None,
            filter_mask: 0,
        });
        let records = read_chunk_records(&[], &l, &[6, 4], None, 8, 8).unwrap();
        assert_eq!(
            records,
            vec![ChunkRecord {
                offset: vec![0, 0],
                address: 4096,
                size: 6 * 4 * 8,
                filter_mask: 0
            }]
        );
    }

    #[test]
    fn implicit_covers_every_slot() {
        let l = layout(ChunkIndexAddress::Implicit {
            address: Some(1000),
        });
        let records = read_chunk_records(&[], &l, &[12, 6], None, 8, 8).unwrap();
        // 2 x 2 grid
        assert_eq!(records.len(), 4);
        assert_eq!(records[1].offset, vec![0, 4]);
        assert_eq!(records[1].address, 1000 + 192);
        assert_eq!(records[3].offset, vec![6, 4]);
        assert_eq!(records[3].address, 1000 + 3 * 192);
    }

    #[test]
    fn implicit_addresses_follow_the_maximum_grid() {
        let l = layout(ChunkIndexAddress::Implicit {
            address: Some(1000),
        });
        // current 2 x 2 chunks inside a 4 x 4 maximum grid
        let records = read_chunk_records(&[], &l, &[12, 8], Some(&[24, 16]), 8, 8).unwrap();
        let found: Vec<_> = records.iter().map(|r| (r.offset.clone(), r.address)).collect();
        assert_eq!(
            found,
            vec![
                (vec![0, 0], 1000),
                (vec![0, 4], 1000 + 192),
                (vec![6, 0], 1000 + 4 * 192),
                (vec![6, 4], 1000 + 5 * 192),
            ]
        );
    }

    #[test]
    fn rank_mismatch() {
        let l = layout(ChunkIndexAddress::Implicit { address: Some(0) });
        assert_eq!(
            read_chunk_records(&[], &l, &[12], None, 8, 8),
            Err(FormatError::ChunkRankMismatch {
                layout: 2,
                dataspace: 1
            })
        );
    }

    #[test]
    fn fixed_array_slots_map_to_origins() {
        // 24x16 with 6x4 chunks -> 4x4 grid, only slots 2 and 7 written
        let mut addresses = [u64::MAX; 16];
        addresses[2] = 5000;
        addresses[7] = 6000;
        let buf = fixed_array(&addresses);
        let records = read_chunk_records(&buf, &fixed_array_layout(), &[24, 16], None, 8, 8)
            .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].offset, vec![0, 8]);
        assert_eq!(records[1].offset, vec![6, 12]);
        assert_eq!(records[1].address, 6000);
        assert_eq!(records[1].size, 192);
    }

    #[test]
    fn fixed_array_slots_follow_the_maximum_grid() {
        // 12x8 of a 24x16 maximum: the array holds the full 4x4 grid and
        // the current chunks sit in slots 0, 1, 4 and 5
        let mut addresses = [u64::MAX; 16];
        for (slot, address) in [(0, 100), (1, 200), (4, 300), (5, 400)] {
            addresses[slot] = address;
        }
        let buf = fixed_array(&addresses);
        let records =
            read_chunk_records(&buf, &fixed_array_layout(), &[12, 8], Some(&[24, 16]), 8, 8)
                .unwrap();
        let found: Vec<_> = records.iter().map(|r| (r.offset.clone(), r.address)).collect();
        assert_eq!(
            found,
            vec![
                (vec![0, 0], 100),
                (vec![0, 4], 200),
                (vec![6, 0], 300),
                (vec![6, 4], 400),
            ]
        );
    }

    #[test]
    fn fixed_array_drops_slots_outside_current_dimensions() {
        let mut addresses = [u64::MAX; 16];
        addresses[2] = 700;
        addresses[15] = 800;
        let buf = fixed_array(&addresses);
        let records =
            read_chunk_records(&buf, &fixed_array_layout(), &[12, 8], Some(&[24, 16]), 8, 8)
                .unwrap();
        assert!(records.is_empty());
    }

    /// An extensible array with eight elements in its index block.
    fn extensible_array(addresses: [u64; 8]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"EAHD");
        // version, client, element size, max bits, index block elements,
        // data block minimum, super block minimum, page bits
        buf.extend_from_slice(&[0, 0, 8, 32, 8, 16, 4, 10]);
        for stat in [0u64, 0, 0, 0, 8, 8, 72] {
            buf.extend_from_slice(&stat.to_le_bytes());
        }
        buf.extend_from_slice(&[0; 4]);
        buf.extend_from_slice(b"EAIB");
        buf.extend_from_slice(&[0, 0]);
        buf.extend_from_slice(&0u64.to_le_bytes());
        for addr in addresses {
            buf.extend_from_slice(&addr.to_le_bytes());
        }
        // 6 direct data blocks, 25 super blocks
        for _ in 0..31 {
            buf.extend_from_slice(&u64::MAX.to_le_bytes());
        }
        buf.extend_from_slice(&[0; 4]);
        buf
    }

    #[test]
    fn extensible_array_numbers_the_unlimited_axis_first() {
        let l = layout(ChunkIndexAddress::ExtensibleArray { address: Some(0) });
        let none = u64::MAX;
        // axis 1 is unlimited; axis 0 has 4 chunks at most, 2 of them current
        let buf = extensible_array([none, 10, 20, none, none, 50, none, none]);
        let records =
            read_chunk_records(&buf, &l, &[12, 8], Some(&[24, UNLIMITED]), 8, 8).unwrap();
        let found: Vec<_> = records.iter().map(|r| (r.offset.clone(), r.address)).collect();
        // element 2 is row 2 of axis 0, past the current 12 rows
        assert_eq!(found, vec![(vec![6, 0], 10), (vec![6, 4], 50)]);
    }

    #[test]
    fn extensible_array_needs_one_unlimited_dimension() {
        let l = layout(ChunkIndexAddress::ExtensibleArray { address: Some(0) });
        assert_eq!(
            read_chunk_records(&[], &l, &[12, 8], Some(&[24, 16]), 8, 8),
            Err(FormatError::UnlimitedDimensionCount(0))
        );
        assert_eq!(
            read_chunk_records(&[], &l, &[12, 8], Some(&[UNLIMITED, UNLIMITED]), 8, 8),
            Err(FormatError::UnlimitedDimensionCount(2))
        );
    }
}
