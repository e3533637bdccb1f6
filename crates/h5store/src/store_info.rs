//! The public query surface: one accessor per dataset that answers the same
//! three questions whatever the storage class.

use log::debug;

use crate::directory::{ChunkDirectory, DirectoryOptions};
use crate::error::{Error, Result};
use crate::layout::{DatasetLayout, LayoutProvider};

/// Physical storage of one chunk, or of a whole contiguous dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreInfo {
    /// Row-major position in the chunk grid, `0` for contiguous storage.
    pub index: Option<u64>,
    /// Array-space origin; all zeros for contiguous storage.
    pub chunk_offset: Option<Vec<u64>>,
    /// Absolute byte offset in the container, unset if never written.
    pub file_offset: Option<u64>,
    /// Bytes physically stored (after filtering), `0` if never written.
    pub size: u64,
    /// Bit `i` set means filter `i` was skipped for this chunk.
    pub filter_mask: u32,
}

impl StoreInfo {
    /// Placeholder for a valid position that holds no bytes.
    pub fn unwritten(index: Option<u64>, chunk_offset: Option<Vec<u64>>) -> Self {
        StoreInfo {
            index,
            chunk_offset,
            file_offset: None,
            size: 0,
            filter_mask: 0,
        }
    }

    pub fn is_written(&self) -> bool {
        self.file_offset.is_some()
    }
}

/// Store-info queries over one dataset.
///
/// Immutable once built; the chunk directory is derived a single time from
/// the provider and then only read.
#[derive(Debug, Clone)]
pub struct StoreInfoAccessor {
    layout: DatasetLayout,
    directory: Option<ChunkDirectory>,
    options: DirectoryOptions,
}

impl StoreInfoAccessor {
    /// Pair `layout` with the chunk records of a chunked dataset. `records`
    /// is ignored for the other layout classes.
    pub fn new<I>(layout: DatasetLayout, records: I, options: DirectoryOptions) -> Result<Self>
    where
        I: IntoIterator<Item = h5store_format::ChunkRecord>,
    {
        let directory = match &layout {
            DatasetLayout::Chunked { grid, .. } => {
                Some(ChunkDirectory::build(grid.clone(), records, options)?)
            }
            _ => None,
        };
        Ok(StoreInfoAccessor {
            layout,
            directory,
            options,
        })
    }

    /// Ask `provider` for the layout and, when chunked, its chunk map.
    pub fn from_provider<P>(provider: &P, options: DirectoryOptions) -> Result<Self>
    where
        P: LayoutProvider + ?Sized,
    {
        let layout = provider.layout()?;
        let records = match layout {
            DatasetLayout::Chunked { .. } => provider.chunk_addresses()?,
            _ => Vec::new(),
        };
        debug!("store info for {} layout", layout.kind());
        Self::new(layout, records, options)
    }

    pub fn layout(&self) -> &DatasetLayout {
        &self.layout
    }

    /// The chunk directory of a chunked dataset.
    pub fn directory(&self) -> Option<&ChunkDirectory> {
        self.directory.as_ref()
    }

    /// Written chunk count; for contiguous storage 1 once allocated.
    pub fn chunk_count(&self) -> u64 {
        match (&self.layout, &self.directory) {
            (DatasetLayout::Chunked { .. }, Some(directory)) => directory.len() as u64,
            (DatasetLayout::Contiguous { extent, .. }, _) => u64::from(extent.is_some()),
            _ => 0,
        }
    }

    /// Every written chunk, ascending by index.
    pub fn list_all(&self) -> Vec<StoreInfo> {
        match (&self.layout, &self.directory) {
            (DatasetLayout::Chunked { .. }, Some(directory)) => directory.list_all(),
            (DatasetLayout::Contiguous { shape, extent: Some(extent), .. }, _) => {
                vec![contiguous_record(shape.len(), extent.address, extent.size)]
            }
            _ => Vec::new(),
        }
    }

    pub fn get_by_index(&self, index: u64) -> Result<StoreInfo> {
        match (&self.layout, &self.directory) {
            (DatasetLayout::Chunked { .. }, Some(directory)) => directory.get_by_index(index),
            (DatasetLayout::Contiguous { shape, extent, .. }, _) => {
                if index != 0 {
                    return Err(Error::index_out_of_range(index, 1));
                }
                Ok(match extent {
                    Some(e) => contiguous_record(shape.len(), e.address, e.size),
                    None => StoreInfo::unwritten(Some(0), None),
                })
            }
            _ => Err(Error::index_out_of_range(index, 0)),
        }
    }

    pub fn get_by_coordinate(&self, coordinate: &[u64]) -> Result<StoreInfo> {
        match (&self.layout, &self.directory) {
            (DatasetLayout::Chunked { .. }, Some(directory)) => {
                directory.get_by_coordinate(coordinate)
            }
            (DatasetLayout::Contiguous { shape, extent, .. }, _) => {
                if coordinate.len() != shape.len() {
                    return Err(Error::InvalidCoordinate {
                        coordinate: coordinate.to_vec(),
                        reason: "rank does not match the dataset",
                    });
                }
                if coordinate.iter().any(|&c| c != 0) {
                    return Err(Error::InvalidCoordinate {
                        coordinate: coordinate.to_vec(),
                        reason: "contiguous storage has only the origin",
                    });
                }
                Ok(match extent {
                    Some(e) => contiguous_record(shape.len(), e.address, e.size),
                    None => {
                        let index = self.options.index_on_coordinate_miss.then_some(0);
                        StoreInfo::unwritten(index, Some(coordinate.to_vec()))
                    }
                })
            }
            _ => Err(Error::coordinate_out_of_range(coordinate, 0)),
        }
    }
}

fn contiguous_record(rank: usize, address: u64, size: u64) -> StoreInfo {
    StoreInfo {
        index: Some(0),
        chunk_offset: Some(vec![0; rank]),
        file_offset: Some(address),
        size,
        filter_mask: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::ChunkGrid;
    use crate::layout::{Extent, StaticLayout};
    use h5store_format::ChunkRecord;

    fn contiguous(extent: Option<Extent>) -> StoreInfoAccessor {
        let layout = DatasetLayout::Contiguous {
            shape: vec![4, 5],
            dtype_size: 8,
            extent,
        };
        StoreInfoAccessor::new(layout, Vec::new(), DirectoryOptions::default()).unwrap()
    }

    #[test]
    fn shapeless_answers_nothing() {
        let a = StoreInfoAccessor::new(
            DatasetLayout::Shapeless,
            Vec::new(),
            DirectoryOptions::default(),
        )
        .unwrap();
        assert!(a.list_all().is_empty());
        assert_eq!(a.chunk_count(), 0);
        assert!(matches!(a.get_by_index(0), Err(Error::IndexOutOfRange { .. })));
        assert!(matches!(
            a.get_by_coordinate(&[]),
            Err(Error::IndexOutOfRange { .. })
        ));
    }

    #[test]
    fn contiguous_written() {
        let a = contiguous(Some(Extent {
            address: 2048,
            size: 160,
        }));
        assert_eq!(a.chunk_count(), 1);
        let all = a.list_all();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].index, Some(0));
        assert_eq!(all[0].chunk_offset, Some(vec![0, 0]));
        assert_eq!(all[0].size, 4 * 5 * 8);
        assert_eq!(a.get_by_index(0).unwrap(), all[0]);
        assert_eq!(a.get_by_coordinate(&[0, 0]).unwrap(), all[0]);
        assert!(matches!(a.get_by_index(1), Err(Error::IndexOutOfRange { .. })));
        assert!(matches!(
            a.get_by_coordinate(&[0, 5]),
            Err(Error::InvalidCoordinate { .. })
        ));
        assert!(matches!(
            a.get_by_coordinate(&[0]),
            Err(Error::InvalidCoordinate { .. })
        ));
    }

    #[test]
    fn contiguous_unwritten() {
        let a = contiguous(None);
        assert_eq!(a.chunk_count(), 0);
        assert!(a.list_all().is_empty());
        assert_eq!(
            a.get_by_index(0).unwrap(),
            StoreInfo::unwritten(Some(0), None)
        );
        let by_coord = a.get_by_coordinate(&[0, 0]).unwrap();
        assert_eq!(by_coord, StoreInfo::unwritten(None, Some(vec![0, 0])));
        assert!(!by_coord.is_written());
    }

    #[test]
    fn chunked_from_provider() {
        let grid = ChunkGrid::new(vec![10], vec![4]).unwrap();
        let provider = StaticLayout::new(
            DatasetLayout::Chunked { grid, dtype_size: 2 },
            vec![ChunkRecord {
                offset: vec![4],
                address: 900,
                size: 8,
                filter_mask: 0,
            }],
        );
        let a = StoreInfoAccessor::from_provider(&provider, DirectoryOptions::default()).unwrap();
        assert_eq!(a.chunk_count(), 1);
        assert_eq!(a.directory().map(|d| d.grid().num_chunks()), Some(3));
        assert_eq!(a.get_by_index(1).unwrap().file_offset, Some(900));
        assert!(!a.get_by_index(2).unwrap().is_written());
    }

    #[test]
    fn accessor_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<StoreInfoAccessor>();
    }
}
