//! HDF5 file and dataset handles that act as the layout provider.
//!
//! When the `mmap` feature is enabled (default), [`File::open`] maps the
//! file instead of reading it. [`File::open_buffered`] reads it into memory
//! and [`File::from_bytes`] wraps bytes the caller already holds.

use std::collections::HashSet;
use std::path::Path;
use std::sync::OnceLock;

use h5store_format::chunk_index::read_chunk_records;
use h5store_format::data_layout::DataLayout;
use h5store_format::dataspace::{Dataspace, DataspaceType};
use h5store_format::datatype::Datatype;
use h5store_format::group_v1::{group_members, resolve_path};
use h5store_format::message_type::MessageType;
use h5store_format::object_header::ObjectHeader;
use h5store_format::shared_message::SharedMessage;
use h5store_format::signature::find_signature;
use h5store_format::superblock::Superblock;
use h5store_format::{ChunkRecord, FormatError};
use log::{debug, warn};

use crate::directory::DirectoryOptions;
use crate::error::{Error, Result};
use crate::grid::ChunkGrid;
use crate::layout::{DatasetLayout, Extent, LayoutProvider};
use crate::range::SliceRangeReader;
use crate::store_info::{StoreInfo, StoreInfoAccessor};

enum FileData {
    Owned(Vec<u8>),
    #[cfg(feature = "mmap")]
    Mmap(memmap2::Mmap),
}

impl FileData {
    fn as_bytes(&self) -> &[u8] {
        match self {
            FileData::Owned(v) => v,
            #[cfg(feature = "mmap")]
            FileData::Mmap(m) => m,
        }
    }
}

/// An HDF5 file opened for storage-layout queries.
pub struct File {
    data: FileData,
    superblock: Superblock,
    /// Offset of the superblock; file addresses are relative to it.
    base: usize,
    options: DirectoryOptions,
}

impl File {
    /// Open an HDF5 file from a filesystem path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        #[cfg(feature = "mmap")]
        {
            let file = std::fs::File::open(path)?;
            // SAFETY: read-only mapping; the file must not be truncated
            // while the handle is alive.
            let mmap = unsafe { memmap2::Mmap::map(&file)? };
            Self::from_data(FileData::Mmap(mmap))
        }
        #[cfg(not(feature = "mmap"))]
        {
            Self::open_buffered(path)
        }
    }

    /// Open an HDF5 file by reading it entirely into memory.
    pub fn open_buffered<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(bytes)
    }

    /// Use an in-memory HDF5 image.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        Self::from_data(FileData::Owned(data))
    }

    fn from_data(data: FileData) -> Result<Self> {
        let bytes = data.as_bytes();
        let base = find_signature(bytes)?;
        let superblock = Superblock::parse(bytes, base)?;
        debug!(
            "superblock v{} at byte {base}, root group at {}",
            superblock.version, superblock.root_group_address
        );
        Ok(File {
            data,
            superblock,
            base,
            options: DirectoryOptions::default(),
        })
    }

    /// Lookup policy used by the accessors of datasets opened afterwards.
    pub fn with_directory_options(mut self, options: DirectoryOptions) -> Self {
        self.options = options;
        self
    }

    pub fn superblock(&self) -> &Superblock {
        &self.superblock
    }

    /// The whole file.
    pub fn as_bytes(&self) -> &[u8] {
        self.data.as_bytes()
    }

    /// A reader over the file's bytes, addressed like [`StoreInfo::file_offset`].
    pub fn reader(&self) -> SliceRangeReader<'_> {
        SliceRangeReader::new(self.as_bytes())
    }

    /// Byte offset of the superblock (the size of any user block).
    pub fn base_offset(&self) -> u64 {
        self.base as u64
    }

    /// Turn a base-relative file address into a byte offset in the file.
    fn absolute(&self, address: u64) -> Result<u64> {
        address
            .checked_add(self.base as u64)
            .ok_or(Error::Format(FormatError::AddressOverflow(address)))
    }

    fn metadata(&self) -> &[u8] {
        &self.as_bytes()[self.base..]
    }

    fn header(&self, address: u64) -> std::result::Result<ObjectHeader, FormatError> {
        ObjectHeader::parse(
            self.metadata(),
            address,
            self.superblock.offset_size,
            self.superblock.length_size,
        )
    }

    fn members(&self, header: &ObjectHeader) -> Result<Option<Vec<(String, u64)>>> {
        let members = group_members(
            self.metadata(),
            header,
            self.superblock.offset_size,
            self.superblock.length_size,
        )?;
        Ok(members.map(|entries| {
            let mut named: Vec<_> = entries
                .into_iter()
                .map(|e| (e.name, e.object_header_address))
                .collect();
            named.sort();
            named
        }))
    }

    /// Resolve a `/`-separated path to a dataset.
    pub fn dataset(&self, path: &str) -> Result<Dataset<'_>> {
        let address = resolve_path(
            self.metadata(),
            self.superblock.root_group_address,
            path,
            self.superblock.offset_size,
            self.superblock.length_size,
        )?;
        let header = self.header(address)?;
        Dataset::new(self, normalize(path), header)
    }

    /// Every dataset reachable from the root group, depth-first with
    /// members in name order. Each item carries its own result so one
    /// unreadable object does not hide the rest.
    pub fn visit_datasets(&self) -> Vec<(String, Result<Dataset<'_>>)> {
        let mut out = Vec::new();
        let mut visited = HashSet::new();
        let root = self.superblock.root_group_address;
        match self.header(root) {
            Ok(header) => self.visit_group("", root, header, &mut visited, &mut out),
            Err(e) => out.push((String::from("/"), Err(e.into()))),
        }
        debug!("visited {} datasets", out.len());
        out
    }

    fn visit_group<'f>(
        &'f self,
        path: &str,
        address: u64,
        header: ObjectHeader,
        visited: &mut HashSet<u64>,
        out: &mut Vec<(String, Result<Dataset<'f>>)>,
    ) {
        if !visited.insert(address) {
            warn!("skipping {path}/: group already visited");
            return;
        }
        let members = match self.members(&header) {
            Ok(Some(members)) => members,
            Ok(None) => return,
            Err(e) => {
                let shown = if path.is_empty() { "/" } else { path };
                out.push((shown.to_string(), Err(e)));
                return;
            }
        };
        for (name, member) in members {
            let child = format!("{path}/{name}");
            let header = match self.header(member) {
                Ok(header) => header,
                Err(e) => {
                    out.push((child, Err(e.into())));
                    continue;
                }
            };
            if header.find(MessageType::DataLayout).is_some() {
                let dataset = Dataset::new(self, child.clone(), header);
                out.push((child, dataset));
            } else if header.find(MessageType::SymbolTable).is_some()
                || header.find(MessageType::LinkInfo).is_some()
                || header.find(MessageType::Link).is_some()
            {
                self.visit_group(&child, member, header, visited, out);
            } else {
                debug!("skipping {child}: neither a group nor a dataset");
            }
        }
    }
}

impl std::fmt::Debug for File {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("File")
            .field("size", &self.as_bytes().len())
            .field("superblock_version", &self.superblock.version)
            .field("base", &self.base)
            .finish()
    }
}

fn normalize(path: &str) -> String {
    let parts: Vec<&str> = path.split('/').filter(|c| !c.is_empty()).collect();
    format!("/{}", parts.join("/"))
}

/// A dataset inside an open [`File`].
pub struct Dataset<'f> {
    file: &'f File,
    path: String,
    header: ObjectHeader,
    store: OnceLock<StoreInfoAccessor>,
}

impl<'f> Dataset<'f> {
    fn new(file: &'f File, path: String, header: ObjectHeader) -> Result<Self> {
        if header.find(MessageType::DataLayout).is_none() {
            return Err(Error::NotADataset(path));
        }
        Ok(Dataset {
            file,
            path,
            header,
            store: OnceLock::new(),
        })
    }

    /// Absolute path, e.g. `/group/values`.
    pub fn path(&self) -> &str {
        &self.path
    }

    fn dataspace(&self) -> Result<Dataspace> {
        let msg = self.header.find(MessageType::Dataspace).ok_or_else(|| {
            Error::LayoutUnavailable(format!("{} has no dataspace message", self.path))
        })?;
        Ok(Dataspace::parse(&msg.data, self.file.superblock.length_size)?)
    }

    fn data_layout(&self) -> Result<DataLayout> {
        let msg = self
            .header
            .find(MessageType::DataLayout)
            .ok_or_else(|| Error::NotADataset(self.path.clone()))?;
        Ok(DataLayout::parse(
            &msg.data,
            self.file.superblock.offset_size,
            self.file.superblock.length_size,
        )?)
    }

    /// Element size from the datatype message, following a committed type.
    fn datatype_size(&self) -> Result<u64> {
        let missing =
            || Error::LayoutUnavailable(format!("{} has no datatype message", self.path));
        let msg = self.header.find(MessageType::Datatype).ok_or_else(missing)?;
        let datatype = if msg.is_shared() {
            let shared = SharedMessage::parse(&msg.data, self.file.superblock.offset_size)?;
            let committed = self.file.header(shared.object_header_address)?;
            let inner = committed.find(MessageType::Datatype).ok_or_else(missing)?;
            Datatype::parse(&inner.data)?
        } else {
            Datatype::parse(&msg.data)?
        };
        Ok(u64::from(datatype.size))
    }

    /// Cached store-info accessor, built on first use.
    pub fn store_info(&self) -> Result<&StoreInfoAccessor> {
        if let Some(accessor) = self.store.get() {
            return Ok(accessor);
        }
        let accessor = StoreInfoAccessor::from_provider(self, self.file.options)?;
        debug!("{}: {} chunks written", self.path, accessor.chunk_count());
        Ok(self.store.get_or_init(|| accessor))
    }

    /// Every written chunk, ascending by index.
    pub fn store(&self) -> Result<Vec<StoreInfo>> {
        Ok(self.store_info()?.list_all())
    }
}

impl LayoutProvider for Dataset<'_> {
    fn layout(&self) -> Result<DatasetLayout> {
        let dataspace = self.dataspace()?;
        if dataspace.space_type == DataspaceType::Null {
            return Ok(DatasetLayout::Shapeless);
        }
        let shape = dataspace.dimensions;
        match self.data_layout()? {
            DataLayout::Contiguous { address, size } => Ok(DatasetLayout::Contiguous {
                shape,
                dtype_size: self.datatype_size()?,
                extent: address
                    .map(|address| {
                        Ok::<_, Error>(Extent {
                            address: self.file.absolute(address)?,
                            size,
                        })
                    })
                    .transpose()?,
            }),
            DataLayout::Chunked(chunked) => Ok(DatasetLayout::Chunked {
                grid: ChunkGrid::new(shape, chunked.chunk_shape().to_vec())?,
                dtype_size: chunked.element_size(),
            }),
            DataLayout::Compact { .. } => Err(Error::LayoutUnavailable(format!(
                "{} is compact: its data lives in the object header",
                self.path
            ))),
            DataLayout::Virtual => Err(Error::LayoutUnavailable(format!(
                "{} is a virtual dataset",
                self.path
            ))),
        }
    }

    fn chunk_addresses(&self) -> Result<Vec<ChunkRecord>> {
        let DataLayout::Chunked(chunked) = self.data_layout()? else {
            return Ok(Vec::new());
        };
        let dataspace = self.dataspace()?;
        let mut records = read_chunk_records(
            self.file.metadata(),
            &chunked,
            &dataspace.dimensions,
            dataspace.max_dimensions.as_deref(),
            self.file.superblock.offset_size,
            self.file.superblock.length_size,
        )
        .map_err(|e| Error::chunk_index(&self.path, e))?;
        for record in &mut records {
            record.address = self.file.absolute(record.address)?;
        }
        Ok(records)
    }
}

impl std::fmt::Debug for Dataset<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dataset")
            .field("path", &self.path)
            .field("header_version", &self.header.version)
            .finish()
    }
}
