//! Reading the bytes a [`StoreInfo`] points at, and hashing them.

use std::fs;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use sha3::{Digest, Sha3_256};

use crate::error::{Error, Result};
use crate::store_info::StoreInfo;

/// Name of the digest produced by [`ChunkDigest::of`].
pub const DIGEST_ALGORITHM: &str = "SHA-3-256";

/// Random access to the container's bytes.
///
/// Implementations must be re-entrant: disjoint ranges may be read from
/// several threads at once.
pub trait ByteRangeReader {
    /// Read exactly `length` bytes starting at `offset`.
    fn read(&self, offset: u64, length: u64) -> Result<Vec<u8>>;

    /// Whether arbitrary offsets can be reached.
    fn seekable(&self) -> bool {
        true
    }
}

/// Reads ranges from a file on disk, opening a fresh handle per call.
#[derive(Debug, Clone)]
pub struct FileRangeReader {
    path: PathBuf,
}

impl FileRangeReader {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        FileRangeReader {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ByteRangeReader for FileRangeReader {
    fn read(&self, offset: u64, length: u64) -> Result<Vec<u8>> {
        let mut file = fs::File::open(&self.path)?;
        let available = file.metadata()?.len().saturating_sub(offset);
        if available < length {
            return Err(Error::ShortRead {
                offset,
                expected: length,
                available,
            });
        }
        let len = usize::try_from(length).map_err(|_| Error::ShortRead {
            offset,
            expected: length,
            available,
        })?;
        file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; len];
        file.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Regular files are seekable; pipes and character devices are not.
    fn seekable(&self) -> bool {
        fs::metadata(&self.path).is_ok_and(|m| m.is_file())
    }
}

/// Reads ranges from bytes already in memory (owned or memory-mapped).
#[derive(Debug, Clone, Copy)]
pub struct SliceRangeReader<'a> {
    data: &'a [u8],
}

impl<'a> SliceRangeReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        SliceRangeReader { data }
    }

    /// Borrow the range without copying.
    pub fn slice(&self, offset: u64, length: u64) -> Result<&'a [u8]> {
        let available = (self.data.len() as u64).saturating_sub(offset);
        let short = || Error::ShortRead {
            offset,
            expected: length,
            available,
        };
        let start = usize::try_from(offset).map_err(|_| short())?;
        let len = usize::try_from(length).map_err(|_| short())?;
        start
            .checked_add(len)
            .and_then(|end| self.data.get(start..end))
            .ok_or_else(short)
    }
}

impl ByteRangeReader for SliceRangeReader<'_> {
    fn read(&self, offset: u64, length: u64) -> Result<Vec<u8>> {
        self.slice(offset, length).map(<[u8]>::to_vec)
    }
}

/// A content digest of one stored chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkDigest {
    pub algorithm: &'static str,
    /// Lowercase hex.
    pub value: String,
}

impl ChunkDigest {
    /// SHA-3-256 of `data`.
    pub fn of(data: &[u8]) -> Self {
        use std::fmt::Write;

        let hash = Sha3_256::digest(data);
        let mut value = String::with_capacity(64);
        for byte in hash.iter() {
            // writing into a String cannot fail
            let _ = write!(value, "{byte:02x}");
        }
        ChunkDigest {
            algorithm: DIGEST_ALGORITHM,
            value,
        }
    }
}

/// Read the bytes `record` points at and hash them. Unwritten records have
/// no digest.
pub fn digest_range<R>(reader: &R, record: &StoreInfo) -> Result<Option<ChunkDigest>>
where
    R: ByteRangeReader + ?Sized,
{
    let Some(offset) = record.file_offset else {
        return Ok(None);
    };
    let bytes = reader.read(offset, record.size)?;
    Ok(Some(ChunkDigest::of(&bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn written(offset: u64, size: u64) -> StoreInfo {
        StoreInfo {
            index: Some(0),
            chunk_offset: Some(vec![0]),
            file_offset: Some(offset),
            size,
            filter_mask: 0,
        }
    }

    #[test]
    fn known_digests() {
        assert_eq!(
            ChunkDigest::of(b"").value,
            "a7ffc6f8bf1ed76651c14756a061d662f580ff4de43b49fa82d80a4b80f8434a"
        );
        let abc = ChunkDigest::of(b"abc");
        assert_eq!(abc.algorithm, "SHA-3-256");
        assert_eq!(
            abc.value,
            "3a985da74fe225b2045c172d6bd390bd855f086e3e9d525b46bfe24511431532"
        );
    }

    #[test]
    fn slice_reader_ranges() {
        let data = b"0123456789";
        let r = SliceRangeReader::new(data);
        assert_eq!(r.read(2, 3).unwrap(), b"234");
        assert_eq!(r.slice(10, 0).unwrap(), b"");
        assert!(matches!(
            r.read(8, 5),
            Err(Error::ShortRead {
                offset: 8,
                expected: 5,
                available: 2
            })
        ));
        assert!(matches!(r.read(u64::MAX, 1), Err(Error::ShortRead { .. })));
    }

    #[test]
    fn file_reader_matches_slice_reader() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        let data: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
        tmp.write_all(&data).unwrap();
        tmp.flush().unwrap();

        let file = FileRangeReader::new(tmp.path());
        assert!(file.seekable());
        assert_eq!(file.read(1000, 100).unwrap(), &data[1000..1100]);
        assert!(matches!(
            file.read(4000, 200),
            Err(Error::ShortRead { available: 96, .. })
        ));

        let record = written(512, 1024);
        assert_eq!(
            digest_range(&file, &record).unwrap(),
            digest_range(&SliceRangeReader::new(&data), &record).unwrap()
        );
    }

    #[test]
    fn unwritten_has_no_digest() {
        let r = SliceRangeReader::new(&[]);
        let record = StoreInfo::unwritten(Some(3), None);
        assert_eq!(digest_range(&r, &record).unwrap(), None);
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let reader = FileRangeReader::new(dir.path().join("absent.h5"));
        assert!(!reader.seekable());
        assert!(matches!(reader.read(0, 1), Err(Error::Io(_))));
    }
}
