//! HDF5 superblock parsing for versions 0, 1, 2 and 3.

use crate::error::FormatError;
use crate::signature::HDF5_SIGNATURE;
use crate::util::{ensure_len, read_u32, read_uint};

/// Cached B-tree and heap addresses from a symbol table entry scratch pad.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachedSymbolTable {
    /// Address of the group's v1 B-tree.
    pub btree_address: u64,
    /// Address of the group's local heap.
    pub heap_address: u64,
}

/// Parsed HDF5 superblock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Superblock {
    /// Superblock version (0-3).
    pub version: u8,
    /// Size of file addresses in bytes (2, 4, or 8).
    pub offset_size: u8,
    /// Size of lengths in bytes (2, 4, or 8).
    pub length_size: u8,
    /// Absolute position that all other addresses are relative to.
    pub base_address: u64,
    /// End-of-file address.
    pub eof_address: u64,
    /// Object header address of the root group.
    pub root_group_address: u64,
    /// Symbol table addresses cached in the root entry (v0/v1 only).
    pub root_symbol_table: Option<CachedSymbolTable>,
}

fn validate_sizes(offset_size: u8, length_size: u8) -> Result<(), FormatError> {
    if !matches!(offset_size, 2 | 4 | 8) {
        return Err(FormatError::InvalidOffsetSize(offset_size));
    }
    if !matches!(length_size, 2 | 4 | 8) {
        return Err(FormatError::InvalidLengthSize(length_size));
    }
    Ok(())
}

impl Superblock {
    /// Parse a superblock from `data` starting at `signature_offset`.
    pub fn parse(data: &[u8], signature_offset: usize) -> Result<Superblock, FormatError> {
        ensure_len(data, signature_offset, 9)?;
        let d = &data[signature_offset..];
        if d[..8] != HDF5_SIGNATURE {
            return Err(FormatError::SignatureNotFound);
        }

        match d[8] {
            v @ (0 | 1) => Self::parse_v0_v1(d, v),
            v @ (2 | 3) => Self::parse_v2_v3(d, v),
            v => Err(FormatError::UnsupportedVersion(v)),
        }
    }

    fn parse_v0_v1(d: &[u8], version: u8) -> Result<Superblock, FormatError> {
        // Fixed prefix: 24 bytes for v0, v1 adds istore K(2) + reserved(2).
        let fixed = if version == 0 { 24 } else { 28 };
        ensure_len(d, 0, fixed)?;

        let offset_size = d[13];
        let length_size = d[14];
        validate_sizes(offset_size, length_size)?;

        let os = offset_size as usize;
        let mut pos = fixed;
        let base_address = read_uint(d, pos, offset_size)?;
        // free space address and EOF follow the base address
        let eof_address = read_uint(d, pos + 2 * os, offset_size)?;
        pos += 4 * os;

        // Root group symbol table entry
        let entry_len = 2 * os + 8 + 16;
        ensure_len(d, pos, entry_len)?;
        let root_group_address = read_uint(d, pos + os, offset_size)?;
        let cache_type = read_u32(d, pos + 2 * os)?;
        let scratch = pos + 2 * os + 8;
        let root_symbol_table = if cache_type == 1 {
            Some(CachedSymbolTable {
                btree_address: read_uint(d, scratch, offset_size)?,
                heap_address: read_uint(d, scratch + os, offset_size)?,
            })
        } else {
            None
        };

        Ok(Superblock {
            version,
            offset_size,
            length_size,
            base_address,
            eof_address,
            root_group_address,
            root_symbol_table,
        })
    }

    fn parse_v2_v3(d: &[u8], version: u8) -> Result<Superblock, FormatError> {
        // sig(8) + version(1) + offset_size(1) + length_size(1) + flags(1)
        ensure_len(d, 0, 12)?;
        let offset_size = d[9];
        let length_size = d[10];
        validate_sizes(offset_size, length_size)?;

        let os = offset_size as usize;
        ensure_len(d, 12, 4 * os + 4)?;
        let base_address = read_uint(d, 12, offset_size)?;
        // superblock extension address at 12 + os is not needed
        let eof_address = read_uint(d, 12 + 2 * os, offset_size)?;
        let root_group_address = read_uint(d, 12 + 3 * os, offset_size)?;

        Ok(Superblock {
            version,
            offset_size,
            length_size,
            base_address,
            eof_address,
            root_group_address,
            root_symbol_table: None,
        })
    }
}
