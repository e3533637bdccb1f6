//! Link (0x0006) and link info (0x0002) messages of new-style groups.

#[cfg(not(feature = "std"))]
use alloc::{string::String, vec::Vec};

use crate::error::FormatError;
use crate::util::{ensure_len, read_address, read_u16, read_var_uint};

/// Where a link points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkTarget {
    /// Object header address in this file.
    Hard(u64),
    /// Path to another object in this file.
    Soft(String),
    /// External or user-defined link, with its raw link type.
    Other(u8),
}

/// Parsed link message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkMessage {
    pub name: String,
    pub target: LinkTarget,
}

impl LinkMessage {
    pub fn parse(data: &[u8], offset_size: u8) -> Result<LinkMessage, FormatError> {
        ensure_len(data, 0, 2)?;
        let version = data[0];
        if version != 1 {
            return Err(FormatError::InvalidLinkVersion(version));
        }
        let flags = data[1];
        let mut pos = 2;

        let link_type = if flags & 0x08 != 0 {
            ensure_len(data, pos, 1)?;
            pos += 1;
            data[pos - 1]
        } else {
            0
        };
        if flags & 0x04 != 0 {
            // creation order
            pos += 8;
        }
        if flags & 0x10 != 0 {
            // character set
            pos += 1;
        }

        let width = 1usize << (flags & 0x03);
        let name_len = read_var_uint(data, pos, width)? as usize;
        pos += width;
        ensure_len(data, pos, name_len)?;
        let name = String::from_utf8_lossy(&data[pos..pos + name_len]).into_owned();
        pos += name_len;

        let target = match link_type {
            0 => LinkTarget::Hard(
                read_address(data, pos, offset_size)?
                    .ok_or(FormatError::PathNotFound(name.clone()))?,
            ),
            1 => {
                let len = read_u16(data, pos)? as usize;
                ensure_len(data, pos + 2, len)?;
                LinkTarget::Soft(String::from_utf8_lossy(&data[pos + 2..pos + 2 + len]).into_owned())
            }
            t => LinkTarget::Other(t),
        };
        Ok(LinkMessage { name, target })
    }
}

/// Parsed link info message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkInfoMessage {
    /// Fractal heap holding links in dense storage, if any.
    pub fractal_heap_address: Option<u64>,
    /// Version 2 B-tree indexing link names.
    pub name_index_address: Option<u64>,
}

impl LinkInfoMessage {
    pub fn parse(data: &[u8], offset_size: u8) -> Result<LinkInfoMessage, FormatError> {
        ensure_len(data, 0, 2)?;
        let version = data[0];
        if version != 0 {
            return Err(FormatError::InvalidLinkVersion(version));
        }
        let flags = data[1];
        // optional maximum creation index
        let pos = if flags & 0x01 != 0 { 10 } else { 2 };
        Ok(LinkInfoMessage {
            fractal_heap_address: read_address(data, pos, offset_size)?,
            name_index_address: read_address(data, pos + offset_size as usize, offset_size)?,
        })
    }

    /// Whether links live in a fractal heap rather than in link messages.
    pub fn is_dense(&self) -> bool {
        self.fractal_heap_address.is_some()
    }
}
