//! Shared message references.
//!
//! A header message flagged as shared holds a reference instead of the
//! message body. The only form resolved here is a committed object: the
//! real message lives in another object header (named datatypes).

use crate::error::FormatError;
use crate::util::{ensure_len, read_uint};

/// Shared message type 2 in v3: stored in another object header.
const SHARED_IN_OBJECT_HEADER: u8 = 2;

/// A reference to a message stored in another object header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SharedMessage {
    pub version: u8,
    /// Object header address that holds the actual message.
    pub object_header_address: u64,
}

impl SharedMessage {
    pub fn parse(data: &[u8], offset_size: u8) -> Result<SharedMessage, FormatError> {
        ensure_len(data, 0, 2)?;
        let version = data[0];
        let address_pos = match version {
            // version, type, reserved(6)
            1 => 8,
            2 => 2,
            3 if data[1] == SHARED_IN_OBJECT_HEADER => 2,
            3 => return Err(FormatError::UnsupportedSharedMessage(data[1])),
            v => return Err(FormatError::InvalidSharedMessageVersion(v)),
        };
        Ok(SharedMessage {
            version,
            object_header_address: read_uint(data, address_pos, offset_size)?,
        })
    }
}
