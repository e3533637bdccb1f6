//! HDF5 object header parsing (v1 and v2).

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

use crate::error::FormatError;
use crate::message_type::MessageType;
use crate::util::{ensure_len, read_u16, read_uint, to_pos};

/// OHDR signature for v2 object headers.
const OHDR_SIGNATURE: [u8; 4] = *b"OHDR";

/// OCHK signature for v2 continuation chunks.
const OCHK_SIGNATURE: [u8; 4] = *b"OCHK";

/// Upper bound on continuation blocks followed for one header.
const MAX_CONTINUATIONS: usize = 4096;

/// Message flag: the message body is a shared message reference.
pub const MSG_FLAG_SHARED: u8 = 0x02;
/// Message flag: readers that do not understand the type must fail.
const MSG_FLAG_MUST_UNDERSTAND: u8 = 0x08;

/// A single parsed header message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderMessage {
    /// The message type.
    pub msg_type: MessageType,
    /// Message flags byte.
    pub flags: u8,
    /// Raw message data bytes.
    pub data: Vec<u8>,
}

impl HeaderMessage {
    /// Whether the body references a shared (committed) message.
    pub fn is_shared(&self) -> bool {
        self.flags & MSG_FLAG_SHARED != 0
    }
}

/// Parsed HDF5 object header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectHeader {
    /// Header version (1 or 2).
    pub version: u8,
    /// All non-NIL, non-continuation messages in header order.
    pub messages: Vec<HeaderMessage>,
}

/// How messages are laid out inside one header block.
#[derive(Clone, Copy)]
enum BlockFormat {
    V1,
    V2 { creation_order: bool },
}

impl ObjectHeader {
    /// Parse the object header at `address` in `data`.
    ///
    /// `offset_size` and `length_size` come from the superblock.
    pub fn parse(
        data: &[u8],
        address: u64,
        offset_size: u8,
        length_size: u8,
    ) -> Result<ObjectHeader, FormatError> {
        let offset = to_pos(address)?;
        ensure_len(data, offset, 4)?;

        let (version, format, first_block) = if data[offset..offset + 4] == OHDR_SIGNATURE {
            Self::v2_prefix(data, offset)?
        } else {
            Self::v1_prefix(data, offset)?
        };

        let mut messages = Vec::new();
        let mut pending = Vec::new();
        Self::parse_block(
            data,
            first_block,
            format,
            offset_size,
            length_size,
            &mut messages,
            &mut pending,
        )?;

        let mut followed = 0usize;
        while let Some((cont_address, cont_length)) = pending.pop() {
            followed += 1;
            if followed > MAX_CONTINUATIONS {
                return Err(FormatError::ContinuationLimit);
            }
            let start = to_pos(cont_address)?;
            let len = to_pos(cont_length)?;
            ensure_len(data, start, len)?;
            let block = match format {
                BlockFormat::V1 => (start, start + len),
                BlockFormat::V2 { .. } => {
                    // OCHK signature + messages + checksum
                    if len < 8 || data[start..start + 4] != OCHK_SIGNATURE {
                        return Err(FormatError::InvalidObjectHeaderSignature);
                    }
                    (start + 4, start + len - 4)
                }
            };
            Self::parse_block(
                data,
                block,
                format,
                offset_size,
                length_size,
                &mut messages,
                &mut pending,
            )?;
        }

        Ok(ObjectHeader { version, messages })
    }

    /// The first message of the given type.
    pub fn find(&self, msg_type: MessageType) -> Option<&HeaderMessage> {
        self.messages.iter().find(|m| m.msg_type == msg_type)
    }

    /// All messages of the given type, in header order.
    pub fn find_all(&self, msg_type: MessageType) -> impl Iterator<Item = &HeaderMessage> {
        self.messages.iter().filter(move |m| m.msg_type == msg_type)
    }

    fn v1_prefix(
        data: &[u8],
        offset: usize,
    ) -> Result<(u8, BlockFormat, (usize, usize)), FormatError> {
        // version(1) + reserved(1) + num_messages(2) + ref_count(4) + header_size(4),
        // then 4 bytes of padding to reach 8-byte alignment
        ensure_len(data, offset, 16)?;
        let version = data[offset];
        if version != 1 {
            return Err(FormatError::InvalidObjectHeaderVersion(version));
        }
        let header_size = read_uint(data, offset + 8, 4)? as usize;
        let start = offset + 16;
        ensure_len(data, start, header_size)?;
        Ok((1, BlockFormat::V1, (start, start + header_size)))
    }

    fn v2_prefix(
        data: &[u8],
        offset: usize,
    ) -> Result<(u8, BlockFormat, (usize, usize)), FormatError> {
        ensure_len(data, offset, 6)?;
        let version = data[offset + 4];
        if version != 2 {
            return Err(FormatError::InvalidObjectHeaderVersion(version));
        }
        let flags = data[offset + 5];
        let mut pos = offset + 6;
        if flags & 0x20 != 0 {
            // access, modification, change and birth times
            pos += 16;
        }
        if flags & 0x10 != 0 {
            // max compact / min dense attribute counts
            pos += 4;
        }
        let width = 1u8 << (flags & 0x03);
        let chunk0_size = to_pos(read_uint(data, pos, width)?)?;
        pos += width as usize;
        // chunk 0 is followed by a 4-byte checksum
        ensure_len(data, pos, chunk0_size.saturating_add(4))?;
        let format = BlockFormat::V2 {
            creation_order: flags & 0x04 != 0,
        };
        Ok((2, format, (pos, pos + chunk0_size)))
    }

    fn parse_block(
        data: &[u8],
        (start, end): (usize, usize),
        format: BlockFormat,
        offset_size: u8,
        length_size: u8,
        messages: &mut Vec<HeaderMessage>,
        pending: &mut Vec<(u64, u64)>,
    ) -> Result<(), FormatError> {
        let header_len = match format {
            BlockFormat::V1 => 8,
            BlockFormat::V2 {
                creation_order: true,
            } => 6,
            BlockFormat::V2 {
                creation_order: false,
            } => 4,
        };

        let mut pos = start;
        // A tail shorter than a message header is gap padding.
        while pos + header_len <= end {
            let (raw_type, size, flags) = match format {
                BlockFormat::V1 => (
                    read_u16(data, pos)?,
                    read_u16(data, pos + 2)? as usize,
                    data[pos + 4],
                ),
                BlockFormat::V2 { .. } => (
                    data[pos] as u16,
                    read_u16(data, pos + 1)? as usize,
                    data[pos + 3],
                ),
            };
            pos += header_len;
            if pos + size > end {
                return Err(FormatError::UnexpectedEof {
                    expected: pos + size,
                    available: end,
                });
            }
            let body = &data[pos..pos + size];
            pos += size;

            match MessageType::from_u16(raw_type) {
                MessageType::Nil => {}
                MessageType::ObjectHeaderContinuation => {
                    let address = read_uint(body, 0, offset_size)?;
                    let length = read_uint(body, offset_size as usize, length_size)?;
                    pending.push((address, length));
                }
                MessageType::Unknown(id) if flags & MSG_FLAG_MUST_UNDERSTAND != 0 => {
                    return Err(FormatError::UnsupportedMessage(id));
                }
                msg_type => messages.push(HeaderMessage {
                    msg_type,
                    flags,
                    data: body.to_vec(),
                }),
            }
        }
        Ok(())
    }
}
