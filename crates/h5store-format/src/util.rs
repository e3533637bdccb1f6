//! Little-endian field readers shared by the structure parsers.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::FormatError;

/// Check that `needed` bytes are available at `offset`.
pub(crate) fn ensure_len(data: &[u8], offset: usize, needed: usize) -> Result<(), FormatError> {
    match offset.checked_add(needed) {
        Some(end) if end <= data.len() => Ok(()),
        _ => Err(FormatError::UnexpectedEof {
            expected: offset.saturating_add(needed),
            available: data.len(),
        }),
    }
}

/// Read an unsigned integer of `size` bytes (1, 2, 4 or 8) at `pos`.
pub(crate) fn read_uint(data: &[u8], pos: usize, size: u8) -> Result<u64, FormatError> {
    let s = size as usize;
    ensure_len(data, pos, s)?;
    let slice = &data[pos..pos + s];
    Ok(match size {
        1 => slice[0] as u64,
        2 => LittleEndian::read_u16(slice) as u64,
        4 => LittleEndian::read_u32(slice) as u64,
        8 => LittleEndian::read_u64(slice),
        _ => return Err(FormatError::InvalidOffsetSize(size)),
    })
}

/// Read an unsigned integer of any width from 1 to 8 bytes.
pub(crate) fn read_var_uint(data: &[u8], pos: usize, size: usize) -> Result<u64, FormatError> {
    if size == 0 || size > 8 {
        return Err(FormatError::InvalidFieldWidth(size));
    }
    ensure_len(data, pos, size)?;
    Ok(LittleEndian::read_uint(&data[pos..pos + size], size))
}

pub(crate) fn read_u16(data: &[u8], pos: usize) -> Result<u16, FormatError> {
    ensure_len(data, pos, 2)?;
    Ok(LittleEndian::read_u16(&data[pos..pos + 2]))
}

pub(crate) fn read_u32(data: &[u8], pos: usize) -> Result<u32, FormatError> {
    ensure_len(data, pos, 4)?;
    Ok(LittleEndian::read_u32(&data[pos..pos + 4]))
}

/// Read a file address; all-ones is HDF5's undefined address.
pub(crate) fn read_address(data: &[u8], pos: usize, size: u8) -> Result<Option<u64>, FormatError> {
    ensure_len(data, pos, size as usize)?;
    if data[pos..pos + size as usize].iter().all(|&b| b == 0xFF) {
        Ok(None)
    } else {
        read_uint(data, pos, size).map(Some)
    }
}

/// Convert a file address into a slice position.
pub(crate) fn to_pos(address: u64) -> Result<usize, FormatError> {
    usize::try_from(address).map_err(|_| FormatError::AddressOverflow(address))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uint_widths() {
        let data = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08];
        assert_eq!(read_uint(&data, 0, 1).unwrap(), 0x01);
        assert_eq!(read_uint(&data, 0, 2).unwrap(), 0x0201);
        assert_eq!(read_uint(&data, 0, 4).unwrap(), 0x0403_0201);
        assert_eq!(read_uint(&data, 0, 8).unwrap(), 0x0807_0605_0403_0201);
        assert_eq!(read_uint(&data, 0, 3), Err(FormatError::InvalidOffsetSize(3)));
    }

    #[test]
    fn var_uint_three_bytes() {
        let data = [0xAA, 0x01, 0x02, 0x03];
        assert_eq!(read_var_uint(&data, 1, 3).unwrap(), 0x03_0201);
        assert_eq!(read_var_uint(&data, 0, 9), Err(FormatError::InvalidFieldWidth(9)));
    }

    #[test]
    fn undefined_address() {
        let data = [0xFF; 8];
        assert_eq!(read_address(&data, 0, 8).unwrap(), None);
        let data = 0x40u64.to_le_bytes();
        assert_eq!(read_address(&data, 0, 8).unwrap(), Some(0x40));
    }

    #[test]
    fn eof_reports_needed_bytes() {
        let data = [0u8; 4];
        assert_eq!(
            read_u32(&data, 2),
            Err(FormatError::UnexpectedEof {
                expected: 6,
                available: 4
            })
        );
        assert!(ensure_len(&data, usize::MAX, 2).is_err());
    }
}
