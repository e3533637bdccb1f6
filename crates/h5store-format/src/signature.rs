//! HDF5 file signature (magic bytes) detection.

use crate::error::FormatError;

/// The 8-byte HDF5 magic signature.
pub const HDF5_SIGNATURE: [u8; 8] = [0x89, b'H', b'D', b'F', b'\r', b'\n', 0x1A, b'\n'];

/// Search for the HDF5 signature at valid offsets.
///
/// The signature may follow a user block, so it can sit at offset 0 or at
/// any power of two from 512 upwards.
pub fn find_signature(data: &[u8]) -> Result<usize, FormatError> {
    core::iter::once(0usize)
        .chain(core::iter::successors(Some(512usize), |o| o.checked_mul(2)))
        .take_while(|&o| o.saturating_add(HDF5_SIGNATURE.len()) <= data.len())
        .find(|&o| data[o..o + HDF5_SIGNATURE.len()] == HDF5_SIGNATURE)
        .ok_or(FormatError::SignatureNotFound)
}
