//! HDF5 datatype message parsing (message type 0x0003).
//!
//! Only the fixed header is decoded: the type class and the element size.
//! Class-specific properties are not needed to locate storage.

use crate::error::FormatError;
use crate::util::{ensure_len, read_u32};

/// HDF5 datatype classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatatypeClass {
    FixedPoint,
    FloatingPoint,
    Time,
    String,
    BitField,
    Opaque,
    Compound,
    Reference,
    Enumeration,
    VariableLength,
    Array,
    Complex,
}

impl DatatypeClass {
    fn from_u8(val: u8) -> Option<DatatypeClass> {
        Some(match val {
            0 => DatatypeClass::FixedPoint,
            1 => DatatypeClass::FloatingPoint,
            2 => DatatypeClass::Time,
            3 => DatatypeClass::String,
            4 => DatatypeClass::BitField,
            5 => DatatypeClass::Opaque,
            6 => DatatypeClass::Compound,
            7 => DatatypeClass::Reference,
            8 => DatatypeClass::Enumeration,
            9 => DatatypeClass::VariableLength,
            10 => DatatypeClass::Array,
            11 => DatatypeClass::Complex,
            _ => return None,
        })
    }
}

/// Fixed part of a datatype message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Datatype {
    /// Datatype message version (1-5).
    pub version: u8,
    /// Type class.
    pub class: DatatypeClass,
    /// Size in bytes of one element.
    pub size: u32,
}

impl Datatype {
    /// Parse the 8-byte datatype header from a message body.
    pub fn parse(data: &[u8]) -> Result<Datatype, FormatError> {
        ensure_len(data, 0, 8)?;
        let version = data[0] >> 4;
        if !(1..=5).contains(&version) {
            return Err(FormatError::InvalidDatatypeVersion(version));
        }
        let class_id = data[0] & 0x0F;
        let class =
            DatatypeClass::from_u8(class_id).ok_or(FormatError::InvalidDatatypeClass(class_id))?;
        Ok(Datatype {
            version,
            class,
            size: read_u32(data, 4)?,
        })
    }
}
