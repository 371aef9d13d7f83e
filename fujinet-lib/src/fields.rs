use crate::error::FujiError;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};
use strum_macros::Display;

/// Number of aux bytes carried for each field descriptor code.
///
/// Not monotonic: the `B` and `C` layouts pack 16/32-bit values.
pub const FIELD_BYTE_COUNTS: [u8; 8] = [0, 1, 2, 3, 4, 2, 4, 4];

/// Describes which auxiliary parameter bytes follow a bus packet header.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Display, TryFromPrimitive, IntoPrimitive, Serialize, Deserialize,
)]
#[repr(u8)]
pub enum FieldDescriptor {
    #[default]
    #[strum(to_string = "none")]
    None = 0,
    #[strum(to_string = "a1")]
    A1 = 1,
    #[strum(to_string = "a1,a2")]
    A1A2 = 2,
    #[strum(to_string = "a1,a2,a3")]
    A1A2A3 = 3,
    #[strum(to_string = "a1,a2,a3,a4")]
    A1A2A3A4 = 4,
    #[strum(to_string = "b12")]
    B12 = 5,
    #[strum(to_string = "b12,b34")]
    B12B34 = 6,
    #[strum(to_string = "c1234")]
    C1234 = 7,
}

impl FieldDescriptor {
    /// Parse a raw descriptor code, rejecting anything above 7
    pub fn from_code(code: u8) -> Result<Self, FujiError> {
        Self::try_from(code).map_err(|_| FujiError::InvalidFields(code))
    }

    /// Number of aux bytes this descriptor puts on the wire
    pub fn aux_len(self) -> usize {
        FIELD_BYTE_COUNTS[u8::from(self) as usize] as usize
    }

    /// Pick the smallest byte-per-field descriptor that carries `count` aux bytes
    pub fn for_aux_count(count: usize) -> Result<Self, FujiError> {
        match count {
            0 => Ok(Self::None),
            1 => Ok(Self::A1),
            2 => Ok(Self::A1A2),
            3 => Ok(Self::A1A2A3),
            4 => Ok(Self::A1A2A3A4),
            _ => Err(FujiError::InvalidFields(count as u8)),
        }
    }
}

/// Look up how many aux bytes a raw descriptor code carries.
pub fn aux_byte_count(code: u8) -> Result<usize, FujiError> {
    FIELD_BYTE_COUNTS
        .get(code as usize)
        .map(|&n| n as usize)
        .ok_or(FujiError::InvalidFields(code))
}
