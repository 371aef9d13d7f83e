use crate::error::FujiError;
use crate::fields::FieldDescriptor;
use zerocopy::byteorder::little_endian::U16;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

/// Size of the bus packet header (6 bytes)
pub const HEADER_SIZE: usize = size_of::<BusHeader>();

/// Offset of the checksum byte inside the header
pub const CHECKSUM_OFFSET: usize = 4;

/// Largest sector payload the bus carries
pub const MAX_SECTOR: usize = 512;

/// Largest packet: sector + header + four aux bytes
pub const MAX_PACKET: usize = MAX_SECTOR + HEADER_SIZE + 4;

/// Working buffer size, enough for a fully escaped packet plus both delimiters
pub const BUFFER_SIZE: usize = MAX_PACKET * 2 + 2;

/// Header preceding every bus packet, byte-exact with the wire layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct BusHeader {
    /// Destination device
    pub device: u8,
    pub command: u8,
    /// Total packet length including this header
    pub length: U16,
    pub checksum: u8,
    /// Raw field descriptor code
    pub fields: u8,
}

impl BusHeader {
    pub fn new(device: u8, command: u8, fields: FieldDescriptor) -> Self {
        Self {
            device,
            command,
            length: U16::new(HEADER_SIZE as u16),
            checksum: 0,
            fields: fields.into(),
        }
    }

    pub fn length(&self) -> usize {
        self.length.get() as usize
    }

    /// Read a header from the start of `bytes`.
    pub fn parse(bytes: &[u8]) -> Result<Self, FujiError> {
        let (header, _) = Self::read_from_prefix(bytes).map_err(|_| FujiError::ShortFrame {
            expected: HEADER_SIZE,
            actual: bytes.len(),
        })?;
        Ok(header)
    }

    /// Write this header over the start of `bytes`.
    pub fn store(&self, bytes: &mut [u8]) -> Result<(), FujiError> {
        let capacity = bytes.len();
        self.write_to_prefix(bytes).map_err(|_| FujiError::BufferTooSmall {
            needed: HEADER_SIZE,
            capacity,
        })
    }
}
