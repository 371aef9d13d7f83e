use std::io;
use thiserror::Error;

/// The primary error type for the `fujinet-lib` library.
#[derive(Error, Debug)]
pub enum FujiError {
    #[error("Timed out waiting for the peripheral")]
    Timeout,

    #[error("Short frame: expected at least {expected} bytes, got {actual}")]
    ShortFrame { expected: usize, actual: usize },

    #[error("Bad length: header declares {declared} bytes, decoded {actual}")]
    BadLength { declared: usize, actual: usize },

    #[error("Checksum mismatch: received {received:#04x}, computed {computed:#04x}")]
    ChecksumMismatch { received: u8, computed: u8 },

    #[error("Command rejected by peripheral (NAK)")]
    Nak,

    #[error("Peripheral reported {0:#04x} instead of complete")]
    BadComplete(u8),

    #[error("Expected acknowledgment, got {0:#04x}")]
    UnexpectedAck(u8),

    #[error("No acknowledgment after {0} attempts")]
    RetriesExhausted(u32),

    #[error("Invalid field descriptor {0}, must be 0..=7")]
    InvalidFields(u8),

    #[error("Payload of {len} bytes exceeds the {max} byte packet limit")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("Buffer too small: need {needed} bytes, have {capacity}")]
    BufferTooSmall { needed: usize, capacity: usize },

    #[error("Insufficient data: expected at least {expected} bytes, got {actual}")]
    InsufficientData { expected: usize, actual: usize },

    #[error("Invalid port selector: {0}")]
    InvalidPort(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),
}
