// Device addresses and command codes for FujiNet

use num_enum::{IntoPrimitive, TryFromPrimitive};
use strum_macros::Display;

/// The FujiNet adapter itself (configuration, WiFi, mounts)
pub const DEVICE_FUJI: u8 = 0x70;

/// First network channel ("N1:")
pub const DEVICE_NETWORK: u8 = 0x71;

/// Commands understood by the FujiNet adapter device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum FujiCommand {
    MountAll = 0xD7,
    GetAdapterConfig = 0xE8,
    SetSsid = 0xFB,
    GetScanResult = 0xFC,
    ScanNetworks = 0xFD,
}

/// Commands understood by a network channel device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum NetworkCommand {
    Open = b'O',
    Close = b'C',
    Read = b'R',
    Write = b'W',
    Status = b'S',
}

/// Open mode for read/write access (aux1 of `Open`)
pub const NETWORK_MODE_READ_WRITE: u8 = 0x0C;

/// No end-of-line translation (aux2 of `Open`)
pub const NETWORK_TRANSLATION_NONE: u8 = 0x00;

/// Maximum SSID length, excluding the terminating NUL
pub const SSID_MAX: usize = 32;

/// Maximum WiFi password length
pub const PASSWORD_MAX: usize = 64;

/// Size of the URL buffer sent with `Open`
pub const URL_BUFFER_SIZE: usize = 256;
