use crate::constants::{PASSWORD_MAX, SSID_MAX};
use crate::error::FujiError;
use serde::Serialize;
use std::fmt;
use std::net::Ipv4Addr;
use zerocopy::byteorder::little_endian::U16;
use zerocopy::{FromBytes, FromZeros, Immutable, IntoBytes, KnownLayout, Unaligned};

/// Adapter configuration block as sent by the FujiNet (140 bytes).
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct AdapterConfigRaw {
    pub ssid: [u8; SSID_MAX + 1],
    pub hostname: [u8; 64],
    pub local_ip: [u8; 4],
    pub gateway: [u8; 4],
    pub netmask: [u8; 4],
    pub dns_ip: [u8; 4],
    pub mac: [u8; 6],
    pub bssid: [u8; 6],
    pub fn_version: [u8; 15],
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdapterConfig {
    pub ssid: String,
    pub hostname: String,
    pub local_ip: Ipv4Addr,
    pub gateway: Ipv4Addr,
    pub netmask: Ipv4Addr,
    pub dns_ip: Ipv4Addr,
    pub mac: MacAddress,
    pub bssid: MacAddress,
    pub fn_version: String,
}

impl From<AdapterConfigRaw> for AdapterConfig {
    fn from(raw: AdapterConfigRaw) -> Self {
        AdapterConfig {
            ssid: c_string(&raw.ssid),
            hostname: c_string(&raw.hostname),
            local_ip: Ipv4Addr::from(raw.local_ip),
            gateway: Ipv4Addr::from(raw.gateway),
            netmask: Ipv4Addr::from(raw.netmask),
            dns_ip: Ipv4Addr::from(raw.dns_ip),
            mac: MacAddress(raw.mac),
            bssid: MacAddress(raw.bssid),
            fn_version: c_string(&raw.fn_version),
        }
    }
}

impl fmt::Display for AdapterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:>8}:{:>30}", "SSID", self.ssid)?;
        writeln!(f, "{:>8}:{:>30}", "Hostname", self.hostname)?;
        writeln!(f, "{:>8}:{}", "Local IP", self.local_ip)?;
        writeln!(f, "{:>8}:{}", "Netmask", self.netmask)?;
        writeln!(f, "{:>8}:{}", "Gateway", self.gateway)?;
        writeln!(f, "{:>8}:{}", "DNS", self.dns_ip)?;
        writeln!(f, "{:>8}:{}", "MAC", self.mac)?;
        writeln!(f, "{:>8}:{}", "BSSID", self.bssid)?;
        write!(f, "{:>8}:{}", "Version", self.fn_version)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MacAddress(pub [u8; 6]);

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}", a, b, c, d, e, g)
    }
}

/// One entry of a WiFi scan (34 bytes).
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct ScanResultRaw {
    pub ssid: [u8; SSID_MAX + 1],
    pub rssi: i8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanResult {
    pub ssid: String,
    /// Signal strength in dBm
    pub rssi: i8,
}

impl From<ScanResultRaw> for ScanResult {
    fn from(raw: ScanResultRaw) -> Self {
        ScanResult {
            ssid: c_string(&raw.ssid),
            rssi: raw.rssi,
        }
    }
}

impl ScanResult {
    /// Signal strength as a one to three star graph
    pub fn signal_bars(&self) -> &'static str {
        if self.rssi > -50 {
            "***"
        } else if self.rssi > -70 {
            "**"
        } else {
            "*"
        }
    }
}

/// WiFi credentials as sent with `SetSsid` (97 bytes, NUL padded).
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct NetworkConfigRaw {
    pub ssid: [u8; SSID_MAX + 1],
    pub password: [u8; PASSWORD_MAX],
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkConfig {
    pub ssid: String,
    pub password: String,
}

impl NetworkConfig {
    pub fn new(ssid: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            ssid: ssid.into(),
            password: password.into(),
        }
    }

    /// Encode for the wire, truncating over-long fields.
    pub fn to_raw(&self) -> NetworkConfigRaw {
        let mut raw = NetworkConfigRaw::new_zeroed();
        copy_truncated(&mut raw.ssid[..SSID_MAX], self.ssid.as_bytes());
        copy_truncated(&mut raw.password, self.password.as_bytes());
        raw
    }
}

/// Network channel status (4 bytes).
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct NetworkStatusRaw {
    pub bytes_waiting: U16,
    pub connected: u8,
    pub error: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NetworkStatus {
    pub bytes_waiting: u16,
    pub connected: bool,
    pub error: u8,
}

impl From<NetworkStatusRaw> for NetworkStatus {
    fn from(raw: NetworkStatusRaw) -> Self {
        NetworkStatus {
            bytes_waiting: raw.bytes_waiting.get(),
            connected: raw.connected != 0,
            error: raw.error,
        }
    }
}

/// Read a fixed-size wire struct from the start of `bytes`.
pub(crate) fn read_struct<S: FromBytes>(bytes: &[u8]) -> Result<S, FujiError> {
    S::read_from_prefix(bytes)
        .map(|(s, _)| s)
        .map_err(|_| FujiError::InsufficientData {
            expected: size_of::<S>(),
            actual: bytes.len(),
        })
}

fn c_string(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

fn copy_truncated(dst: &mut [u8], src: &[u8]) {
    let n = src.len().min(dst.len());
    dst[..n].copy_from_slice(&src[..n]);
}
