use crate::error::FujiError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Environment variable selecting the serial port (1-4 or a device path)
pub const PORT_ENV: &str = "FUJI_PORT";
/// Environment variable selecting the line speed
pub const BAUD_ENV: &str = "FUJI_BPS";

pub const DEFAULT_BAUD: u32 = 115_200;

/// Timeout for single handshake bytes
pub const TIMEOUT: Duration = Duration::from_millis(100);
/// Timeout for bulk transfers and completion signals
pub const TIMEOUT_SLOW: Duration = Duration::from_secs(15);

/// Which serial port the peripheral hangs off.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PortSelector {
    /// Numbered COM port, 1 through 4
    Com(u8),
    /// Explicit device path such as `/dev/ttyUSB0`
    Path(String),
}

impl Default for PortSelector {
    fn default() -> Self {
        PortSelector::Com(1)
    }
}

impl PortSelector {
    /// Name handed to the OS serial layer
    pub fn device_path(&self) -> String {
        match self {
            PortSelector::Com(n) if cfg!(windows) => format!("COM{}", n),
            PortSelector::Com(n) => format!("/dev/ttyS{}", n.saturating_sub(1)),
            PortSelector::Path(path) => path.clone(),
        }
    }
}

impl FromStr for PortSelector {
    type Err = FujiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(FujiError::InvalidPort(s.to_string()));
        }
        match s.parse::<u8>() {
            Ok(n @ 1..=4) => Ok(PortSelector::Com(n)),
            Ok(_) => Err(FujiError::InvalidPort(s.to_string())),
            Err(_) => Ok(PortSelector::Path(s.to_string())),
        }
    }
}

impl fmt::Display for PortSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortSelector::Com(n) => write!(f, "COM{}", n),
            PortSelector::Path(path) => write!(f, "{}", path),
        }
    }
}

/// Read timeouts used by the protocol engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeouts {
    /// Handshake bytes
    pub short: Duration,
    /// Replies, payload checksums and completion
    pub long: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            short: TIMEOUT,
            long: TIMEOUT_SLOW,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortConfig {
    pub port: PortSelector,
    pub baud: u32,
    #[serde(default)]
    pub timeouts: Timeouts,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            port: PortSelector::default(),
            baud: DEFAULT_BAUD,
            timeouts: Timeouts::default(),
        }
    }
}

impl PortConfig {
    /// Build from `FUJI_PORT` and `FUJI_BPS`, falling back to COM1 at 115200.
    pub fn from_env() -> Result<Self, FujiError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, FujiError> {
        let mut config = Self::default();
        if let Some(port) = lookup(PORT_ENV) {
            config.port = port.parse()?;
        }
        if let Some(baud) = lookup(BAUD_ENV) {
            config.baud = baud
                .trim()
                .parse()
                .ok()
                .filter(|&b| b > 0)
                .ok_or_else(|| FujiError::InvalidPort(format!("{}={}", BAUD_ENV, baud)))?;
        }
        Ok(config)
    }
}
