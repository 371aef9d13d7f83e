use crate::adapter::{
    AdapterConfig, AdapterConfigRaw, NetworkConfig, NetworkStatus, NetworkStatusRaw, ScanResult, ScanResultRaw,
    read_struct,
};
use crate::config::PortConfig;
use crate::constants::{DEVICE_FUJI, DEVICE_NETWORK, FujiCommand, NetworkCommand, URL_BUFFER_SIZE};
use crate::engine::{Completion, Engine, Generation, Request};
use crate::error::FujiError;
use crate::packet::{HEADER_SIZE, MAX_PACKET};
use crate::transport::{SerialTransport, Transport};
use bytes::{Bytes, BytesMut};
use tracing::{debug, info};
use zerocopy::IntoBytes;

/// Largest write that fits one bus packet next to its two length bytes
pub const WRITE_CHUNK: usize = MAX_PACKET - HEADER_SIZE - 2;

/// A FujiNet adapter reached through one protocol engine.
pub struct FujiNet<T> {
    engine: Engine<T>,
}

impl FujiNet<SerialTransport> {
    /// Open the configured serial port and talk `generation` over it.
    pub fn open(config: &PortConfig, generation: Generation) -> Result<Self, FujiError> {
        let transport = SerialTransport::open(config)?;
        info!("Connected on {} using the {} protocol", config.port, generation);
        Ok(Self::new(Engine::with_timeouts(generation, transport, config.timeouts)))
    }
}

impl<T: Transport> FujiNet<T> {
    pub fn new(engine: Engine<T>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Engine<T> {
        &self.engine
    }

    pub fn into_engine(self) -> Engine<T> {
        self.engine
    }

    /// Issue an arbitrary request.
    pub fn call(&mut self, request: Request<'_>) -> Result<Completion, FujiError> {
        self.engine.call(request)
    }

    pub fn adapter_config(&mut self) -> Result<AdapterConfig, FujiError> {
        let mut buf = [0u8; size_of::<AdapterConfigRaw>()];
        let completion = self.call(Request::new(DEVICE_FUJI, FujiCommand::GetAdapterConfig.into()).read(&mut buf))?;
        let raw: AdapterConfigRaw = read_struct(&buf[..completion.received])?;
        Ok(AdapterConfig::from(raw))
    }

    pub fn mount_all(&mut self) -> Result<(), FujiError> {
        info!("Mounting all slots");
        self.call(Request::new(DEVICE_FUJI, FujiCommand::MountAll.into()))?;
        Ok(())
    }

    /// Start a WiFi scan, returning how many networks were found.
    pub fn scan_networks(&mut self) -> Result<u8, FujiError> {
        let mut count = [0u8; 1];
        let completion = self.call(Request::new(DEVICE_FUJI, FujiCommand::ScanNetworks.into()).read(&mut count))?;
        if completion.received < 1 {
            return Err(FujiError::InsufficientData {
                expected: 1,
                actual: completion.received,
            });
        }
        debug!(count = count[0], "Scan complete");
        Ok(count[0])
    }

    pub fn scan_result(&mut self, index: u8) -> Result<ScanResult, FujiError> {
        let mut buf = [0u8; size_of::<ScanResultRaw>()];
        let request = Request::new(DEVICE_FUJI, FujiCommand::GetScanResult.into())
            .aux(&[index])?
            .read(&mut buf);
        let completion = self.call(request)?;
        let raw: ScanResultRaw = read_struct(&buf[..completion.received])?;
        Ok(ScanResult::from(raw))
    }

    /// Store WiFi credentials, optionally persisting them on the adapter.
    pub fn set_ssid(&mut self, config: &NetworkConfig, save: bool) -> Result<(), FujiError> {
        info!(ssid = %config.ssid, save, "Setting SSID");
        let raw = config.to_raw();
        let request = Request::new(DEVICE_FUJI, FujiCommand::SetSsid.into())
            .aux(&[u8::from(save)])?
            .write(raw.as_bytes());
        self.call(request)?;
        Ok(())
    }

    /// Borrow network channel `unit` (1 for "N1:").
    pub fn network(&mut self, unit: u8) -> NetworkChannel<'_, T> {
        NetworkChannel {
            fuji: self,
            device: DEVICE_NETWORK.wrapping_add(unit.saturating_sub(1)),
        }
    }
}

/// A network channel device on the adapter.
pub struct NetworkChannel<'a, T> {
    fuji: &'a mut FujiNet<T>,
    device: u8,
}

impl<T: Transport> NetworkChannel<'_, T> {
    pub fn device(&self) -> u8 {
        self.device
    }

    /// Open `url` with the given access mode and end-of-line translation.
    pub fn open(&mut self, url: &str, mode: u8, translation: u8) -> Result<(), FujiError> {
        let mut spec = [0u8; URL_BUFFER_SIZE];
        let n = url.len().min(URL_BUFFER_SIZE - 1);
        spec[..n].copy_from_slice(&url.as_bytes()[..n]);

        info!(device = self.device, url, "Opening network channel");
        let request = Request::new(self.device, NetworkCommand::Open.into())
            .aux(&[mode, translation])?
            .write(&spec);
        self.fuji.call(request)?;
        Ok(())
    }

    pub fn status(&mut self) -> Result<NetworkStatus, FujiError> {
        let mut buf = [0u8; size_of::<NetworkStatusRaw>()];
        let completion = self
            .fuji
            .call(Request::new(self.device, NetworkCommand::Status.into()).read(&mut buf))?;
        let raw: NetworkStatusRaw = read_struct(&buf[..completion.received])?;
        Ok(NetworkStatus::from(raw))
    }

    /// Read up to `len` bytes; the peripheral is told the length through aux1/aux2.
    pub fn read(&mut self, len: u16) -> Result<Bytes, FujiError> {
        let mut buf = BytesMut::zeroed(len as usize);
        let completion = self
            .fuji
            .call(Request::new(self.device, NetworkCommand::Read.into()).aux12(len).read(&mut buf))?;
        buf.truncate(completion.received);
        Ok(buf.freeze())
    }

    /// Send `data`, split into calls of at most [`WRITE_CHUNK`] bytes.
    pub fn write(&mut self, data: &[u8]) -> Result<(), FujiError> {
        for chunk in data.chunks(WRITE_CHUNK) {
            self.fuji.call(
                Request::new(self.device, NetworkCommand::Write.into())
                    .aux12(chunk.len() as u16)
                    .write(chunk),
            )?;
        }
        Ok(())
    }

    pub fn close(&mut self) -> Result<(), FujiError> {
        self.fuji.call(Request::new(self.device, NetworkCommand::Close.into()))?;
        Ok(())
    }
}
