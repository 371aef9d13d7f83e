use crate::bus::BusEngine;
use crate::config::Timeouts;
use crate::error::FujiError;
use crate::fields::FieldDescriptor;
use crate::legacy::{LegacyEngine, Status};
use crate::transport::Transport;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};
use strum_macros::Display;
use tracing::debug;

/// Protocol generation spoken on the link, fixed when the engine is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Generation {
    /// SLIP-framed packets, one attempt per call
    #[default]
    #[strum(to_string = "bus")]
    Bus,
    /// 5-byte command frames with ACK/NAK handshake and retries
    #[strum(to_string = "legacy")]
    Legacy,
}

/// Transfer direction codes used by callers of the interrupt interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum Direction {
    None = 0x00,
    /// FujiNet to host
    Read = 0x40,
    /// Host to FujiNet
    Write = 0x80,
}

/// Payload phase of a request.
#[derive(Debug)]
pub enum Payload<'a> {
    None,
    Read(&'a mut [u8]),
    Write(&'a [u8]),
}

impl Payload<'_> {
    pub fn direction(&self) -> Direction {
        match self {
            Payload::None => Direction::None,
            Payload::Read(_) => Direction::Read,
            Payload::Write(_) => Direction::Write,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Payload::None => 0,
            Payload::Read(buf) => buf.len(),
            Payload::Write(data) => data.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Parameters for one request, scoped to a single call.
#[derive(Debug)]
pub struct Request<'a> {
    pub device: u8,
    pub command: u8,
    /// Aux layout on the bus; the legacy frame always carries aux1 and aux2
    pub fields: FieldDescriptor,
    pub aux: [u8; 4],
    pub payload: Payload<'a>,
}

impl<'a> Request<'a> {
    pub fn new(device: u8, command: u8) -> Self {
        Self {
            device,
            command,
            fields: FieldDescriptor::None,
            aux: [0; 4],
            payload: Payload::None,
        }
    }

    /// Carry `aux` as individual bytes, choosing the matching descriptor.
    pub fn aux(mut self, aux: &[u8]) -> Result<Self, FujiError> {
        self.fields = FieldDescriptor::for_aux_count(aux.len())?;
        self.aux = [0; 4];
        self.aux[..aux.len()].copy_from_slice(aux);
        Ok(self)
    }

    /// Carry a 16-bit value as aux1 (low byte) and aux2 (high byte).
    pub fn aux12(mut self, value: u16) -> Self {
        let [lo, hi] = value.to_le_bytes();
        self.fields = FieldDescriptor::A1A2;
        self.aux = [lo, hi, 0, 0];
        self
    }

    /// Override the descriptor, e.g. to pass a raw code from a caller.
    pub fn fields(mut self, fields: FieldDescriptor) -> Self {
        self.fields = fields;
        self
    }

    pub fn read(mut self, buf: &'a mut [u8]) -> Self {
        self.payload = Payload::Read(buf);
        self
    }

    pub fn write(mut self, data: &'a [u8]) -> Self {
        self.payload = Payload::Write(data);
        self
    }
}

/// Result of a successful request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    /// Bytes placed in the read buffer
    pub received: usize,
    /// Last status seen from the peripheral
    pub status: Status,
}

/// A protocol engine of either generation behind one call interface.
pub enum Engine<T> {
    Bus(BusEngine<T>),
    Legacy(LegacyEngine<T>),
}

impl<T: Transport> Engine<T> {
    pub fn new(generation: Generation, transport: T) -> Self {
        Self::with_timeouts(generation, transport, Timeouts::default())
    }

    pub fn with_timeouts(generation: Generation, transport: T, timeouts: Timeouts) -> Self {
        match generation {
            Generation::Bus => Engine::Bus(BusEngine::with_timeouts(transport, timeouts)),
            Generation::Legacy => Engine::Legacy(LegacyEngine::with_timeouts(transport, timeouts)),
        }
    }

    pub fn generation(&self) -> Generation {
        match self {
            Engine::Bus(_) => Generation::Bus,
            Engine::Legacy(_) => Generation::Legacy,
        }
    }

    pub fn transport(&self) -> &T {
        match self {
            Engine::Bus(engine) => engine.transport(),
            Engine::Legacy(engine) => engine.transport(),
        }
    }

    pub fn into_transport(self) -> T {
        match self {
            Engine::Bus(engine) => engine.into_transport(),
            Engine::Legacy(engine) => engine.into_transport(),
        }
    }

    /// Perform one request with whichever generation this engine speaks.
    pub fn call(&mut self, request: Request<'_>) -> Result<Completion, FujiError> {
        let Request {
            device,
            command,
            fields,
            aux,
            payload,
        } = request;
        debug!(
            device,
            command,
            direction = %payload.direction(),
            len = payload.len(),
            "Request"
        );

        match self {
            Engine::Bus(engine) => {
                let reply = match payload {
                    Payload::None => engine.bus_call(device, command, fields, aux, None, None)?,
                    Payload::Read(buf) => engine.bus_call(device, command, fields, aux, None, Some(buf))?,
                    Payload::Write(data) => engine.bus_call(device, command, fields, aux, Some(data), None)?,
                };
                Ok(Completion {
                    received: reply.copied,
                    status: Status::Complete,
                })
            }
            Engine::Legacy(engine) => {
                let received = match &payload {
                    Payload::Read(buf) => buf.len(),
                    _ => 0,
                };
                let status = engine.command(device, command, aux[0], aux[1], payload)?;
                Ok(Completion { received, status })
            }
        }
    }
}

/// Collapse a call result into the single status byte of the interrupt interface.
///
/// Success is `'C'`; a peer-reported code is passed through; anything else is `'E'`.
pub fn status_code(result: &Result<Completion, FujiError>) -> u8 {
    match result {
        Ok(completion) => completion.status.into(),
        Err(FujiError::BadComplete(code) | FujiError::UnexpectedAck(code)) => *code,
        Err(FujiError::Nak) => Status::Nak.into(),
        Err(_) => Status::Error.into(),
    }
}
