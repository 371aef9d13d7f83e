//! Legacy command protocol: a fixed 5-byte command frame marked by a DTR pulse,
//! an ACK/NAK handshake, then an optional checksummed payload phase.
//!
//! Only the command/ACK phase is retried. An explicit NAK is final.

use crate::checksum::checksum;
use crate::config::Timeouts;
use crate::engine::Payload;
use crate::error::FujiError;
use crate::transport::Transport;
use num_enum::{FromPrimitive, IntoPrimitive};
use strum_macros::Display;
use tracing::{debug, warn};

/// Attempts at getting the command frame acknowledged
pub const MAX_RETRIES: u32 = 5;

/// device, command, aux1, aux2, checksum
pub const FRAME_SIZE: usize = 5;

/// Single-byte status codes sent by the peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, FromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum Status {
    Ack = b'A',
    Nak = b'N',
    Complete = b'C',
    Error = b'E',
    #[num_enum(catch_all)]
    Unknown(u8),
}

/// Legacy protocol engine owning its transport.
pub struct LegacyEngine<T> {
    transport: T,
    timeouts: Timeouts,
}

impl<T: Transport> LegacyEngine<T> {
    pub fn new(transport: T) -> Self {
        Self::with_timeouts(transport, Timeouts::default())
    }

    pub fn with_timeouts(transport: T, timeouts: Timeouts) -> Self {
        Self { transport, timeouts }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Run one command exchange, returning the final status on success.
    ///
    /// The transport is held exclusively for the whole exchange so nothing
    /// disturbs the control-line framing.
    pub fn command(
        &mut self,
        device: u8,
        command: u8,
        aux1: u8,
        aux2: u8,
        payload: Payload<'_>,
    ) -> Result<Status, FujiError> {
        self.transport.set_exclusive(true)?;
        let result = self.exchange(device, command, aux1, aux2, payload);
        let released = self.transport.set_exclusive(false);
        let status = result?;
        released?;
        Ok(status)
    }

    fn exchange(
        &mut self,
        device: u8,
        command: u8,
        aux1: u8,
        aux2: u8,
        payload: Payload<'_>,
    ) -> Result<Status, FujiError> {
        let mut frame = [device, command, aux1, aux2, 0];
        frame[FRAME_SIZE - 1] = checksum(&frame[..FRAME_SIZE - 1]);
        self.send_until_acked(&frame)?;

        match payload {
            Payload::None => self.await_complete()?,
            Payload::Read(buf) => {
                self.await_complete()?;
                self.read_payload(buf)?;
            }
            Payload::Write(data) => {
                self.write_payload(data)?;
                self.await_complete()?;
            }
        }
        Ok(Status::Complete)
    }

    fn send_until_acked(&mut self, frame: &[u8; FRAME_SIZE]) -> Result<(), FujiError> {
        for attempt in 1..=MAX_RETRIES {
            self.transport.flush_receive_buffer()?;
            self.send_frame(frame)?;

            match self.transport.read_byte(self.timeouts.short)?.map(Status::from) {
                Some(Status::Ack) => return Ok(()),
                Some(Status::Nak) => {
                    warn!(attempt, "Command {:#04x} rejected", frame[1]);
                    return Err(FujiError::Nak);
                }
                Some(other) => warn!(attempt, "Unexpected handshake byte {:?}", other),
                None => warn!(attempt, "No acknowledgment"),
            }
        }
        Err(FujiError::RetriesExhausted(MAX_RETRIES))
    }

    fn send_frame(&mut self, frame: &[u8; FRAME_SIZE]) -> Result<(), FujiError> {
        debug!(bytes = hex::encode(frame), "Command frame");
        self.transport.set_control_line(true)?;
        let sent = self
            .transport
            .write_bytes(frame)
            .and_then(|_| self.transport.wait_transmit_idle());
        // The line is released even when the write failed
        let released = self.transport.set_control_line(false);
        sent?;
        released
    }

    fn await_complete(&mut self) -> Result<(), FujiError> {
        match self.transport.read_byte(self.timeouts.long)?.map(Status::from) {
            Some(Status::Complete) => Ok(()),
            Some(status) => Err(FujiError::BadComplete(status.into())),
            None => Err(FujiError::Timeout),
        }
    }

    fn read_payload(&mut self, buf: &mut [u8]) -> Result<(), FujiError> {
        let n = self.transport.read_bytes(buf, self.timeouts.short)?;
        if n < buf.len() {
            return Err(FujiError::ShortFrame {
                expected: buf.len(),
                actual: n,
            });
        }

        let received = self.transport.read_byte(self.timeouts.long)?.ok_or(FujiError::Timeout)?;
        let computed = checksum(buf);
        if received != computed {
            return Err(FujiError::ChecksumMismatch { received, computed });
        }
        debug!(len = n, "Payload received");
        Ok(())
    }

    fn write_payload(&mut self, data: &[u8]) -> Result<(), FujiError> {
        self.transport.write_bytes(data)?;
        self.transport.write_bytes(&[checksum(data)])?;

        match self.transport.read_byte(self.timeouts.long)?.map(Status::from) {
            Some(Status::Ack) => Ok(()),
            Some(Status::Nak) => Err(FujiError::Nak),
            Some(status) => Err(FujiError::UnexpectedAck(status.into())),
            None => Err(FujiError::Timeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scripted::{LinkEvent, ScriptedTransport};

    #[test]
    fn test_status_codes() {
        assert_eq!(Status::from(b'A'), Status::Ack);
        assert_eq!(Status::from(b'E'), Status::Error);
        assert_eq!(Status::from(0x42), Status::Unknown(0x42));
        assert_eq!(u8::from(Status::Complete), b'C');
    }

    #[test]
    fn test_frame_is_framed_by_control_line() {
        let link = ScriptedTransport::new().respond(b"AC");
        let mut engine = LegacyEngine::new(link);
        let status = engine.command(0x31, b'S', 0x01, 0x00, Payload::None).unwrap();
        assert_eq!(status, Status::Complete);

        let ck = checksum(&[0x31, b'S', 0x01, 0x00]);
        assert_eq!(
            engine.transport().events(),
            &[
                LinkEvent::Exclusive(true),
                LinkEvent::FlushReceive { discarded: 0 },
                LinkEvent::ControlLine(true),
                LinkEvent::Write(bytes::Bytes::copy_from_slice(&[0x31, b'S', 0x01, 0x00, ck])),
                LinkEvent::TransmitIdle,
                LinkEvent::ControlLine(false),
                LinkEvent::Exclusive(false),
            ]
        );
    }

    #[test]
    fn test_exclusive_released_on_failure() {
        let link = ScriptedTransport::new().respond(b"N");
        let mut engine = LegacyEngine::new(link);
        assert!(matches!(
            engine.command(0x31, b'S', 0, 0, Payload::None),
            Err(FujiError::Nak)
        ));
        assert_eq!(engine.transport().events().last(), Some(&LinkEvent::Exclusive(false)));
    }

    #[test]
    fn test_control_line_released_on_write_error() {
        let link = ScriptedTransport::new().fail_writes();
        let mut engine = LegacyEngine::new(link);
        assert!(matches!(
            engine.command(0x31, b'S', 0, 0, Payload::None),
            Err(FujiError::Io(_))
        ));
        assert_eq!(
            engine.transport().events(),
            &[
                LinkEvent::Exclusive(true),
                LinkEvent::FlushReceive { discarded: 0 },
                LinkEvent::ControlLine(true),
                LinkEvent::ControlLine(false),
                LinkEvent::Exclusive(false),
            ]
        );
    }
}
