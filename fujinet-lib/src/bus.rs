//! Current-generation bus protocol: length-prefixed, checksummed, SLIP-framed
//! packets exchanged as a single request/reply.
//!
//! A call makes exactly one attempt. Retrying is left to the caller.

use crate::checksum::checksum;
use crate::config::Timeouts;
use crate::error::FujiError;
use crate::fields::FieldDescriptor;
use crate::packet::{BUFFER_SIZE, BusHeader, CHECKSUM_OFFSET, HEADER_SIZE, MAX_PACKET};
use crate::slip::{self, PACKET_OFFSET};
use crate::transport::Transport;
use tracing::{debug, warn};

/// Outcome of a successful bus exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusReply {
    /// Data bytes (after the header) carried by the reply
    pub payload_len: usize,
    /// Bytes copied into the caller's reply buffer
    pub copied: usize,
    /// Field descriptor echoed in the reply header
    pub fields: u8,
}

/// Bus protocol engine owning its transport and working buffer.
///
/// Not reentrant: each call builds the request in, and decodes the reply
/// into, the same buffer.
pub struct BusEngine<T> {
    transport: T,
    buffer: Box<[u8; BUFFER_SIZE]>,
    timeouts: Timeouts,
}

impl<T: Transport> BusEngine<T> {
    pub fn new(transport: T) -> Self {
        Self::with_timeouts(transport, Timeouts::default())
    }

    pub fn with_timeouts(transport: T, timeouts: Timeouts) -> Self {
        Self {
            transport,
            buffer: Box::new([0u8; BUFFER_SIZE]),
            timeouts,
        }
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

    /// Send one command and wait for its reply.
    ///
    /// Only as many of `aux` as `fields` allows are sent, in order. When the
    /// reply carries data and `reply` is given, up to `reply.len()` bytes are
    /// copied into it; extra reply data is dropped silently.
    pub fn bus_call(
        &mut self,
        device: u8,
        command: u8,
        fields: FieldDescriptor,
        aux: [u8; 4],
        write_data: Option<&[u8]>,
        reply: Option<&mut [u8]>,
    ) -> Result<BusReply, FujiError> {
        let len = self.build(device, command, fields, aux, write_data)?;

        let framed = slip::encode(&mut self.buffer[..], len)?;
        debug!(
            device,
            command,
            bytes = hex::encode(&self.buffer[..framed]),
            "Bus write"
        );
        self.transport.write_bytes(&self.buffer[..framed])?;

        let received = self.transport.read_until_sentinel(
            &mut self.buffer[PACKET_OFFSET..],
            self.timeouts.long,
            slip::END,
            2,
        )?;
        let rx = &mut self.buffer[PACKET_OFFSET..PACKET_OFFSET + received];
        debug!(bytes = hex::encode(&*rx), "Bus read");
        if rx.iter().filter(|&&b| b == slip::END).count() < 2 {
            warn!(received, "No complete reply frame");
            return Err(FujiError::Timeout);
        }

        let decoded = slip::decode(rx);
        self.validate(decoded)?;

        let header = BusHeader::parse(&self.buffer[PACKET_OFFSET..])?;
        let payload_len = decoded - HEADER_SIZE;
        let mut copied = 0;
        if let Some(reply) = reply {
            if payload_len > 0 {
                copied = payload_len.min(reply.len());
                let data = PACKET_OFFSET + HEADER_SIZE;
                reply[..copied].copy_from_slice(&self.buffer[data..data + copied]);
            }
        }

        Ok(BusReply {
            payload_len,
            copied,
            fields: header.fields,
        })
    }

    /// Lay out header, aux bytes and payload at the packet offset; returns the packet length.
    fn build(
        &mut self,
        device: u8,
        command: u8,
        fields: FieldDescriptor,
        aux: [u8; 4],
        write_data: Option<&[u8]>,
    ) -> Result<usize, FujiError> {
        let aux = &aux[..fields.aux_len()];
        let payload = write_data.unwrap_or_default();
        let len = HEADER_SIZE + aux.len() + payload.len();
        if len > MAX_PACKET {
            return Err(FujiError::PayloadTooLarge {
                len: payload.len(),
                max: MAX_PACKET - HEADER_SIZE - aux.len(),
            });
        }

        let packet = &mut self.buffer[PACKET_OFFSET..PACKET_OFFSET + len];
        let (head, data) = packet.split_at_mut(HEADER_SIZE);
        data[..aux.len()].copy_from_slice(aux);
        data[aux.len()..].copy_from_slice(payload);

        let mut header = BusHeader::new(device, command, fields);
        header.length.set(len as u16);
        header.store(head)?;
        let ck = checksum(packet);
        packet[CHECKSUM_OFFSET] = ck;
        Ok(len)
    }

    /// Check the decoded reply's length and checksum.
    fn validate(&mut self, decoded: usize) -> Result<(), FujiError> {
        let packet = &mut self.buffer[PACKET_OFFSET..PACKET_OFFSET + decoded];
        if decoded < HEADER_SIZE {
            warn!(decoded, "Short reply");
            return Err(FujiError::ShortFrame {
                expected: HEADER_SIZE,
                actual: decoded,
            });
        }

        let declared = BusHeader::parse(packet)?.length();
        if declared != decoded {
            warn!(declared, decoded, "Reply length mismatch");
            return Err(FujiError::BadLength {
                declared,
                actual: decoded,
            });
        }

        let received = packet[CHECKSUM_OFFSET];
        packet[CHECKSUM_OFFSET] = 0;
        let computed = checksum(packet);
        if received != computed {
            warn!("Checksum mismatch: received {:#04x}, computed {:#04x}", received, computed);
            return Err(FujiError::ChecksumMismatch { received, computed });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scripted::ScriptedTransport;

    fn reply_frame(packet: &[u8]) -> Vec<u8> {
        let mut buffer = vec![0u8; packet.len() * 2 + 2];
        buffer[1..1 + packet.len()].copy_from_slice(packet);
        let n = slip::encode(&mut buffer, packet.len()).unwrap();
        buffer.truncate(n);
        buffer
    }

    #[test]
    fn test_build_truncates_aux_to_descriptor() {
        let mut engine = BusEngine::new(ScriptedTransport::new());
        let len = engine
            .build(0x70, 0x01, FieldDescriptor::A1A2, [0x11, 0x22, 0x33, 0x44], None)
            .unwrap();
        assert_eq!(len, 8);
        assert_eq!(&engine.buffer[7..9], &[0x11, 0x22]);
        assert_eq!(engine.buffer[3], 8);
    }

    #[test]
    fn test_payload_too_large() {
        let mut engine = BusEngine::new(ScriptedTransport::new());
        let data = vec![0u8; MAX_PACKET];
        let err = engine
            .bus_call(0x70, 0x01, FieldDescriptor::None, [0; 4], Some(&data), None)
            .unwrap_err();
        assert!(matches!(err, FujiError::PayloadTooLarge { max: 516, .. }));
        assert!(engine.transport().written().is_empty());
    }

    #[test]
    fn test_reply_with_payload() {
        let mut packet = vec![0x70, 0xFD, 0x07, 0x00, 0x00, 0x00, 0x03];
        packet[4] = checksum(&packet);
        let link = ScriptedTransport::new().respond(&reply_frame(&packet));
        let mut engine = BusEngine::new(link);

        let mut count = [0u8; 1];
        let reply = engine
            .bus_call(0x70, 0xFD, FieldDescriptor::None, [0; 4], None, Some(&mut count))
            .unwrap();
        assert_eq!(reply.payload_len, 1);
        assert_eq!(reply.copied, 1);
        assert_eq!(count[0], 3);
    }
}
