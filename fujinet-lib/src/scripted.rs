//! In-memory transport that plays back a scripted peer.
//!
//! Replies are queued per write: the Nth call to `write_bytes` releases the Nth
//! queued reply into the receive path. A read that finds the receive path empty
//! behaves like a timeout, so an empty reply scripts a silent peer.

use crate::error::FujiError;
use crate::transport::Transport;
use bytes::{Bytes, BytesMut};
use std::collections::VecDeque;
use std::io;
use std::time::Duration;

/// Control-side events observed by a [`ScriptedTransport`], in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    Write(Bytes),
    ControlLine(bool),
    TransmitIdle,
    FlushReceive { discarded: usize },
    Exclusive(bool),
}

#[derive(Debug, Default)]
pub struct ScriptedTransport {
    rx: VecDeque<u8>,
    replies: VecDeque<Vec<u8>>,
    written: BytesMut,
    events: Vec<LinkEvent>,
    timeouts: Vec<Duration>,
    fail_writes: bool,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the bytes the peer sends after the next unanswered write.
    pub fn respond(mut self, reply: &[u8]) -> Self {
        self.replies.push_back(reply.to_vec());
        self
    }

    /// Queue a write that the peer never answers.
    pub fn silent(self) -> Self {
        self.respond(&[])
    }

    /// Put bytes in the receive path before anything is written.
    pub fn with_pending(mut self, bytes: &[u8]) -> Self {
        self.rx.extend(bytes);
        self
    }

    /// Make every write fail as if the port had gone away.
    pub fn fail_writes(mut self) -> Self {
        self.fail_writes = true;
        self
    }

    /// Everything written so far, concatenated.
    pub fn written(&self) -> &[u8] {
        &self.written
    }

    /// Each write call, in order.
    pub fn writes(&self) -> Vec<Bytes> {
        self.events
            .iter()
            .filter_map(|e| match e {
                LinkEvent::Write(b) => Some(b.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn events(&self) -> &[LinkEvent] {
        &self.events
    }

    /// Timeouts requested by each single-byte or bulk read.
    pub fn read_timeouts(&self) -> &[Duration] {
        &self.timeouts
    }

    /// Bytes still waiting in the receive path.
    pub fn unread(&self) -> usize {
        self.rx.len()
    }

    /// Scripted replies never released by a write.
    pub fn unused_replies(&self) -> usize {
        self.replies.len()
    }
}

impl Transport for ScriptedTransport {
    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, FujiError> {
        if self.fail_writes {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "link closed").into());
        }
        self.written.extend_from_slice(data);
        self.events.push(LinkEvent::Write(Bytes::copy_from_slice(data)));
        if let Some(reply) = self.replies.pop_front() {
            self.rx.extend(reply);
        }
        Ok(data.len())
    }

    fn read_byte(&mut self, timeout: Duration) -> Result<Option<u8>, FujiError> {
        self.timeouts.push(timeout);
        Ok(self.rx.pop_front())
    }

    fn set_control_line(&mut self, asserted: bool) -> Result<(), FujiError> {
        self.events.push(LinkEvent::ControlLine(asserted));
        Ok(())
    }

    fn wait_transmit_idle(&mut self) -> Result<(), FujiError> {
        self.events.push(LinkEvent::TransmitIdle);
        Ok(())
    }

    fn flush_receive_buffer(&mut self) -> Result<(), FujiError> {
        let discarded = self.rx.len();
        self.rx.clear();
        self.events.push(LinkEvent::FlushReceive { discarded });
        Ok(())
    }

    fn set_exclusive(&mut self, exclusive: bool) -> Result<(), FujiError> {
        self.events.push(LinkEvent::Exclusive(exclusive));
        Ok(())
    }
}
