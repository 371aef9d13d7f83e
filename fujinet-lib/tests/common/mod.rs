//! Common test utilities and shared imports

// Allow unused imports and dead code since this is a shared module
// used across multiple test files - not all items are used in every test file
#[allow(unused_imports)]
pub use fujinet_lib::bus::BusEngine;
#[allow(unused_imports)]
pub use fujinet_lib::checksum::checksum;
#[allow(unused_imports)]
pub use fujinet_lib::engine::{Engine, Generation, Payload, Request};
#[allow(unused_imports)]
pub use fujinet_lib::error::FujiError;
#[allow(unused_imports)]
pub use fujinet_lib::fields::FieldDescriptor;
#[allow(unused_imports)]
pub use fujinet_lib::legacy::{LegacyEngine, Status};
#[allow(unused_imports)]
pub use fujinet_lib::scripted::{LinkEvent, ScriptedTransport};
#[allow(unused_imports)]
pub use fujinet_lib::slip;

/// Build a bus packet with a correct length and checksum.
#[allow(dead_code)]
pub fn bus_packet(device: u8, command: u8, fields: u8, data: &[u8]) -> Vec<u8> {
    let len = (6 + data.len()) as u16;
    let mut packet = vec![device, command];
    packet.extend_from_slice(&len.to_le_bytes());
    packet.push(0);
    packet.push(fields);
    packet.extend_from_slice(data);
    packet[4] = checksum(&packet);
    packet
}

/// SLIP-frame `packet` for the wire.
#[allow(dead_code)]
pub fn frame(packet: &[u8]) -> Vec<u8> {
    let mut buffer = vec![0u8; packet.len() * 2 + 2];
    buffer[1..1 + packet.len()].copy_from_slice(packet);
    let n = slip::encode(&mut buffer, packet.len()).expect("buffer sized for worst case");
    buffer.truncate(n);
    buffer
}

/// Decode the frame a host wrote, returning the unescaped packet.
#[allow(dead_code)]
pub fn unframe(wire: &[u8]) -> Vec<u8> {
    let mut rx = wire.to_vec();
    let n = slip::decode(&mut rx);
    rx.truncate(n);
    rx
}

/// Deterministic pseudo-random bytes biased towards the SLIP reserved values.
#[allow(dead_code)]
pub fn noisy_bytes(len: usize, seed: u32) -> Vec<u8> {
    let mut state = seed.wrapping_mul(2_654_435_761).wrapping_add(1);
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            match state % 7 {
                0 => slip::END,
                1 => slip::ESC,
                _ => (state >> 8) as u8,
            }
        })
        .collect()
}
