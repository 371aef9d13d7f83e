//! In-place SLIP framing for the bus protocol.
//!
//! The encoder expects the packet to start one byte into the buffer, leaving
//! room for the leading `END` so that an unescaped packet never moves. When
//! escaping is needed the buffer is rewritten from the back, so every write
//! lands at or ahead of the byte currently being read.

use crate::error::FujiError;

/// Frame delimiter
pub const END: u8 = 0xC0;
/// Escape introducer
pub const ESC: u8 = 0xDB;
/// Follows `ESC` to stand for a literal `END`
pub const ESC_END: u8 = 0xDC;
/// Follows `ESC` to stand for a literal `ESC`
pub const ESC_ESC: u8 = 0xDD;

/// Offset of the packet inside the working buffer.
pub const PACKET_OFFSET: usize = 1;

/// Length of a frame once `data` has been escaped and delimited.
pub fn encoded_len(data: &[u8]) -> usize {
    2 + data.len() + count_escapes(data)
}

fn count_escapes(data: &[u8]) -> usize {
    data.iter().filter(|&&b| b == END || b == ESC).count()
}

/// Encode the `len` byte packet stored at `buffer[1..1 + len]` in place.
///
/// Returns the total framed length, starting at `buffer[0]`.
pub fn encode(buffer: &mut [u8], len: usize) -> Result<usize, FujiError> {
    let packet_end = PACKET_OFFSET + len;
    if packet_end > buffer.len() {
        return Err(FujiError::BufferTooSmall {
            needed: packet_end,
            capacity: buffer.len(),
        });
    }

    let escapes = count_escapes(&buffer[PACKET_OFFSET..packet_end]);
    let framed = 2 + len + escapes;
    if framed > buffer.len() {
        return Err(FujiError::BufferTooSmall {
            needed: framed,
            capacity: buffer.len(),
        });
    }

    if escapes > 0 {
        let packet = &mut buffer[PACKET_OFFSET..];
        let mut src = len;
        let mut dst = len + escapes;
        let mut remaining = escapes;
        // Once every escape has been placed src == dst and the prefix is already in position.
        while remaining > 0 {
            src -= 1;
            match packet[src] {
                END => {
                    dst -= 2;
                    packet[dst] = ESC;
                    packet[dst + 1] = ESC_END;
                    remaining -= 1;
                }
                ESC => {
                    dst -= 2;
                    packet[dst] = ESC;
                    packet[dst + 1] = ESC_ESC;
                    remaining -= 1;
                }
                b => {
                    dst -= 1;
                    packet[dst] = b;
                }
            }
        }
    }

    buffer[0] = END;
    buffer[PACKET_OFFSET + len + escapes] = END;
    Ok(framed)
}

/// Decode a received frame in place, writing the unescaped bytes from `buffer[0]`.
///
/// Anything up to and including the first `END` is discarded. Decoding stops at
/// the next `END` or at the end of the slice. Returns the decoded length.
pub fn decode(buffer: &mut [u8]) -> usize {
    let len = buffer.len();
    let mut idx = match buffer.iter().position(|&b| b == END) {
        Some(pos) => pos + 1,
        None => return 0,
    };

    let mut dec = 0;
    while idx < len {
        let b = buffer[idx];
        if b == END {
            break;
        }

        if b == ESC {
            idx += 1;
            let Some(&marker) = buffer.get(idx) else {
                break;
            };
            buffer[dec] = match marker {
                ESC_END => END,
                ESC_ESC => ESC,
                other => other,
            };
        } else if idx != dec {
            buffer[dec] = b;
        }

        idx += 1;
        dec += 1;
    }

    dec
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(data: &[u8]) -> Vec<u8> {
        let mut buffer = vec![0u8; data.len() * 2 + 2];
        buffer[PACKET_OFFSET..PACKET_OFFSET + data.len()].copy_from_slice(data);
        let n = encode(&mut buffer, data.len()).unwrap();
        buffer.truncate(n);
        buffer
    }

    #[test]
    fn test_encode_without_escapes() {
        assert_eq!(frame(&[0x01, 0x02, 0x03]), vec![END, 0x01, 0x02, 0x03, END]);
    }

    #[test]
    fn test_encode_escapes() {
        assert_eq!(frame(&[END]), vec![END, ESC, ESC_END, END]);
        assert_eq!(frame(&[ESC]), vec![END, ESC, ESC_ESC, END]);
        assert_eq!(
            frame(&[0x11, END, 0x22, ESC, 0x33]),
            vec![END, 0x11, ESC, ESC_END, 0x22, ESC, ESC_ESC, 0x33, END]
        );
    }

    #[test]
    fn test_encode_all_escapes() {
        let data = [END, ESC, END, ESC];
        assert_eq!(
            frame(&data),
            vec![END, ESC, ESC_END, ESC, ESC_ESC, ESC, ESC_END, ESC, ESC_ESC, END]
        );
    }

    #[test]
    fn test_encode_empty() {
        assert_eq!(frame(&[]), vec![END, END]);
    }

    #[test]
    fn test_encode_buffer_too_small() {
        let mut buffer = [0u8, END, 0x01, 0x00];
        assert!(matches!(
            encode(&mut buffer, 2),
            Err(FujiError::BufferTooSmall { needed: 5, capacity: 4 })
        ));
    }

    #[test]
    fn test_decode_skips_leading_noise() {
        let mut rx = vec![0x55, 0xAA, END, 0x01, ESC, ESC_END, 0x02, END, 0x99];
        let n = decode(&mut rx);
        assert_eq!(&rx[..n], &[0x01, END, 0x02]);
    }

    #[test]
    fn test_decode_without_delimiter() {
        let mut rx = vec![0x01, 0x02, 0x03];
        assert_eq!(decode(&mut rx), 0);
    }

    #[test]
    fn test_decode_trailing_escape() {
        let mut rx = vec![END, 0x01, ESC];
        let n = decode(&mut rx);
        assert_eq!(&rx[..n], &[0x01]);
    }

    #[test]
    fn test_decode_unknown_escape_keeps_byte() {
        let mut rx = vec![END, ESC, 0x42, END];
        let n = decode(&mut rx);
        assert_eq!(&rx[..n], &[0x42]);
    }

    #[test]
    fn test_encoded_len() {
        assert_eq!(encoded_len(&[0x00, END, ESC]), 7);
    }
}
