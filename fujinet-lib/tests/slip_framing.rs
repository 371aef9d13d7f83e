//! Tests for in-place SLIP framing

mod common;

use common::*;
use fujinet_lib::packet::{BUFFER_SIZE, MAX_PACKET};

#[test]
fn test_roundtrip_all_lengths() {
    for len in [0, 1, 2, 6, 7, 31, 255, 256, 511, MAX_PACKET] {
        for seed in 0..4 {
            let data = noisy_bytes(len, seed);
            let mut buffer = vec![0u8; BUFFER_SIZE];
            buffer[1..1 + len].copy_from_slice(&data);

            let framed = slip::encode(&mut buffer, len).expect("fits in working buffer");
            let n = slip::decode(&mut buffer[..framed]);

            assert_eq!(n, len, "len {} seed {}", len, seed);
            assert_eq!(&buffer[..n], data.as_slice(), "len {} seed {}", len, seed);
        }
    }
}

#[test]
fn test_worst_case_fits_working_buffer() {
    let data = vec![slip::END; MAX_PACKET];
    let mut buffer = vec![0u8; BUFFER_SIZE];
    buffer[1..1 + MAX_PACKET].copy_from_slice(&data);
    let framed = slip::encode(&mut buffer, MAX_PACKET).unwrap();
    assert_eq!(framed, BUFFER_SIZE);
}

#[test]
fn test_delimiter_only_at_boundaries() {
    for seed in 0..8 {
        let data = noisy_bytes(200, seed);
        let wire = frame(&data);

        assert_eq!(wire[0], slip::END);
        assert_eq!(wire[wire.len() - 1], slip::END);
        let body = &wire[1..wire.len() - 1];
        assert!(!body.contains(&slip::END), "seed {}", seed);

        // Every ESC in the body introduces a valid two-byte sequence
        let mut i = 0;
        let mut escapes = 0;
        while i < body.len() {
            if body[i] == slip::ESC {
                assert!(matches!(body.get(i + 1), Some(&slip::ESC_END) | Some(&slip::ESC_ESC)));
                escapes += 1;
                i += 2;
            } else {
                i += 1;
            }
        }
        let reserved = data.iter().filter(|&&b| b == slip::END || b == slip::ESC).count();
        assert_eq!(escapes, reserved);
        assert_eq!(wire.len(), 2 + data.len() + reserved);
    }
}

#[test]
fn test_single_delimiter_in_ten_bytes() {
    let mut data: Vec<u8> = (0x10..0x1A).collect();
    data[3] = slip::END;
    let wire = frame(&data);

    // One inserted escape byte, then both delimiters
    assert_eq!(wire.len() - 2, 11);
    assert_eq!(&wire[1..4], &[0x10, 0x11, 0x12]);
    assert_eq!(&wire[4..6], &[slip::ESC, slip::ESC_END]);
    assert_eq!(&wire[6..11], &[0x14, 0x15, 0x16, 0x17, 0x18]);
}

#[test]
fn test_unescaped_packet_does_not_move() {
    let data = [0x70, 0x01, 0x06, 0x00, 0x77, 0x00];
    let mut buffer = vec![0xAAu8; 16];
    buffer[1..7].copy_from_slice(&data);
    let framed = slip::encode(&mut buffer, data.len()).unwrap();
    assert_eq!(framed, 8);
    assert_eq!(&buffer[1..7], &data);
    assert_eq!(buffer[8], 0xAA, "bytes past the frame are untouched");
}

#[test]
fn test_decode_discards_stale_delimiter() {
    // A trailing END left over from a previous frame counts as the opening one
    let mut rx = vec![slip::END, 0x01, 0x02, slip::END];
    let n = slip::decode(&mut rx);
    assert_eq!(&rx[..n], &[0x01, 0x02]);
}
