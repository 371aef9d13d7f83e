/// 8-bit additive checksum with end-around carry.
///
/// The carry out of the low byte is folded back in after every addition, so
/// the result depends on byte order once carries start occurring.
pub fn checksum(data: &[u8]) -> u8 {
    let total = data.iter().fold(0u16, |acc, &b| {
        let sum = acc + u16::from(b);
        (sum >> 8) + (sum & 0xFF)
    });
    total as u8
}
