//! Integrity codes carried by every report.
//!
//! The frame CRC is CRC-16/CCITT-FALSE. Polynomial: 0x1021, Initial: 0xFFFF,
//! No reflection, No final XOR.

/// Calculate CRC-16/CCITT-FALSE checksum
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for byte in data {
        crc ^= (*byte as u16) << 8;
        for _ in 0..8 {
            if (crc & 0x8000) != 0 {
                crc = (crc << 1) ^ 0x1021;
            } else {
                crc <<= 1;
            }
        }
    }
    crc
}

/// CRC over `length` bytes of `data` starting at `offset`.
///
/// Returns 0 when the range does not fit inside `data`. Callers treat 0 as
/// "no crc computed".
pub fn crc16_range(data: &[u8], offset: usize, length: usize) -> u16 {
    offset
        .checked_add(length)
        .and_then(|end| data.get(offset..end))
        .map_or(0, crc16)
}

/// Additive body checksum: inverted byte sum, reduced mod 255.
///
/// The result never reaches 255. The firmware verifies this exact value, odd
/// reduction included.
pub fn checksum(data: &[u8]) -> u8 {
    let sum = data.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
    (sum ^ 0xFF) % 255
}
