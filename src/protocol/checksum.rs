//! Checksum functions for both wire formats.
//!
//! The outbound command format embeds CRC-16/XMODEM over the
//! `opcode + body` bytes.  Battery monitor responses use a 16-bit
//! two's-complement sum instead.  Both are plain `fn(&[u8]) -> u16`
//! so the encoder can take either (or a test double) as a parameter.

/// Pluggable checksum used by [`CommandEncoder`](super::encoder::CommandEncoder).
pub type ChecksumFn = fn(&[u8]) -> u16;

const CRC16_POLY: u16 = 0x1021;

/// CRC-16/XMODEM: poly 0x1021, init 0x0000, no reflection, no final XOR.
pub fn crc16_xmodem(bytes: &[u8]) -> u16 {
    let mut crc: u16 = 0;
    for &b in bytes {
        crc ^= (b as u16) << 8;
        for _ in 0..8 {
            if crc & 0x8000 != 0 {
                crc = (crc << 1) ^ CRC16_POLY;
            } else {
                crc <<= 1;
            }
        }
    }
    crc
}

/// Battery monitor checksum: `0x10000 - Σ bytes`, truncated to 16 bits.
pub fn bms_checksum(bytes: &[u8]) -> u16 {
    let sum = bytes.iter().fold(0u16, |acc, &b| acc.wrapping_add(b as u16));
    0u16.wrapping_sub(sum)
}
