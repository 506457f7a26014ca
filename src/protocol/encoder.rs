//! Outbound packet encoder.
//!
//! Wire format:
//! ```text
//! ┌──────┬─────┬─────────────────────┬────────┬────────┬──────┐
//! │ 0x02 │ len │ opcode + body (len) │ crc hi │ crc lo │ 0x03 │
//! └──────┴─────┴─────────────────────┴────────┴────────┴──────┘
//! ```
//!
//! The checksum covers exactly the `opcode + body` bytes.  Encoding is
//! pure: either the whole packet is produced or an error is returned.

use super::checksum::{ChecksumFn, crc16_xmodem};
use super::command::Command;
use crate::error::{DecodeError, EncodingError};

pub const PACKET_START: u8 = 0x02;
pub const PACKET_END: u8 = 0x03;

/// `opcode + body` must fit the single length byte.
pub const MAX_PAYLOAD_LEN: usize = u8::MAX as usize;
pub const MAX_BODY_LEN: usize = MAX_PAYLOAD_LEN - 1;

/// start + len + payload + crc(2) + end
const OVERHEAD: usize = 5;
pub const MAX_PACKET_LEN: usize = MAX_PAYLOAD_LEN + OVERHEAD;

/// Encoded, ready-to-write packet.
pub type Packet = heapless::Vec<u8, MAX_PACKET_LEN>;

/// A packet parsed back into its parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedPacket<'a> {
    pub opcode: u8,
    pub body: &'a [u8],
    pub checksum: u16,
}

#[derive(Clone, Copy)]
pub struct CommandEncoder {
    checksum: ChecksumFn,
}

impl core::fmt::Debug for CommandEncoder {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CommandEncoder").finish_non_exhaustive()
    }
}

impl Default for CommandEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandEncoder {
    /// Encoder using CRC-16/XMODEM.
    pub const fn new() -> Self {
        Self {
            checksum: crc16_xmodem,
        }
    }

    pub const fn with_checksum(checksum: ChecksumFn) -> Self {
        Self { checksum }
    }

    pub fn encode(&self, command: &(impl Command + ?Sized)) -> Result<Packet, EncodingError> {
        self.encode_parts(command.opcode(), &command.body())
    }

    pub fn encode_parts(&self, opcode: u8, body: &[u8]) -> Result<Packet, EncodingError> {
        if body.len() > MAX_BODY_LEN {
            return Err(EncodingError::BodyTooLarge {
                len: body.len(),
                max: MAX_BODY_LEN,
            });
        }

        let mut packet = Packet::new();
        // Capacity is MAX_PACKET_LEN and body length was checked above,
        // so none of the pushes below can fail.
        let _ = packet.push(PACKET_START);
        let _ = packet.push((body.len() + 1) as u8);
        let _ = packet.push(opcode);
        let _ = packet.extend_from_slice(body);

        let crc = (self.checksum)(&packet[2..]);
        let _ = packet.extend_from_slice(&crc.to_be_bytes());
        let _ = packet.push(PACKET_END);
        Ok(packet)
    }

    /// Inverse of [`encode`](Self::encode): validates framing and checksum.
    pub fn decode<'a>(&self, bytes: &'a [u8]) -> Result<ParsedPacket<'a>, DecodeError> {
        if bytes.len() < OVERHEAD + 1 {
            return Err(DecodeError::TooShort { len: bytes.len() });
        }
        if bytes[0] != PACKET_START {
            return Err(DecodeError::BadStartMarker(bytes[0]));
        }

        let declared = bytes[1] as usize;
        let actual = bytes.len() - OVERHEAD;
        if declared != actual {
            return Err(DecodeError::LengthMismatch { declared, actual });
        }

        let end = bytes[bytes.len() - 1];
        if end != PACKET_END {
            return Err(DecodeError::TerminatorMismatch(end));
        }

        let payload = &bytes[2..2 + declared];
        let actual = u16::from_be_bytes([bytes[2 + declared], bytes[3 + declared]]);
        let expected = (self.checksum)(payload);
        if expected != actual {
            return Err(DecodeError::Checksum { expected, actual });
        }

        Ok(ParsedPacket {
            opcode: payload[0],
            body: &payload[1..],
            checksum: actual,
        })
    }
}
