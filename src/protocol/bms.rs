//! Battery monitor frame validation.
//!
//! The assembler only finds boundaries.  This is the first decoder step for
//! battery monitor frames: it checks the declared length against where the
//! frame actually ended, the status byte, and the trailing checksum, then
//! classifies the register.  Field semantics are left to the caller.
//!
//! ```text
//! ┌──────┬─────┬────────┬─────┬──────────────┬────────┬────────┐
//! │ 0xDD │ reg │ status │ len │ data (len B) │ sum hi │ sum lo │   (0x77 stripped)
//! └──────┴─────┴────────┴─────┴──────────────┴────────┴────────┘
//! ```

use super::checksum::bms_checksum;
use super::frame::{Frame, START_MARKER};
use crate::error::DecodeError;

const HEADER_LEN: usize = 4;
const CHECKSUM_LEN: usize = 2;

/// Consumes validated frames for one role. Implemented by telemetry decoders.
pub trait FrameDecoder {
    type Output;

    fn decode(&mut self, frame: &Frame) -> Result<Self::Output, DecodeError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BmsRegister {
    /// Pack voltage, current, capacity, temperatures.
    GeneralInfo,
    /// Per-cell voltages.
    CellInfo,
    Other(u8),
}

impl From<u8> for BmsRegister {
    fn from(b: u8) -> Self {
        match b {
            0x03 => Self::GeneralInfo,
            0x04 => Self::CellInfo,
            other => Self::Other(other),
        }
    }
}

/// A battery monitor response that passed length, status and checksum checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BmsFrame<'a> {
    pub register: BmsRegister,
    pub data: &'a [u8],
}

impl<'a> BmsFrame<'a> {
    pub fn parse(frame: &'a Frame) -> Result<Self, DecodeError> {
        Self::parse_bytes(frame.payload())
    }

    pub fn parse_bytes(bytes: &'a [u8]) -> Result<Self, DecodeError> {
        if bytes.len() < HEADER_LEN + CHECKSUM_LEN {
            return Err(DecodeError::TooShort { len: bytes.len() });
        }
        if bytes[0] != START_MARKER {
            return Err(DecodeError::BadStartMarker(bytes[0]));
        }

        let declared = bytes[3] as usize;
        let terminator_at = HEADER_LEN + declared + CHECKSUM_LEN;
        if bytes.len() > terminator_at {
            // Bytes ran on past the slot the length reserved for 0x77.
            return Err(DecodeError::TerminatorMismatch(bytes[terminator_at]));
        }
        if bytes.len() < terminator_at {
            return Err(DecodeError::LengthMismatch {
                declared,
                actual: bytes.len() - HEADER_LEN - CHECKSUM_LEN,
            });
        }

        let status = bytes[2];
        if status != 0 {
            return Err(DecodeError::Status(status));
        }

        let summed = &bytes[2..HEADER_LEN + declared];
        let expected = bms_checksum(summed);
        let tail = &bytes[HEADER_LEN + declared..];
        let actual = u16::from_be_bytes([tail[0], tail[1]]);
        if expected != actual {
            return Err(DecodeError::Checksum { expected, actual });
        }

        Ok(Self {
            register: BmsRegister::from(bytes[1]),
            data: &bytes[HEADER_LEN..HEADER_LEN + declared],
        })
    }
}

/// Frame-level decoder for the battery monitor role: validates and copies
/// out the register and data bytes.
#[derive(Debug, Default)]
pub struct BmsFrameDecoder {
    pub rejected: u32,
}

impl FrameDecoder for BmsFrameDecoder {
    type Output = (BmsRegister, Vec<u8>);

    fn decode(&mut self, frame: &Frame) -> Result<Self::Output, DecodeError> {
        match BmsFrame::parse(frame) {
            Ok(f) => Ok((f.register, f.data.to_vec())),
            Err(e) => {
                self.rejected = self.rejected.wrapping_add(1);
                log::warn!("{}: discarding frame: {}", frame.source(), e);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
pub(crate) fn build_response(register: u8, data: &[u8]) -> Vec<u8> {
    let mut v = vec![START_MARKER, register, 0x00, data.len() as u8];
    v.extend_from_slice(data);
    let sum = bms_checksum(&v[2..]);
    v.extend_from_slice(&sum.to_be_bytes());
    v
}
