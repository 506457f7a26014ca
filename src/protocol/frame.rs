//! Inbound frame layout and the reassembled [`Frame`] value.
//!
//! Notification wire format (battery monitor / motor controller UART bridge):
//! ```text
//! ┌──────┬─────┬────────┬─────┬──────────────┬─────────────┬──────┐
//! │ 0xDD │ cmd │ status │ len │ data (len B) │ trailer (tB)│ 0x77 │
//! └──────┴─────┴────────┴─────┴──────────────┴─────────────┴──────┘
//!   slot 0                slot 3
//! ```
//!
//! The length byte is authoritative; the terminator only confirms the
//! boundary once `len + trailer` bytes have been consumed.

use serde::{Deserialize, Serialize};

use crate::config::Role;
use crate::error::ConfigError;

/// Hard upper bound on the reassembly buffer, sized at compile time.
pub const MAX_FRAME_CAPACITY: usize = 256;

pub const START_MARKER: u8 = 0xDD;
pub const TERMINATOR: u8 = 0x77;
pub const LENGTH_OFFSET: usize = 3;
pub const DEFAULT_CAPACITY: usize = 80;

/// Battery monitor responses carry a 16-bit checksum between data and terminator.
pub const BMS_TRAILER_LEN: u8 = 2;

// ── Start-marker policy ──────────────────────────────────────

/// What to do with a start marker seen while a frame is already open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerPolicy {
    /// Restart at the newest marker while the header is still incomplete
    /// (before the length slot). Afterwards the marker value is payload.
    #[default]
    RestartInHeader,
    /// Restart at every marker, even mid-payload.
    AlwaysRestart,
    /// Never restart; a marker inside a frame is ordinary data.
    Ignore,
}

// ── Frame format ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameFormat {
    pub start_marker: u8,
    pub terminator: u8,
    /// Byte offset of the declared-length field, counted from the marker.
    pub length_offset: usize,
    /// Bytes that follow the declared payload before the terminator.
    pub trailer_len: u8,
    /// Reassembly buffer size; a frame reaching it is dropped.
    pub capacity: usize,
    #[serde(default)]
    pub marker_policy: MarkerPolicy,
}

impl Default for FrameFormat {
    fn default() -> Self {
        Self {
            start_marker: START_MARKER,
            terminator: TERMINATOR,
            length_offset: LENGTH_OFFSET,
            trailer_len: 0,
            capacity: DEFAULT_CAPACITY,
            marker_policy: MarkerPolicy::RestartInHeader,
        }
    }
}

impl FrameFormat {
    /// Layout used by the battery monitor: checksum bytes precede the terminator.
    pub fn battery_monitor() -> Self {
        Self {
            trailer_len: BMS_TRAILER_LEN,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    #[must_use]
    pub fn with_marker_policy(mut self, policy: MarkerPolicy) -> Self {
        self.marker_policy = policy;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 || self.capacity > MAX_FRAME_CAPACITY {
            return Err(ConfigError::ValidationFailed(
                "frame capacity must be within 1..=256",
            ));
        }
        if self.length_offset == 0 || self.length_offset >= self.capacity {
            return Err(ConfigError::ValidationFailed(
                "length_offset must fall inside the frame after the marker",
            ));
        }
        if self.start_marker == self.terminator {
            return Err(ConfigError::ValidationFailed(
                "start marker and terminator must differ",
            ));
        }
        Ok(())
    }
}

// ── Frame ────────────────────────────────────────────────────

/// Frame payload storage; never exceeds [`MAX_FRAME_CAPACITY`].
pub type FrameBytes = heapless::Vec<u8, MAX_FRAME_CAPACITY>;

/// A fully reassembled inbound message: bytes from the start marker up to,
/// but not including, the terminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    source: Role,
    payload: FrameBytes,
}

impl Frame {
    /// Only the assembler builds frames; tests construct them directly.
    pub(crate) fn new(source: Role, payload: FrameBytes) -> Self {
        Self { source, payload }
    }

    pub fn source(&self) -> Role {
        self.source
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Register / command byte (slot 1), if present.
    pub fn command(&self) -> Option<u8> {
        self.payload.get(1).copied()
    }
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        &self.payload
    }
}
