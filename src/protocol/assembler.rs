//! Streaming frame assembler.
//!
//! BLE notifications arrive in MTU-sized chunks with no alignment to frame
//! boundaries: one delivery may carry half a header, the tail of one frame
//! and the start of the next, or a single byte.  The assembler runs a
//! per-byte state machine over each chunk, so its output depends only on
//! the byte sequence, never on where the chunks were cut.
//!
//! ```text
//!            ┌───────── noise ─────────┐
//!            ▼                         │
//!       ┌─────────┐  start marker  ┌───┴─────┐  len slot   ┌──────────┐
//!  ──▶  │ Idle    │──────────────▶ │ Header  │───────────▶ │ Payload  │
//!       └─────────┘                └─────────┘             └────┬─────┘
//!            ▲      terminator && remaining == 0 → emit         │
//!            └──────────────────────────────────────────────────┘
//!            ▲      position == capacity → overflow, drop byte
//!            └──────────────────────────────────────────────────┘
//! ```
//!
//! One assembler per connection; never shared.

use log::{debug, warn};

use super::frame::{Frame, FrameBytes, FrameFormat, MAX_FRAME_CAPACITY, MarkerPolicy};
use crate::config::Role;
use crate::error::OverflowError;

// ── Reassembly state ─────────────────────────────────────────

/// Read-only snapshot of the reassembly bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReassemblyState {
    /// Next write offset into the buffer.
    pub position: usize,
    /// Bytes still expected before the terminator check applies.
    pub remaining: usize,
    /// A start marker has been seen and not yet closed.
    pub in_frame: bool,
}

impl ReassemblyState {
    pub const EMPTY: Self = Self {
        position: 0,
        remaining: 0,
        in_frame: false,
    };
}

/// Running counters, useful for link-quality diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssemblerStats {
    pub frames: u32,
    pub overflows: u32,
    /// Bytes discarded while hunting for a start marker.
    pub noise_bytes: u32,
    /// Frames abandoned because a newer start marker arrived.
    pub restarts: u32,
}

// ── Assembler ────────────────────────────────────────────────

pub struct FrameAssembler {
    role: Role,
    format: FrameFormat,
    capacity: usize,
    buffer: FrameBytes,
    remaining: usize,
    in_frame: bool,
    stats: AssemblerStats,
}

impl FrameAssembler {
    pub fn new(role: Role, format: FrameFormat) -> Self {
        debug_assert!(format.validate().is_ok(), "invalid frame format");
        let capacity = format.capacity.clamp(1, MAX_FRAME_CAPACITY);
        Self {
            role,
            format,
            capacity,
            buffer: FrameBytes::new(),
            remaining: 0,
            in_frame: false,
            stats: AssemblerStats::default(),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn format(&self) -> &FrameFormat {
        &self.format
    }

    pub fn state(&self) -> ReassemblyState {
        ReassemblyState {
            position: self.buffer.len(),
            remaining: self.remaining,
            in_frame: self.in_frame,
        }
    }

    pub fn stats(&self) -> AssemblerStats {
        self.stats
    }

    /// Drop any partial frame (e.g. after a disconnect).
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.remaining = 0;
        self.in_frame = false;
    }

    /// Feed one notification's worth of bytes.
    ///
    /// `sink` is called once for every frame completed inside `chunk`,
    /// in stream order.
    pub fn on_bytes<F>(&mut self, chunk: &[u8], mut sink: F)
    where
        F: FnMut(Frame),
    {
        for &byte in chunk {
            if let Some(frame) = self.push(byte) {
                sink(frame);
            }
        }
    }

    /// Like [`on_bytes`](Self::on_bytes) but collects the frames.
    pub fn collect(&mut self, chunk: &[u8]) -> Vec<Frame> {
        let mut frames = Vec::new();
        self.on_bytes(chunk, |f| frames.push(f));
        frames
    }

    // ── Per-byte state machine ───────────────────────────────

    fn push(&mut self, byte: u8) -> Option<Frame> {
        if self.buffer.len() >= self.capacity {
            warn!(
                "{}: {}",
                self.role,
                OverflowError {
                    capacity: self.capacity
                }
            );
            self.stats.overflows = self.stats.overflows.wrapping_add(1);
            self.reset();
            return None;
        }

        if !self.in_frame {
            if byte == self.format.start_marker {
                self.open();
            } else {
                self.stats.noise_bytes = self.stats.noise_bytes.wrapping_add(1);
            }
            return None;
        }

        let position = self.buffer.len();

        if byte == self.format.start_marker && self.restarts_at(position) {
            debug!("{}: start marker at offset {}, restarting frame", self.role, position);
            self.stats.restarts = self.stats.restarts.wrapping_add(1);
            self.open();
            return None;
        }

        if position == self.format.length_offset {
            self.remaining = byte as usize + self.format.trailer_len as usize;
            self.store(byte);
            return None;
        }

        let header_read = position > self.format.length_offset;
        if byte == self.format.terminator && header_read && self.remaining == 0 {
            return self.close();
        }

        self.store(byte);
        if header_read {
            self.remaining = self.remaining.saturating_sub(1);
        }
        None
    }

    fn restarts_at(&self, position: usize) -> bool {
        match self.format.marker_policy {
            MarkerPolicy::RestartInHeader => position < self.format.length_offset,
            MarkerPolicy::AlwaysRestart => true,
            MarkerPolicy::Ignore => false,
        }
    }

    fn open(&mut self) {
        self.reset();
        self.in_frame = true;
        self.store(self.format.start_marker);
    }

    fn store(&mut self, byte: u8) {
        // capacity <= MAX_FRAME_CAPACITY and push() checks len < capacity first
        let _ = self.buffer.push(byte);
    }

    fn close(&mut self) -> Option<Frame> {
        let payload = core::mem::take(&mut self.buffer);
        self.reset();
        if payload.is_empty() {
            return None;
        }
        self.stats.frames = self.stats.frames.wrapping_add(1);
        debug!("{}: frame complete ({} bytes)", self.role, payload.len());
        Some(Frame::new(self.role, payload))
    }
}

// ── Tests ────────────────────────────────────────────────────
