//! Transport completion events.
//!
//! Every asynchronous transport operation reports back through a
//! [`TransportEvent`] tagged with the [`AttemptId`] it was issued under.
//! A connection drops any event whose id is not its current one, so a
//! late callback from a superseded attempt can never move the state
//! machine.

use heapless::Vec;
use log::warn;

/// Largest notification the transport may deliver (ATT MTU 517 - 3 - 2).
pub const MAX_NOTIFICATION_LEN: usize = 512;

pub type NotificationBytes = Vec<u8, MAX_NOTIFICATION_LEN>;

/// Identity of one connection attempt. Monotonic per connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct AttemptId(pub u32);

impl AttemptId {
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl core::fmt::Display for AttemptId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEventKind {
    Connected,
    ConnectFailed,
    Bonded,
    BondFailed,
    ServicesDiscovered,
    DiscoveryFailed,
    /// Bytes from the RX characteristic, exactly as delivered.
    Notification(NotificationBytes),
    WriteComplete,
    WriteFailed,
    Disconnected,
}

impl TransportEventKind {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::ConnectFailed => "connect-failed",
            Self::Bonded => "bonded",
            Self::BondFailed => "bond-failed",
            Self::ServicesDiscovered => "services-discovered",
            Self::DiscoveryFailed => "discovery-failed",
            Self::Notification(_) => "notification",
            Self::WriteComplete => "write-complete",
            Self::WriteFailed => "write-failed",
            Self::Disconnected => "disconnected",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportEvent {
    pub attempt: AttemptId,
    pub kind: TransportEventKind,
}

impl TransportEvent {
    pub fn new(attempt: AttemptId, kind: TransportEventKind) -> Self {
        Self { attempt, kind }
    }

    /// Notification event. Bytes beyond [`MAX_NOTIFICATION_LEN`] are cut off.
    pub fn notification(attempt: AttemptId, bytes: &[u8]) -> Self {
        let take = bytes.len().min(MAX_NOTIFICATION_LEN);
        if take < bytes.len() {
            warn!(
                "notification of {} bytes on attempt {} truncated to {}",
                bytes.len(),
                attempt,
                MAX_NOTIFICATION_LEN
            );
        }
        let mut buf = NotificationBytes::new();
        // take <= capacity
        let _ = buf.extend_from_slice(&bytes[..take]);
        Self::new(attempt, TransportEventKind::Notification(buf))
    }
}
