//! Connection lifecycle states.
//!
//! ```text
//!            start()            address match        pin?
//!  ┌──────┐ ───────▶ ┌──────────┐ ──────────▶ ┌────────────┐ ──▶ ┌─────────┐
//!  │ Idle │          │ Scanning │             │ Connecting │     │ Bonding │
//!  └──────┘ ◀─────── └──────────┘             └─────┬──────┘     └────┬────┘
//!     ▲      stop()                                 │ connected       │
//!     │                                             ▼                 │
//!     │                                  ┌─────────────────────┐◀─────┘
//!     │                                  │ DiscoveringServices │
//!     │                                  └──────────┬──────────┘
//!     │                               UART found    │   missing
//!     │                                  ┌──────────┴──────────┐
//!     │                                  ▼                     ▼
//!     │                              ┌───────┐            ┌────────┐
//!     │                              │ Ready │            │ Failed │
//!     │                              └───┬───┘            └───┬────┘
//!     │                     disconnect   ▼                    │ backoff
//!     │                          ┌──────────────┐             │
//!     └──────────────────────────│ Disconnected │─────────────┴──▶ Connecting
//!                                └──────────────┘
//! ```

/// Lifecycle state of one peripheral link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ConnectionState {
    Idle = 0,
    Scanning = 1,
    Connecting = 2,
    Bonding = 3,
    DiscoveringServices = 4,
    Ready = 5,
    Disconnected = 6,
    Failed = 7,
}

impl ConnectionState {
    pub const COUNT: usize = 8;

    /// Convert an index back to a state. Out-of-range maps to `Failed`.
    pub fn from_index(idx: usize) -> Self {
        match idx {
            0 => Self::Idle,
            1 => Self::Scanning,
            2 => Self::Connecting,
            3 => Self::Bonding,
            4 => Self::DiscoveringServices,
            5 => Self::Ready,
            6 => Self::Disconnected,
            _ => {
                debug_assert!(idx == 7, "invalid state index: {idx}");
                Self::Failed
            }
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Scanning => "Scanning",
            Self::Connecting => "Connecting",
            Self::Bonding => "Bonding",
            Self::DiscoveringServices => "DiscoveringServices",
            Self::Ready => "Ready",
            Self::Disconnected => "Disconnected",
            Self::Failed => "Failed",
        }
    }

    pub const fn is_ready(self) -> bool {
        matches!(self, Self::Ready)
    }

    /// A link attempt is underway: transport events are expected.
    pub const fn is_attempting(self) -> bool {
        matches!(
            self,
            Self::Connecting | Self::Bonding | Self::DiscoveringServices
        )
    }

    /// States from which the reconnect loop schedules another attempt.
    pub const fn awaits_retry(self) -> bool {
        matches!(self, Self::Disconnected | Self::Failed)
    }
}

impl core::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}
