//! Unified error types for the protocol engine.
//!
//! A single [`Error`] enum that every subsystem converts into, so callers
//! that do not care about the category can use one `?` path.  All variants
//! are `Copy`; they carry no heap data and are cheap to log or hand back
//! across the supervisor boundary.

use core::fmt;

use crate::link::state::ConnectionState;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Link-level failure. Feeds the reconnect loop, never fatal.
    Transport(TransportError),
    /// A command could not be serialised.
    Encoding(EncodingError),
    /// A write was attempted while the link was not `Ready`.
    NotConnected(NotConnectedError),
    /// A frame or packet failed validation.
    Decode(DecodeError),
    /// The outbound write queue is full.
    QueueFull,
    /// Configuration is invalid.
    Config(ConfigError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "transport: {e}"),
            Self::Encoding(e) => write!(f, "encoding: {e}"),
            Self::NotConnected(e) => write!(f, "{e}"),
            Self::Decode(e) => write!(f, "decode: {e}"),
            Self::QueueFull => write!(f, "outbound write queue full"),
            Self::Config(e) => write!(f, "config: {e}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Transport errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    ConnectFailed,
    BondFailed,
    DiscoveryFailed,
    /// The UART service is not present on the peripheral.
    ServiceMissing,
    /// The service exists but lacks the RX or TX characteristic.
    CharacteristicMissing,
    NotificationSetupFailed,
    /// A write failed or was not acknowledged in time.
    WriteFailed,
    Disconnected,
    /// Events for the link were dropped before the engine saw them.
    EventsLost,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectFailed => write!(f, "GATT connect failed"),
            Self::BondFailed => write!(f, "bonding failed"),
            Self::DiscoveryFailed => write!(f, "service discovery failed"),
            Self::ServiceMissing => write!(f, "UART service not found"),
            Self::CharacteristicMissing => write!(f, "UART characteristic not found"),
            Self::NotificationSetupFailed => write!(f, "enabling notifications failed"),
            Self::WriteFailed => write!(f, "characteristic write failed"),
            Self::Disconnected => write!(f, "link disconnected"),
            Self::EventsLost => write!(f, "transport events lost"),
        }
    }
}

impl std::error::Error for TransportError {}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

// ---------------------------------------------------------------------------
// Encoding errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodingError {
    /// `opcode + body` does not fit the single length byte.
    BodyTooLarge { len: usize, max: usize },
}

impl fmt::Display for EncodingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BodyTooLarge { len, max } => {
                write!(f, "command body of {len} bytes exceeds maximum of {max}")
            }
        }
    }
}

impl std::error::Error for EncodingError {}

impl From<EncodingError> for Error {
    fn from(e: EncodingError) -> Self {
        Self::Encoding(e)
    }
}

// ---------------------------------------------------------------------------
// Not connected
// ---------------------------------------------------------------------------

/// A write was attempted outside `Ready`. Carries the state the link was in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotConnectedError {
    pub state: ConnectionState,
}

impl fmt::Display for NotConnectedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "not connected (link is {})", self.state.name())
    }
}

impl std::error::Error for NotConnectedError {}

impl From<NotConnectedError> for Error {
    fn from(e: NotConnectedError) -> Self {
        Self::NotConnected(e)
    }
}

// ---------------------------------------------------------------------------
// Overflow
// ---------------------------------------------------------------------------

/// An in-progress frame ran past the reassembly buffer.
///
/// Recovered locally by resync; only ever logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverflowError {
    pub capacity: usize,
}

impl fmt::Display for OverflowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "frame exceeded {} byte reassembly buffer, resyncing",
            self.capacity
        )
    }
}

// ---------------------------------------------------------------------------
// Decode errors
// ---------------------------------------------------------------------------

/// Frame- or packet-level validation failures. The offending frame is
/// discarded; the next one is unaffected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    TooShort { len: usize },
    BadStartMarker(u8),
    /// Declared length disagrees with where the frame actually ended.
    LengthMismatch { declared: usize, actual: usize },
    /// The byte in the terminator slot is not the terminator.
    TerminatorMismatch(u8),
    Checksum { expected: u16, actual: u16 },
    /// Peripheral reported a non-zero status byte.
    Status(u8),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooShort { len } => write!(f, "frame too short ({len} bytes)"),
            Self::BadStartMarker(b) => write!(f, "bad start marker 0x{b:02x}"),
            Self::LengthMismatch { declared, actual } => {
                write!(f, "declared length {declared} but got {actual}")
            }
            Self::TerminatorMismatch(b) => write!(f, "terminator mismatch (0x{b:02x})"),
            Self::Checksum { expected, actual } => {
                write!(f, "checksum mismatch: expected 0x{expected:04x}, got 0x{actual:04x}")
            }
            Self::Status(s) => write!(f, "peripheral status 0x{s:02x}"),
        }
    }
}

impl std::error::Error for DecodeError {}

impl From<DecodeError> for Error {
    fn from(e: DecodeError) -> Self {
        Self::Decode(e)
    }
}

// ---------------------------------------------------------------------------
// Send errors
// ---------------------------------------------------------------------------

/// Result of [`send_command`](crate::link::supervisor::ConnectionSupervisor::send_command).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendError {
    NotConnected(NotConnectedError),
    Encoding(EncodingError),
    /// A write is in flight and the outbox is full.
    QueueFull,
}

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConnected(e) => write!(f, "{e}"),
            Self::Encoding(e) => write!(f, "{e}"),
            Self::QueueFull => write!(f, "outbound write queue full"),
        }
    }
}

impl std::error::Error for SendError {}

impl From<NotConnectedError> for SendError {
    fn from(e: NotConnectedError) -> Self {
        Self::NotConnected(e)
    }
}

impl From<EncodingError> for SendError {
    fn from(e: EncodingError) -> Self {
        Self::Encoding(e)
    }
}

impl From<SendError> for Error {
    fn from(e: SendError) -> Self {
        match e {
            SendError::NotConnected(e) => Self::NotConnected(e),
            SendError::Encoding(e) => Self::Encoding(e),
            SendError::QueueFull => Self::QueueFull,
        }
    }
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Rejected configuration. The `&'static str` names the field and why.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    InvalidAddress,
    InvalidPin,
    ValidationFailed(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidAddress => write!(f, "address must be six colon-separated hex octets"),
            Self::InvalidPin => write!(f, "PIN must be 1-16 ASCII digits"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

pub type Result<T> = core::result::Result<T, Error>;
