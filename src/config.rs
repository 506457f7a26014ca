//! Link configuration
//!
//! Peripheral identity (address, display name, pairing PIN) per role,
//! the reconnect policy, and the inbound frame layout. Values arrive from
//! the application's preference store and can change at runtime.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::protocol::frame::FrameFormat;

/// Settings screens store this when "None" is selected.
const NO_DEVICE_ADDRESS: &str = "0";

const MAX_PIN_LEN: usize = 16;

pub const DEFAULT_WRITE_TIMEOUT_MS: u32 = 2_000;

// ---------------------------------------------------------------------------
// Role
// ---------------------------------------------------------------------------

/// Which logical peripheral a connection talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Role {
    BatteryMonitor = 0,
    MotorController = 1,
}

impl Role {
    pub const COUNT: usize = 2;
    pub const ALL: [Role; Role::COUNT] = [Role::BatteryMonitor, Role::MotorController];

    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::BatteryMonitor => "battery",
            Self::MotorController => "motor",
        }
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Peripheral identity
// ---------------------------------------------------------------------------

/// Identity of one configured peripheral.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeripheralConfig {
    /// MAC address, `AA:BB:CC:DD:EE:FF`. Compared case-insensitively.
    pub address: String,
    /// Display name shown by the status indicator.
    pub name: String,
    /// Pairing PIN; `None` skips bonding.
    #[serde(default)]
    pub pin: Option<String>,
}

impl PeripheralConfig {
    pub fn new(address: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: name.into(),
            pin: None,
        }
    }

    /// Attach a pairing PIN. An empty string means "no PIN".
    #[must_use]
    pub fn with_pin(mut self, pin: impl Into<String>) -> Self {
        let pin = pin.into();
        self.pin = if pin.is_empty() { None } else { Some(pin) };
        self
    }

    /// A config with no device selected does not drive a connection.
    pub fn is_active(&self) -> bool {
        let addr = self.address.trim();
        !addr.is_empty() && addr != NO_DEVICE_ADDRESS
    }

    /// Case-insensitive address match against a discovered peripheral.
    pub fn matches(&self, address: &str) -> bool {
        self.is_active() && self.address.trim().eq_ignore_ascii_case(address.trim())
    }

    pub fn pin(&self) -> Option<&str> {
        self.pin.as_deref().filter(|p| !p.is_empty())
    }

    /// Reject malformed addresses and PINs. Inactive configs are valid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.is_active() && !is_mac_address(self.address.trim()) {
            return Err(ConfigError::InvalidAddress);
        }
        if let Some(pin) = self.pin() {
            if pin.len() > MAX_PIN_LEN || !pin.bytes().all(|b| b.is_ascii_digit()) {
                return Err(ConfigError::InvalidPin);
            }
        }
        Ok(())
    }
}

fn is_mac_address(s: &str) -> bool {
    let mut octets = 0;
    for part in s.split(':') {
        if part.len() != 2 || !part.bytes().all(|b| b.is_ascii_hexdigit()) {
            return false;
        }
        octets += 1;
    }
    octets == 6
}

// ---------------------------------------------------------------------------
// Reconnect policy
// ---------------------------------------------------------------------------

/// Bounded exponential backoff for automatic reconnects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconnectPolicy {
    /// Delay before the first retry (milliseconds).
    pub initial_delay_ms: u32,
    /// Ceiling for the retry delay (milliseconds).
    pub max_delay_ms: u32,
    /// Growth factor applied after each consecutive failure.
    pub multiplier: u32,
    /// Give up after this many consecutive failures. `None` retries forever.
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay_ms: 250,
            max_delay_ms: 30_000,
            multiplier: 2,
            max_attempts: None,
        }
    }
}

impl ReconnectPolicy {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.initial_delay_ms == 0 {
            return Err(ConfigError::ValidationFailed(
                "initial_delay_ms must be non-zero",
            ));
        }
        if self.max_delay_ms < self.initial_delay_ms {
            return Err(ConfigError::ValidationFailed(
                "max_delay_ms must be >= initial_delay_ms",
            ));
        }
        if self.multiplier == 0 {
            return Err(ConfigError::ValidationFailed("multiplier must be >= 1"));
        }
        if self.max_attempts == Some(0) {
            return Err(ConfigError::ValidationFailed(
                "max_attempts must be >= 1 when set",
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Engine configuration
// ---------------------------------------------------------------------------

/// Everything the supervisor needs besides peripheral identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkConfig {
    pub battery_frame: FrameFormat,
    pub motor_frame: FrameFormat,
    pub reconnect: ReconnectPolicy,
    /// A write with no completion after this long fails the link.
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u32,
}

fn default_write_timeout_ms() -> u32 {
    DEFAULT_WRITE_TIMEOUT_MS
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            battery_frame: FrameFormat::battery_monitor(),
            motor_frame: FrameFormat::default(),
            reconnect: ReconnectPolicy::default(),
            write_timeout_ms: DEFAULT_WRITE_TIMEOUT_MS,
        }
    }
}

impl LinkConfig {
    pub fn frame_format(&self, role: Role) -> FrameFormat {
        match role {
            Role::BatteryMonitor => self.battery_frame,
            Role::MotorController => self.motor_frame,
        }
    }

    pub fn write_timeout(&self) -> core::time::Duration {
        core::time::Duration::from_millis(u64::from(self.write_timeout_ms))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.battery_frame.validate()?;
        self.motor_frame.validate()?;
        if self.write_timeout_ms == 0 {
            return Err(ConfigError::ValidationFailed(
                "write_timeout_ms must be non-zero",
            ));
        }
        self.reconnect.validate()
    }
}
