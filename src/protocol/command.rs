//! Outbound commands.
//!
//! Anything with an opcode and a body is a [`Command`]; the encoder never
//! looks past that, so new requests are added here without touching the
//! framing code.

use std::borrow::Cow;

/// Motor controller packet ids used by this crate.
pub mod opcode {
    pub const READ_VALUES: u8 = 0x04;
    pub const READ_MOTOR_CONFIG: u8 = 0x0E;
    pub const SET_MOTOR_CONFIG_TEMP_SETUP: u8 = 0x31;
}

/// An outbound request.
pub trait Command {
    fn opcode(&self) -> u8;

    /// Parameter bytes following the opcode. May be empty.
    fn body(&self) -> Cow<'_, [u8]>;

    /// Short label for logs.
    fn name(&self) -> &'static str {
        "command"
    }
}

// ── Raw command ──────────────────────────────────────────────

/// A command built from literal bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCommand {
    pub opcode: u8,
    pub body: Vec<u8>,
}

impl RawCommand {
    pub fn new(opcode: u8, body: impl Into<Vec<u8>>) -> Self {
        Self {
            opcode,
            body: body.into(),
        }
    }
}

impl Command for RawCommand {
    fn opcode(&self) -> u8 {
        self.opcode
    }

    fn body(&self) -> Cow<'_, [u8]> {
        Cow::Borrowed(&self.body)
    }

    fn name(&self) -> &'static str {
        "raw"
    }
}

// ── Fixed requests ───────────────────────────────────────────

/// Request the motor controller's full configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadMotorConfig;

impl Command for ReadMotorConfig {
    fn opcode(&self) -> u8 {
        opcode::READ_MOTOR_CONFIG
    }

    fn body(&self) -> Cow<'_, [u8]> {
        Cow::Borrowed(&[])
    }

    fn name(&self) -> &'static str {
        "read-motor-config"
    }
}

/// Request live telemetry values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadValues;

impl Command for ReadValues {
    fn opcode(&self) -> u8 {
        opcode::READ_VALUES
    }

    fn body(&self) -> Cow<'_, [u8]> {
        Cow::Borrowed(&[])
    }

    fn name(&self) -> &'static str {
        "read-values"
    }
}

// ── Riding profiles ──────────────────────────────────────────

/// Temporary motor limits applied by a profile switch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProfileLimits {
    pub current_min_scale: f32,
    pub current_max_scale: f32,
    /// m/s
    pub speed_min: f32,
    /// m/s
    pub speed_max: f32,
    pub duty_min: f32,
    pub duty_max: f32,
    /// W
    pub watt_min: f32,
    /// W
    pub watt_max: f32,
}

/// Named riding modes selectable from the profile screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MotorProfile {
    /// Unrestricted.
    Ballern,
    Cruise,
    /// Street-legal: 25 km/h, 250 W.
    Legal,
}

/// Flag bytes preceding the limits: don't store, forward over CAN, no ack,
/// don't divide by controller count.
const PROFILE_FLAGS: [u8; 4] = [0, 1, 0, 0];

impl MotorProfile {
    pub const ALL: [MotorProfile; 3] = [Self::Ballern, Self::Cruise, Self::Legal];

    pub fn limits(self) -> ProfileLimits {
        match self {
            Self::Ballern => ProfileLimits {
                current_min_scale: 1.0,
                current_max_scale: 1.0,
                speed_min: -100.0,
                speed_max: 100.0,
                duty_min: 0.005,
                duty_max: 0.95,
                watt_min: -1_500_000.0,
                watt_max: 1_500_000.0,
            },
            Self::Cruise => ProfileLimits {
                current_min_scale: 1.0,
                current_max_scale: 0.7,
                speed_min: -100.0,
                speed_max: 35.0 / 3.6,
                duty_min: 0.005,
                duty_max: 0.95,
                watt_min: -1_500_000.0,
                watt_max: 750.0,
            },
            Self::Legal => ProfileLimits {
                current_min_scale: 1.0,
                current_max_scale: 0.5,
                speed_min: -100.0,
                speed_max: 25.0 / 3.6,
                duty_min: 0.005,
                duty_max: 0.95,
                watt_min: -1_500_000.0,
                watt_max: 250.0,
            },
        }
    }
}

impl Command for MotorProfile {
    fn opcode(&self) -> u8 {
        opcode::SET_MOTOR_CONFIG_TEMP_SETUP
    }

    fn body(&self) -> Cow<'_, [u8]> {
        let l = self.limits();
        let mut body = Vec::with_capacity(PROFILE_FLAGS.len() + 8 * 4);
        body.extend_from_slice(&PROFILE_FLAGS);
        for v in [
            l.current_min_scale,
            l.current_max_scale,
            l.speed_min,
            l.speed_max,
            l.duty_min,
            l.duty_max,
            l.watt_min,
            l.watt_max,
        ] {
            body.extend_from_slice(&v.to_bits().to_be_bytes());
        }
        Cow::Owned(body)
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Ballern => "profile-ballern",
            Self::Cruise => "profile-cruise",
            Self::Legal => "profile-legal",
        }
    }
}
