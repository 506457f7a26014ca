//! Wire protocols.
//!
//! ```text
//!  inbound   notification bytes ──▶ assembler ──▶ Frame ──▶ bms (validate)
//!  outbound  Command ──▶ encoder ──▶ Packet  (0x02 len … crc 0x03)
//! ```

pub mod assembler;
pub mod bms;
pub mod checksum;
pub mod command;
pub mod encoder;
pub mod frame;

pub use assembler::FrameAssembler;
pub use command::{Command, MotorProfile, RawCommand, ReadMotorConfig, ReadValues};
pub use encoder::{CommandEncoder, Packet};
pub use frame::{Frame, FrameFormat, MarkerPolicy};
