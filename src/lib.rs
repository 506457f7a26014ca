//! bmslink: serial-over-BLE protocol engine for an e-bike battery monitor
//! and motor controller.
//!
//! Exposes the frame assembler, command encoder and connection lifecycle as
//! plain logic driven through port traits, so everything runs and is tested
//! on the host without a radio.

#![deny(unused_must_use)]

pub mod config;
pub mod error;
pub mod link;
pub mod protocol;

pub use config::{LinkConfig, PeripheralConfig, ReconnectPolicy, Role};
pub use error::{Error, Result};
