//! Port traits: the boundary between the link engine and the BLE stack.
//!
//! ```text
//!   BLE stack adapter ──▶ GattTransport / Scanner ──▶ DeviceConnection
//!                     ◀── TransportEvent (via inbox) ◀──
//! ```
//!
//! Operations return immediately.  Completion is reported later as a
//! [`TransportEvent`](super::events::TransportEvent) carrying the
//! [`AttemptId`] the operation was issued with.  The only synchronous
//! calls are the characteristic lookup and notification enable, which
//! operate on the already-discovered GATT table.

use super::events::AttemptId;
use crate::error::TransportError;

// ───────────────────────────────────────────────────────────────
// Nordic UART service
// ───────────────────────────────────────────────────────────────

pub const UART_SERVICE: u128 = 0x6e400001_b5a3_f393_e0a9_e50e24dcca9e;
/// Peripheral → central (notify).
pub const UART_RX_CHAR: u128 = 0x6e400003_b5a3_f393_e0a9_e50e24dcca9e;
/// Central → peripheral (write).
pub const UART_TX_CHAR: u128 = 0x6e400002_b5a3_f393_e0a9_e50e24dcca9e;

// ───────────────────────────────────────────────────────────────
// GATT transport (driven adapter: link → radio)
// ───────────────────────────────────────────────────────────────

/// One GATT client link to one peripheral.
pub trait GattTransport {
    /// Open a GATT connection. Completes with `Connected` / `ConnectFailed`.
    fn connect(&mut self, attempt: AttemptId, address: &str);

    /// Pair with `pin`. Completes with `Bonded` / `BondFailed`.
    fn bond(&mut self, attempt: AttemptId, address: &str, pin: &str);

    /// Completes with `ServicesDiscovered` / `DiscoveryFailed`.
    fn discover_services(&mut self, attempt: AttemptId);

    /// Whether the discovered GATT table contains `characteristic` under `service`.
    fn has_characteristic(&self, service: u128, characteristic: u128) -> bool;

    /// Write the CCCD for `characteristic`.
    fn enable_notifications(
        &mut self,
        service: u128,
        characteristic: u128,
    ) -> Result<(), TransportError>;

    /// Write `data` to `characteristic`. Completes with `WriteComplete` / `WriteFailed`.
    fn write(&mut self, attempt: AttemptId, characteristic: u128, data: &[u8]);

    /// Close the link. Idempotent; no event is expected for it.
    fn disconnect(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Scanner (driven adapter: link → radio)
// ───────────────────────────────────────────────────────────────

/// An advertising peripheral seen by the scanner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredPeripheral {
    pub address: String,
    pub name: Option<String>,
}

impl DiscoveredPeripheral {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: None,
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Advertisement scanning plus the registry of peripherals already seen.
pub trait Scanner {
    fn start_scan(&mut self);

    fn stop_scan(&mut self);

    /// Look up a previously discovered peripheral by address (case-insensitive).
    fn find(&self, address: &str) -> Option<DiscoveredPeripheral>;
}
