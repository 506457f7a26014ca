//! Mock BLE adapters for integration tests.
//!
//! Records every transport call so tests can assert on the full command
//! history without a radio.

use std::collections::HashMap;

use bmslink::error::TransportError;
use bmslink::link::ports::{DiscoveredPeripheral, GattTransport, Scanner};
use bmslink::link::{AttemptId, TransportEvent, TransportEventKind};

// ── Transport call record ─────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    Connect { attempt: AttemptId, address: String },
    Bond { attempt: AttemptId, pin: String },
    DiscoverServices { attempt: AttemptId },
    EnableNotifications { characteristic: u128 },
    Write { attempt: AttemptId, data: Vec<u8> },
    Disconnect,
}

// ── MockTransport ─────────────────────────────────────────────

pub struct MockTransport {
    pub calls: Vec<TransportCall>,
    /// Characteristics present in the "discovered" GATT table.
    pub characteristics: Vec<(u128, u128)>,
    pub fail_notifications: bool,
}

#[allow(dead_code)]
impl MockTransport {
    pub fn new() -> Self {
        use bmslink::link::ports::{UART_RX_CHAR, UART_SERVICE, UART_TX_CHAR};
        Self {
            calls: Vec::new(),
            characteristics: vec![(UART_SERVICE, UART_RX_CHAR), (UART_SERVICE, UART_TX_CHAR)],
            fail_notifications: false,
        }
    }

    /// A peripheral that exposes no UART service at all.
    pub fn without_uart() -> Self {
        Self {
            characteristics: Vec::new(),
            ..Self::new()
        }
    }

    pub fn last_call(&self) -> Option<&TransportCall> {
        self.calls.last()
    }

    /// Attempt id of the most recent connect or bond request.
    pub fn last_attempt(&self) -> Option<AttemptId> {
        self.calls.iter().rev().find_map(|c| match c {
            TransportCall::Connect { attempt, .. } | TransportCall::Bond { attempt, .. } => {
                Some(*attempt)
            }
            _ => None,
        })
    }

    pub fn writes(&self) -> Vec<&[u8]> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                TransportCall::Write { data, .. } => Some(data.as_slice()),
                _ => None,
            })
            .collect()
    }

    pub fn connects(&self) -> usize {
        self.calls
            .iter()
            .filter(|c| matches!(c, TransportCall::Connect { .. }))
            .count()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl GattTransport for MockTransport {
    fn connect(&mut self, attempt: AttemptId, address: &str) {
        self.calls.push(TransportCall::Connect {
            attempt,
            address: address.to_string(),
        });
    }

    fn bond(&mut self, attempt: AttemptId, _address: &str, pin: &str) {
        self.calls.push(TransportCall::Bond {
            attempt,
            pin: pin.to_string(),
        });
    }

    fn discover_services(&mut self, attempt: AttemptId) {
        self.calls.push(TransportCall::DiscoverServices { attempt });
    }

    fn has_characteristic(&self, service: u128, characteristic: u128) -> bool {
        self.characteristics.contains(&(service, characteristic))
    }

    fn enable_notifications(
        &mut self,
        _service: u128,
        characteristic: u128,
    ) -> Result<(), TransportError> {
        self.calls
            .push(TransportCall::EnableNotifications { characteristic });
        if self.fail_notifications {
            Err(TransportError::NotificationSetupFailed)
        } else {
            Ok(())
        }
    }

    fn write(&mut self, attempt: AttemptId, _characteristic: u128, data: &[u8]) {
        self.calls.push(TransportCall::Write {
            attempt,
            data: data.to_vec(),
        });
    }

    fn disconnect(&mut self) {
        self.calls.push(TransportCall::Disconnect);
    }
}

// ── MockScanner ───────────────────────────────────────────────

#[derive(Default)]
pub struct MockScanner {
    pub scanning: bool,
    pub starts: u32,
    pub stops: u32,
    /// Peripherals already seen, keyed by upper-case address.
    pub registry: HashMap<String, DiscoveredPeripheral>,
}

#[allow(dead_code)]
impl MockScanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn remember(&mut self, peripheral: DiscoveredPeripheral) {
        self.registry
            .insert(peripheral.address.to_ascii_uppercase(), peripheral);
    }
}

impl Scanner for MockScanner {
    fn start_scan(&mut self) {
        self.scanning = true;
        self.starts += 1;
    }

    fn stop_scan(&mut self) {
        self.scanning = false;
        self.stops += 1;
    }

    fn find(&self, address: &str) -> Option<DiscoveredPeripheral> {
        self.registry.get(&address.to_ascii_uppercase()).cloned()
    }
}

// ── Event helpers ─────────────────────────────────────────────

#[allow(dead_code)]
pub fn event(attempt: AttemptId, kind: TransportEventKind) -> TransportEvent {
    TransportEvent::new(attempt, kind)
}

#[allow(dead_code)]
pub fn notify(attempt: AttemptId, bytes: &[u8]) -> TransportEvent {
    TransportEvent::notification(attempt, bytes)
}
