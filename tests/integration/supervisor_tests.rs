//! ConnectionSupervisor integration tests: discovery, scan bookkeeping,
//! frame routing, command gating and configuration changes.

use std::time::Instant;

use bmslink::config::{LinkConfig, PeripheralConfig, Role};
use bmslink::error::{ConfigError, NotConnectedError, SendError};
use bmslink::link::ports::{DiscoveredPeripheral, UART_RX_CHAR, UART_TX_CHAR};
use bmslink::link::supervisor::FRAME_QUEUE_DEPTH;
use bmslink::link::{ConnectionState, ConnectionSupervisor, TransportEventKind};
use bmslink::protocol::checksum::bms_checksum;
use bmslink::protocol::command::{MotorProfile, ReadMotorConfig};
use bmslink::protocol::encoder::CommandEncoder;

use crate::mock_link::{MockScanner, MockTransport, TransportCall, event, notify};

pub const BMS_ADDR: &str = "A4:C1:38:0A:BB:CC";
pub const VESC_ADDR: &str = "D8:A9:8B:11:22:33";

pub type Sup = ConnectionSupervisor<MockTransport, MockScanner>;

pub fn supervisor_with(config: &LinkConfig) -> Sup {
    ConnectionSupervisor::new(
        config,
        MockTransport::new(),
        MockTransport::new(),
        MockScanner::new(),
    )
    .unwrap()
}

pub fn supervisor() -> Sup {
    supervisor_with(&LinkConfig::default())
}

/// Complete the attempt `role` is currently on, up to `Ready`.
pub fn bring_up(sup: &mut Sup, role: Role, now: Instant) {
    let attempt = sup.connection(role).attempt();
    if sup.state(role) == ConnectionState::Bonding {
        sup.handle_at(role, event(attempt, TransportEventKind::Bonded), now);
    }
    sup.handle_at(role, event(attempt, TransportEventKind::Connected), now);
    sup.handle_at(role, event(attempt, TransportEventKind::ServicesDiscovered), now);
    assert_eq!(sup.state(role), ConnectionState::Ready);
}

/// Start both roles, discover both peripherals and bring both links up.
pub fn both_ready(now: Instant) -> Sup {
    let mut sup = supervisor();
    sup.start(Role::BatteryMonitor, PeripheralConfig::new(BMS_ADDR, "xiaoxiang"))
        .unwrap();
    sup.start(Role::MotorController, PeripheralConfig::new(VESC_ADDR, "vesc"))
        .unwrap();
    sup.on_discovered(&DiscoveredPeripheral::new(BMS_ADDR));
    sup.on_discovered(&DiscoveredPeripheral::new(VESC_ADDR));
    bring_up(&mut sup, Role::BatteryMonitor, now);
    bring_up(&mut sup, Role::MotorController, now);
    sup
}

/// A checksummed battery monitor response, terminator included.
pub fn bms_wire(register: u8, data: &[u8]) -> Vec<u8> {
    let mut v = vec![0xDD, register, 0x00, data.len() as u8];
    v.extend_from_slice(data);
    let sum = bms_checksum(&v[2..]);
    v.extend_from_slice(&sum.to_be_bytes());
    v.push(0x77);
    v
}

// ── Discovery and scanning ────────────────────────────────────

#[test]
fn start_scans_until_peripheral_is_seen() {
    let mut sup = supervisor();
    sup.start(Role::BatteryMonitor, PeripheralConfig::new(BMS_ADDR, "bms"))
        .unwrap();
    assert_eq!(sup.state(Role::BatteryMonitor), ConnectionState::Scanning);
    assert!(sup.scanner().scanning);

    sup.on_discovered(&DiscoveredPeripheral::new("00:11:22:33:44:55"));
    assert_eq!(sup.state(Role::BatteryMonitor), ConnectionState::Scanning);

    sup.on_discovered(&DiscoveredPeripheral::new(BMS_ADDR.to_lowercase()).with_name("xiaoxiang"));
    assert_eq!(sup.state(Role::BatteryMonitor), ConnectionState::Connecting);
    assert!(!sup.scanner().scanning);
    assert_eq!(
        sup.transport(Role::BatteryMonitor).last_call(),
        Some(&TransportCall::Connect {
            attempt: sup.connection(Role::BatteryMonitor).attempt(),
            address: BMS_ADDR.to_string(),
        })
    );
}

#[test]
fn known_peripheral_skips_scanning() {
    let mut scanner = MockScanner::new();
    scanner.remember(DiscoveredPeripheral::new(VESC_ADDR));
    let mut sup = ConnectionSupervisor::new(
        &LinkConfig::default(),
        MockTransport::new(),
        MockTransport::new(),
        scanner,
    )
    .unwrap();

    sup.start(Role::MotorController, PeripheralConfig::new(VESC_ADDR, "vesc"))
        .unwrap();
    assert_eq!(sup.state(Role::MotorController), ConnectionState::Connecting);
    assert_eq!(sup.scanner().starts, 0);
}

#[test]
fn scan_runs_while_any_link_is_scanning() {
    let mut sup = supervisor();
    sup.start(Role::BatteryMonitor, PeripheralConfig::new(BMS_ADDR, "bms"))
        .unwrap();
    sup.start(Role::MotorController, PeripheralConfig::new(VESC_ADDR, "vesc"))
        .unwrap();
    assert_eq!(sup.scanner().starts, 1);

    sup.on_discovered(&DiscoveredPeripheral::new(BMS_ADDR));
    assert!(sup.scanner().scanning);

    sup.on_discovered(&DiscoveredPeripheral::new(VESC_ADDR));
    assert!(!sup.scanner().scanning);
    assert_eq!(sup.scanner().stops, 1);
}

#[test]
fn pin_config_bonds_first() {
    let now = Instant::now();
    let mut sup = supervisor();
    sup.start(
        Role::BatteryMonitor,
        PeripheralConfig::new(BMS_ADDR, "bms").with_pin("123456"),
    )
    .unwrap();
    sup.on_discovered(&DiscoveredPeripheral::new(BMS_ADDR));
    assert_eq!(sup.state(Role::BatteryMonitor), ConnectionState::Bonding);
    assert!(matches!(
        sup.transport(Role::BatteryMonitor).last_call(),
        Some(TransportCall::Bond { pin, .. }) if pin == "123456"
    ));
    bring_up(&mut sup, Role::BatteryMonitor, now);
}

#[test]
fn ready_enables_notifications_on_both_characteristics() {
    let sup = both_ready(Instant::now());
    let calls = &sup.transport(Role::MotorController).calls;
    assert!(calls.contains(&TransportCall::EnableNotifications {
        characteristic: UART_RX_CHAR
    }));
    assert!(calls.contains(&TransportCall::EnableNotifications {
        characteristic: UART_TX_CHAR
    }));
}

#[test]
fn invalid_config_is_rejected() {
    let mut sup = supervisor();
    assert_eq!(
        sup.start(Role::BatteryMonitor, PeripheralConfig::new("not-a-mac", "bms")),
        Err(ConfigError::InvalidAddress)
    );
    assert_eq!(sup.state(Role::BatteryMonitor), ConnectionState::Idle);
    assert!(!sup.is_scanning());
}

#[test]
fn none_selection_leaves_link_idle() {
    let mut sup = supervisor();
    sup.start(Role::MotorController, PeripheralConfig::new("0", "None"))
        .unwrap();
    assert_eq!(sup.state(Role::MotorController), ConnectionState::Idle);
    assert!(!sup.is_scanning());
}

// ── Frames ────────────────────────────────────────────────────

#[test]
fn frames_are_routed_to_their_role() {
    let now = Instant::now();
    let mut sup = both_ready(now);
    let b = sup.connection(Role::BatteryMonitor).attempt();
    let m = sup.connection(Role::MotorController).attempt();

    let bms = bms_wire(0x03, &[0x14, 0xB4]);
    let vesc = [0xDD, 0x04, 0x00, 0x01, 0x55, 0x77];

    // Interleave partial chunks across roles.
    sup.handle_at(Role::BatteryMonitor, notify(b, &bms[..3]), now);
    sup.handle_at(Role::MotorController, notify(m, &vesc[..2]), now);
    sup.handle_at(Role::BatteryMonitor, notify(b, &bms[3..]), now);
    sup.handle_at(Role::MotorController, notify(m, &vesc[2..]), now);

    let bf = sup.try_recv_frame(Role::BatteryMonitor).unwrap();
    assert_eq!(bf.payload(), &bms[..bms.len() - 1]);
    assert_eq!(bf.source(), Role::BatteryMonitor);
    assert!(sup.try_recv_frame(Role::BatteryMonitor).is_none());

    let mf = sup.frames(Role::MotorController).try_receive().unwrap();
    assert_eq!(mf.payload(), &vesc[..5]);
    assert_eq!(mf.source(), Role::MotorController);
}

#[test]
fn full_frame_queue_drops_newest() {
    let now = Instant::now();
    let mut sup = both_ready(now);
    let m = sup.connection(Role::MotorController).attempt();

    for i in 0..=FRAME_QUEUE_DEPTH {
        sup.handle_at(
            Role::MotorController,
            notify(m, &[0xDD, 0x04, 0x00, 0x01, i as u8, 0x77]),
            now,
        );
    }
    let mut received = Vec::new();
    while let Some(f) = sup.try_recv_frame(Role::MotorController) {
        received.push(f.payload()[4]);
    }
    assert_eq!(received.len(), FRAME_QUEUE_DEPTH);
    assert_eq!(received[0], 0);
    assert_eq!(*received.last().unwrap() as usize, FRAME_QUEUE_DEPTH - 1);
}

// ── Commands ──────────────────────────────────────────────────

#[test]
fn send_requires_ready() {
    let mut sup = supervisor();
    sup.start(Role::MotorController, PeripheralConfig::new(VESC_ADDR, "vesc"))
        .unwrap();
    assert_eq!(
        sup.send_command(Role::MotorController, &ReadMotorConfig),
        Err(SendError::NotConnected(NotConnectedError {
            state: ConnectionState::Scanning
        }))
    );
    assert!(sup.transport(Role::MotorController).writes().is_empty());
}

#[test]
fn send_writes_encoded_packet() {
    let mut sup = both_ready(Instant::now());
    sup.send_command(Role::MotorController, &ReadMotorConfig)
        .unwrap();
    assert_eq!(
        sup.transport(Role::MotorController).writes(),
        vec![&[0x02u8, 0x01, 0x0E, 0xE1, 0xCE, 0x03][..]]
    );
    assert!(sup.transport(Role::BatteryMonitor).writes().is_empty());
}

#[test]
fn profile_switch_roundtrips_through_encoder() {
    let now = Instant::now();
    let mut sup = both_ready(now);
    let m = sup.connection(Role::MotorController).attempt();
    sup.send_command(Role::MotorController, &MotorProfile::Legal)
        .unwrap();
    sup.send_command(Role::MotorController, &MotorProfile::Ballern)
        .unwrap();
    assert_eq!(sup.transport(Role::MotorController).writes().len(), 1);

    sup.handle_at(Role::MotorController, event(m, TransportEventKind::WriteComplete), now);
    let writes = sup.transport(Role::MotorController).writes();
    assert_eq!(writes.len(), 2);

    let enc = CommandEncoder::new();
    let first = enc.decode(writes[0]).unwrap();
    let second = enc.decode(writes[1]).unwrap();
    assert_eq!(first.opcode, 0x31);
    assert_ne!(first.body, second.body);
}

// ── Configuration changes ─────────────────────────────────────

#[test]
fn address_change_tears_down_and_rediscovers() {
    let now = Instant::now();
    let mut sup = both_ready(now);
    let b = sup.connection(Role::BatteryMonitor).attempt();
    sup.handle_at(Role::BatteryMonitor, notify(b, &[0xDD, 0x03, 0x00, 0x08, 0x01]), now);
    assert!(sup.connection(Role::BatteryMonitor).reassembly().in_frame);

    let new_addr = "A4:C1:38:0A:BB:DD";
    sup.on_config_changed(
        Role::BatteryMonitor,
        Some(PeripheralConfig::new(new_addr, "spare pack")),
    )
    .unwrap();

    assert_eq!(
        sup.transport(Role::BatteryMonitor).last_call(),
        Some(&TransportCall::Disconnect)
    );
    assert_eq!(sup.state(Role::BatteryMonitor), ConnectionState::Scanning);
    assert!(!sup.connection(Role::BatteryMonitor).reassembly().in_frame);
    assert!(sup.is_scanning());
    // The motor link is untouched.
    assert_eq!(sup.state(Role::MotorController), ConnectionState::Ready);

    sup.on_discovered(&DiscoveredPeripheral::new(BMS_ADDR));
    assert_eq!(sup.state(Role::BatteryMonitor), ConnectionState::Scanning);

    sup.on_discovered(&DiscoveredPeripheral::new(new_addr));
    assert_eq!(sup.state(Role::BatteryMonitor), ConnectionState::Connecting);
    assert!(matches!(
        sup.transport(Role::BatteryMonitor).last_call(),
        Some(TransportCall::Connect { address, .. }) if address == new_addr
    ));
}

#[test]
fn unchanged_config_keeps_link_up() {
    let mut sup = both_ready(Instant::now());
    let calls_before = sup.transport(Role::MotorController).calls.len();
    sup.on_config_changed(
        Role::MotorController,
        Some(PeripheralConfig::new(VESC_ADDR, "vesc")),
    )
    .unwrap();
    assert_eq!(sup.state(Role::MotorController), ConnectionState::Ready);
    assert_eq!(sup.transport(Role::MotorController).calls.len(), calls_before);
}

#[test]
fn clearing_config_leaves_link_idle() {
    let mut sup = both_ready(Instant::now());
    sup.on_config_changed(Role::MotorController, None).unwrap();
    assert_eq!(sup.state(Role::MotorController), ConnectionState::Idle);
    assert_eq!(sup.connection(Role::MotorController).retry_at(), None);
    assert!(!sup.is_scanning());

    sup.on_config_changed(
        Role::MotorController,
        Some(PeripheralConfig::new("0", "None")),
    )
    .unwrap();
    assert_eq!(sup.state(Role::MotorController), ConnectionState::Idle);
}

#[test]
fn stop_and_shutdown() {
    let mut sup = both_ready(Instant::now());
    sup.stop(Role::BatteryMonitor);
    assert_eq!(sup.state(Role::BatteryMonitor), ConnectionState::Idle);
    assert_eq!(sup.state(Role::MotorController), ConnectionState::Ready);

    sup.shutdown();
    assert_eq!(sup.state(Role::MotorController), ConnectionState::Idle);
    assert!(!sup.is_scanning());
}
