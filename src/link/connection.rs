//! One peripheral link: lifecycle, reassembly and serialized writes.
//!
//! A `DeviceConnection` owns everything that belongs to a single physical
//! link and nothing else:
//!
//! ```text
//! ┌────────────────────────── DeviceConnection ───────────────────────────┐
//! │  config ── state ── attempt id ── backoff / retry_at                  │
//! │                                                                       │
//! │  Notification ──▶ FrameAssembler ──▶ sink(Frame)                      │
//! │  send(cmd) ──▶ CommandEncoder ──▶ [in flight] ──▶ GattTransport.write │
//! │                                  └─▶ outbox (4) ─┘                    │
//! │  tick(now) ──▶ retry due? ── write overdue? ──▶ Failed                │
//! └───────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The transport is passed in on every call rather than stored, so the
//! owner decides how transports are shared and a connection stays a plain
//! state machine that tests can drive step by step.
//!
//! The reassembly state is discarded whenever the link goes down and again
//! at the start of every attempt; bytes from one session can never be
//! glued onto bytes from the next.

use std::time::{Duration, Instant};

use heapless::Deque;
use log::{debug, info, warn};

use super::backoff::Backoff;
use super::events::{AttemptId, TransportEvent, TransportEventKind};
use super::ports::{DiscoveredPeripheral, GattTransport, UART_RX_CHAR, UART_SERVICE, UART_TX_CHAR};
use super::state::ConnectionState;
use crate::config::{DEFAULT_WRITE_TIMEOUT_MS, PeripheralConfig, ReconnectPolicy, Role};
use crate::error::{NotConnectedError, SendError, TransportError};
use crate::protocol::assembler::{AssemblerStats, FrameAssembler, ReassemblyState};
use crate::protocol::command::Command;
use crate::protocol::encoder::{CommandEncoder, Packet};
use crate::protocol::frame::{Frame, FrameFormat};

/// Packets waiting behind an in-flight write.
pub const OUTBOX_DEPTH: usize = 4;

pub struct DeviceConnection {
    role: Role,
    config: Option<PeripheralConfig>,
    state: ConnectionState,
    attempt: AttemptId,
    assembler: FrameAssembler,
    encoder: CommandEncoder,
    backoff: Backoff,
    retry_at: Option<Instant>,
    write_in_flight: bool,
    write_timeout: Duration,
    write_deadline: Option<Instant>,
    outbox: Deque<Packet, OUTBOX_DEPTH>,
    last_error: Option<TransportError>,
}

impl DeviceConnection {
    pub fn new(role: Role, format: FrameFormat, policy: ReconnectPolicy) -> Self {
        Self {
            role,
            config: None,
            state: ConnectionState::Idle,
            attempt: AttemptId::default(),
            assembler: FrameAssembler::new(role, format),
            encoder: CommandEncoder::new(),
            backoff: Backoff::new(policy),
            retry_at: None,
            write_in_flight: false,
            write_timeout: Duration::from_millis(u64::from(DEFAULT_WRITE_TIMEOUT_MS)),
            write_deadline: None,
            outbox: Deque::new(),
            last_error: None,
        }
    }

    #[must_use]
    pub fn with_encoder(mut self, encoder: CommandEncoder) -> Self {
        self.encoder = encoder;
        self
    }

    /// How long a write may go without a completion event.
    #[must_use]
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    // ── Accessors ────────────────────────────────────────────

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn config(&self) -> Option<&PeripheralConfig> {
        self.config.as_ref()
    }

    pub fn attempt(&self) -> AttemptId {
        self.attempt
    }

    /// When the next automatic retry fires, if one is scheduled.
    pub fn retry_at(&self) -> Option<Instant> {
        self.retry_at
    }

    /// When the in-flight write is declared lost.
    pub fn write_deadline(&self) -> Option<Instant> {
        self.write_deadline
    }

    /// Earliest instant at which [`tick`](Self::tick) has work to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.retry_at, self.write_deadline) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    pub fn last_error(&self) -> Option<TransportError> {
        self.last_error
    }

    pub fn reassembly(&self) -> ReassemblyState {
        self.assembler.state()
    }

    pub fn assembler_stats(&self) -> AssemblerStats {
        self.assembler.stats()
    }

    pub fn write_in_flight(&self) -> bool {
        self.write_in_flight
    }

    pub fn queued_writes(&self) -> usize {
        self.outbox.len()
    }

    fn has_active_config(&self) -> bool {
        self.config.as_ref().is_some_and(PeripheralConfig::is_active)
    }

    // ── Lifecycle ────────────────────────────────────────────

    /// Replace the peripheral identity. Any link in progress is torn down
    /// and the connection returns to `Idle`; call [`start`](Self::start)
    /// to begin discovery for the new identity.
    pub fn configure<T>(&mut self, config: Option<PeripheralConfig>, transport: &mut T)
    where
        T: GattTransport + ?Sized,
    {
        self.stop(transport);
        self.backoff.reset();
        self.last_error = None;
        self.config = config;
    }

    /// `Idle → Scanning` when an active peripheral is configured.
    /// Returns whether the connection is now waiting for discovery.
    pub fn start(&mut self) -> bool {
        if self.state != ConnectionState::Idle {
            return self.state == ConnectionState::Scanning;
        }
        if !self.has_active_config() {
            debug!("link[{}]: no peripheral selected, staying idle", self.role);
            return false;
        }
        self.transition(ConnectionState::Scanning);
        true
    }

    /// Tear the link down and return to `Idle`. The configuration is kept.
    pub fn stop<T>(&mut self, transport: &mut T)
    where
        T: GattTransport + ?Sized,
    {
        if self.state.is_attempting() || self.state.is_ready() {
            transport.disconnect();
        }
        self.drop_session();
        self.retry_at = None;
        self.transition(ConnectionState::Idle);
    }

    /// A peripheral was seen by the scanner. Returns whether it was ours
    /// and started an attempt.
    ///
    /// A match while waiting to retry skips the remaining backoff delay.
    pub fn on_discovered<T>(&mut self, peripheral: &DiscoveredPeripheral, transport: &mut T) -> bool
    where
        T: GattTransport + ?Sized,
    {
        let ours = self
            .config
            .as_ref()
            .is_some_and(|c| c.matches(&peripheral.address));
        if !ours {
            return false;
        }

        match self.state {
            ConnectionState::Scanning => {
                self.begin_attempt(transport);
                true
            }
            s if s.awaits_retry() => {
                debug!("link[{}]: peripheral seen again, retrying now", self.role);
                self.begin_attempt(transport);
                true
            }
            _ => false,
        }
    }

    /// Fire a due retry, or fail a link whose write was never acknowledged.
    /// Returns whether an attempt was started.
    pub fn tick<T>(&mut self, now: Instant, transport: &mut T) -> bool
    where
        T: GattTransport + ?Sized,
    {
        if self.state.is_ready() && self.write_deadline.is_some_and(|at| at <= now) {
            warn!(
                "link[{}]: write not acknowledged within {} ms",
                self.role,
                self.write_timeout.as_millis()
            );
            self.fail(TransportError::WriteFailed, transport, now);
            return false;
        }
        match self.retry_at {
            Some(at) if at <= now && self.state.awaits_retry() => {
                self.begin_attempt(transport);
                true
            }
            _ => false,
        }
    }

    /// Some events for `attempt` never arrived, so the link state can no
    /// longer be trusted. A live link under that attempt is failed and goes
    /// through the reconnect loop; anything else is left alone.
    pub fn on_events_lost<T>(&mut self, attempt: AttemptId, transport: &mut T, now: Instant)
    where
        T: GattTransport + ?Sized,
    {
        if attempt != self.attempt {
            debug!("link[{}]: lost events belong to attempt {}, ignoring", self.role, attempt);
            return;
        }
        if self.state.is_attempting() || self.state.is_ready() {
            self.fail(TransportError::EventsLost, transport, now);
        }
    }

    fn begin_attempt<T>(&mut self, transport: &mut T)
    where
        T: GattTransport + ?Sized,
    {
        let Some(config) = self.config.clone() else {
            return;
        };
        self.retry_at = None;
        self.attempt = self.attempt.next();
        self.drop_session();

        self.transition(ConnectionState::Connecting);
        info!(
            "link[{}]: attempt {} to {} ({})",
            self.role, self.attempt, config.address, config.name
        );

        // Pairing happens before the GATT connect.
        match config.pin() {
            Some(pin) => {
                self.transition(ConnectionState::Bonding);
                transport.bond(self.attempt, &config.address, pin);
            }
            None => transport.connect(self.attempt, &config.address),
        }
    }

    // ── Transport events ─────────────────────────────────────

    /// Apply one transport event. Completed frames are passed to `sink` in
    /// stream order.
    pub fn handle<T, F>(&mut self, event: TransportEvent, transport: &mut T, now: Instant, mut sink: F)
    where
        T: GattTransport + ?Sized,
        F: FnMut(Frame),
    {
        if event.attempt != self.attempt {
            debug!(
                "link[{}]: dropping stale {} from attempt {} (current {})",
                self.role,
                event.kind.name(),
                event.attempt,
                self.attempt
            );
            return;
        }

        use ConnectionState as S;
        use TransportEventKind as E;

        match (self.state, event.kind) {
            (S::Bonding, E::Bonded) => {
                if let Some(config) = &self.config {
                    transport.connect(self.attempt, &config.address);
                }
            }
            (S::Bonding, E::BondFailed) => self.fail(TransportError::BondFailed, transport, now),

            (S::Connecting | S::Bonding, E::Connected) => {
                self.transition(S::DiscoveringServices);
                transport.discover_services(self.attempt);
            }
            (S::Connecting | S::Bonding, E::ConnectFailed) => {
                self.fail(TransportError::ConnectFailed, transport, now);
            }

            (S::DiscoveringServices, E::ServicesDiscovered) => {
                if let Err(e) = Self::setup_uart(transport) {
                    self.fail(e, transport, now);
                } else {
                    self.backoff.reset();
                    self.last_error = None;
                    self.transition(S::Ready);
                }
            }
            (S::DiscoveringServices, E::DiscoveryFailed) => {
                self.fail(TransportError::DiscoveryFailed, transport, now);
            }

            (S::Ready, E::Notification(bytes)) => self.assembler.on_bytes(&bytes, &mut sink),
            (S::Ready, E::WriteComplete) => {
                self.write_in_flight = false;
                self.write_deadline = None;
                self.pump_outbox(transport, now);
            }
            (S::Ready, E::WriteFailed) => self.fail(TransportError::WriteFailed, transport, now),

            (s, E::Disconnected) if s.is_attempting() || s.is_ready() => {
                warn!("link[{}]: {}", self.role, TransportError::Disconnected);
                self.last_error = Some(TransportError::Disconnected);
                transport.disconnect();
                self.drop_session();
                self.transition(S::Disconnected);
                self.schedule_retry(now);
            }

            (s, kind) => {
                debug!("link[{}]: ignoring {} in {}", self.role, kind.name(), s);
            }
        }
    }

    /// Locate the UART service and enable notifications on both characteristics.
    fn setup_uart<T>(transport: &mut T) -> Result<(), TransportError>
    where
        T: GattTransport + ?Sized,
    {
        let has_rx = transport.has_characteristic(UART_SERVICE, UART_RX_CHAR);
        let has_tx = transport.has_characteristic(UART_SERVICE, UART_TX_CHAR);
        match (has_rx, has_tx) {
            (false, false) => return Err(TransportError::ServiceMissing),
            (true, true) => {}
            _ => return Err(TransportError::CharacteristicMissing),
        }
        transport
            .enable_notifications(UART_SERVICE, UART_RX_CHAR)
            .and_then(|()| transport.enable_notifications(UART_SERVICE, UART_TX_CHAR))
            .map_err(|_| TransportError::NotificationSetupFailed)
    }

    fn fail<T>(&mut self, error: TransportError, transport: &mut T, now: Instant)
    where
        T: GattTransport + ?Sized,
    {
        warn!("link[{}]: {} (attempt {})", self.role, error, self.attempt);
        self.last_error = Some(error);
        transport.disconnect();
        self.drop_session();
        self.transition(ConnectionState::Failed);
        self.schedule_retry(now);
    }

    fn schedule_retry(&mut self, now: Instant) {
        if !self.has_active_config() {
            self.retry_at = None;
            return;
        }
        match self.backoff.next_delay() {
            Some(delay) => {
                info!(
                    "link[{}]: retry {} in {} ms",
                    self.role,
                    self.backoff.failures(),
                    delay.as_millis()
                );
                self.retry_at = Some(now + delay);
            }
            None => {
                warn!(
                    "link[{}]: giving up after {} consecutive failures",
                    self.role,
                    self.backoff.failures()
                );
                self.retry_at = None;
            }
        }
    }

    /// Forget everything tied to the current physical session.
    fn drop_session(&mut self) {
        self.assembler.reset();
        if !self.outbox.is_empty() {
            debug!("link[{}]: dropping {} queued writes", self.role, self.outbox.len());
        }
        self.outbox.clear();
        self.write_in_flight = false;
        self.write_deadline = None;
    }

    fn transition(&mut self, to: ConnectionState) {
        if self.state != to {
            info!("link[{}]: {} -> {}", self.role, self.state, to);
            self.state = to;
        }
    }

    // ── Outbound ─────────────────────────────────────────────

    /// Encode `command` and write it to the TX characteristic.
    ///
    /// Only allowed in `Ready`. If a write is already in flight the packet
    /// waits in the outbox and goes out on the next write completion. A
    /// write that is not completed by `now + write_timeout` fails the link
    /// on the next [`tick`](Self::tick).
    pub fn send<T>(
        &mut self,
        command: &dyn Command,
        transport: &mut T,
        now: Instant,
    ) -> Result<(), SendError>
    where
        T: GattTransport + ?Sized,
    {
        if !self.state.is_ready() {
            return Err(NotConnectedError { state: self.state }.into());
        }
        let packet = self.encoder.encode(command)?;

        if self.write_in_flight {
            self.outbox.push_back(packet).map_err(|_| {
                warn!("link[{}]: outbox full, rejecting {}", self.role, command.name());
                SendError::QueueFull
            })?;
            debug!("link[{}]: queued {} ({} waiting)", self.role, command.name(), self.outbox.len());
            return Ok(());
        }

        debug!("link[{}]: write {} ({} bytes)", self.role, command.name(), packet.len());
        self.issue(&packet, transport, now);
        Ok(())
    }

    fn pump_outbox<T>(&mut self, transport: &mut T, now: Instant)
    where
        T: GattTransport + ?Sized,
    {
        if let Some(packet) = self.outbox.pop_front() {
            self.issue(&packet, transport, now);
        }
    }

    fn issue<T>(&mut self, packet: &Packet, transport: &mut T, now: Instant)
    where
        T: GattTransport + ?Sized,
    {
        self.write_in_flight = true;
        self.write_deadline = Some(now + self.write_timeout);
        transport.write(self.attempt, UART_TX_CHAR, packet);
    }
}

impl core::fmt::Debug for DeviceConnection {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DeviceConnection")
            .field("role", &self.role)
            .field("state", &self.state)
            .field("attempt", &self.attempt)
            .field("retry_at", &self.retry_at)
            .field("write_in_flight", &self.write_in_flight)
            .field("write_deadline", &self.write_deadline)
            .field("queued", &self.outbox.len())
            .finish_non_exhaustive()
    }
}

// ── Tests ────────────────────────────────────────────────────
