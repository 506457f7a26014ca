//! Supervisor for the two peripheral links.
//!
//! ```text
//! ┌──────────────────────── ConnectionSupervisor ────────────────────────┐
//! │                                                                      │
//! │   Scanner ◀── start/stop_scan (any link Scanning?) ── find(address)  │
//! │                                                                      │
//! │   ┌─ battery ──────────────────┐    ┌─ motor ────────────────────┐   │
//! │   │ DeviceConnection           │    │ DeviceConnection           │   │
//! │   │ GattTransport              │    │ GattTransport              │   │
//! │   │ frames: Channel<Frame,16>  │    │ frames: Channel<Frame,16>  │   │
//! │   └────────────────────────────┘    └────────────────────────────┘   │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Roles share nothing but the scanner: separate transports, assemblers,
//! backoff and frame queues.  Decoders consume each role's frames from its
//! channel.

use std::time::Instant;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, Receiver};
use log::{debug, info, warn};

use super::connection::DeviceConnection;
use super::events::{AttemptId, TransportEvent};
use super::ports::{DiscoveredPeripheral, GattTransport, Scanner};
use super::state::ConnectionState;
use crate::config::{LinkConfig, PeripheralConfig, Role};
use crate::error::{ConfigError, SendError};
use crate::protocol::command::Command;
use crate::protocol::frame::Frame;

/// Frames buffered per role before the oldest consumer falls behind.
pub const FRAME_QUEUE_DEPTH: usize = 16;

pub type FrameChannel = Channel<CriticalSectionRawMutex, Frame, FRAME_QUEUE_DEPTH>;
pub type FrameReceiver<'a> = Receiver<'a, CriticalSectionRawMutex, Frame, FRAME_QUEUE_DEPTH>;

struct Link<T> {
    connection: DeviceConnection,
    transport: T,
    frames: FrameChannel,
}

impl<T: GattTransport> Link<T> {
    fn new(role: Role, config: &LinkConfig, transport: T) -> Self {
        Self {
            connection: DeviceConnection::new(role, config.frame_format(role), config.reconnect)
                .with_write_timeout(config.write_timeout()),
            transport,
            frames: Channel::new(),
        }
    }
}

pub struct ConnectionSupervisor<T: GattTransport, S: Scanner> {
    links: [Link<T>; Role::COUNT],
    scanner: S,
    scanning: bool,
}

impl<T: GattTransport, S: Scanner> ConnectionSupervisor<T, S> {
    pub fn new(
        config: &LinkConfig,
        battery: T,
        motor: T,
        scanner: S,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            links: [
                Link::new(Role::BatteryMonitor, config, battery),
                Link::new(Role::MotorController, config, motor),
            ],
            scanner,
            scanning: false,
        })
    }

    fn link(&self, role: Role) -> &Link<T> {
        &self.links[role.index()]
    }

    fn link_mut(&mut self, role: Role) -> &mut Link<T> {
        &mut self.links[role.index()]
    }

    // ── Lifecycle ────────────────────────────────────────────

    /// Configure `role` and begin discovery for it.
    pub fn start(&mut self, role: Role, config: PeripheralConfig) -> Result<(), ConfigError> {
        config.validate()?;
        let link = self.link_mut(role);
        link.connection.configure(Some(config), &mut link.transport);
        self.begin(role);
        Ok(())
    }

    /// Disconnect `role` and leave it idle. Its configuration is kept.
    pub fn stop(&mut self, role: Role) {
        let link = self.link_mut(role);
        link.connection.stop(&mut link.transport);
        self.update_scan();
    }

    /// Stop every link and the scanner.
    pub fn shutdown(&mut self) {
        for role in Role::ALL {
            self.stop(role);
        }
    }

    /// The stored identity for `role` changed.
    ///
    /// A different identity tears the link down (discarding its partial
    /// frame) and restarts discovery if the new identity is active.
    /// An identical identity leaves a live link alone.
    pub fn on_config_changed(
        &mut self,
        role: Role,
        config: Option<PeripheralConfig>,
    ) -> Result<(), ConfigError> {
        if let Some(c) = &config {
            c.validate()?;
        }
        if self.link(role).connection.config() == config.as_ref() {
            debug!("link[{}]: configuration unchanged", role);
            return Ok(());
        }

        info!(
            "link[{}]: configuration changed to {}",
            role,
            config.as_ref().map_or("none", |c| c.address.as_str())
        );
        let link = self.link_mut(role);
        link.connection.configure(config, &mut link.transport);
        self.begin(role);
        Ok(())
    }

    /// `Idle → Scanning`, then try the scanner's registry before waiting
    /// for a fresh advertisement.
    fn begin(&mut self, role: Role) {
        let link = &mut self.links[role.index()];
        if link.connection.start() {
            let known = link
                .connection
                .config()
                .and_then(|c| self.scanner.find(&c.address));
            if let Some(peripheral) = known {
                debug!("link[{}]: {} already known", role, peripheral.address);
                link.connection.on_discovered(&peripheral, &mut link.transport);
            }
        }
        self.update_scan();
    }

    /// Forward a scan result to whichever link is waiting for it.
    pub fn on_discovered(&mut self, peripheral: &DiscoveredPeripheral) {
        for link in &mut self.links {
            link.connection.on_discovered(peripheral, &mut link.transport);
        }
        self.update_scan();
    }

    /// Apply a transport event for `role` at the current time.
    pub fn handle(&mut self, role: Role, event: TransportEvent) {
        self.handle_at(role, event, Instant::now());
    }

    pub fn handle_at(&mut self, role: Role, event: TransportEvent, now: Instant) {
        let Link {
            connection,
            transport,
            frames,
        } = &mut self.links[role.index()];

        connection.handle(event, transport, now, |frame| {
            if frames.try_send(frame).is_err() {
                warn!("link[{}]: frame queue full, dropping frame", role);
            }
        });
        self.update_scan();
    }

    /// Events for `role` under `attempt` were dropped upstream; force the
    /// link through the reconnect loop if that attempt is still current.
    pub fn on_events_lost(&mut self, role: Role, attempt: AttemptId, now: Instant) {
        let link = self.link_mut(role);
        link.connection
            .on_events_lost(attempt, &mut link.transport, now);
        self.update_scan();
    }

    /// Fire any retries that are due and fail links with overdue writes.
    pub fn tick(&mut self, now: Instant) {
        for link in &mut self.links {
            link.connection.tick(now, &mut link.transport);
        }
        self.update_scan();
    }

    /// Earliest retry or write deadline across both links.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.links
            .iter()
            .filter_map(|l| l.connection.next_deadline())
            .min()
    }

    fn update_scan(&mut self) {
        let wanted = self
            .links
            .iter()
            .any(|l| l.connection.state() == ConnectionState::Scanning);
        if wanted && !self.scanning {
            info!("scanner: start");
            self.scanner.start_scan();
            self.scanning = true;
        } else if !wanted && self.scanning {
            info!("scanner: stop");
            self.scanner.stop_scan();
            self.scanning = false;
        }
    }

    // ── Outbound ─────────────────────────────────────────────

    pub fn send_command(&mut self, role: Role, command: &dyn Command) -> Result<(), SendError> {
        self.send_command_at(role, command, Instant::now())
    }

    pub fn send_command_at(
        &mut self,
        role: Role,
        command: &dyn Command,
        now: Instant,
    ) -> Result<(), SendError> {
        let link = self.link_mut(role);
        link.connection.send(command, &mut link.transport, now)
    }

    // ── Queries ──────────────────────────────────────────────

    pub fn state(&self, role: Role) -> ConnectionState {
        self.link(role).connection.state()
    }

    pub fn connection(&self, role: Role) -> &DeviceConnection {
        &self.link(role).connection
    }

    /// Consumer side of `role`'s frame queue.
    pub fn frames(&self, role: Role) -> FrameReceiver<'_> {
        self.link(role).frames.receiver()
    }

    pub fn try_recv_frame(&self, role: Role) -> Option<Frame> {
        self.link(role).frames.try_receive().ok()
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning
    }

    pub fn transport(&self, role: Role) -> &T {
        &self.link(role).transport
    }

    pub fn transport_mut(&mut self, role: Role) -> &mut T {
        &mut self.link_mut(role).transport
    }

    pub fn scanner(&self) -> &S {
        &self.scanner
    }

    pub fn scanner_mut(&mut self) -> &mut S {
        &mut self.scanner
    }
}
