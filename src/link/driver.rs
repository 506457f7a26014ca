//! Async driver: one inbox, one consumer.
//!
//! BLE stack callbacks run on whatever thread the platform uses.  They post
//! [`Inbound`] messages into a bounded `embassy-sync` channel; the driver
//! future is the only thing that touches the supervisor, so every event for
//! a link (including resets) is applied in order.
//!
//! ```text
//!  GATT callbacks ──┐
//!  scan callbacks ──┼──▶ LinkInbox (Channel<Inbound, 32>) ──▶ run() ──▶ ConnectionSupervisor
//!  settings store ──┘                                           │
//!                                                    deadlines ─┘ (async-io-mini)
//! ```
//!
//! Notifications may only fill the inbox up to [`CONTROL_RESERVE`] slots
//! short of capacity, so a burst of data cannot crowd out a disconnect or
//! a write completion queued behind it.  If a transport event is dropped
//! anyway, the inbox remembers the role and attempt, and the driver fails
//! that link once the queued messages ahead of the gap have been applied.
//!
//! The supervisor is held in `Rc<RefCell<..>>` so other local tasks can
//! call `send_command` between awaits; no borrow is held across an await.
//! A task that sends calls [`LinkInbox::wake`] afterwards so the driver
//! picks up the new write deadline.

use core::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Instant;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, TrySendError};
use embassy_sync::signal::Signal;
use log::{info, warn};

// async-io-mini timers call into the embassy-time driver; `std` supplies it.
use embassy_time as _;

use super::events::{AttemptId, TransportEvent, TransportEventKind};
use super::ports::{DiscoveredPeripheral, GattTransport, Scanner};
use super::supervisor::ConnectionSupervisor;
use crate::config::{PeripheralConfig, Role};

pub const INBOX_DEPTH: usize = 32;

/// Slots only lifecycle messages may use.
pub const CONTROL_RESERVE: usize = 8;

pub type LostAttempts = [Option<AttemptId>; Role::COUNT];

/// Everything that can happen to the link engine from the outside.
#[derive(Debug, Clone)]
pub enum Inbound {
    Transport(Role, TransportEvent),
    Discovered(DiscoveredPeripheral),
    ConfigChanged(Role, Option<PeripheralConfig>),
    Shutdown,
}

impl Inbound {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Transport(_, event) => event.kind.name(),
            Self::Discovered(_) => "discovered",
            Self::ConfigChanged(..) => "config-changed",
            Self::Shutdown => "shutdown",
        }
    }

    fn is_bulk(&self) -> bool {
        matches!(
            self,
            Self::Transport(_, TransportEvent { kind: TransportEventKind::Notification(_), .. })
        )
    }
}

pub struct LinkInbox {
    channel: Channel<CriticalSectionRawMutex, Inbound, INBOX_DEPTH>,
    lost: Mutex<CriticalSectionRawMutex, Cell<LostAttempts>>,
    wake: Signal<CriticalSectionRawMutex, ()>,
}

impl Default for LinkInbox {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkInbox {
    pub const fn new() -> Self {
        Self {
            channel: Channel::new(),
            lost: Mutex::new(Cell::new([None; Role::COUNT])),
            wake: Signal::new(),
        }
    }

    /// Non-blocking post from a callback. Returns `false` if the message
    /// was dropped.
    ///
    /// A dropped transport event marks its link for a forced reconnect.
    /// Dropped discovery, configuration or shutdown messages are only
    /// reported through the return value; the caller posts them again.
    pub fn post(&self, msg: Inbound) -> bool {
        if msg.is_bulk() && self.channel.len() >= INBOX_DEPTH - CONTROL_RESERVE {
            self.reject(&msg);
            return false;
        }
        match self.channel.try_send(msg) {
            Ok(()) => true,
            Err(TrySendError::Full(msg)) => {
                self.reject(&msg);
                false
            }
        }
    }

    fn reject(&self, msg: &Inbound) {
        if let Inbound::Transport(role, event) = msg {
            warn!(
                "link inbox full, dropping {} for {} (attempt {}), link will resync",
                event.kind.name(),
                role,
                event.attempt
            );
            self.lost.lock(|lost| {
                let mut roles = lost.get();
                roles[role.index()] = Some(event.attempt);
                lost.set(roles);
            });
        } else {
            warn!("link inbox full, dropping {}", msg.name());
        }
    }

    /// Roles that lost a transport event since the last call, with the
    /// attempt the event belonged to.
    pub fn take_lost(&self) -> LostAttempts {
        self.lost.lock(|lost| lost.replace([None; Role::COUNT]))
    }

    /// Make a waiting [`run`] re-read the supervisor's deadlines.
    pub fn wake(&self) {
        self.wake.signal(());
    }

    pub fn try_recv(&self) -> Option<Inbound> {
        self.channel.try_receive().ok()
    }

    pub async fn recv(&self) -> Inbound {
        self.channel.receive().await
    }

    pub fn len(&self) -> usize {
        self.channel.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channel.is_empty()
    }
}

/// Apply one message. Returns `false` on [`Inbound::Shutdown`].
pub fn dispatch<T, S>(sup: &mut ConnectionSupervisor<T, S>, msg: Inbound, now: Instant) -> bool
where
    T: GattTransport,
    S: Scanner,
{
    match msg {
        Inbound::Transport(role, event) => sup.handle_at(role, event, now),
        Inbound::Discovered(peripheral) => sup.on_discovered(&peripheral),
        Inbound::ConfigChanged(role, config) => {
            if let Err(e) = sup.on_config_changed(role, config) {
                warn!("link[{}]: rejected configuration: {}", role, e);
            }
        }
        Inbound::Shutdown => {
            sup.shutdown();
            return false;
        }
    }
    true
}

/// Fail links whose event stream has a gap.
fn resync_lost<T, S>(sup: &mut ConnectionSupervisor<T, S>, inbox: &LinkInbox, now: Instant)
where
    T: GattTransport,
    S: Scanner,
{
    for (role, lost) in Role::ALL.into_iter().zip(inbox.take_lost()) {
        if let Some(attempt) = lost {
            sup.on_events_lost(role, attempt, now);
        }
    }
}

/// Synchronously apply everything currently in the inbox, then fire due
/// retries. Returns `false` if a shutdown was processed.
pub fn drain<T, S>(sup: &mut ConnectionSupervisor<T, S>, inbox: &LinkInbox, now: Instant) -> bool
where
    T: GattTransport,
    S: Scanner,
{
    while let Some(msg) = inbox.try_recv() {
        if !dispatch(sup, msg, now) {
            return false;
        }
    }
    resync_lost(sup, inbox, now);
    sup.tick(now);
    true
}

/// Drive the supervisor until [`Inbound::Shutdown`].
///
/// Waits on the inbox, or on the earliest retry or write deadline when one
/// is scheduled, and ticks the supervisor after every wake-up.
pub async fn run<T, S>(sup: Rc<RefCell<ConnectionSupervisor<T, S>>>, inbox: &LinkInbox)
where
    T: GattTransport,
    S: Scanner,
{
    info!("link driver started");
    loop {
        let deadline = sup.borrow().next_deadline();
        let next = futures_lite::future::or(async { Some(inbox.recv().await) }, async {
            inbox.wake.wait().await;
            None
        });
        let msg = match deadline {
            Some(at) => {
                let wait = at.saturating_duration_since(Instant::now());
                futures_lite::future::or(next, async {
                    async_io_mini::Timer::after(wait).await;
                    None
                })
                .await
            }
            None => next.await,
        };

        let now = Instant::now();
        let mut s = sup.borrow_mut();
        if let Some(msg) = msg {
            if !dispatch(&mut *s, msg, now) {
                info!("link driver stopped");
                return;
            }
        }
        if inbox.is_empty() {
            resync_lost(&mut *s, inbox, now);
        }
        s.tick(now);
    }
}
