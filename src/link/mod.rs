//! Connection lifecycle for the two BLE peripherals.
//!
//! ```text
//!   Scanner ─┐                         ┌─▶ frames(battery)
//!            ├─▶ ConnectionSupervisor ─┤
//!   Gatt ────┘    └ DeviceConnection×2 └─▶ frames(motor)
//! ```

pub mod backoff;
pub mod connection;
pub mod driver;
pub mod events;
pub mod ports;
pub mod state;
pub mod supervisor;

pub use connection::DeviceConnection;
pub use events::{AttemptId, TransportEvent, TransportEventKind};
pub use ports::{DiscoveredPeripheral, GattTransport, Scanner};
pub use state::ConnectionState;
pub use supervisor::ConnectionSupervisor;
