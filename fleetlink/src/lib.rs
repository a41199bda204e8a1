/*!
fleetlink: telemetry and control bridge between autonomous vehicles and a
monitoring center
*/

pub mod core;

pub use crate::core::alert_hub::{AlertHub, AlertListener, AlertTier, ListenerHandle};
pub use crate::core::config::BridgeConfig;
pub use crate::core::control_center::ControlCenter;
pub use crate::core::error::BridgeError;
pub use crate::core::shadow::{ShadowEntry, ShadowStore, UpdateOutcome};
pub use crate::core::transport::{LocalBroker, Message, Transport};
pub use crate::core::vehicle_agent::VehicleAgent;
pub use fleetlink_protocol as protocol;
