/*!
Digital-twin store, alert fan-out, and the adapters that feed them
*/

pub mod alert_hub;
pub mod config;
pub mod control_center;
pub mod error;
pub mod output_plugins;
pub mod shadow;
pub mod simulation;
pub mod transport;
pub mod vehicle_agent;
