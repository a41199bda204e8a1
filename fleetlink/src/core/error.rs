/*!
Error types for the adapter layer
*/

use fleetlink_protocol::ProtocolError;

use crate::core::{config::ConfigError, transport::TransportError};

/// Anything that can go wrong between the transport and the core
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
