//! Swarm error types

use thiserror::Error;

use crate::protocol::AgentId;

/// Errors that can occur in the swarm
#[derive(Debug, Error)]
pub enum SwarmError {
    /// Agent not found in the registry
    #[error("Agent not found: {0}")]
    AgentNotFound(AgentId),

    /// Agent spawn denied
    #[error("Spawn denied: {0}")]
    SpawnDenied(String),

    /// Generation call failure (quota, network). Fatal to the caller's
    /// current loop iteration; never retried internally.
    #[error("Generation call failed: {0}")]
    Generation(String),

    /// Tool error
    #[error("Tool error: {0}")]
    Tool(#[from] crate::toolbox::ToolError),

    /// Control channel error
    #[error("Channel error: {0}")]
    Channel(#[from] crate::control::ChannelError),
}
