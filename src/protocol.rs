//! Shared data model for the swarm
//!
//! Everything that crosses an agent boundary lives here: identifiers,
//! bus messages, and the role-tagged entries fed to the generation call.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque short identifier for a single agent.
///
/// Generated ids are the first 8 hex characters of a v4 UUID; the
/// distinguished genesis agent gets a caller-supplied name instead.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(String);

impl AgentId {
    /// Allocate a fresh short id.
    pub fn short() -> Self {
        let mut hex = Uuid::new_v4().simple().to_string();
        hex.truncate(8);
        Self(hex)
    }

    /// Use a caller-supplied name as the id (e.g. `"genesis"`).
    pub fn named(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Originator of a bus message.
///
/// `System` marks synthesized notices (delivery failures), `Manager`
/// marks orchestrator-originated notices (shutdown).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    Agent(AgentId),
    System,
    Manager,
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sender::Agent(id) => write!(f, "{id}"),
            Sender::System => f.write_str("system"),
            Sender::Manager => f.write_str("manager"),
        }
    }
}

/// Destination of a bus message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recipient {
    Agent(AgentId),
    Broadcast,
}

impl fmt::Display for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recipient::Agent(id) => write!(f, "{id}"),
            Recipient::Broadcast => f.write_str("broadcast"),
        }
    }
}

/// A message routed through the bus. Immutable once published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub from: Sender,
    pub to: Recipient,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn direct(from: AgentId, to: AgentId, content: impl Into<String>) -> Self {
        Self {
            from: Sender::Agent(from),
            to: Recipient::Agent(to),
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn broadcast(from: AgentId, content: impl Into<String>) -> Self {
        Self {
            from: Sender::Agent(from),
            to: Recipient::Broadcast,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    /// Synthesized system notice delivered outside the global history.
    pub fn system(to: AgentId, content: impl Into<String>) -> Self {
        Self {
            from: Sender::System,
            to: Recipient::Agent(to),
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    /// Orchestrator-originated broadcast (e.g. shutdown notice).
    pub fn manager_broadcast(content: impl Into<String>) -> Self {
        Self {
            from: Sender::Manager,
            to: Recipient::Broadcast,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Role tag on a transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One role-tagged entry in an agent's transcript, in the shape the
/// generation call consumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// Model configuration an agent runs with. Children inherit their
/// parent's config unchanged.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Model identifier handed to the generation call.
    pub model: String,
    /// Output-length bound for decision calls.
    pub max_tokens: u32,
    /// Pause between lifecycle iterations.
    pub tick: std::time::Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.5-flash".into(),
            max_tokens: 2048,
            tick: std::time::Duration::from_millis(100),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_id_shape() {
        let id = AgentId::short();
        assert_eq!(id.as_str().len(), 8);
        assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_short_ids_distinct() {
        assert_ne!(AgentId::short(), AgentId::short());
    }

    #[test]
    fn test_named_id() {
        let id = AgentId::named("genesis");
        assert_eq!(id.as_str(), "genesis");
    }

    #[test]
    fn test_sentinel_display() {
        assert_eq!(Sender::System.to_string(), "system");
        assert_eq!(Sender::Manager.to_string(), "manager");
        assert_eq!(Recipient::Broadcast.to_string(), "broadcast");
    }

    #[test]
    fn test_message_constructors() {
        let a = AgentId::named("a");
        let b = AgentId::named("b");

        let direct = Message::direct(a.clone(), b.clone(), "hi");
        assert_eq!(direct.from, Sender::Agent(a.clone()));
        assert_eq!(direct.to, Recipient::Agent(b));

        let bcast = Message::broadcast(a.clone(), "all");
        assert_eq!(bcast.to, Recipient::Broadcast);

        let notice = Message::system(a, "failed");
        assert_eq!(notice.from, Sender::System);
    }
}
