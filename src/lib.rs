//! # Drove
//!
//! Self-organizing swarm of LLM agents - spawn, gossip, converge.
//!
//! Every agent is an autonomous unit driven by a text-generation call. It
//! reads its mailbox, decides, and acts: spawning children for subtasks,
//! messaging or broadcasting to peers, invoking collaborator tools, and
//! eventually terminating itself. The orchestrator tracks the spawn tree,
//! compresses each agent's history into a rolling summary siblings can
//! see, and detects convergence once no live agents remain.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          ORCHESTRATOR                            │
//! │   ┌────────────┐   ┌─────────────┐   ┌───────────────────────┐   │
//! │   │ Registry   │   │ Coordinator │   │ Summaries / Roster    │   │
//! │   └────────────┘   └──────▲──────┘   └───────────────────────┘   │
//! └───────────────────────────┼──────────────────────────────────────┘
//!              control requests (spawn / terminate / summarize)
//!          ┌─────────────────┼─────────────────┐
//!          │                 │                 │
//!     ┌────┴────┐       ┌────┴────┐       ┌────┴────┐
//!     │ genesis │       │  agent  │       │  agent  │   ... grows and
//!     └────┬────┘       └────┬────┘       └────┬────┘       shrinks
//!          │                 │                 │
//!          └────────────┬────┴─────────────────┘
//!                  ┌────▼────────┐
//!                  │ MESSAGE BUS │  one FIFO mailbox per agent,
//!                  └─────────────┘  broadcast + direct + bounces
//! ```
//!
//! ## Key Concepts
//!
//! - **Agent**: one unit in the swarm; owns a mission, transcript, mailbox
//! - **Mission**: immutable natural-language goal assigned at creation
//! - **Action grammar**: bracketed tags in a response become operations
//! - **Spawn tree**: parent/child lineage, reconstructed for inspection
//! - **Convergence**: the state where zero live agents remain

pub mod actions;
pub mod agent;
pub mod bus;
pub mod control;
pub mod error;
pub mod llm;
pub mod orchestrator;
pub mod protocol;
pub mod swarm;
pub mod toolbox;
pub mod tree;

pub use actions::{parse_actions, Action};
pub use agent::{Agent, AgentHandle, SwarmLink};
pub use bus::MessageBus;
pub use control::{ChannelPair, ControlRequest, SwarmChannel, SwarmEvent};
pub use error::SwarmError;
pub use llm::ChatClient;
pub use orchestrator::{Orchestrator, GENESIS_ID};
pub use swarm::{Roster, Swarm, SwarmStatus};
pub use toolbox::{ToolError, ToolRegistry};
pub use tree::{SpawnTree, TreeNode};

// Commonly used protocol types
pub use protocol::{AgentConfig, AgentId, ChatMessage, Message, Recipient, Role, Sender};
