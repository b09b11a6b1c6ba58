//! Agent implementation - one autonomous unit in the swarm
//!
//! An agent owns its mission, transcript and inbox exclusively; everything
//! shared (bus, roster, tool table) arrives through [`SwarmLink`]. The
//! lifecycle loop perceives (drains the mailbox), decides (one generation
//! call), and acts (executes the parsed operations), repeating until the
//! agent terminates itself or the swarm shuts down.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::actions::{parse_actions, Action};
use crate::bus::MessageBus;
use crate::control::{ControlRequest, SwarmEvent};
use crate::error::SwarmError;
use crate::llm::ChatClient;
use crate::protocol::{AgentConfig, AgentId, ChatMessage, Message};
use crate::swarm::Roster;
use crate::toolbox::ToolRegistry;

/// Distinct senders shown in the decision prompt's recent-message window.
const RECENT_SENDER_WINDOW: usize = 5;
/// Tool updates shown in the decision prompt.
const TOOL_UPDATE_WINDOW: usize = 3;
/// Lifecycle cycles between shared-summary refresh requests.
const SUMMARY_REFRESH_CYCLES: u64 = 5;

const SYSTEM_PROMPT: &str = "\
You are an autonomous agent in a multi-agent system. You can spawn other \
agents, communicate, and terminate yourself.

YOUR CAPABILITIES:

1. SPAWN - Create child agents for subtasks
   Format: [SPAWN: <mission description>]
   Use when: the task is complex, needs parallel exploration, or requires specialized focus

2. BROADCAST - Send a message to all agents
   Format: [BROADCAST: <message>]
   Use when: sharing discoveries, coordinating work, announcing findings

3. MESSAGE - Send a direct message to a specific agent
   Format: [MESSAGE <agent_id>: <message>]
   Use when: coordinating with one agent, asking for help, sharing relevant info

4. WAIT - Wait for messages
   Format: [WAIT: 0]
   Use when: expecting responses from agents, need to synchronize
   Note: waits until a message arrives

5. REPORT - Send important findings to the human user
   Format: [REPORT: <message>]
   Use when: sharing final results, important discoveries, or progress

6. TERMINATE - End your existence
   Format: [TERMINATE: <reason>]
   Use when: your work is done, you are redundant, or you reached a dead end

IMPORTANT RULES:
- Be concise (tokens are expensive)
- Spawn agents when you identify parallel work
- Terminate when your specific task is complete
- Check the active agents list before messaging

IDENTITY:
Agent ID: {agent_id}
Mission: {mission}
Parent: {parent}
";

/// Status of a recorded tool invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolStatus {
    Success,
    Error,
}

impl std::fmt::Display for ToolStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToolStatus::Success => f.write_str("success"),
            ToolStatus::Error => f.write_str("error"),
        }
    }
}

/// Local record of one tool invocation, visible to the agent on its next
/// decision step.
#[derive(Debug, Clone)]
pub struct ToolUpdate {
    pub tool: String,
    pub status: ToolStatus,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Local audit record of one REPORT action.
#[derive(Debug, Clone)]
pub struct Report {
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// Shared services every agent is wired to at construction. Children
/// receive a clone of their parent's link, which is how tool tables are
/// inherited down the spawn tree.
#[derive(Clone)]
pub struct SwarmLink {
    pub bus: Arc<MessageBus>,
    pub roster: Arc<Roster>,
    pub client: Arc<dyn ChatClient>,
    pub tools: Arc<ToolRegistry>,
    pub req_tx: mpsc::UnboundedSender<ControlRequest>,
    pub event_tx: mpsc::UnboundedSender<SwarmEvent>,
}

/// A single autonomous agent
pub struct Agent {
    /// Unique identifier
    pub id: AgentId,
    /// Parent agent (None for roots)
    pub parent_id: Option<AgentId>,
    /// Immutable goal assigned at creation
    pub mission: String,
    /// Model configuration, inherited by children
    pub config: AgentConfig,
    /// Creation instant
    pub birth_time: DateTime<Utc>,
    /// Children ids, appended before each spawn request is sent
    children: RwLock<Vec<AgentId>>,
    /// true at birth, flips to false exactly once
    alive: AtomicBool,
    /// Full role-tagged history fed to every generation call
    transcript: RwLock<Vec<ChatMessage>>,
    /// Every message ever delivered to this agent
    inbox: RwLock<Vec<Message>>,
    /// Recorded tool invocations
    tool_updates: RwLock<Vec<ToolUpdate>>,
    /// Recorded REPORT output
    reports: RwLock<Vec<Report>>,
    messages_sent: AtomicU64,
    link: SwarmLink,
}

impl Agent {
    pub fn new(
        id: AgentId,
        parent_id: Option<AgentId>,
        mission: impl Into<String>,
        config: AgentConfig,
        link: SwarmLink,
    ) -> Self {
        let mission = mission.into();
        info!(agent_id = %id, parent = ?parent_id, mission = %mission, "Creating agent");

        Self {
            id,
            parent_id,
            mission,
            config,
            birth_time: Utc::now(),
            children: RwLock::new(Vec::new()),
            alive: AtomicBool::new(true),
            transcript: RwLock::new(Vec::new()),
            inbox: RwLock::new(Vec::new()),
            tool_updates: RwLock::new(Vec::new()),
            reports: RwLock::new(Vec::new()),
            messages_sent: AtomicU64::new(0),
            link,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Force the alive flag down without a termination request. Used by
    /// the orchestrator when an execution unit is stopped externally.
    pub(crate) fn kill(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }

    pub fn children(&self) -> Vec<AgentId> {
        self.children.read().clone()
    }

    pub fn messages_sent(&self) -> u64 {
        self.messages_sent.load(Ordering::SeqCst)
    }

    pub fn inbox(&self) -> Vec<Message> {
        self.inbox.read().clone()
    }

    pub fn reports(&self) -> Vec<Report> {
        self.reports.read().clone()
    }

    pub fn tool_updates(&self) -> Vec<ToolUpdate> {
        self.tool_updates.read().clone()
    }

    /// Transcript snapshot, as handed to the generation call.
    pub fn transcript(&self) -> Vec<ChatMessage> {
        self.transcript.read().clone()
    }

    /// Completed prompt/response exchanges so far.
    pub fn exchanges(&self) -> usize {
        self.transcript.read().len() / 2
    }

    /// Main lifecycle loop: perceive, decide, act, yield.
    pub async fn run(&self) {
        info!(agent_id = %self.id, "Agent loop starting");
        let mut cycle: u64 = 0;

        while self.is_alive() {
            self.check_messages();
            cycle += 1;

            let prompt = self.decision_prompt();
            let response = match self.think(&prompt).await {
                Ok(response) => response,
                Err(e) => {
                    // Fatal to this agent only; the registry stays intact
                    // because the coordinator performs the unregistration.
                    error!(agent_id = %self.id, error = %e, "Generation call failed, agent exiting");
                    self.kill();
                    let _ = self.link.req_tx.send(ControlRequest::Terminate {
                        id: self.id.clone(),
                        reason: format!("generation failure: {e}"),
                    });
                    break;
                }
            };

            // The swarm may have shut down while the call was in flight;
            // a dead agent's decisions are discarded.
            if !self.is_alive() {
                break;
            }

            self.execute_actions(&response).await;

            if cycle % SUMMARY_REFRESH_CYCLES == 0 {
                let _ = self.link.req_tx.send(ControlRequest::Summarize { id: self.id.clone() });
            }

            tokio::time::sleep(self.config.tick).await;
        }

        debug!(agent_id = %self.id, cycles = cycle, "Agent loop exited");
    }

    /// Drain all pending mailbox messages into the inbox.
    pub fn check_messages(&self) -> usize {
        let delivered = self.link.bus.drain(&self.id);
        let count = delivered.len();
        if count > 0 {
            self.inbox.write().extend(delivered);
        }
        count
    }

    /// One generation call over the full transcript plus this prompt.
    /// Both the prompt and the response are appended to the transcript.
    pub async fn think(&self, prompt: &str) -> Result<String, SwarmError> {
        let mut messages = vec![ChatMessage::system(self.system_prompt())];
        messages.extend(self.transcript.read().iter().cloned());
        messages.push(ChatMessage::user(prompt));

        let response = self
            .link
            .client
            .complete(&messages, &self.config.model, self.config.max_tokens)
            .await?;

        let mut transcript = self.transcript.write();
        transcript.push(ChatMessage::user(prompt));
        transcript.push(ChatMessage::assistant(response.clone()));

        Ok(response)
    }

    /// Parse a response and execute its operations in grammar order.
    pub async fn execute_actions(&self, response: &str) {
        for action in parse_actions(response) {
            // Nothing executes on behalf of a dead agent.
            if !self.is_alive() {
                break;
            }
            self.execute(action).await;
        }
    }

    async fn execute(&self, action: Action) {
        match action {
            Action::Spawn(mission) => {
                self.spawn(mission);
            }
            Action::Broadcast(text) => self.broadcast(text),
            Action::Message { to, content } => self.message(to, content),
            Action::Wait(seconds) => {
                // The numeric argument is parsed for compatibility only;
                // the wait is unbounded until a message arrives.
                debug!(agent_id = %self.id, requested = seconds, "Waiting for messages");
                self.link.bus.wait_any(&self.id).await;
            }
            Action::Report(text) => self.report(text),
            Action::Terminate(reason) => self.terminate(&reason),
            Action::Tool { name, args } => self.run_tool(&name, &args),
        }
    }

    /// Request a child agent. The child id is allocated here and recorded
    /// in `children` before the coordinator ever sees the request.
    pub fn spawn(&self, mission: String) -> AgentId {
        let child = AgentId::short();
        self.children.write().push(child.clone());

        if self
            .link
            .req_tx
            .send(ControlRequest::Spawn {
                child: child.clone(),
                parent: self.id.clone(),
                mission,
            })
            .is_err()
        {
            warn!(agent_id = %self.id, "Spawn request dropped: coordinator gone");
        }

        child
    }

    pub fn broadcast(&self, content: String) {
        debug!(agent_id = %self.id, "Broadcasting");
        self.link.bus.publish(Message::broadcast(self.id.clone(), content));
        self.messages_sent.fetch_add(1, Ordering::SeqCst);
    }

    pub fn message(&self, to: AgentId, content: String) {
        debug!(agent_id = %self.id, to = %to, "Sending direct message");
        self.link.bus.publish(Message::direct(self.id.clone(), to, content));
        self.messages_sent.fetch_add(1, Ordering::SeqCst);
    }

    /// Emit human-visible output. Recorded locally, surfaced on the event
    /// channel, never routed through the bus.
    pub fn report(&self, text: String) {
        info!(agent_id = %self.id, report = %text, "REPORT");
        self.reports.write().push(Report { text: text.clone(), timestamp: Utc::now() });
        let _ = self.link.event_tx.send(SwarmEvent::Report { id: self.id.clone(), text });
    }

    /// Flip `alive` and request unregistration. Idempotent: only the
    /// first call sends the request.
    pub fn terminate(&self, reason: &str) {
        if self.alive.swap(false, Ordering::SeqCst) {
            info!(agent_id = %self.id, reason = %reason, "Agent terminating");
            let _ = self.link.req_tx.send(ControlRequest::Terminate {
                id: self.id.clone(),
                reason: reason.to_string(),
            });
        }
    }

    /// Invoke a collaborator tool. Failures are recorded, never raised.
    pub fn run_tool(&self, name: &str, args: &str) {
        let update = match self.link.tools.invoke(name, args) {
            Ok(result) => ToolUpdate {
                tool: name.to_string(),
                status: ToolStatus::Success,
                message: format!("Result: {result}"),
                timestamp: Utc::now(),
            },
            Err(e) => ToolUpdate {
                tool: name.to_string(),
                status: ToolStatus::Error,
                message: e.to_string(),
                timestamp: Utc::now(),
            },
        };

        debug!(agent_id = %self.id, tool = %update.tool, status = %update.status, "Tool update");
        self.tool_updates.write().push(update);
    }

    fn system_prompt(&self) -> String {
        let parent = self
            .parent_id
            .as_ref()
            .map(|p| p.to_string())
            .unwrap_or_else(|| "None".into());

        let mut prompt = SYSTEM_PROMPT
            .replace("{agent_id}", self.id.as_str())
            .replace("{mission}", &self.mission)
            .replace("{parent}", &parent);

        let docs = self.link.tools.docs();
        if !self.link.tools.is_empty() && !docs.is_empty() {
            prompt.push_str(&format!(
                "\nCUSTOM TOOLS AVAILABLE:\n\n{docs}\n\nTo use a tool, format: [TOOL: <tool_name>(<args>)]\n"
            ));
        }

        prompt
    }

    /// Most recent message per distinct sender (up to the window size),
    /// re-ordered chronologically.
    fn recent_messages(&self) -> Vec<String> {
        let inbox = self.inbox.read();
        let mut seen = std::collections::HashSet::new();
        let mut recent = Vec::new();

        for msg in inbox.iter().rev() {
            let from = msg.from.to_string();
            if recent.len() >= RECENT_SENDER_WINDOW {
                break;
            }
            if seen.insert(from.clone()) {
                recent.push(format!("[{from}]: {}", msg.content));
            }
        }

        recent.reverse();
        recent
    }

    fn recent_tool_updates(&self) -> Vec<String> {
        let updates = self.tool_updates.read();
        let skip = updates.len().saturating_sub(TOOL_UPDATE_WINDOW);
        updates
            .iter()
            .skip(skip)
            .map(|u| format!("[Tool {}] {}: {}", u.tool, u.status, u.message))
            .collect()
    }

    /// Build the per-cycle decision prompt from the peer roster, the
    /// recent-message window, and pending tool updates.
    pub fn decision_prompt(&self) -> String {
        let peers = self.link.roster.peers_excluding(&self.id);
        let recent = self.recent_messages();
        let tool_updates = self.recent_tool_updates();

        let mut parts = Vec::new();

        if peers.is_empty() {
            parts.push("Active agents in system:\n  None (you are alone)".to_string());
        } else {
            let lines: Vec<String> = peers.iter().map(|p| format!("  - {p}")).collect();
            parts.push(format!("Active agents in system:\n{}", lines.join("\n")));
        }

        if !recent.is_empty() {
            parts.push(format!("Recent messages:\n{}", recent.join("\n")));
        }

        if !tool_updates.is_empty() {
            parts.push(format!("Recent tool updates:\n{}", tool_updates.join("\n")));
        }

        let context = parts.join("\n\n");

        if !recent.is_empty() || !tool_updates.is_empty() {
            format!(
                "{context}\n\n\
                 Based on your mission, these messages, and tool updates, what should you do next?\n\
                 Consider: are others already working on parts of this? Do you need to coordinate?\n\
                 Remember your capabilities: SPAWN, BROADCAST, MESSAGE, WAIT, REPORT, TERMINATE."
            )
        } else {
            format!(
                "{context}\n\n\
                 You're working on: {}\n\n\
                 What's your first step? Consider if you need to SPAWN helpers for parallel work.\n\
                 Remember to REPORT important findings to the human.",
                self.mission
            )
        }
    }
}

/// Handle to an agent for external interaction
#[derive(Clone)]
pub struct AgentHandle {
    inner: Arc<Agent>,
}

impl AgentHandle {
    pub fn new(agent: Agent) -> Self {
        Self { inner: Arc::new(agent) }
    }

    pub fn id(&self) -> &AgentId {
        &self.inner.id
    }
}

impl std::fmt::Debug for AgentHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentHandle").field("id", &self.inner.id).finish()
    }
}

impl std::ops::Deref for AgentHandle {
    type Target = Agent;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}
