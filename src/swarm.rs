//! Swarm state - registry, roster, and lifecycle task management
//!
//! The [`Swarm`] owns the only cross-agent shared state: the registry of
//! live agents, the rolling summary map, and the bus. Structural mutation
//! happens exclusively on the orchestrator's coordinator task; agents get
//! a read-only [`Roster`] view of their peers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::agent::{Agent, AgentHandle, SwarmLink};
use crate::bus::MessageBus;
use crate::control::{ControlRequest, SwarmEvent};
use crate::error::SwarmError;
use crate::llm::ChatClient;
use crate::protocol::{AgentConfig, AgentId, ChatMessage};
use crate::toolbox::ToolRegistry;

/// Output-length bound for summarization calls.
const SUMMARY_MAX_TOKENS: u32 = 150;
/// Characters of a peer's summary shown in the roster view.
const ROSTER_SUMMARY_CHARS: usize = 60;

const SUMMARIZER_SYSTEM: &str = "You are a concise summarizer. Extract only \
the KEY findings, decisions, and current status. Be extremely brief.";

/// Shared read view of live peers.
///
/// Updated only by the coordinator; agents read it when building their
/// decision prompts, seeing each peer's rolling summary instead of its
/// full transcript.
pub struct Roster {
    entries: RwLock<HashMap<AgentId, PeerInfo>>,
}

struct PeerInfo {
    mission: String,
    summary: String,
}

impl Roster {
    pub fn new() -> Self {
        Self { entries: RwLock::new(HashMap::new()) }
    }

    pub(crate) fn insert(&self, id: AgentId, mission: String, summary: String) {
        self.entries.write().insert(id, PeerInfo { mission, summary });
    }

    pub(crate) fn set_summary(&self, id: &AgentId, summary: String) {
        if let Some(entry) = self.entries.write().get_mut(id) {
            entry.summary = summary;
        }
    }

    pub(crate) fn remove(&self, id: &AgentId) {
        self.entries.write().remove(id);
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Formatted `id: summary` lines for every peer except `id`, sorted
    /// by id for stable prompts.
    pub fn peers_excluding(&self, id: &AgentId) -> Vec<String> {
        let entries = self.entries.read();
        let mut peers: Vec<(&AgentId, &PeerInfo)> =
            entries.iter().filter(|(peer, _)| *peer != id).collect();
        peers.sort_by(|a, b| a.0.as_str().cmp(b.0.as_str()));

        peers
            .into_iter()
            .map(|(peer, info)| {
                let source = if info.summary.is_empty() { &info.mission } else { &info.summary };
                let mut line: String = source.chars().take(ROSTER_SUMMARY_CHARS).collect();
                if line.chars().count() < source.chars().count() {
                    line.push_str("...");
                }
                format!("{peer}: {line}")
            })
            .collect()
    }
}

impl Default for Roster {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time swarm metrics.
#[derive(Debug, Clone, Serialize)]
pub struct SwarmStatus {
    pub runtime_secs: i64,
    pub active_agents: usize,
    pub total_spawned: u64,
    pub total_died: u64,
    pub history_len: usize,
}

impl std::fmt::Display for SwarmStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "runtime={}s active={}/{} died={} history={}",
            self.runtime_secs,
            self.active_agents,
            self.total_spawned,
            self.total_died,
            self.history_len
        )
    }
}

/// The registry of live agents and everything they share.
pub struct Swarm {
    /// All registered agents
    registry: RwLock<HashMap<AgentId, AgentHandle>>,
    /// Rolling summaries, retained after unregistration for reporting
    summaries: RwLock<HashMap<AgentId, String>>,
    roster: Arc<Roster>,
    bus: Arc<MessageBus>,
    tools: Arc<ToolRegistry>,
    client: Arc<dyn ChatClient>,
    /// Config inherited by the genesis agent (children inherit their
    /// parent's copy)
    config: AgentConfig,
    req_tx: mpsc::UnboundedSender<ControlRequest>,
    event_tx: mpsc::UnboundedSender<SwarmEvent>,
    /// Lifecycle tasks keyed by agent id
    tasks: Mutex<HashMap<AgentId, JoinHandle<()>>>,
    running: AtomicBool,
    total_spawned: AtomicU64,
    total_died: AtomicU64,
    started_at: RwLock<Option<DateTime<Utc>>>,
}

impl Swarm {
    pub fn new(
        client: Arc<dyn ChatClient>,
        tools: Arc<ToolRegistry>,
        config: AgentConfig,
        req_tx: mpsc::UnboundedSender<ControlRequest>,
        event_tx: mpsc::UnboundedSender<SwarmEvent>,
    ) -> Self {
        Self {
            registry: RwLock::new(HashMap::new()),
            summaries: RwLock::new(HashMap::new()),
            roster: Arc::new(Roster::new()),
            bus: Arc::new(MessageBus::new()),
            tools,
            client,
            config,
            req_tx,
            event_tx,
            tasks: Mutex::new(HashMap::new()),
            running: AtomicBool::new(false),
            total_spawned: AtomicU64::new(0),
            total_died: AtomicU64::new(0),
            started_at: RwLock::new(None),
        }
    }

    pub fn bus(&self) -> &Arc<MessageBus> {
        &self.bus
    }

    pub fn roster(&self) -> &Arc<Roster> {
        &self.roster
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn link(&self) -> SwarmLink {
        SwarmLink {
            bus: Arc::clone(&self.bus),
            roster: Arc::clone(&self.roster),
            client: Arc::clone(&self.client),
            tools: Arc::clone(&self.tools),
            req_tx: self.req_tx.clone(),
            event_tx: self.event_tx.clone(),
        }
    }

    /// Build an agent wired into this swarm. Registration is separate so
    /// the coordinator controls when the agent becomes visible.
    pub fn build_agent(
        &self,
        id: AgentId,
        parent_id: Option<AgentId>,
        mission: impl Into<String>,
        config: AgentConfig,
    ) -> Agent {
        Agent::new(id, parent_id, mission, config, self.link())
    }

    /// Wire an agent to the bus and registry and, if the swarm is
    /// running, start its lifecycle task.
    pub fn register_agent(&self, agent: Agent) -> AgentHandle {
        let id = agent.id.clone();
        let mission = agent.mission.clone();
        let parent = agent.parent_id.clone();
        let handle = AgentHandle::new(agent);

        self.bus.register(&id);
        let placeholder = format!("New agent working on: {mission}");
        self.roster.insert(id.clone(), mission.clone(), placeholder.clone());
        self.summaries.write().insert(id.clone(), placeholder);
        self.registry.write().insert(id.clone(), handle.clone());
        self.total_spawned.fetch_add(1, Ordering::SeqCst);

        let _ = self.event_tx.send(SwarmEvent::AgentSpawned {
            id: id.clone(),
            parent,
            mission: mission.clone(),
        });

        if self.is_running() {
            self.start_task(&handle);
        }

        info!(agent_id = %id, mission = %mission, "Registered agent");
        handle
    }

    /// Create and register a child for a spawn request. The child id was
    /// allocated by the parent; the parent's `children` already lists it.
    pub fn spawn_child(
        &self,
        child: AgentId,
        parent: &AgentId,
        mission: String,
    ) -> Result<AgentHandle, SwarmError> {
        let parent_handle = self
            .get_agent(parent)
            .ok_or_else(|| SwarmError::AgentNotFound(parent.clone()))?;

        if !parent_handle.is_alive() {
            return Err(SwarmError::SpawnDenied(format!(
                "parent {parent} terminated before the spawn was processed"
            )));
        }

        let agent = self.build_agent(
            child,
            Some(parent.clone()),
            mission,
            parent_handle.config.clone(),
        );
        Ok(self.register_agent(agent))
    }

    /// Remove an agent: final summary, lifecycle task, mailbox, registry
    /// entry. Idempotent; returns false if the id was already gone.
    pub async fn unregister_agent(&self, id: &AgentId, reason: &str) -> bool {
        let handle = match self.get_agent(id) {
            Some(h) => h,
            None => {
                debug!(agent_id = %id, "Unregister for unknown agent ignored");
                return false;
            }
        };

        // Final summary while the transcript is still warm.
        if let Err(e) = self.update_summary(id).await {
            warn!(agent_id = %id, error = %e, "Final summary failed");
        }

        handle.kill();

        if let Some(task) = self.tasks.lock().remove(id) {
            task.abort();
        }

        self.bus.unregister(id);
        self.roster.remove(id);
        self.registry.write().remove(id);
        self.total_died.fetch_add(1, Ordering::SeqCst);

        let _ = self.event_tx.send(SwarmEvent::AgentTerminated {
            id: id.clone(),
            reason: reason.to_string(),
        });

        info!(agent_id = %id, reason = %reason, "Unregistered agent");
        true
    }

    /// Refresh the shared rolling summary for one agent.
    ///
    /// No-op when the transcript holds fewer than two exchanges; there is
    /// nothing worth compressing yet.
    pub async fn update_summary(&self, id: &AgentId) -> Result<(), SwarmError> {
        let handle = match self.get_agent(id) {
            Some(h) => h,
            None => return Ok(()),
        };

        if handle.exchanges() < 2 {
            return Ok(());
        }

        let history: String = handle
            .transcript()
            .iter()
            .map(|entry| format!("{:?}: {}\n", entry.role, entry.content))
            .collect();

        let messages = vec![
            ChatMessage::system(SUMMARIZER_SYSTEM),
            ChatMessage::user(format!(
                "Summarize this agent's work in 2-3 sentences MAX:\n\n\
                 Agent ID: {id}\n\
                 Mission: {mission}\n\
                 Conversation history:\n{history}\n\
                 Focus on: What has been discovered? What is being worked on now? \
                 What decisions were made?",
                mission = handle.mission,
            )),
        ];

        let summary = self
            .client
            .complete(&messages, &handle.config.model, SUMMARY_MAX_TOKENS)
            .await?;
        let summary = summary.trim().to_string();

        self.summaries.write().insert(id.clone(), summary.clone());
        self.roster.set_summary(id, summary);
        debug!(agent_id = %id, "Summary refreshed");
        Ok(())
    }

    /// Launch lifecycle tasks for every registered agent and accept new
    /// ones as they register.
    pub fn start_all(&self) {
        self.running.store(true, Ordering::SeqCst);
        *self.started_at.write() = Some(Utc::now());

        let agents: Vec<AgentHandle> = self.registry.read().values().cloned().collect();
        for handle in agents {
            self.start_task(&handle);
        }
    }

    fn start_task(&self, handle: &AgentHandle) {
        let mut tasks = self.tasks.lock();
        if tasks.contains_key(handle.id()) {
            return;
        }
        let task_handle = handle.clone();
        let task = tokio::spawn(async move { task_handle.run().await });
        tasks.insert(handle.id().clone(), task);
    }

    /// Force-stop every execution unit without unregistering anyone.
    /// Used by shutdown after the grace period.
    pub fn halt_all(&self) {
        self.running.store(false, Ordering::SeqCst);

        for handle in self.registry.read().values() {
            handle.kill();
        }
        for (_, task) in self.tasks.lock().drain() {
            task.abort();
        }
    }

    pub fn get_agent(&self, id: &AgentId) -> Option<AgentHandle> {
        self.registry.read().get(id).cloned()
    }

    pub fn agent_count(&self) -> usize {
        self.registry.read().len()
    }

    /// Ids of registered agents that are still alive.
    pub fn active_agents(&self) -> Vec<AgentId> {
        self.registry
            .read()
            .values()
            .filter(|h| h.is_alive())
            .map(|h| h.id.clone())
            .collect()
    }

    pub fn summary_of(&self, id: &AgentId) -> Option<String> {
        self.summaries.read().get(id).cloned()
    }

    /// Snapshot the registry into spawn-tree seeds.
    pub fn tree(&self) -> crate::tree::SpawnTree {
        let summaries = self.summaries.read();
        let seeds = self
            .registry
            .read()
            .values()
            .map(|handle| crate::tree::TreeSeed {
                id: handle.id.clone(),
                parent_id: handle.parent_id.clone(),
                children: handle.children(),
                mission: handle.mission.clone(),
                alive: handle.is_alive(),
                messages_sent: handle.messages_sent(),
                summary: summaries.get(&handle.id).cloned().unwrap_or_default(),
            })
            .collect();
        crate::tree::SpawnTree::build(seeds)
    }

    pub fn status(&self) -> SwarmStatus {
        let started_at = *self.started_at.read();
        let runtime_secs = started_at
            .map(|t| (Utc::now() - t).num_seconds())
            .unwrap_or(0);

        SwarmStatus {
            runtime_secs,
            active_agents: self.active_agents().len(),
            total_spawned: self.total_spawned.load(Ordering::SeqCst),
            total_died: self.total_died.load(Ordering::SeqCst),
            history_len: self.bus.history_len(),
        }
    }

    pub fn default_config(&self) -> &AgentConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedClient;
    use std::time::Duration;

    fn swarm_with(responses: Vec<&str>) -> (Arc<Swarm>, Arc<ScriptedClient>) {
        let client = Arc::new(ScriptedClient::new(responses));
        let (req_tx, _req_rx) = mpsc::unbounded_channel();
        let (event_tx, _event_rx) = mpsc::unbounded_channel();
        let swarm = Swarm::new(
            Arc::clone(&client) as Arc<dyn ChatClient>,
            Arc::new(ToolRegistry::new()),
            AgentConfig { tick: Duration::from_millis(10), ..Default::default() },
            req_tx,
            event_tx,
        );
        (Arc::new(swarm), client)
    }

    fn genesis(swarm: &Swarm) -> AgentHandle {
        let agent = swarm.build_agent(
            AgentId::named("genesis"),
            None,
            "bootstrap the swarm",
            swarm.default_config().clone(),
        );
        swarm.register_agent(agent)
    }

    #[tokio::test]
    async fn test_register_wires_everything() {
        let (swarm, _) = swarm_with(vec![]);
        let handle = genesis(&swarm);

        assert_eq!(swarm.agent_count(), 1);
        assert!(swarm.bus().is_registered(handle.id()));
        assert_eq!(swarm.roster().len(), 1);
        assert_eq!(
            swarm.summary_of(handle.id()).unwrap(),
            "New agent working on: bootstrap the swarm"
        );
    }

    #[tokio::test]
    async fn test_unregister_removes_everything() {
        let (swarm, _) = swarm_with(vec![]);
        let handle = genesis(&swarm);

        assert!(swarm.unregister_agent(handle.id(), "done").await);

        assert_eq!(swarm.agent_count(), 0);
        assert!(!swarm.bus().is_registered(handle.id()));
        assert_eq!(swarm.roster().len(), 0);
        assert!(!handle.is_alive());
        assert_eq!(swarm.status().total_died, 1);
        // Summary survives for reporting.
        assert!(swarm.summary_of(handle.id()).is_some());

        // Second unregister is a no-op.
        assert!(!swarm.unregister_agent(handle.id(), "again").await);
        assert_eq!(swarm.status().total_died, 1);
    }

    #[tokio::test]
    async fn test_spawn_child_inherits_and_links() {
        let (swarm, _) = swarm_with(vec![]);
        let parent = genesis(&swarm);

        let child_id = AgentId::short();
        let child = swarm
            .spawn_child(child_id.clone(), parent.id(), "dig into details".into())
            .unwrap();

        assert_eq!(child.parent_id.as_ref(), Some(parent.id()));
        assert_eq!(child.config.model, parent.config.model);
        assert_eq!(swarm.agent_count(), 2);
    }

    #[tokio::test]
    async fn test_spawn_child_unknown_parent() {
        let (swarm, _) = swarm_with(vec![]);
        let err = swarm
            .spawn_child(AgentId::short(), &AgentId::named("nobody"), "orphan".into())
            .unwrap_err();
        assert!(matches!(err, SwarmError::AgentNotFound(_)));
    }

    #[tokio::test]
    async fn test_spawn_child_dead_parent_denied() {
        let (swarm, _) = swarm_with(vec![]);
        let parent = genesis(&swarm);
        parent.kill();

        let err = swarm
            .spawn_child(AgentId::short(), parent.id(), "too late".into())
            .unwrap_err();
        assert!(matches!(err, SwarmError::SpawnDenied(_)));
    }

    #[tokio::test]
    async fn test_update_summary_skips_short_transcripts() {
        let (swarm, client) = swarm_with(vec!["one response"]);
        let handle = genesis(&swarm);

        // One exchange only: below the summarization threshold.
        handle.think("first step?").await.unwrap();
        swarm.update_summary(handle.id()).await.unwrap();

        assert_eq!(client.calls(), 1);
        assert!(swarm
            .summary_of(handle.id())
            .unwrap()
            .starts_with("New agent working on"));
    }

    #[tokio::test]
    async fn test_update_summary_stores_result() {
        let (swarm, client) =
            swarm_with(vec!["reply one", "reply two", "  Compressed progress.  "]);
        let handle = genesis(&swarm);

        handle.think("step one?").await.unwrap();
        handle.think("step two?").await.unwrap();
        swarm.update_summary(handle.id()).await.unwrap();

        assert_eq!(client.calls(), 3);
        assert_eq!(swarm.summary_of(handle.id()).unwrap(), "Compressed progress.");
        // Peers see the refreshed summary, not the mission.
        let view = swarm.roster().peers_excluding(&AgentId::named("other"));
        assert_eq!(view.len(), 1);
        assert!(view[0].contains("Compressed progress."));
    }

    #[tokio::test]
    async fn test_tree_reflects_lineage() {
        let (swarm, _) = swarm_with(vec![]);
        let parent = genesis(&swarm);
        // The parent records the child id, then the coordinator registers it.
        let child_id = parent.spawn("subtask".to_string());
        swarm
            .spawn_child(child_id.clone(), parent.id(), "subtask".into())
            .unwrap();

        let tree = swarm.tree();
        assert_eq!(tree.len(), 2);
        assert_eq!(tree.roots().len(), 1);
        assert_eq!(tree.depth(&child_id), Some(1));
    }

    #[tokio::test]
    async fn test_roster_excludes_self() {
        let (swarm, _) = swarm_with(vec![]);
        let parent = genesis(&swarm);
        let child_id = AgentId::short();
        swarm
            .spawn_child(child_id.clone(), parent.id(), "other work".into())
            .unwrap();

        let view = swarm.roster().peers_excluding(parent.id());
        assert_eq!(view.len(), 1);
        assert!(view[0].starts_with(child_id.as_str()));
    }
}
