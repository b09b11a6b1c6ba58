//! Main orchestrator - owns the swarm and serializes registry mutation
//!
//! Agents run as independent tokio tasks, so spawn/terminate requests are
//! never applied from the requesting task. They flow through the control
//! channel into one coordinator task, the sole structural mutator of the
//! registry. Stopping is a broadcast shutdown notice, a grace period for
//! voluntary termination, then a forced halt of whatever remains.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn, instrument};

use crate::agent::AgentHandle;
use crate::control::{ChannelPair, ControlRequest, SwarmChannel, SwarmEvent};
use crate::llm::ChatClient;
use crate::protocol::{AgentConfig, AgentId, Message};
use crate::swarm::{Swarm, SwarmStatus};
use crate::toolbox::ToolRegistry;
use crate::tree::SpawnTree;

/// Reserved id of the distinguished root agent.
pub const GENESIS_ID: &str = "genesis";

/// Time agents get to react to the shutdown broadcast before their tasks
/// are aborted.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);
/// Convergence poll interval.
const CONVERGENCE_POLL: Duration = Duration::from_millis(500);

/// The swarm orchestrator
///
/// Tracks the registry through [`Swarm`], runs the coordinator that
/// applies control requests, and exposes convergence and shutdown
/// control.
pub struct Orchestrator {
    swarm: Arc<Swarm>,
    /// Taken by the coordinator on start
    req_rx: Mutex<Option<mpsc::UnboundedReceiver<ControlRequest>>>,
    coordinator: Mutex<Option<JoinHandle<()>>>,
    event_tx: mpsc::UnboundedSender<SwarmEvent>,
}

impl Orchestrator {
    /// Create a new orchestrator with the given channel pair.
    pub fn new(
        client: Arc<dyn ChatClient>,
        tools: Arc<ToolRegistry>,
        config: AgentConfig,
        channels: ChannelPair,
    ) -> Self {
        let swarm = Swarm::new(
            client,
            tools,
            config,
            channels.req_tx,
            channels.event_tx.clone(),
        );

        Self {
            swarm: Arc::new(swarm),
            req_rx: Mutex::new(Some(channels.req_rx)),
            coordinator: Mutex::new(None),
            event_tx: channels.event_tx,
        }
    }

    /// Create an orchestrator and return a channel for communication.
    pub fn with_channel(
        client: Arc<dyn ChatClient>,
        tools: Arc<ToolRegistry>,
        config: AgentConfig,
    ) -> (Self, SwarmChannel) {
        let (channel, pair) = SwarmChannel::new();
        (Self::new(client, tools, config, pair), channel)
    }

    /// Register the distinguished root agent.
    pub fn create_genesis(&self, mission: impl Into<String>) -> AgentHandle {
        let agent = self.swarm.build_agent(
            AgentId::named(GENESIS_ID),
            None,
            mission,
            self.swarm.default_config().clone(),
        );
        self.swarm.register_agent(agent)
    }

    /// Transition to running: launch the coordinator and a lifecycle task
    /// for every already-registered agent.
    #[instrument(skip(self))]
    pub fn start(&self) {
        if self.swarm.is_running() {
            return;
        }

        let req_rx = match self.req_rx.lock().take() {
            Some(rx) => rx,
            None => {
                warn!("Orchestrator started twice; ignoring");
                return;
            }
        };

        info!(agents = self.swarm.agent_count(), "Starting swarm orchestrator");

        let swarm = Arc::clone(&self.swarm);
        *self.coordinator.lock() = Some(tokio::spawn(coordinate(swarm, req_rx)));

        self.swarm.start_all();
    }

    /// Broadcast a shutdown notice, grant a grace period for voluntary
    /// termination, then force-stop every remaining execution unit.
    ///
    /// Safe to call while agents are mid-decision: an in-flight
    /// generation call completes, and the agent discards its actions once
    /// it observes it is no longer alive.
    #[instrument(skip(self))]
    pub async fn stop(&self) {
        info!("Stopping swarm orchestrator");

        let _ = self.event_tx.send(SwarmEvent::Shutdown);
        self.swarm.bus().publish(Message::manager_broadcast("SYSTEM SHUTDOWN"));

        tokio::time::sleep(SHUTDOWN_GRACE).await;

        self.swarm.halt_all();
        if let Some(coordinator) = self.coordinator.lock().take() {
            coordinator.abort();
        }

        info!(status = %self.swarm.status(), "Swarm orchestrator stopped");
    }

    /// Poll until no live agents remain (true) or the timeout elapses
    /// (false).
    pub async fn wait_for_convergence(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            if self.swarm.active_agents().is_empty() {
                info!("All agents terminated - swarm converged");
                return true;
            }

            if tokio::time::Instant::now() >= deadline {
                info!("Convergence timeout reached");
                return false;
            }

            tokio::time::sleep(CONVERGENCE_POLL).await;
        }
    }

    /// Spawn tree over currently registered agents, for inspection only.
    pub fn tree(&self) -> SpawnTree {
        self.swarm.tree()
    }

    pub fn status(&self) -> SwarmStatus {
        self.swarm.status()
    }

    pub fn active_agents(&self) -> Vec<AgentId> {
        self.swarm.active_agents()
    }

    /// Shared swarm state, for inspection by front ends.
    pub fn swarm(&self) -> &Arc<Swarm> {
        &self.swarm
    }
}

/// Coordinator loop: the single consumer of control requests and the only
/// execution context that mutates registry structure.
async fn coordinate(swarm: Arc<Swarm>, mut req_rx: mpsc::UnboundedReceiver<ControlRequest>) {
    debug!("Coordinator started");

    while let Some(request) = req_rx.recv().await {
        match request {
            ControlRequest::Spawn { child, parent, mission } => {
                if let Err(e) = swarm.spawn_child(child.clone(), &parent, mission) {
                    warn!(child = %child, parent = %parent, error = %e, "Spawn request rejected");
                }
            }
            ControlRequest::Terminate { id, reason } => {
                swarm.unregister_agent(&id, &reason).await;
            }
            ControlRequest::Summarize { id } => {
                if let Err(e) = swarm.update_summary(&id).await {
                    warn!(agent_id = %id, error = %e, "Summary refresh failed");
                }
            }
        }
    }

    debug!("Coordinator stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedClient;

    fn orchestrator_with(client: ScriptedClient) -> (Orchestrator, SwarmChannel) {
        Orchestrator::with_channel(
            Arc::new(client),
            Arc::new(ToolRegistry::new()),
            AgentConfig { tick: Duration::from_millis(10), ..Default::default() },
        )
    }

    fn drain_events(channel: &SwarmChannel) -> Vec<SwarmEvent> {
        let mut events = Vec::new();
        while let Some(event) = channel.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_create_genesis_registers_root() {
        let (orchestrator, channel) = orchestrator_with(ScriptedClient::new(vec![]));
        let genesis = orchestrator.create_genesis("ping");

        assert_eq!(genesis.id(), &AgentId::named(GENESIS_ID));
        assert_eq!(orchestrator.active_agents(), vec![AgentId::named(GENESIS_ID)]);

        let tree = orchestrator.tree();
        assert_eq!(tree.roots().len(), 1);
        assert_eq!(tree.roots()[0].id, AgentId::named(GENESIS_ID));

        let events = drain_events(&channel);
        assert!(matches!(
            events.first(),
            Some(SwarmEvent::AgentSpawned { parent: None, .. })
        ));
    }

    #[tokio::test]
    async fn test_ping_mission_converges() {
        let (orchestrator, _channel) =
            orchestrator_with(ScriptedClient::new(vec!["[TERMINATE: ping complete]"]));
        orchestrator.create_genesis("ping");
        orchestrator.start();

        assert!(orchestrator.wait_for_convergence(Duration::from_secs(30)).await);

        // Give the coordinator a beat to process the unregistration.
        tokio::time::sleep(Duration::from_millis(100)).await;
        let status = orchestrator.status();
        assert_eq!(status.active_agents, 0);
        assert_eq!(status.total_spawned, 1);
        assert_eq!(status.total_died, 1);
        assert_eq!(orchestrator.swarm().agent_count(), 0);
    }

    #[tokio::test]
    async fn test_convergence_times_out_while_agent_waits() {
        let (orchestrator, _channel) =
            orchestrator_with(ScriptedClient::new(vec![]).with_fallback("[WAIT: 0]"));
        orchestrator.create_genesis("wait forever");
        orchestrator.start();

        assert!(!orchestrator.wait_for_convergence(Duration::from_millis(600)).await);

        orchestrator.stop().await;
        assert!(orchestrator.active_agents().is_empty());
    }

    #[tokio::test]
    async fn test_message_to_unregistered_id_bounces_to_sender() {
        let (orchestrator, _channel) =
            orchestrator_with(ScriptedClient::new(vec!["[MESSAGE ghost: are you there?]"]));
        let genesis = orchestrator.create_genesis("find ghost");
        orchestrator.start();

        assert!(orchestrator.wait_for_convergence(Duration::from_secs(30)).await);

        let inbox = genesis.inbox();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].from, crate::protocol::Sender::System);
        assert!(inbox[0].content.contains("ghost"));
        // Failure notices never enter the global history.
        assert_eq!(orchestrator.swarm().bus().history_len(), 0);
    }

    #[tokio::test]
    async fn test_spawned_child_joins_and_swarm_converges() {
        let (orchestrator, channel) =
            orchestrator_with(ScriptedClient::new(vec!["[SPAWN: investigate leads]"]));
        let genesis = orchestrator.create_genesis("delegate everything");
        orchestrator.start();

        assert!(orchestrator.wait_for_convergence(Duration::from_secs(30)).await);
        tokio::time::sleep(Duration::from_millis(100)).await;

        let status = orchestrator.status();
        assert_eq!(status.total_spawned, 2);
        assert_eq!(status.total_died, 2);

        let children = genesis.children();
        assert_eq!(children.len(), 1);

        let spawned: Vec<(AgentId, Option<AgentId>)> = drain_events(&channel)
            .into_iter()
            .filter_map(|e| match e {
                SwarmEvent::AgentSpawned { id, parent, .. } => Some((id, parent)),
                _ => None,
            })
            .collect();
        assert_eq!(spawned.len(), 2);
        assert_eq!(spawned[0].0, AgentId::named(GENESIS_ID));
        assert_eq!(spawned[1].0, children[0]);
        assert_eq!(spawned[1].1.as_ref(), Some(genesis.id()));
    }

    #[tokio::test]
    async fn test_external_terminate_request() {
        let (orchestrator, channel) =
            orchestrator_with(ScriptedClient::new(vec![]).with_fallback("[WAIT: 0]"));
        let genesis = orchestrator.create_genesis("idle");
        orchestrator.start();
        tokio::time::sleep(Duration::from_millis(100)).await;

        channel
            .send(ControlRequest::Terminate {
                id: genesis.id().clone(),
                reason: "operator kill".into(),
            })
            .unwrap();

        assert!(orchestrator.wait_for_convergence(Duration::from_secs(30)).await);
        assert!(!genesis.is_alive());
    }

    #[tokio::test]
    async fn test_stop_emits_shutdown_and_halts() {
        let (orchestrator, channel) =
            orchestrator_with(ScriptedClient::new(vec![]).with_fallback("[WAIT: 0]"));
        orchestrator.create_genesis("linger");
        orchestrator.start();
        tokio::time::sleep(Duration::from_millis(50)).await;

        orchestrator.stop().await;

        // Registry entry survives a forced halt, but nothing is live.
        assert_eq!(orchestrator.swarm().agent_count(), 1);
        assert!(orchestrator.active_agents().is_empty());
        assert!(drain_events(&channel)
            .iter()
            .any(|e| matches!(e, SwarmEvent::Shutdown)));
    }

    #[tokio::test]
    async fn test_start_twice_is_harmless() {
        let (orchestrator, _channel) =
            orchestrator_with(ScriptedClient::new(vec!["[TERMINATE: done]"]));
        orchestrator.create_genesis("once");
        orchestrator.start();
        orchestrator.start();

        assert!(orchestrator.wait_for_convergence(Duration::from_secs(30)).await);
    }
}
