//! Control and event channels for the orchestrator
//!
//! Structural registry mutations (spawn, terminate, summary refresh) are
//! never performed from agent tasks directly; they are marshaled as
//! [`ControlRequest`]s into a single-consumer channel whose sole reader
//! is the orchestrator's coordinator. Events flow the other way, out to
//! whatever front end is attached.

use tokio::sync::mpsc;

use crate::protocol::AgentId;

/// A registry mutation requested from an agent task (or a front end).
#[derive(Debug, Clone)]
pub enum ControlRequest {
    /// Create and register a child agent. The child id is allocated by
    /// the requesting parent before this request is sent.
    Spawn {
        child: AgentId,
        parent: AgentId,
        mission: String,
    },
    /// Unregister an agent. Idempotent; requests for already-removed
    /// agents are no-ops.
    Terminate { id: AgentId, reason: String },
    /// Refresh the shared rolling summary for an agent.
    Summarize { id: AgentId },
}

/// An observable swarm event, for front ends.
#[derive(Debug, Clone)]
pub enum SwarmEvent {
    AgentSpawned {
        id: AgentId,
        parent: Option<AgentId>,
        mission: String,
    },
    AgentTerminated {
        id: AgentId,
        reason: String,
    },
    /// Human-visible output from a REPORT/PRINT action. Never routed
    /// through the bus.
    Report {
        id: AgentId,
        text: String,
    },
    Shutdown,
}

/// Channel pair held by the orchestrator.
pub struct ChannelPair {
    /// Receiver for control requests (consumed by the coordinator).
    pub req_rx: mpsc::UnboundedReceiver<ControlRequest>,
    /// Sender handed to each agent so lifecycle tasks can enqueue
    /// requests of their own.
    pub req_tx: mpsc::UnboundedSender<ControlRequest>,
    /// Sender for events.
    pub event_tx: mpsc::UnboundedSender<SwarmEvent>,
}

/// Client-side channel for talking to a running swarm.
#[derive(Clone)]
pub struct SwarmChannel {
    req_tx: mpsc::UnboundedSender<ControlRequest>,
    event_rx: std::sync::Arc<parking_lot::Mutex<mpsc::UnboundedReceiver<SwarmEvent>>>,
}

impl SwarmChannel {
    /// Create a new channel pair.
    ///
    /// Returns the client channel and the orchestrator channel pair.
    pub fn new() -> (Self, ChannelPair) {
        let (req_tx, req_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let channel = Self {
            req_tx: req_tx.clone(),
            event_rx: std::sync::Arc::new(parking_lot::Mutex::new(event_rx)),
        };

        let pair = ChannelPair { req_rx, req_tx, event_tx };

        (channel, pair)
    }

    /// Inject a control request from outside the swarm (e.g. a REPL
    /// killing an agent).
    pub fn send(&self, request: ControlRequest) -> Result<(), ChannelError> {
        self.req_tx.send(request).map_err(|_| ChannelError::Closed)
    }

    /// Try to receive an event (non-blocking).
    pub fn try_recv(&self) -> Option<SwarmEvent> {
        self.event_rx.lock().try_recv().ok()
    }

    /// Receive an event, waiting until one is available.
    pub async fn recv(&self) -> Option<SwarmEvent> {
        let mut guard = self.event_rx.lock();
        guard.recv().await
    }

    /// Check if the channel is closed.
    pub fn is_closed(&self) -> bool {
        self.req_tx.is_closed()
    }
}

/// Channel errors
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel is closed")]
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_creation() {
        let (channel, _pair) = SwarmChannel::new();
        assert!(!channel.is_closed());
    }

    #[test]
    fn test_send_request() {
        let (channel, mut pair) = SwarmChannel::new();

        let request = ControlRequest::Terminate {
            id: AgentId::named("genesis"),
            reason: "operator kill".into(),
        };
        channel.send(request).unwrap();

        let received = pair.req_rx.try_recv();
        assert!(matches!(received, Ok(ControlRequest::Terminate { .. })));
    }

    #[tokio::test]
    async fn test_receive_event() {
        let (channel, pair) = SwarmChannel::new();

        let event = SwarmEvent::Report {
            id: AgentId::named("genesis"),
            text: "found the answer".into(),
        };
        pair.event_tx.send(event).unwrap();

        let received = channel.try_recv();
        assert!(matches!(received, Some(SwarmEvent::Report { .. })));
    }
}
