//! Generation-call collaborator interface
//!
//! The swarm treats text generation as a black box: an ordered list of
//! role-tagged messages goes in, one string comes out. Failures propagate
//! to the caller; the lifecycle loop catches them at its top level.

use async_trait::async_trait;

use crate::error::SwarmError;
use crate::protocol::ChatMessage;

/// A chat-completion backend.
///
/// Implementations wrap whatever provider the embedding application uses.
/// The swarm never retries internally; a returned error kills the calling
/// agent's loop iteration.
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        model: &str,
        max_tokens: u32,
    ) -> Result<String, SwarmError>;
}

#[cfg(test)]
pub(crate) mod testing {
    //! Deterministic clients for lifecycle tests.

    use std::collections::VecDeque;

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use crate::error::SwarmError;
    use crate::protocol::ChatMessage;

    use super::ChatClient;

    /// Replays a fixed sequence of responses, then a fallback.
    pub struct ScriptedClient {
        responses: Mutex<VecDeque<String>>,
        fallback: String,
        calls: Mutex<u64>,
    }

    impl ScriptedClient {
        pub fn new(responses: Vec<&str>) -> Self {
            Self {
                responses: Mutex::new(responses.into_iter().map(String::from).collect()),
                fallback: "[TERMINATE: script exhausted]".into(),
                calls: Mutex::new(0),
            }
        }

        pub fn with_fallback(mut self, fallback: &str) -> Self {
            self.fallback = fallback.into();
            self
        }

        pub fn calls(&self) -> u64 {
            *self.calls.lock()
        }
    }

    #[async_trait]
    impl ChatClient for ScriptedClient {
        async fn complete(
            &self,
            _messages: &[ChatMessage],
            _model: &str,
            _max_tokens: u32,
        ) -> Result<String, SwarmError> {
            *self.calls.lock() += 1;
            Ok(self
                .responses
                .lock()
                .pop_front()
                .unwrap_or_else(|| self.fallback.clone()))
        }
    }

    /// Always fails, simulating quota/network errors.
    pub struct FailingClient;

    #[async_trait]
    impl ChatClient for FailingClient {
        async fn complete(
            &self,
            _messages: &[ChatMessage],
            _model: &str,
            _max_tokens: u32,
        ) -> Result<String, SwarmError> {
            Err(SwarmError::Generation("quota exhausted".into()))
        }
    }
}
