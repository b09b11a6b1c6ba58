//! Collaborator tool table
//!
//! Tools are named string -> string functions supplied by the embedding
//! application. One registry is shared by construction with every agent
//! spawned into the swarm, so children inherit their parent's tools.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;

type ToolFn = dyn Fn(&str) -> anyhow::Result<String> + Send + Sync;

/// Tool invocation errors
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool '{0}' not found")]
    Unknown(String),

    #[error("Tool '{name}' failed: {message}")]
    Failed { name: String, message: String },
}

/// Registry of named tools available to the swarm.
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Arc<ToolFn>>>,
    /// Free-text documentation shown to the model when tools exist.
    docs: RwLock<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: RwLock::new(HashMap::new()),
            docs: RwLock::new(String::new()),
        }
    }

    /// Register a tool under a name. Replaces any existing tool with the
    /// same name.
    pub fn register<F>(&self, name: impl Into<String>, f: F)
    where
        F: Fn(&str) -> anyhow::Result<String> + Send + Sync + 'static,
    {
        self.tools.write().insert(name.into(), Arc::new(f));
    }

    /// Set the documentation block appended to agent system prompts.
    pub fn set_docs(&self, docs: impl Into<String>) {
        *self.docs.write() = docs.into();
    }

    pub fn docs(&self) -> String {
        self.docs.read().clone()
    }

    /// Invoke a tool by name with a raw string argument.
    pub fn invoke(&self, name: &str, args: &str) -> Result<String, ToolError> {
        let tool = self
            .tools
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| ToolError::Unknown(name.to_string()))?;

        tool(args).map_err(|e| ToolError::Failed {
            name: name.to_string(),
            message: e.to_string(),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.tools.read().is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.read().keys().cloned().collect()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
