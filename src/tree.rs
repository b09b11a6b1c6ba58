//! Spawn tree reconstruction
//!
//! The parent/child structure is implied by each agent's `parent_id` and
//! `children` fields; nothing in the runtime consults it. This module
//! rebuilds the forest from a registry snapshot for inspection and
//! reporting only.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::protocol::AgentId;

/// Flat per-agent snapshot the tree is built from.
#[derive(Debug, Clone)]
pub struct TreeSeed {
    pub id: AgentId,
    pub parent_id: Option<AgentId>,
    pub children: Vec<AgentId>,
    pub mission: String,
    pub alive: bool,
    pub messages_sent: u64,
    pub summary: String,
}

/// One node of the reconstructed spawn tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeNode {
    pub id: AgentId,
    pub mission: String,
    pub alive: bool,
    pub messages_sent: u64,
    pub summary: String,
    pub children: Vec<TreeNode>,
}

/// The spawn forest over agents still present in the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpawnTree {
    roots: Vec<TreeNode>,
}

impl SpawnTree {
    /// Rebuild the forest from registry snapshots.
    ///
    /// Agents whose parent has already been unregistered are kept as
    /// roots so the whole registry stays inspectable. Children ids
    /// pointing at unregistered agents are skipped.
    pub fn build(seeds: Vec<TreeSeed>) -> Self {
        let index: HashMap<AgentId, TreeSeed> =
            seeds.into_iter().map(|s| (s.id.clone(), s)).collect();

        let mut root_ids: Vec<AgentId> = index
            .values()
            .filter(|seed| match &seed.parent_id {
                None => true,
                Some(parent) => !index.contains_key(parent),
            })
            .map(|seed| seed.id.clone())
            .collect();
        root_ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));

        let roots = root_ids
            .iter()
            .filter_map(|id| Self::build_node(id, &index))
            .collect();

        Self { roots }
    }

    fn build_node(id: &AgentId, index: &HashMap<AgentId, TreeSeed>) -> Option<TreeNode> {
        let seed = index.get(id)?;
        let children = seed
            .children
            .iter()
            .filter_map(|child| Self::build_node(child, index))
            .collect();

        Some(TreeNode {
            id: seed.id.clone(),
            mission: seed.mission.clone(),
            alive: seed.alive,
            messages_sent: seed.messages_sent,
            summary: seed.summary.clone(),
            children,
        })
    }

    pub fn roots(&self) -> &[TreeNode] {
        &self.roots
    }

    /// Total node count across the forest.
    pub fn len(&self) -> usize {
        fn count(node: &TreeNode) -> usize {
            1 + node.children.iter().map(count).sum::<usize>()
        }
        self.roots.iter().map(count).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// JSON rendering for front ends and logs.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// Depth of an agent below its root, if present.
    pub fn depth(&self, id: &AgentId) -> Option<usize> {
        fn find(node: &TreeNode, id: &AgentId, depth: usize) -> Option<usize> {
            if &node.id == id {
                return Some(depth);
            }
            node.children.iter().find_map(|c| find(c, id, depth + 1))
        }
        self.roots.iter().find_map(|r| find(r, id, 0))
    }
}
