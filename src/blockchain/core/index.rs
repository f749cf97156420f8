//! Arena of every admitted block.
//!
//! Nodes are addressed by [`NodeId`] and never removed. Each node owns its block,
//! points at its parent and remembers its height. The `next` link is only
//! meaningful along the current best path.

use super::block::Block;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone)]
pub struct IndexNode {
    pub block: Block,
    pub hash: String,
    pub parent: Option<NodeId>,
    pub next: Option<NodeId>,
    pub height: u64,
}

#[derive(Debug, Clone)]
pub struct ChainIndex {
    nodes: Vec<IndexNode>,
    by_hash: HashMap<String, NodeId>,
}

impl ChainIndex {
    pub fn new(genesis: Block) -> Self {
        let hash = genesis.hash();
        let root = IndexNode {
            block: genesis,
            hash: hash.clone(),
            parent: None,
            next: None,
            height: 0,
        };
        Self {
            nodes: vec![root],
            by_hash: HashMap::from([(hash, NodeId(0))]),
        }
    }

    pub fn genesis(&self) -> NodeId {
        NodeId(0)
    }

    /// Adds `block` under `parent` at `parent.height + 1`.
    pub fn insert(&mut self, block: Block, parent: NodeId) -> NodeId {
        let id = NodeId(self.nodes.len());
        let hash = block.hash();
        let height = self.height(parent) + 1;
        self.nodes.push(IndexNode {
            block,
            hash: hash.clone(),
            parent: Some(parent),
            next: None,
            height,
        });
        self.by_hash.insert(hash, id);
        id
    }

    pub fn find_by_hash(&self, hash: &str) -> Option<NodeId> {
        self.by_hash.get(hash).copied()
    }

    pub fn node(&self, id: NodeId) -> &IndexNode {
        &self.nodes[id.0]
    }

    pub fn block(&self, id: NodeId) -> &Block {
        &self.nodes[id.0].block
    }

    pub fn hash(&self, id: NodeId) -> &str {
        &self.nodes[id.0].hash
    }

    pub fn height(&self, id: NodeId) -> u64 {
        self.nodes[id.0].height
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn next(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].next
    }

    pub fn set_next(&mut self, id: NodeId, next: Option<NodeId>) {
        self.nodes[id.0].next = next;
    }

    /// The node `steps` predecessors above `id`, if the chain is that long.
    pub fn ancestor(&self, id: NodeId, steps: u64) -> Option<NodeId> {
        self.walk_to_genesis(id).nth(steps as usize)
    }

    /// `id`, its parent, grandparent, ... down to genesis.
    pub fn walk_to_genesis(&self, id: NodeId) -> Ancestors<'_> {
        Ancestors {
            index: self,
            cursor: Some(id),
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

pub struct Ancestors<'a> {
    index: &'a ChainIndex,
    cursor: Option<NodeId>,
}

impl Iterator for Ancestors<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.cursor?;
        self.cursor = self.index.parent(current);
        Some(current)
    }
}
