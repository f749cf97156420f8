use super::block::Block;
use std::collections::HashMap;

/// Blocks whose parent is not known yet, indexed by the parent they wait for.
#[derive(Debug, Clone, Default)]
pub struct OrphanBuffer {
    blocks: HashMap<String, Block>,
    by_parent: HashMap<String, Vec<String>>,
}

impl OrphanBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, hash: &str) -> bool {
        self.blocks.contains_key(hash)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn insert(&mut self, hash: String, block: Block) {
        if self.blocks.contains_key(&hash) {
            return;
        }
        self.by_parent
            .entry(block.previous_block_hash.clone())
            .or_default()
            .push(hash.clone());
        self.blocks.insert(hash, block);
    }

    /// Removes and returns every orphan waiting on `parent_hash`.
    pub fn take_children(&mut self, parent_hash: &str) -> Vec<Block> {
        let Some(hashes) = self.by_parent.remove(parent_hash) else {
            return Vec::new();
        };
        hashes
            .into_iter()
            .filter_map(|hash| self.blocks.remove(&hash))
            .collect()
    }

    /// Parent hashes currently waited on.
    pub fn awaited_parents(&self) -> Vec<String> {
        self.by_parent.keys().cloned().collect()
    }
}
