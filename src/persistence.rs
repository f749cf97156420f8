//! Chain persistence for Branchcoin
//!
//! The persisted form is line oriented: one JSON block per line for the best
//! chain (genesis first, tip last), a literal `sidechain` line, then one line per
//! side-chain block. The same text travels in `chain-snapshot` messages.

use crate::blockchain::Block;
use crate::error::ChainError;
use parking_lot::Mutex;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tracing::debug;

pub const SIDECHAIN_SEPARATOR: &str = "sidechain";

/// Best path and side blocks as read from, or written to, the persisted text.
#[derive(Debug, Clone, Default)]
pub struct ChainSnapshot {
    pub best_chain: Vec<Block>,
    pub side_chain: Vec<Block>,
}

impl ChainSnapshot {
    pub fn encode(&self) -> Result<String, ChainError> {
        let mut text = String::new();
        for block in &self.best_chain {
            text.push_str(&block.to_json()?);
            text.push('\n');
        }
        text.push_str(SIDECHAIN_SEPARATOR);
        text.push('\n');
        for block in &self.side_chain {
            text.push_str(&block.to_json()?);
            text.push('\n');
        }
        Ok(text)
    }

    /// Blank lines are ignored. A missing separator means there are no side blocks.
    pub fn decode(text: &str) -> Result<Self, ChainError> {
        let mut snapshot = ChainSnapshot::default();
        let mut in_side_chain = false;

        for (line_no, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if line == SIDECHAIN_SEPARATOR {
                if in_side_chain {
                    return Err(ChainError::CorruptChain(format!(
                        "line {}: repeated separator",
                        line_no + 1
                    )));
                }
                in_side_chain = true;
                continue;
            }

            let block = Block::from_json(line).map_err(|e| {
                ChainError::CorruptChain(format!("line {}: {}", line_no + 1, e))
            })?;
            if in_side_chain {
                snapshot.side_chain.push(block);
            } else {
                snapshot.best_chain.push(block);
            }
        }

        if snapshot.best_chain.is_empty() {
            return Err(ChainError::CorruptChain("no best-chain blocks".to_string()));
        }
        Ok(snapshot)
    }

    /// Height of the last best-chain block.
    pub fn best_height(&self) -> u64 {
        self.best_chain.len().saturating_sub(1) as u64
    }
}

/// Where the serialized chain lives between runs.
pub trait ChainStore: Send + Sync {
    /// `None` when nothing has been stored yet.
    fn load(&self) -> Result<Option<String>, ChainError>;
    fn save(&self, text: &str) -> Result<(), ChainError>;
}

/// Single file, replaced atomically on every save.
#[derive(Debug, Clone)]
pub struct FileChainStore {
    path: PathBuf,
}

impl FileChainStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ChainStore for FileChainStore {
    fn load(&self) -> Result<Option<String>, ChainError> {
        if !self.path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read_to_string(&self.path)?))
    }

    fn save(&self, text: &str) -> Result<(), ChainError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(text.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| ChainError::Io(e.error))?;

        debug!(path = %self.path.display(), bytes = text.len(), "chain written");
        Ok(())
    }
}

/// Volatile store. Clones share the same contents.
#[derive(Debug, Clone, Default)]
pub struct InMemoryChainStore {
    contents: Arc<Mutex<Option<String>>>,
}

impl InMemoryChainStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_contents(text: impl Into<String>) -> Self {
        Self {
            contents: Arc::new(Mutex::new(Some(text.into()))),
        }
    }

    pub fn contents(&self) -> Option<String> {
        self.contents.lock().clone()
    }
}

impl ChainStore for InMemoryChainStore {
    fn load(&self) -> Result<Option<String>, ChainError> {
        Ok(self.contents.lock().clone())
    }

    fn save(&self, text: &str) -> Result<(), ChainError> {
        *self.contents.lock() = Some(text.to_string());
        Ok(())
    }
}
