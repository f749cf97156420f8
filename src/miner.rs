//! Proof-of-work nonce search.

use crate::blockchain::Block;
use crate::consensus::meets_target;
use crate::error::ChainError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Nonces probed between two clock and cancellation checks.
const CHECK_EVERY: u32 = 1024;

/// Shared stop signal for a running search.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchOutcome {
    Found(u32),
    BudgetExpired,
    Cancelled,
    NonceSpaceExhausted,
}

/// Probes nonces 0, 1, 2, ... until the block hash meets its target, `budget`
/// runs out or `cancel` is raised. The block itself is not modified.
pub fn search_nonce(block: &Block, budget: Duration, cancel: &CancelFlag) -> SearchOutcome {
    let deadline = Instant::now().checked_add(budget);
    probe(block, deadline, Some(cancel))
}

/// Mines without a time limit and returns the block with its winning nonce.
pub fn mine_block(mut block: Block) -> Result<Block, ChainError> {
    match probe(&block, None, None) {
        SearchOutcome::Found(nonce) => {
            block.nonce = nonce;
            Ok(block)
        }
        _ => Err(ChainError::MiningExhausted),
    }
}

fn probe(block: &Block, deadline: Option<Instant>, cancel: Option<&CancelFlag>) -> SearchOutcome {
    let prefix = block.header_prefix();
    let suffix = block.hash_suffix();

    for nonce in 0..=u32::MAX {
        if nonce % CHECK_EVERY == 0 {
            if cancel.is_some_and(CancelFlag::is_cancelled) {
                return SearchOutcome::Cancelled;
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return SearchOutcome::BudgetExpired;
            }
        }

        let mut hasher = prefix.clone();
        hasher.update(nonce.to_string());
        hasher.update(&suffix);
        if meets_target(&hasher.finish(), &block.target) {
            return SearchOutcome::Found(nonce);
        }
    }
    SearchOutcome::NonceSpaceExhausted
}
