//! Block admission rules.
//!
//! Each check maps to exactly one [`RejectReason`]. The engine runs them in the
//! order they appear here and stops at the first failure.

use super::block::Block;
use super::index::{ChainIndex, NodeId};
use super::state::ChainView;
use crate::consensus::{
    is_well_formed, meets_target, minimum_timestamp, required_target, target_within_max,
    MAX_FUTURE_DRIFT_MS,
};
use crate::crypto::SignatureVerifier;
use crate::economics::block_reward;
use crate::error::RejectReason;
use crate::transaction::check_spend;
use std::collections::HashSet;

/// `hash <= target <= MAX_TARGET`.
pub fn check_proof_of_work(block: &Block, hash: &str) -> Result<(), RejectReason> {
    if !is_well_formed(&block.target) || !target_within_max(&block.target) {
        return Err(RejectReason::TargetInvalid);
    }
    if !meets_target(hash, &block.target) {
        return Err(RejectReason::ProofOfWorkInvalid);
    }
    Ok(())
}

pub fn check_timestamp(
    block: &Block,
    index: &ChainIndex,
    parent: NodeId,
    now_ms: i64,
) -> Result<(), RejectReason> {
    if block.timestamp > now_ms.saturating_add(MAX_FUTURE_DRIFT_MS) {
        return Err(RejectReason::TimestampInvalid);
    }
    if block.timestamp < minimum_timestamp(index, parent) {
        return Err(RejectReason::TimestampInvalid);
    }
    Ok(())
}

pub fn check_target(block: &Block, index: &ChainIndex, parent: NodeId) -> Result<(), RejectReason> {
    if block.target != required_target(index, parent) {
        return Err(RejectReason::TargetInvalid);
    }
    Ok(())
}

/// First transaction pays exactly the scheduled reward through one input and one output.
pub fn check_coinbase(block: &Block, parent_height: u64) -> Result<(), RejectReason> {
    let coinbase = block.coinbase().ok_or(RejectReason::CoinbaseInvalid)?;
    if !coinbase.is_coinbase_shaped() {
        return Err(RejectReason::CoinbaseInvalid);
    }
    if coinbase.outputs[0].amount != block_reward(parent_height + 1) {
        return Err(RejectReason::CoinbaseInvalid);
    }
    Ok(())
}

/// Every non-coinbase transaction against the branch the block extends.
///
/// Outpoints consumed by earlier transactions of the same block count as spent.
pub fn check_transactions(
    block: &Block,
    index: &ChainIndex,
    parent: NodeId,
    verifier: &dyn SignatureVerifier,
) -> Result<(), RejectReason> {
    if block.transactions.len() <= 1 {
        return Ok(());
    }
    let view = ChainView::along(index, parent);
    let mut used = HashSet::new();
    for tx in block.transactions.iter().skip(1) {
        check_spend(tx, &view, &mut used, verifier)?;
    }
    Ok(())
}

/// Rules that need the parent: timestamp, target, coinbase, then transactions.
pub fn check_block_rules(
    block: &Block,
    index: &ChainIndex,
    parent: NodeId,
    now_ms: i64,
    verifier: &dyn SignatureVerifier,
) -> Result<(), RejectReason> {
    check_timestamp(block, index, parent, now_ms)?;
    check_target(block, index, parent)?;
    check_coinbase(block, index.height(parent))?;
    check_transactions(block, index, parent, verifier)
}
