//! Proof-of-work rules: target encoding, difficulty retargeting and the
//! timestamp window a new block must fall into.
//!
//! Hashes and targets travel as 64-digit uppercase hex strings. Comparing two
//! such strings lexicographically is the same as comparing the 256-bit numbers
//! they encode, so every comparison first checks that both sides are well formed.

use crate::blockchain::{ChainIndex, NodeId};
use primitive_types::{U256, U512};

/// Easiest permitted target.
pub const MAX_TARGET: &str = "0000FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFF";

/// Blocks per retarget window.
pub const RETARGET_INTERVAL: u64 = 100;

pub const TARGET_MINUTES_PER_BLOCK: u64 = 10;

/// How far ahead of local time a block timestamp may be.
pub const MAX_FUTURE_DRIFT_MS: i64 = 60 * 60 * 1000;

/// Number of blocks averaged for the lower timestamp bound.
pub const TIMESTAMP_WINDOW: u64 = 12;

const MS_PER_MINUTE: u64 = 60_000;

/// 64 hex digits, digits and uppercase letters only.
pub fn is_well_formed(hex: &str) -> bool {
    hex.len() == 64
        && hex
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'A'..=b'F').contains(&b))
}

/// `hash <= target`, both fixed-width.
pub fn meets_target(hash: &str, target: &str) -> bool {
    is_well_formed(hash) && is_well_formed(target) && hash <= target
}

/// `target <= MAX_TARGET`, and well formed.
pub fn target_within_max(target: &str) -> bool {
    is_well_formed(target) && target <= MAX_TARGET
}

pub fn parse_target(target: &str) -> Option<U256> {
    if !is_well_formed(target) {
        return None;
    }
    let bytes = hex::decode(target).ok()?;
    Some(U256::from_big_endian(&bytes))
}

pub fn encode_target(value: U256) -> String {
    let mut bytes = [0u8; 32];
    value.to_big_endian(&mut bytes);
    hex::encode_upper(bytes)
}

fn max_target() -> U256 {
    parse_target(MAX_TARGET).unwrap_or_else(U256::max_value)
}

/// Scale `old_target` by how long the window actually took relative to the
/// intended `RETARGET_INTERVAL * TARGET_MINUTES_PER_BLOCK` minutes.
///
/// The product is floored and clamped to `[1, MAX_TARGET]`. A non-positive
/// elapsed time counts as one millisecond.
pub fn retarget(old_target: &str, window_start_ms: i64, window_end_ms: i64) -> String {
    let Some(old) = parse_target(old_target) else {
        return MAX_TARGET.to_string();
    };
    let elapsed = window_end_ms.saturating_sub(window_start_ms).max(1) as u64;
    let expected = RETARGET_INTERVAL * MS_PER_MINUTE * TARGET_MINUTES_PER_BLOCK;

    let scaled = U512::from(old) * U512::from(elapsed) / U512::from(expected);
    let max = U512::from(max_target());
    if scaled > max {
        return MAX_TARGET.to_string();
    }

    let mut wide = [0u8; 64];
    scaled.to_big_endian(&mut wide);
    let value = U256::from_big_endian(&wide[32..]).max(U256::one());
    encode_target(value)
}

/// Target a child of `parent` must declare.
///
/// Up to height `RETARGET_INTERVAL` the chain bootstraps at `MAX_TARGET`. After
/// that the parent's retarget window is located by stepping back to its first
/// block, and the window's last block supplies both the old target and the end
/// timestamp.
pub fn required_target(index: &ChainIndex, parent: NodeId) -> String {
    let parent_height = index.height(parent);
    if parent_height <= RETARGET_INTERVAL {
        return MAX_TARGET.to_string();
    }

    let steps_back = (parent_height - 1) % RETARGET_INTERVAL;
    let anchor = index.ancestor(parent, steps_back);
    let window_start = anchor.and_then(|a| index.ancestor(a, RETARGET_INTERVAL));
    let window_end = anchor.and_then(|a| index.parent(a));

    match (window_start, window_end) {
        (Some(start), Some(end)) => {
            let start = index.block(start);
            let end = index.block(end);
            retarget(&end.target, start.timestamp, end.timestamp)
        }
        _ => MAX_TARGET.to_string(),
    }
}

/// Lower timestamp bound for a child of `parent`: the mean timestamp of the
/// parent and its eleven predecessors, or 0 while the chain is shorter than that.
pub fn minimum_timestamp(index: &ChainIndex, parent: NodeId) -> i64 {
    if index.height(parent) < TIMESTAMP_WINDOW {
        return 0;
    }
    // the mean of i64 values always fits back into i64
    let sum: i128 = index
        .walk_to_genesis(parent)
        .take(TIMESTAMP_WINDOW as usize)
        .map(|id| i128::from(index.block(id).timestamp))
        .sum();
    (sum / i128::from(TIMESTAMP_WINDOW)) as i64
}
