//! Coinbase reward schedule.

pub const INITIAL_REWARD: u64 = 5000;

/// Blocks between two halvings.
pub const HALVING_INTERVAL: u64 = 200;

/// Reward paid by the coinbase of the block at `height`.
///
/// Halved once per elapsed interval, flooring after every step.
pub fn block_reward(height: u64) -> u64 {
    let halvings = height / HALVING_INTERVAL;
    let mut reward = INITIAL_REWARD;
    for _ in 0..halvings {
        if reward == 0 {
            break;
        }
        reward /= 2;
    }
    reward
}
