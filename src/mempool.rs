//! Pending-transaction pool.
//!
//! Holds transactions that passed admission but are not yet in an admitted block.
//! There is no fee ordering, size cap or expiry.

use crate::blockchain::Block;
use crate::transaction::{OutPoint, Transaction};
use std::collections::HashSet;
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct Mempool {
    /// Admission order.
    transactions: Vec<Transaction>,
    hashes: HashSet<String>,
    /// Outpoints consumed by pooled transactions.
    claimed: HashSet<OutPoint>,
}

impl Mempool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    pub fn contains(&self, hash: &str) -> bool {
        self.hashes.contains(hash)
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn claimed(&self) -> &HashSet<OutPoint> {
        &self.claimed
    }

    /// Appends an already validated transaction.
    pub fn insert(&mut self, tx: Transaction) {
        let hash = tx.hash();
        if !self.hashes.insert(hash.clone()) {
            return;
        }
        self.claimed.extend(tx.inputs.iter().map(|input| input.outpoint()));
        debug!(tx = %hash, pool_size = self.transactions.len() + 1, "transaction pooled");
        self.transactions.push(tx);
    }

    /// Drops every pooled transaction that spends an outpoint `block` spends.
    ///
    /// Returns how many were removed.
    pub fn remove_conflicting(&mut self, block: &Block) -> usize {
        let spent: HashSet<OutPoint> = block
            .transactions
            .iter()
            .skip(1)
            .flat_map(|tx| tx.inputs.iter().map(|input| input.outpoint()))
            .collect();
        if spent.is_empty() {
            return 0;
        }
        self.retain(|tx| !tx.inputs.iter().any(|input| spent.contains(&input.outpoint())))
    }

    /// Keeps only the transactions for which `keep` holds, in order.
    pub fn retain(&mut self, mut keep: impl FnMut(&Transaction) -> bool) -> usize {
        let before = self.transactions.len();
        self.transactions.retain(|tx| keep(tx));
        let removed = before - self.transactions.len();
        if removed > 0 {
            self.rebuild_indexes();
        }
        removed
    }

    pub fn clear(&mut self) {
        self.transactions.clear();
        self.hashes.clear();
        self.claimed.clear();
    }

    fn rebuild_indexes(&mut self) {
        self.hashes = self.transactions.iter().map(|tx| tx.hash()).collect();
        self.claimed = self
            .transactions
            .iter()
            .flat_map(|tx| tx.inputs.iter().map(|input| input.outpoint()))
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::{Input, Output};

    fn spend(tx_hash: &str, index: u32, amount: u64) -> Transaction {
        Transaction::new(
            vec![Input::new(tx_hash, index)],
            vec![Output::new(amount, "dest")],
        )
    }

    #[test]
    fn test_insert_tracks_claims() {
        let mut pool = Mempool::new();
        let tx = spend("AA", 0, 5);
        pool.insert(tx.clone());
        pool.insert(tx.clone());

        assert_eq!(pool.len(), 1);
        assert!(pool.contains(&tx.hash()));
        assert!(pool.claimed().contains(&OutPoint {
            tx_hash: "AA".to_string(),
            index: 0
        }));
    }

    #[test]
    fn test_block_prunes_conflicts_only() {
        let mut pool = Mempool::new();
        let kept = spend("AA", 0, 5);
        let conflicting = spend("BB", 1, 5);
        pool.insert(kept.clone());
        pool.insert(conflicting);

        let coinbase = Transaction::coinbase("AA", 5000, "miner");
        let block = Block::new(
            "P".to_string(),
            0,
            "T".to_string(),
            vec![coinbase, spend("BB", 1, 7)],
        );

        assert_eq!(pool.remove_conflicting(&block), 1);
        assert_eq!(pool.transactions(), &[kept]);
        assert!(!pool.claimed().contains(&OutPoint {
            tx_hash: "BB".to_string(),
            index: 1
        }));
    }
}
