use super::index::{ChainIndex, NodeId};
use crate::transaction::{OutPoint, Output, SpendView, Transaction};
use std::collections::{HashMap, HashSet};

/// Transactions and spent outpoints of one branch, from a tip down to genesis.
///
/// Coinbase inputs are synthetic and never mark anything as spent.
pub struct ChainView<'a> {
    transactions: HashMap<String, &'a Transaction>,
    spent: HashSet<OutPoint>,
}

impl<'a> ChainView<'a> {
    pub fn along(index: &'a ChainIndex, tip: NodeId) -> Self {
        let mut transactions = HashMap::new();
        let mut spent = HashSet::new();

        for id in index.walk_to_genesis(tip) {
            let block = index.block(id);
            for (position, tx) in block.transactions.iter().enumerate() {
                transactions.insert(tx.hash(), tx);
                if position > 0 {
                    spent.extend(tx.inputs.iter().map(|input| input.outpoint()));
                }
            }
        }

        Self {
            transactions,
            spent,
        }
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}

impl SpendView for ChainView<'_> {
    fn transaction(&self, hash: &str) -> Option<&Transaction> {
        self.transactions.get(hash).copied()
    }

    fn is_spent(&self, outpoint: &OutPoint) -> bool {
        self.spent.contains(outpoint)
    }
}

/// An output on the best chain that no later transaction consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnspentOutput {
    pub outpoint: OutPoint,
    pub output: Output,
}

/// Unspent outputs paying `recipient_key` on the branch ending at `tip`, oldest first.
pub fn unspent_outputs(index: &ChainIndex, tip: NodeId, recipient_key: &str) -> Vec<UnspentOutput> {
    let mut path: Vec<NodeId> = index.walk_to_genesis(tip).collect();
    path.reverse();

    let mut candidates: Vec<UnspentOutput> = Vec::new();
    for id in path {
        for (position, tx) in index.block(id).transactions.iter().enumerate() {
            if position > 0 {
                for input in &tx.inputs {
                    let outpoint = input.outpoint();
                    candidates.retain(|candidate| candidate.outpoint != outpoint);
                }
            }

            let tx_hash = tx.hash();
            for (output_index, output) in tx.outputs.iter().enumerate() {
                if output.recipient_key == recipient_key {
                    candidates.push(UnspentOutput {
                        outpoint: OutPoint {
                            tx_hash: tx_hash.clone(),
                            index: output_index as u32,
                        },
                        output: output.clone(),
                    });
                }
            }
        }
    }
    candidates
}

pub fn balance(index: &ChainIndex, tip: NodeId, recipient_key: &str) -> u64 {
    unspent_outputs(index, tip, recipient_key)
        .iter()
        .map(|utxo| utxo.output.amount)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::{genesis_block, Block};
    use crate::transaction::Input;

    fn extend(index: &mut ChainIndex, parent: NodeId, txs: Vec<Transaction>) -> NodeId {
        let block = Block::new(index.hash(parent).to_string(), 1, "F".repeat(64), txs);
        index.insert(block, parent)
    }

    #[test]
    fn test_view_follows_one_branch() {
        let mut index = ChainIndex::new(genesis_block());
        let g = index.genesis();
        let left_cb = Transaction::coinbase(index.hash(g), 10, "left");
        let right_cb = Transaction::coinbase("other-parent", 10, "right");
        let left = extend(&mut index, g, vec![left_cb.clone()]);
        let right = extend(&mut index, g, vec![right_cb.clone()]);

        let view = ChainView::along(&index, left);
        assert!(view.transaction(&left_cb.hash()).is_some());
        assert!(view.transaction(&right_cb.hash()).is_none());

        let view = ChainView::along(&index, right);
        assert!(view.transaction(&right_cb.hash()).is_some());
        assert_eq!(view.len(), 2);
    }

    #[test]
    fn test_coinbase_inputs_are_not_spends() {
        let index = ChainIndex::new(genesis_block());
        let view = ChainView::along(&index, index.genesis());
        let genesis_input = genesis_block().transactions[0].inputs[0].outpoint();
        assert!(!view.is_spent(&genesis_input));
    }

    #[test]
    fn test_unspent_scan_drops_spent_outputs() {
        let mut index = ChainIndex::new(genesis_block());
        let g = index.genesis();
        let cb = Transaction::coinbase(index.hash(g), 50, "alice");
        let first = extend(&mut index, g, vec![cb.clone()]);

        let pay = Transaction::new(
            vec![Input::new(cb.hash(), 0)],
            vec![Output::new(20, "bob"), Output::new(30, "alice")],
        );
        let cb2 = Transaction::coinbase(index.hash(first), 50, "alice");
        let second = extend(&mut index, first, vec![cb2.clone(), pay.clone()]);

        let alice = unspent_outputs(&index, second, "alice");
        let hashes: Vec<&str> = alice.iter().map(|u| u.outpoint.tx_hash.as_str()).collect();
        assert_eq!(hashes, vec![cb2.hash().as_str(), pay.hash().as_str()]);
        assert_eq!(balance(&index, second, "alice"), 80);
        assert_eq!(balance(&index, second, "bob"), 20);
        assert_eq!(balance(&index, first, "alice"), 50);
    }

    #[test]
    fn test_every_matching_output_is_tracked() {
        let mut index = ChainIndex::new(genesis_block());
        let g = index.genesis();
        let cb = Transaction::coinbase(index.hash(g), 50, "alice");
        let first = extend(&mut index, g, vec![cb.clone()]);
        let split = Transaction::new(
            vec![Input::new(cb.hash(), 0)],
            vec![Output::new(25, "carol"), Output::new(25, "carol")],
        );
        let cb2 = Transaction::coinbase(index.hash(first), 50, "alice");
        let second = extend(&mut index, first, vec![cb2, split]);

        let carol = unspent_outputs(&index, second, "carol");
        assert_eq!(carol.len(), 2);
        assert_eq!(carol[1].outpoint.index, 1);
        assert_eq!(balance(&index, second, "carol"), 50);
    }
}
