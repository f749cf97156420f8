//! The ledger engine.
//!
//! [`Blockchain`] owns the block tree, the best-tip pointer, the side-chain set,
//! the orphan buffer, the pending-transaction pool and the local mining template.
//! It assumes a single writer; hosts that share it across tasks must serialize
//! access themselves.

use super::block::{genesis_block, Block};
use super::index::{ChainIndex, NodeId};
use super::orphans::OrphanBuffer;
use super::state::{self, ChainView, UnspentOutput};
use super::validation::{check_block_rules, check_proof_of_work, check_timestamp};
use crate::consensus::{minimum_timestamp, required_target};
use crate::crypto::{KeyPair, Secp256k1Verifier, SignatureVerifier};
use crate::economics::block_reward;
use crate::error::{ChainError, RejectReason};
use crate::mempool::Mempool;
use crate::miner::{search_nonce, CancelFlag, SearchOutcome};
use crate::persistence::{ChainSnapshot, ChainStore, InMemoryChainStore};
use crate::transaction::{check_spend, OutPoint, Transaction};
use crate::wallet::build_payment;
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::collections::{BTreeSet, HashSet};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainPlacement {
    BestChain,
    SideChain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockOutcome {
    Accepted(ChainPlacement),
    /// Parent unknown; buffered and retried once the parent is admitted.
    Orphan,
    Rejected(RejectReason),
}

impl BlockOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, BlockOutcome::Accepted(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxOutcome {
    Accepted,
    Rejected(RejectReason),
}

/// Notifications for whoever sits around the engine (relay, UI).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerEvent {
    BlockAccepted {
        hash: String,
        height: u64,
        placement: ChainPlacement,
    },
    Reorganized {
        old_tip: String,
        new_tip: String,
        fork_point: String,
        displaced: usize,
    },
    TransactionAccepted {
        hash: String,
    },
    ChainReplaced {
        height: u64,
    },
}

pub struct Blockchain {
    index: ChainIndex,
    best_tip: NodeId,
    side_chain: BTreeSet<NodeId>,
    orphans: OrphanBuffer,
    mempool: Mempool,
    template: Block,
    coinbase_key: String,
    verifier: Box<dyn SignatureVerifier>,
    store: Box<dyn ChainStore>,
    subscribers: Vec<Sender<LedgerEvent>>,
}

impl Blockchain {
    /// Genesis-only chain with an in-memory store and secp256k1 signatures.
    pub fn new(coinbase_key: impl Into<String>) -> Self {
        Self::with_backends(
            Box::new(InMemoryChainStore::new()),
            Box::new(Secp256k1Verifier),
            coinbase_key,
        )
    }

    /// Opens the chain held by `store`, bootstrapping and persisting genesis if it is empty.
    pub fn open(
        store: Box<dyn ChainStore>,
        verifier: Box<dyn SignatureVerifier>,
        coinbase_key: impl Into<String>,
    ) -> Result<Self, ChainError> {
        let mut chain = Self::with_backends(store, verifier, coinbase_key);
        chain.load()?;
        Ok(chain)
    }

    fn with_backends(
        store: Box<dyn ChainStore>,
        verifier: Box<dyn SignatureVerifier>,
        coinbase_key: impl Into<String>,
    ) -> Self {
        let index = ChainIndex::new(genesis_block());
        let best_tip = index.genesis();
        let mut chain = Blockchain {
            index,
            best_tip,
            side_chain: BTreeSet::new(),
            orphans: OrphanBuffer::new(),
            mempool: Mempool::new(),
            template: genesis_block(),
            coinbase_key: coinbase_key.into(),
            verifier,
            store,
            subscribers: Vec::new(),
        };
        chain.template = chain.build_template();
        chain
    }

    // ------------------------------------------------------------------
    // Block admission
    // ------------------------------------------------------------------

    pub fn submit_block(&mut self, block: Block) -> BlockOutcome {
        let previous_tip = self.best_tip;
        let hash = block.hash();

        let outcome = self.admit(block, &hash);
        if outcome.is_accepted() {
            self.resolve_orphans_of(hash);
        }
        if self.best_tip != previous_tip {
            self.template = self.build_template();
        }
        outcome
    }

    fn admit(&mut self, block: Block, hash: &str) -> BlockOutcome {
        if let Err(reason) = check_proof_of_work(&block, hash) {
            warn!(block = %short(hash), %reason, "block rejected");
            return BlockOutcome::Rejected(reason);
        }
        if self.index.find_by_hash(hash).is_some() || self.orphans.contains(hash) {
            debug!(block = %short(hash), "duplicate block ignored");
            return BlockOutcome::Rejected(RejectReason::Duplicate);
        }

        let Some(parent) = self.index.find_by_hash(&block.previous_block_hash) else {
            info!(
                block = %short(hash),
                parent = %short(&block.previous_block_hash),
                "parent unknown, buffering orphan"
            );
            self.orphans.insert(hash.to_string(), block);
            return BlockOutcome::Orphan;
        };

        if let Err(reason) = check_block_rules(
            &block,
            &self.index,
            parent,
            now_ms(),
            self.verifier.as_ref(),
        ) {
            warn!(block = %short(hash), %reason, "block rejected");
            return BlockOutcome::Rejected(reason);
        }

        let pruned = self.mempool.remove_conflicting(&block);
        let id = self.index.insert(block, parent);
        let placement = self.attach(id, parent);
        let height = self.index.height(id);

        info!(
            block = %short(hash),
            height,
            ?placement,
            pruned,
            "block accepted"
        );
        self.emit(LedgerEvent::BlockAccepted {
            hash: hash.to_string(),
            height,
            placement,
        });
        BlockOutcome::Accepted(placement)
    }

    /// Links a freshly inserted node into the best path or the side-chain set.
    fn attach(&mut self, id: NodeId, parent: NodeId) -> ChainPlacement {
        if parent == self.best_tip {
            self.index.set_next(parent, Some(id));
            self.best_tip = id;
            return ChainPlacement::BestChain;
        }

        self.side_chain.insert(id);
        if self.index.height(id) > self.index.height(self.best_tip) {
            self.reorganize(id);
            ChainPlacement::BestChain
        } else {
            ChainPlacement::SideChain
        }
    }

    /// Makes the side-chain node `new_tip` the best tip.
    ///
    /// Only successor links change. Nodes leaving the best path join the
    /// side-chain set and nodes entering it leave that set.
    fn reorganize(&mut self, new_tip: NodeId) {
        let old_tip = self.best_tip;
        let mut incoming = Vec::new();
        let mut outgoing = Vec::new();
        let (mut a, mut b) = (new_tip, old_tip);

        while a != b {
            let (height_a, height_b) = (self.index.height(a), self.index.height(b));
            if height_a >= height_b {
                incoming.push(a);
                let Some(parent) = self.index.parent(a) else { break };
                a = parent;
            }
            if height_b >= height_a {
                outgoing.push(b);
                let Some(parent) = self.index.parent(b) else { break };
                b = parent;
            }
        }
        let fork_point = a;

        for &id in &outgoing {
            self.side_chain.insert(id);
            self.index.set_next(id, None);
        }
        let mut previous = fork_point;
        for &id in incoming.iter().rev() {
            self.side_chain.remove(&id);
            self.index.set_next(previous, Some(id));
            previous = id;
        }
        self.index.set_next(new_tip, None);
        self.best_tip = new_tip;

        let event = LedgerEvent::Reorganized {
            old_tip: self.index.hash(old_tip).to_string(),
            new_tip: self.index.hash(new_tip).to_string(),
            fork_point: self.index.hash(fork_point).to_string(),
            displaced: outgoing.len(),
        };
        info!(
            old_tip = %short(self.index.hash(old_tip)),
            new_tip = %short(self.index.hash(new_tip)),
            fork_height = self.index.height(fork_point),
            displaced = outgoing.len(),
            "chain reorganized"
        );
        self.emit(event);
    }

    /// Admits every buffered descendant of `parent_hash`, depth first.
    fn resolve_orphans_of(&mut self, parent_hash: String) {
        let mut ready = vec![parent_hash];
        while let Some(parent_hash) = ready.pop() {
            for orphan in self.orphans.take_children(&parent_hash) {
                let hash = orphan.hash();
                match self.admit(orphan, &hash) {
                    BlockOutcome::Accepted(_) => {
                        info!(block = %short(&hash), "orphan resolved");
                        ready.push(hash);
                    }
                    outcome => debug!(block = %short(&hash), ?outcome, "buffered orphan dropped"),
                }
            }
        }
    }

    fn resolve_buffered_orphans(&mut self) {
        for parent_hash in self.orphans.awaited_parents() {
            if self.index.find_by_hash(&parent_hash).is_some() {
                self.resolve_orphans_of(parent_hash);
            }
        }
    }

    // ------------------------------------------------------------------
    // Transactions and mining
    // ------------------------------------------------------------------

    pub fn submit_transaction(&mut self, tx: Transaction) -> TxOutcome {
        let hash = tx.hash();
        if self.mempool.contains(&hash) {
            return TxOutcome::Rejected(RejectReason::Duplicate);
        }

        let view = ChainView::along(&self.index, self.best_tip);
        let mut claimed = self.mempool.claimed().clone();
        if let Err(reason) = check_spend(&tx, &view, &mut claimed, self.verifier.as_ref()) {
            debug!(tx = %short(&hash), %reason, "transaction rejected");
            return TxOutcome::Rejected(reason);
        }

        self.mempool.insert(tx);
        info!(tx = %short(&hash), pool_size = self.mempool.len(), "transaction accepted");
        self.emit(LedgerEvent::TransactionAccepted { hash });
        TxOutcome::Accepted
    }

    /// Builds a payment from `sender`'s unclaimed outputs and admits it to the pool.
    pub fn send_payment(
        &mut self,
        sender: &KeyPair,
        recipient_key: &str,
        amount: u64,
    ) -> Result<Transaction, ChainError> {
        let tx = build_payment(self, sender, recipient_key, amount)?;
        match self.submit_transaction(tx.clone()) {
            TxOutcome::Accepted => Ok(tx),
            TxOutcome::Rejected(reason) => Err(ChainError::PaymentRejected(reason)),
        }
    }

    /// One time-sliced mining attempt on the current template.
    ///
    /// Returns the block only if it was found and admitted. On budget expiry or
    /// cancellation the template is kept and re-timestamped on the next call.
    pub fn try_mine_once(&mut self, budget: Duration, cancel: &CancelFlag) -> Option<Block> {
        let additions = self.spendable_pool_transactions(&self.template);
        self.template.transactions.extend(additions);
        self.template.timestamp = now_ms().max(minimum_timestamp(&self.index, self.best_tip));

        let nonce = match search_nonce(&self.template, budget, cancel) {
            SearchOutcome::Found(nonce) => nonce,
            outcome => {
                trace!(?outcome, "no block this slice");
                return None;
            }
        };

        let mut block = self.template.clone();
        block.nonce = nonce;
        let outcome = self.submit_block(block.clone());
        self.template = self.build_template();

        if outcome.is_accepted() {
            info!(block = %short(&block.hash()), height = self.current_height(), "mined block");
            Some(block)
        } else {
            warn!(?outcome, "mined block was not admitted");
            None
        }
    }

    /// Unmined block on `parent_hash` with the required target and reward.
    ///
    /// `None` if the parent is not in the tree.
    pub fn candidate_block(
        &self,
        parent_hash: &str,
        recipient_key: &str,
        transactions: Vec<Transaction>,
    ) -> Option<Block> {
        let parent = self.index.find_by_hash(parent_hash)?;
        let reward = block_reward(self.index.height(parent) + 1);
        let mut txs = vec![Transaction::coinbase(parent_hash, reward, recipient_key)];
        txs.extend(transactions);
        let timestamp = now_ms().max(minimum_timestamp(&self.index, parent));
        Some(Block::new(
            parent_hash.to_string(),
            timestamp,
            required_target(&self.index, parent),
            txs,
        ))
    }

    fn build_template(&self) -> Block {
        let tip_hash = self.index.hash(self.best_tip).to_string();
        let mut template = self
            .candidate_block(&tip_hash, &self.coinbase_key, Vec::new())
            .unwrap_or_else(genesis_block);
        let additions = self.spendable_pool_transactions(&template);
        template.transactions.extend(additions);
        template
    }

    /// Pool transactions not yet in `template` that still validate on the best tip.
    fn spendable_pool_transactions(&self, template: &Block) -> Vec<Transaction> {
        let view = ChainView::along(&self.index, self.best_tip);
        let present: HashSet<String> = template.transactions.iter().map(Transaction::hash).collect();
        let mut claimed: HashSet<OutPoint> = template
            .transactions
            .iter()
            .skip(1)
            .flat_map(|tx| tx.inputs.iter().map(|input| input.outpoint()))
            .collect();

        self.mempool
            .transactions()
            .iter()
            .filter(|tx| !present.contains(&tx.hash()))
            .filter(|tx| check_spend(tx, &view, &mut claimed, self.verifier.as_ref()).is_ok())
            .cloned()
            .collect()
    }

    /// Drops pooled transactions that no longer validate on the best tip.
    fn revalidate_pool(&mut self) {
        let view = ChainView::along(&self.index, self.best_tip);
        let verifier = self.verifier.as_ref();
        let mut claimed = HashSet::new();
        let removed = self
            .mempool
            .retain(|tx| check_spend(tx, &view, &mut claimed, verifier).is_ok());
        if removed > 0 {
            info!(removed, "pool revalidated against new best chain");
        }
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn unspent_outputs_for(&self, recipient_key: &str) -> Vec<UnspentOutput> {
        state::unspent_outputs(&self.index, self.best_tip, recipient_key)
    }

    pub fn balance_for(&self, recipient_key: &str) -> u64 {
        state::balance(&self.index, self.best_tip, recipient_key)
    }

    pub fn current_height(&self) -> u64 {
        self.index.height(self.best_tip)
    }

    pub fn best_tip_hash(&self) -> &str {
        self.index.hash(self.best_tip)
    }

    pub fn best_block(&self) -> &Block {
        self.index.block(self.best_tip)
    }

    pub fn block(&self, hash: &str) -> Option<&Block> {
        self.index.find_by_hash(hash).map(|id| self.index.block(id))
    }

    pub fn height_of(&self, hash: &str) -> Option<u64> {
        self.index.find_by_hash(hash).map(|id| self.index.height(id))
    }

    pub fn is_on_best_chain(&self, hash: &str) -> bool {
        self.index
            .find_by_hash(hash)
            .is_some_and(|id| self.on_best_path(id))
    }

    pub fn is_side_chain(&self, hash: &str) -> bool {
        self.index
            .find_by_hash(hash)
            .is_some_and(|id| self.side_chain.contains(&id))
    }

    /// Blocks on the best path, genesis first.
    pub fn best_chain(&self) -> Vec<&Block> {
        self.best_path().into_iter().map(|id| self.index.block(id)).collect()
    }

    pub fn side_chain_blocks(&self) -> Vec<&Block> {
        self.side_chain.iter().map(|&id| self.index.block(id)).collect()
    }

    /// Every block in the tree, best path and side chains.
    pub fn block_count(&self) -> usize {
        self.index.len()
    }

    pub fn orphan_count(&self) -> usize {
        self.orphans.len()
    }

    pub fn mempool(&self) -> &Mempool {
        &self.mempool
    }

    pub fn template(&self) -> &Block {
        &self.template
    }

    pub fn coinbase_key(&self) -> &str {
        &self.coinbase_key
    }

    pub fn subscribe(&mut self) -> Receiver<LedgerEvent> {
        let (tx, rx) = unbounded();
        self.subscribers.push(tx);
        rx
    }

    fn emit(&mut self, event: LedgerEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Follows successor links from genesis to the best tip.
    fn best_path(&self) -> Vec<NodeId> {
        let mut path = Vec::with_capacity(self.current_height() as usize + 1);
        let mut cursor = Some(self.index.genesis());
        while let Some(id) = cursor {
            path.push(id);
            if id == self.best_tip {
                break;
            }
            cursor = self.index.next(id);
        }
        path
    }

    fn on_best_path(&self, id: NodeId) -> bool {
        let height = self.index.height(id);
        let best = self.current_height();
        height <= best && self.index.ancestor(self.best_tip, best - height) == Some(id)
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    pub fn serialize_chain(&self) -> Result<String, ChainError> {
        let snapshot = ChainSnapshot {
            best_chain: self.best_chain().into_iter().cloned().collect(),
            side_chain: self.side_chain_blocks().into_iter().cloned().collect(),
        };
        snapshot.encode()
    }

    pub fn persist(&self) -> Result<(), ChainError> {
        self.store.save(&self.serialize_chain()?)
    }

    /// Rebuilds the tree from the store, or from genesis if the store is empty.
    ///
    /// Orphans and pooled transactions survive. Orphans whose parent is now
    /// known are admitted and pooled transactions that no longer validate are
    /// dropped.
    pub fn load(&mut self) -> Result<(), ChainError> {
        match self.store.load()? {
            Some(text) => {
                let loaded = LoadedChain::from_text(&text)?;
                self.adopt(loaded);
                info!(
                    height = self.current_height(),
                    blocks = self.block_count(),
                    "chain loaded"
                );
            }
            None => {
                self.adopt(LoadedChain::genesis());
                self.persist()?;
                info!("no stored chain, started from genesis");
            }
        }

        self.resolve_buffered_orphans();
        self.revalidate_pool();
        self.template = self.build_template();
        Ok(())
    }

    /// Overwrites the stored chain with `text` and reloads from it.
    ///
    /// `text` is parsed before anything is written, so a malformed snapshot
    /// leaves both the store and the engine untouched.
    pub fn replace_chain(&mut self, text: &str) -> Result<(), ChainError> {
        LoadedChain::from_text(text)?;
        self.store.save(text)?;
        self.load()?;

        let height = self.current_height();
        info!(height, "chain replaced from snapshot");
        self.emit(LedgerEvent::ChainReplaced { height });
        Ok(())
    }

    fn adopt(&mut self, loaded: LoadedChain) {
        self.index = loaded.index;
        self.best_tip = loaded.best_tip;
        self.side_chain = loaded.side_chain;
        for block in loaded.unresolved {
            let hash = block.hash();
            warn!(block = %short(&hash), "stored side block has no known parent, buffering");
            self.orphans.insert(hash, block);
        }
    }
}

/// Tree rebuilt from persisted text.
struct LoadedChain {
    index: ChainIndex,
    best_tip: NodeId,
    side_chain: BTreeSet<NodeId>,
    /// Side blocks whose parent appears nowhere in the text.
    unresolved: Vec<Block>,
}

impl LoadedChain {
    fn genesis() -> Self {
        let index = ChainIndex::new(genesis_block());
        let best_tip = index.genesis();
        Self {
            index,
            best_tip,
            side_chain: BTreeSet::new(),
            unresolved: Vec::new(),
        }
    }

    /// Stored blocks are checked for linkage, proof of work and the timestamp
    /// window. Targets, rewards and spends are trusted.
    fn from_text(text: &str) -> Result<Self, ChainError> {
        let snapshot = ChainSnapshot::decode(text)?;
        let now = now_ms();
        let mut best = snapshot.best_chain.into_iter();

        let genesis = best
            .next()
            .ok_or_else(|| ChainError::CorruptChain("no best-chain blocks".to_string()))?;
        if genesis.hash() != genesis_block().hash() {
            return Err(ChainError::GenesisMismatch);
        }

        let mut index = ChainIndex::new(genesis);
        let mut tip = index.genesis();
        for block in best {
            let hash = block.hash();
            if block.previous_block_hash != index.hash(tip) {
                return Err(ChainError::CorruptChain(format!(
                    "best chain breaks at height {}",
                    index.height(tip) + 1
                )));
            }
            Self::check_stored(&index, tip, &block, &hash, now)?;
            let id = index.insert(block, tip);
            index.set_next(tip, Some(id));
            tip = id;
        }

        let mut side_chain = BTreeSet::new();
        let mut pending = snapshot.side_chain;
        loop {
            let mut waiting = Vec::new();
            let before = pending.len();
            for block in pending {
                let hash = block.hash();
                if index.find_by_hash(&hash).is_some() {
                    continue;
                }
                match index.find_by_hash(&block.previous_block_hash) {
                    Some(parent) => {
                        Self::check_stored(&index, parent, &block, &hash, now)?;
                        side_chain.insert(index.insert(block, parent));
                    }
                    None => waiting.push(block),
                }
            }
            pending = waiting;
            if pending.is_empty() || pending.len() == before {
                break;
            }
        }

        Ok(Self {
            index,
            best_tip: tip,
            side_chain,
            unresolved: pending,
        })
    }

    fn check_stored(
        index: &ChainIndex,
        parent: NodeId,
        block: &Block,
        hash: &str,
        now: i64,
    ) -> Result<(), ChainError> {
        if index.find_by_hash(hash).is_some() {
            return Err(ChainError::CorruptChain(format!("block {} stored twice", short(hash))));
        }
        check_proof_of_work(block, hash)
            .and_then(|()| check_timestamp(block, index, parent, now))
            .map_err(|reason| ChainError::CorruptChain(format!("block {}: {}", short(hash), reason)))
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn short(hash: &str) -> &str {
    hash.get(..12).unwrap_or(hash)
}
