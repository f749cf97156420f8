//! Single-owner control loop around the ledger engine.
//!
//! The node task owns the [`Blockchain`]. Peers' messages arrive on an inbound
//! queue, replies and broadcasts leave on an outbound queue, and between drains
//! the loop runs one time-sliced mining attempt before yielding.

use crate::blockchain::{BlockOutcome, Blockchain, TxOutcome};
use crate::crypto::KeyPair;
use crate::error::ChainError;
use crate::miner::CancelFlag;
use crate::persistence::ChainSnapshot;
use crate::protocol::Message;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

pub type PeerId = u64;

#[derive(Debug, Clone)]
pub enum Inbound {
    Connected(PeerId),
    Message(PeerId, Message),
    /// Local request to pay `amount` from `sender` to `recipient_key`.
    Pay {
        sender: KeyPair,
        recipient_key: String,
        amount: u64,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Send(PeerId, Message),
    Broadcast(Message),
}

#[derive(Debug, Clone)]
pub struct NodeSettings {
    pub mining_enabled: bool,
    /// Wall-clock budget of one mining attempt.
    pub mining_budget: Duration,
    /// Pause after each mining attempt.
    pub idle_pause: Duration,
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            mining_enabled: true,
            mining_budget: Duration::from_millis(50),
            idle_pause: Duration::ZERO,
        }
    }
}

/// Cloneable control surface of a running node.
#[derive(Clone)]
pub struct NodeHandle {
    inbound: mpsc::UnboundedSender<Inbound>,
    shutdown: Arc<watch::Sender<bool>>,
    cancel: CancelFlag,
}

impl NodeHandle {
    /// Queues a message for the node. `false` once the node has stopped.
    pub fn deliver(&self, inbound: Inbound) -> bool {
        self.inbound.send(inbound).is_ok()
    }

    /// Stops the loop and interrupts a running mining attempt.
    pub fn shutdown(&self) {
        self.cancel.cancel();
        let _ = self.shutdown.send(true);
    }
}

pub struct Node {
    chain: Blockchain,
    settings: NodeSettings,
    inbound: mpsc::UnboundedReceiver<Inbound>,
    outbound: mpsc::UnboundedSender<Outbound>,
    shutdown: watch::Receiver<bool>,
    cancel: CancelFlag,
}

impl Node {
    /// Wires a node around `chain`. The returned receiver yields everything the
    /// node wants delivered to peers.
    pub fn new(
        chain: Blockchain,
        settings: NodeSettings,
    ) -> (Self, NodeHandle, mpsc::UnboundedReceiver<Outbound>) {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let cancel = CancelFlag::new();

        let node = Node {
            chain,
            settings,
            inbound: inbound_rx,
            outbound: outbound_tx,
            shutdown: shutdown_rx,
            cancel: cancel.clone(),
        };
        let handle = NodeHandle {
            inbound: inbound_tx,
            shutdown: Arc::new(shutdown_tx),
            cancel,
        };
        (node, handle, outbound_rx)
    }

    /// Runs until shutdown is requested or every handle is dropped, then
    /// persists the chain and hands it back.
    pub async fn run(mut self) -> Result<Blockchain, ChainError> {
        info!(
            height = self.chain.current_height(),
            mining = self.settings.mining_enabled,
            "node started"
        );

        loop {
            if self.settings.mining_enabled {
                if !self.drain_inbound() || *self.shutdown.borrow() {
                    break;
                }
                self.mine_slice();
                tokio::task::yield_now().await;
                if !self.settings.idle_pause.is_zero() {
                    tokio::time::sleep(self.settings.idle_pause).await;
                }
            } else {
                // queued messages are handled before a pending shutdown
                tokio::select! {
                    biased;
                    inbound = self.inbound.recv() => match inbound {
                        Some(inbound) => self.handle(inbound),
                        None => break,
                    },
                    changed = self.shutdown.changed() => {
                        if changed.is_err() || *self.shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
        }

        self.chain.persist()?;
        info!(height = self.chain.current_height(), "node stopped");
        Ok(self.chain)
    }

    /// Handles everything queued so far. `false` when the inbound side is closed.
    fn drain_inbound(&mut self) -> bool {
        loop {
            match self.inbound.try_recv() {
                Ok(inbound) => self.handle(inbound),
                Err(TryRecvError::Empty) => return true,
                Err(TryRecvError::Disconnected) => return false,
            }
        }
    }

    fn mine_slice(&mut self) {
        if self.cancel.is_cancelled() {
            return;
        }
        if let Some(block) = self
            .chain
            .try_mine_once(self.settings.mining_budget, &self.cancel)
        {
            self.send(Outbound::Broadcast(Message::Block(block)));
        }
    }

    fn handle(&mut self, inbound: Inbound) {
        match inbound {
            Inbound::Connected(peer) => {
                debug!(peer, "peer connected");
                let height = self.chain.current_height();
                self.send(Outbound::Send(peer, Message::ChainHeight(height)));
            }
            Inbound::Message(peer, message) => {
                debug!(peer, kind = message.kind(), "message received");
                self.handle_message(peer, message);
            }
            Inbound::Pay {
                sender,
                recipient_key,
                amount,
            } => match self.chain.send_payment(&sender, &recipient_key, amount) {
                Ok(tx) => self.send(Outbound::Broadcast(Message::Transaction(tx))),
                Err(e) => warn!(amount, error = %e, "payment not sent"),
            },
        }
    }

    fn handle_message(&mut self, peer: PeerId, message: Message) {
        match message {
            Message::Transaction(tx) => {
                if self.chain.submit_transaction(tx.clone()) == TxOutcome::Accepted {
                    self.send(Outbound::Broadcast(Message::Transaction(tx)));
                }
            }
            Message::Block(block) => {
                if let BlockOutcome::Rejected(reason) = self.chain.submit_block(block) {
                    debug!(peer, %reason, "peer block rejected");
                }
            }
            Message::ChainHeight(theirs) => {
                if theirs < self.chain.current_height() {
                    match self.chain.serialize_chain() {
                        Ok(text) => self.send(Outbound::Send(peer, Message::ChainSnapshot(text))),
                        Err(e) => warn!(peer, error = %e, "could not serialize chain"),
                    }
                }
            }
            Message::ChainSnapshot(text) => self.consider_snapshot(peer, &text),
        }
    }

    fn consider_snapshot(&mut self, peer: PeerId, text: &str) {
        let snapshot = match ChainSnapshot::decode(text) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(peer, error = %e, "ignoring malformed snapshot");
                return;
            }
        };
        if snapshot.best_height() <= self.chain.current_height() {
            debug!(peer, theirs = snapshot.best_height(), "snapshot not longer than ours");
            return;
        }
        if let Err(e) = self.chain.replace_chain(text) {
            warn!(peer, error = %e, "snapshot replacement failed");
        }
    }

    fn send(&self, outbound: Outbound) {
        if self.outbound.send(outbound).is_err() {
            debug!("outbound queue closed");
        }
    }
}
