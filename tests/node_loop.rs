//! Integration tests for the node control loop

use branchcoin::blockchain::Blockchain;
use branchcoin::crypto::{sign_transaction, KeyPair, Secp256k1Verifier};
use branchcoin::miner::mine_block;
use branchcoin::node::{Inbound, Node, NodeSettings, Outbound};
use branchcoin::persistence::{ChainSnapshot, InMemoryChainStore};
use branchcoin::protocol::Message;
use branchcoin::transaction::{Input, Output, Transaction};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(60);

fn relay_only() -> NodeSettings {
    NodeSettings {
        mining_enabled: false,
        ..NodeSettings::default()
    }
}

fn grow(chain: &mut Blockchain, blocks: usize) {
    for _ in 0..blocks {
        let tip = chain.best_tip_hash().to_string();
        let candidate = chain.candidate_block(&tip, "peer", vec![]).unwrap();
        assert!(chain.submit_block(mine_block(candidate).unwrap()).is_accepted());
    }
}

async fn next_outbound(outbound: &mut UnboundedReceiver<Outbound>) -> Outbound {
    timeout(WAIT, outbound.recv())
        .await
        .expect("node answered in time")
        .expect("outbound queue open")
}

#[tokio::test]
async fn test_connect_announces_height() {
    let (node, handle, mut outbound) = Node::new(Blockchain::new("local"), relay_only());
    let task = tokio::spawn(node.run());

    assert!(handle.deliver(Inbound::Connected(4)));
    assert_eq!(
        next_outbound(&mut outbound).await,
        Outbound::Send(4, Message::ChainHeight(0))
    );

    handle.shutdown();
    let chain = task.await.unwrap().unwrap();
    assert_eq!(chain.current_height(), 0);
}

#[tokio::test]
async fn test_shorter_peer_receives_snapshot() {
    let mut chain = Blockchain::new("local");
    grow(&mut chain, 2);
    let expected = chain.serialize_chain().unwrap();

    let (node, handle, mut outbound) = Node::new(chain, relay_only());
    let task = tokio::spawn(node.run());

    handle.deliver(Inbound::Message(9, Message::ChainHeight(5)));
    handle.deliver(Inbound::Message(9, Message::ChainHeight(1)));
    assert_eq!(
        next_outbound(&mut outbound).await,
        Outbound::Send(9, Message::ChainSnapshot(expected))
    );

    handle.shutdown();
    task.await.unwrap().unwrap();
    assert!(outbound.try_recv().is_err());
}

#[tokio::test]
async fn test_longer_snapshot_replaces_chain() {
    let mut peer = Blockchain::new("peer");
    grow(&mut peer, 3);
    let snapshot = peer.serialize_chain().unwrap();
    let short = {
        let mut shorter = Blockchain::new("peer");
        grow(&mut shorter, 1);
        shorter.serialize_chain().unwrap()
    };

    let mut local = Blockchain::new("local");
    grow(&mut local, 2);
    let (node, handle, _outbound) = Node::new(local, relay_only());
    let task = tokio::spawn(node.run());

    handle.deliver(Inbound::Message(1, Message::ChainSnapshot(short)));
    handle.deliver(Inbound::Message(1, Message::ChainSnapshot("garbage".to_string())));
    handle.deliver(Inbound::Message(2, Message::ChainSnapshot(snapshot.clone())));
    handle.shutdown();

    let chain = task.await.unwrap().unwrap();
    assert_eq!(chain.current_height(), 3);
    assert_eq!(chain.best_tip_hash(), peer.best_tip_hash());
    assert_eq!(ChainSnapshot::decode(&chain.serialize_chain().unwrap()).unwrap().best_height(), 3);
}

#[tokio::test]
async fn test_accepted_transaction_is_relayed() {
    let alice = KeyPair::generate();
    let mut chain = Blockchain::new("local");
    let tip = chain.best_tip_hash().to_string();
    let funding = mine_block(chain.candidate_block(&tip, &alice.recipient_key(), vec![]).unwrap()).unwrap();
    assert!(chain.submit_block(funding.clone()).is_accepted());

    let mut tx = Transaction::new(
        vec![Input::new(funding.transactions[0].hash(), 0)],
        vec![Output::new(1200, "bob")],
    );
    sign_transaction(&mut tx, &alice).unwrap();
    let unsigned = Transaction::new(
        vec![Input::new(funding.transactions[0].hash(), 0)],
        vec![Output::new(1, "eve")],
    );

    let (node, handle, mut outbound) = Node::new(chain, relay_only());
    let task = tokio::spawn(node.run());

    handle.deliver(Inbound::Message(3, Message::Transaction(unsigned)));
    handle.deliver(Inbound::Message(3, Message::Transaction(tx.clone())));
    assert_eq!(
        next_outbound(&mut outbound).await,
        Outbound::Broadcast(Message::Transaction(tx.clone()))
    );

    handle.shutdown();
    let chain = task.await.unwrap().unwrap();
    assert!(chain.mempool().contains(&tx.hash()));
    assert_eq!(chain.mempool().len(), 1);
}

#[tokio::test]
async fn test_mining_node_broadcasts_and_persists() {
    let store = InMemoryChainStore::new();
    let chain = Blockchain::open(Box::new(store.clone()), Box::new(Secp256k1Verifier), "local").unwrap();
    let settings = NodeSettings {
        mining_enabled: true,
        mining_budget: Duration::from_millis(50),
        idle_pause: Duration::ZERO,
    };
    let (node, handle, mut outbound) = Node::new(chain, settings);
    let task = tokio::spawn(node.run());

    let mined = match next_outbound(&mut outbound).await {
        Outbound::Broadcast(Message::Block(block)) => block,
        other => panic!("expected a mined block, got {other:?}"),
    };
    assert_eq!(mined.transactions[0].outputs[0].recipient_key, "local");

    handle.shutdown();
    let chain = task.await.unwrap().unwrap();
    assert!(chain.current_height() >= 1);
    assert!(chain.block(&mined.hash()).is_some());

    let stored = ChainSnapshot::decode(&store.contents().unwrap()).unwrap();
    assert_eq!(stored.best_height(), chain.current_height());
}

#[tokio::test]
async fn test_local_payment_is_pooled_and_relayed() {
    let alice = KeyPair::generate();
    let mut chain = Blockchain::new("local");
    let tip = chain.best_tip_hash().to_string();
    let funding = mine_block(chain.candidate_block(&tip, &alice.recipient_key(), vec![]).unwrap()).unwrap();
    assert!(chain.submit_block(funding).is_accepted());

    let (node, handle, mut outbound) = Node::new(chain, relay_only());
    let task = tokio::spawn(node.run());

    handle.deliver(Inbound::Pay {
        sender: alice.clone(),
        recipient_key: "bob".to_string(),
        amount: 9000,
    });
    handle.deliver(Inbound::Pay {
        sender: alice.clone(),
        recipient_key: "bob".to_string(),
        amount: 1500,
    });
    let tx = match next_outbound(&mut outbound).await {
        Outbound::Broadcast(Message::Transaction(tx)) => tx,
        other => panic!("expected a relayed payment, got {other:?}"),
    };
    assert_eq!(tx.outputs[0], Output::new(1500, "bob"));
    assert_eq!(tx.outputs[1], Output::new(3500, alice.recipient_key()));

    handle.shutdown();
    let chain = task.await.unwrap().unwrap();
    assert!(chain.mempool().contains(&tx.hash()));
    assert_eq!(chain.mempool().len(), 1);
}
