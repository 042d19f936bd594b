//! Wire-level scenarios against live sockets: request/response handlers,
//! SetTX replay codes and gossip dedup.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use unionchain_core::Block;
use unionchain_node::handlers::decode_u64_body;
use unionchain_network::{
    Client, Handler, Message, Node, MSG_GET_BLOCK, MSG_GET_HEIGHT, MSG_GET_TX, MSG_SET_TX,
};
use unionchain_tests::test_utils::{make_genesis, make_state, make_txs, serve_node, test_addr};

#[tokio::test]
async fn test_get_height_and_block_over_wire() {
    let dir = TempDir::new().unwrap();
    let genesis = make_genesis("genesis");
    let state = make_state(dir.path().join("chain"), &genesis);
    let (_node, addr) = serve_node(state).await;

    let mut client = Client::connect(&addr).await.unwrap();

    let resp = client.request(&Message::new(MSG_GET_HEIGHT, vec![])).await.unwrap();
    assert_eq!(decode_u64_body(resp.body()), Some(0));

    let resp = client
        .request(&Message::new(MSG_GET_BLOCK, 0u64.to_be_bytes().to_vec()))
        .await
        .unwrap();
    assert_eq!(Block::load(resp.body()).unwrap(), genesis);

    // Absent heights answer with an empty body
    let resp = client
        .request(&Message::new(MSG_GET_BLOCK, 5u64.to_be_bytes().to_vec()))
        .await
        .unwrap();
    assert!(resp.body().is_empty());
}

#[tokio::test]
async fn test_get_tx_over_wire() {
    let dir = TempDir::new().unwrap();
    let genesis = make_genesis("genesis");
    let committed = genesis.txs()[0].clone();
    let state = make_state(dir.path().join("chain"), &genesis);
    let (_node, addr) = serve_node(state).await;

    let mut client = Client::connect(&addr).await.unwrap();

    let resp = client
        .request(&Message::new(MSG_GET_TX, committed.hash().to_vec()))
        .await
        .unwrap();
    assert_eq!(resp.body(), committed.to_bytes());

    let resp = client
        .request(&Message::new(MSG_GET_TX, [0u8; 32].to_vec()))
        .await
        .unwrap();
    assert!(resp.body().is_empty());
}

#[tokio::test]
async fn test_set_tx_replay_codes() {
    let dir = TempDir::new().unwrap();
    let genesis = make_genesis("genesis");
    let state = make_state(dir.path().join("chain"), &genesis);
    let (_node, addr) = serve_node(state.clone()).await;

    let tx = make_txs(1, "replay").remove(0);
    let mut client = Client::connect(&addr).await.unwrap();

    // First submission is accepted, the replay reports "already in mempool"
    let resp = client
        .request(&Message::new(MSG_SET_TX, tx.to_bytes()))
        .await
        .unwrap();
    assert_eq!(decode_u64_body(resp.body()), Some(0));

    let resp = client
        .request(&Message::new(MSG_SET_TX, tx.to_bytes()))
        .await
        .unwrap();
    assert_eq!(decode_u64_body(resp.body()), Some(4));

    // Only one mempool entry exists
    assert_eq!(state.chain.mempool().height(), 1);
    assert!(state.chain.mempool().tx(tx.hash()).is_some());
}

#[tokio::test]
async fn test_set_tx_rejects_garbage_and_committed() {
    let dir = TempDir::new().unwrap();
    let genesis = make_genesis("genesis");
    let committed = genesis.txs()[0].clone();
    let state = make_state(dir.path().join("chain"), &genesis);
    let (_node, addr) = serve_node(state).await;

    let mut client = Client::connect(&addr).await.unwrap();

    let resp = client
        .request(&Message::new(MSG_SET_TX, b"garbage".to_vec()))
        .await
        .unwrap();
    assert_eq!(decode_u64_body(resp.body()), Some(2));

    let resp = client
        .request(&Message::new(MSG_SET_TX, committed.to_bytes()))
        .await
        .unwrap();
    assert_eq!(decode_u64_body(resp.body()), Some(3));
}

#[tokio::test]
async fn test_gossip_dedup_dispatches_once() {
    let counter = Arc::new(AtomicUsize::new(0));

    let node_b = Node::new();
    let handler: Handler = {
        let counter = counter.clone();
        Arc::new(move |_node, _conn, _msg| {
            let counter = counter.clone();
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                true
            })
        })
    };
    node_b.handle(MSG_SET_TX, handler);

    let addr = test_addr();
    {
        let node_b = node_b.clone();
        let addr = addr.clone();
        tokio::spawn(async move {
            let _ = node_b.listen(&addr).await;
        });
    }
    tokio::time::sleep(Duration::from_millis(100)).await;

    let node_a = Node::new();
    node_a.connect(&addr).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    // The same frame broadcast twice reaches the handler exactly once
    let msg = Message::new(MSG_SET_TX, b"payload".to_vec());
    node_a.broadcast(&msg);
    node_a.broadcast(&msg);
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(counter.load(Ordering::SeqCst), 1);
}
