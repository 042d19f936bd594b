//! End-to-end scenarios: block production, equal-height merge through the
//! gossip handler, plurality commit across three nodes, and startup sync.

use std::sync::Arc;
use tempfile::TempDir;
use unionchain_core::constants::TXS_PER_BLOCK;
use unionchain_core::Hash;
use unionchain_node::consensus;
use unionchain_node::handlers::{self, BlockAnnounce};
use unionchain_network::{Message, Node, MSG_SET_BLOCK};
use unionchain_tests::test_utils::{child_of, make_genesis, make_state, make_txs, serve_node};

#[test]
fn test_genesis_bring_up() {
    let dir = TempDir::new().unwrap();
    let genesis = make_genesis("genesis");
    let state = make_state(dir.path().join("chain"), &genesis);

    assert_eq!(state.chain.height(), 0);
    assert_eq!(state.chain.block(0), Some(genesis));
    assert_eq!(state.chain.mempool().height(), 0);
}

#[test]
fn test_single_block_produce_round() {
    let dir = TempDir::new().unwrap();
    let genesis = make_genesis("genesis");
    let state = make_state(dir.path().join("chain"), &genesis);

    let mempool = state.chain.mempool();
    let pending = make_txs(TXS_PER_BLOCK, "pending");
    for tx in &pending {
        mempool.push(tx);
    }

    let block = consensus::produce_block(&state.chain).expect("full mempool produces a block");

    assert_eq!(state.chain.height(), 1);
    assert_eq!(mempool.height(), 0);
    assert_eq!(state.chain.block(1), Some(block));
    for tx in &pending {
        assert_eq!(state.chain.tx(tx.hash()), Some(tx.clone()));
    }
}

#[test]
fn test_short_mempool_produces_nothing() {
    let dir = TempDir::new().unwrap();
    let genesis = make_genesis("genesis");
    let state = make_state(dir.path().join("chain"), &genesis);

    let mempool = state.chain.mempool();
    for tx in make_txs(TXS_PER_BLOCK - 1, "pending") {
        mempool.push(&tx);
    }

    assert!(consensus::produce_block(&state.chain).is_none());
    assert_eq!(state.chain.height(), 0);
    assert_eq!(mempool.height(), (TXS_PER_BLOCK - 1) as u64);
}

#[tokio::test]
async fn test_equal_height_merge_via_handler() {
    let dir = TempDir::new().unwrap();
    let genesis = make_genesis("genesis");
    let state = make_state(dir.path().join("a"), &genesis);

    // A and B form different blocks at height 1 over the same parent
    let block_a = child_of(&genesis, "a");
    let block_b = child_of(&genesis, "b");
    assert!(state.chain.accept(&block_a));

    let announce = BlockAnnounce {
        height: 1,
        block: block_b.to_bytes(),
    };
    let msg = Message::new(MSG_SET_BLOCK, announce.to_bytes());
    let node = Node::new();
    assert!(handlers::handle_set_block(&state, &node, &msg));

    let merged = state.chain.block(1).unwrap();
    assert!(merged.is_valid());
    assert_ne!(merged.curr_hash(), block_a.curr_hash());

    // The merged tx set is the lowest TXS_PER_BLOCK hashes of the union
    let mut union: Vec<Hash> = block_a
        .txs()
        .iter()
        .chain(block_b.txs())
        .map(|tx| *tx.hash())
        .collect();
    union.sort();
    let kept: Vec<Hash> = merged.txs().iter().map(|tx| *tx.hash()).collect();
    assert_eq!(kept, union[..TXS_PER_BLOCK]);

    // Displaced transactions ended up in the mempool
    let mempool = state.chain.mempool();
    assert_eq!(mempool.height(), TXS_PER_BLOCK as u64);
    for hash in &union[TXS_PER_BLOCK..] {
        assert!(mempool.tx(hash).is_some());
    }
}

#[tokio::test]
async fn test_same_tip_announce_is_dropped() {
    let dir = TempDir::new().unwrap();
    let genesis = make_genesis("genesis");
    let state = make_state(dir.path().join("a"), &genesis);

    let block = child_of(&genesis, "a");
    assert!(state.chain.accept(&block));

    let announce = BlockAnnounce {
        height: 1,
        block: block.to_bytes(),
    };
    let msg = Message::new(MSG_SET_BLOCK, announce.to_bytes());
    let node = Node::new();
    assert!(handlers::handle_set_block(&state, &node, &msg));

    // Nothing changed
    assert_eq!(state.chain.block(1), Some(block));
    assert_eq!(state.chain.mempool().height(), 0);
}

#[tokio::test]
async fn test_out_of_band_announce_feeds_mempool() {
    let dir = TempDir::new().unwrap();
    let genesis = make_genesis("genesis");
    let state = make_state(dir.path().join("a"), &genesis);

    // A proposal two heights ahead: its txs are kept, nothing is accepted
    let block = child_of(&genesis, "far");
    let announce = BlockAnnounce {
        height: 2,
        block: block.to_bytes(),
    };
    let msg = Message::new(MSG_SET_BLOCK, announce.to_bytes());
    let node = Node::new();
    assert!(handlers::handle_set_block(&state, &node, &msg));

    assert_eq!(state.chain.height(), 0);
    assert_eq!(state.chain.mempool().height(), TXS_PER_BLOCK as u64);
}

#[tokio::test]
async fn test_plurality_commit_converges_three_nodes() {
    let dir = TempDir::new().unwrap();
    let genesis = make_genesis("genesis");

    let state_a = make_state(dir.path().join("a"), &genesis);
    let state_b = make_state(dir.path().join("b"), &genesis);
    let state_c = make_state(dir.path().join("c"), &genesis);

    // A and B agree on X; C sits on its own Y over the same parent
    let block_x = child_of(&genesis, "x");
    let block_y = child_of(&genesis, "y");
    assert!(state_a.chain.accept(&block_x));
    assert!(state_b.chain.accept(&block_x));
    assert!(state_c.chain.accept(&block_y));

    let (_node_a, addr_a) = serve_node(state_a.clone()).await;
    let (_node_b, addr_b) = serve_node(state_b.clone()).await;

    consensus::commit_round(&state_c, &[addr_a, addr_b]).await;

    // C rolled back Y and adopted X; all three replicas now agree
    assert_eq!(state_c.chain.height(), 1);
    assert_eq!(state_c.chain.block(1), Some(block_x.clone()));
    assert_eq!(state_a.chain.block(1), Some(block_x.clone()));
    assert_eq!(state_b.chain.block(1), Some(block_x));
}

#[tokio::test]
async fn test_commit_round_keeps_local_tip_when_alone() {
    let dir = TempDir::new().unwrap();
    let genesis = make_genesis("genesis");
    let state = make_state(dir.path().join("a"), &genesis);

    let block = child_of(&genesis, "solo");
    assert!(state.chain.accept(&block));

    // No peers reachable: the local tip stands
    consensus::commit_round(&state, &["127.0.0.1:1".to_string()]).await;

    assert_eq!(state.chain.height(), 1);
    assert_eq!(state.chain.block(1), Some(block));
}

#[tokio::test]
async fn test_bootstrap_adopts_peer_chain() {
    let dir = TempDir::new().unwrap();
    let genesis = make_genesis("genesis");
    let state_a = make_state(dir.path().join("a"), &genesis);

    let block = child_of(&genesis, "b1");
    assert!(state_a.chain.accept(&block));

    let (_node_a, addr_a) = serve_node(state_a.clone()).await;

    // A fresh node syncing from A adopts its genesis and its block 1
    let path_b = dir.path().join("b");
    let (chain_b, _time) =
        consensus::bootstrap_chain(path_b.to_str().unwrap(), &[addr_a]).await.unwrap();

    assert_eq!(chain_b.height(), 1);
    assert_eq!(chain_b.block(0), Some(genesis));
    assert_eq!(chain_b.block(1), Some(block));
}
