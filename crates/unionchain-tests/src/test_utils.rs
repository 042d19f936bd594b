use std::sync::atomic::{AtomicU16, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use unionchain_core::constants::{GENESIS_PREV_BLOCK, TXS_PER_BLOCK};
use unionchain_core::{Block, Transaction};
use unionchain_crypto::Keypair;
use unionchain_node::handlers::{self, ChainState};
use unionchain_network::Node;
use unionchain_storage::Chain;

/// Distinct localhost address per call, so parallel tests never collide.
pub fn test_addr() -> String {
    static PORT: AtomicU16 = AtomicU16::new(47310);
    format!("127.0.0.1:{}", PORT.fetch_add(1, Ordering::Relaxed))
}

/// A batch of valid transactions signed by one throwaway key; distinct tags
/// give distinct hashes across batches.
pub fn make_txs(n: usize, tag: &str) -> Vec<Transaction> {
    let keypair = Keypair::generate();
    (0..n)
        .map(|i| Transaction::new(&keypair, format!("{tag}-{i}").into_bytes()).unwrap())
        .collect()
}

pub fn make_genesis(tag: &str) -> Block {
    Block::new(GENESIS_PREV_BLOCK.to_vec(), make_txs(TXS_PER_BLOCK, tag)).unwrap()
}

pub fn child_of(parent: &Block, tag: &str) -> Block {
    Block::new(parent.curr_hash().to_vec(), make_txs(TXS_PER_BLOCK, tag)).unwrap()
}

/// A chain with the handler state the node crate dispatches against.
pub fn make_state(path: std::path::PathBuf, genesis: &Block) -> Arc<ChainState> {
    Arc::new(ChainState {
        chain: Arc::new(Chain::create(path, genesis).unwrap()),
        current_time: AtomicU64::new(0),
    })
}

/// A listening node serving the full dispatch table for `state`. Returns the
/// node and its address once the listener is up.
pub async fn serve_node(state: Arc<ChainState>) -> (Arc<Node>, String) {
    let addr = test_addr();
    let node = Node::new();
    handlers::register(&node, state);

    {
        let node = node.clone();
        let addr = addr.clone();
        tokio::spawn(async move {
            let _ = node.listen(&addr).await;
        });
    }
    tokio::time::sleep(Duration::from_millis(100)).await;

    (node, addr)
}
