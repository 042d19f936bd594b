use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};
use unionchain_core::{hex_serde, Block, Transaction};
use unionchain_network::{
    Handler, Message, Node, MSG_GET_BLOCK, MSG_GET_HEIGHT, MSG_GET_TIME, MSG_GET_TX, MSG_SET_BLOCK,
    MSG_SET_TX,
};
use unionchain_storage::Chain;

/// SetTX response codes.
pub const SET_TX_OK: u64 = 0;
pub const SET_TX_INVALID: u64 = 2;
pub const SET_TX_IN_CHAIN: u64 = 3;
pub const SET_TX_IN_MEMPOOL: u64 = 4;

/// Body of a SetBlock frame: a height paired with the block's canonical bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockAnnounce {
    pub height: u64,
    #[serde(with = "hex_serde::bytes")]
    pub block: Vec<u8>,
}

impl BlockAnnounce {
    pub fn to_bytes(&self) -> Vec<u8> {
        // A struct of a u64 and a hex string cannot fail to encode.
        serde_json::to_vec(self).expect("announce JSON encoding")
    }
}

/// State shared by every handler: the chain and the process-local clock.
pub struct ChainState {
    pub chain: Arc<Chain>,
    pub current_time: AtomicU64,
}

/// Decode a u64 big-endian message body.
pub fn decode_u64_body(body: &[u8]) -> Option<u64> {
    Some(u64::from_be_bytes(body.try_into().ok()?))
}

/// Register the full dispatch table on a node.
pub fn register(node: &Arc<Node>, state: Arc<ChainState>) {
    node.handle(MSG_GET_TIME, get_time(state.clone()))
        .handle(MSG_GET_HEIGHT, get_height(state.clone()))
        .handle(MSG_GET_BLOCK, get_block(state.clone()))
        .handle(MSG_SET_BLOCK, set_block(state.clone()))
        .handle(MSG_GET_TX, get_tx(state.clone()))
        .handle(MSG_SET_TX, set_tx(state));
}

fn get_time(state: Arc<ChainState>) -> Handler {
    Arc::new(move |_node, conn, _msg| {
        let state = state.clone();
        Box::pin(async move {
            let now = state.current_time.load(Ordering::Relaxed);
            conn.send(&Message::response(MSG_GET_TIME, now.to_be_bytes().to_vec()))
                .await
                .is_ok()
        })
    })
}

fn get_height(state: Arc<ChainState>) -> Handler {
    Arc::new(move |_node, conn, _msg| {
        let state = state.clone();
        Box::pin(async move {
            let height = state.chain.height();
            conn.send(&Message::response(MSG_GET_HEIGHT, height.to_be_bytes().to_vec()))
                .await
                .is_ok()
        })
    })
}

fn get_block(state: Arc<ChainState>) -> Handler {
    Arc::new(move |_node, conn, msg| {
        let state = state.clone();
        Box::pin(async move {
            let Some(height) = decode_u64_body(msg.body()) else {
                return false;
            };
            let body = state
                .chain
                .block(height)
                .map(|block| block.to_bytes())
                .unwrap_or_default();
            conn.send(&Message::response(MSG_GET_BLOCK, body)).await.is_ok()
        })
    })
}

fn get_tx(state: Arc<ChainState>) -> Handler {
    Arc::new(move |_node, conn, msg| {
        let state = state.clone();
        Box::pin(async move {
            let Ok(hash) = <[u8; 32]>::try_from(msg.body()) else {
                return false;
            };
            let body = state
                .chain
                .tx(&hash)
                .map(|tx| tx.to_bytes())
                .unwrap_or_default();
            conn.send(&Message::response(MSG_GET_TX, body)).await.is_ok()
        })
    })
}

fn set_tx(state: Arc<ChainState>) -> Handler {
    Arc::new(move |_node, conn, msg| {
        let state = state.clone();
        Box::pin(async move {
            let code = set_tx_code(&state, msg.body());
            conn.send(&Message::response(MSG_SET_TX, code.to_be_bytes().to_vec()))
                .await
                .is_ok()
        })
    })
}

/// Admit a transaction into the mempool, reporting why not. Accepted
/// transactions are not re-broadcast; they propagate once a producer embeds
/// them in a block.
pub fn set_tx_code(state: &ChainState, body: &[u8]) -> u64 {
    let Ok(tx) = Transaction::load(body) else {
        return SET_TX_INVALID;
    };

    if state.chain.tx(tx.hash()).is_some() {
        return SET_TX_IN_CHAIN;
    }

    let mempool = state.chain.mempool();
    if mempool.tx(tx.hash()).is_some() {
        return SET_TX_IN_MEMPOOL;
    }

    mempool.push(&tx);
    debug!("tx 0x{} entered mempool", hex::encode(&tx.hash()[..8]));
    SET_TX_OK
}

fn set_block(state: Arc<ChainState>) -> Handler {
    Arc::new(move |node, _conn, msg| {
        let state = state.clone();
        Box::pin(async move { handle_set_block(&state, &node, &msg) })
    })
}

/// Candidate-block gossip. Same-height candidates with a different tip hash
/// go through `merge`; other heights are treated as out-of-band proposals
/// whose transactions feed the mempool while the frame floods on.
pub fn handle_set_block(state: &ChainState, node: &Node, msg: &Message) -> bool {
    let Ok(announce) = serde_json::from_slice::<BlockAnnounce>(msg.body()) else {
        return false;
    };
    let Ok(block) = Block::load(&announce.block) else {
        return false;
    };

    let chain = &state.chain;
    let height = chain.height();

    if announce.height != height {
        let mempool = chain.mempool();
        for tx in block.txs() {
            if chain.tx(tx.hash()).is_some() {
                continue;
            }
            mempool.push(tx);
        }
        node.broadcast(msg);
        return true;
    }

    let Some(tip) = chain.block(height) else {
        return false;
    };
    if block.curr_hash() == tip.curr_hash() {
        return true;
    }

    if !chain.merge(height, block.txs()) {
        return true;
    }

    let Some(merged) = chain.block(height) else {
        return true;
    };
    info!(
        "🔀 merged block {height} hash 0x{} mempool={}",
        hex::encode(&merged.curr_hash()[..8]),
        chain.mempool().height()
    );

    let body = BlockAnnounce {
        height,
        block: merged.to_bytes(),
    }
    .to_bytes();
    node.broadcast(&Message::new(MSG_SET_BLOCK, body));
    true
}
