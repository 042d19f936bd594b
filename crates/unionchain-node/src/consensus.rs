use crate::genesis;
use crate::handlers::{decode_u64_body, BlockAnnounce, ChainState};
use crate::settings::INTERVAL_TIME;
use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use unionchain_core::{Block, Hash};
use unionchain_network::{Client, Message, Node, MSG_GET_BLOCK, MSG_GET_TIME, MSG_SET_BLOCK};
use unionchain_storage::Chain;

/// Open the local chain, creating a fresh one with a random genesis when the
/// directory does not exist, then sync from the first reachable peer. Returns
/// the chain and the peer-seeded clock (0 when no peer answered).
pub async fn bootstrap_chain(path: &str, peers: &[String]) -> anyhow::Result<(Arc<Chain>, u64)> {
    let fresh = !Path::new(path).exists();
    let mut chain = if fresh {
        info!("creating fresh chain at {path}");
        Arc::new(Chain::create(path, &genesis::new_genesis()?)?)
    } else {
        Arc::new(Chain::open(path)?)
    };

    let mut seeded_time = 0;
    for addr in peers {
        let Ok(mut client) = Client::connect(addr).await else {
            debug!("peer {addr} unreachable during sync");
            continue;
        };
        info!("syncing blocks from {addr}");
        chain = sync_blocks(chain, fresh, &mut client, path).await?;
        seeded_time = fetch_time(&mut client).await.unwrap_or(0);
        break;
    }

    Ok((chain, seeded_time))
}

/// Walk the peer's chain upward, adopting its genesis when ours was freshly
/// created and feeding every later block to `accept`. The first failed fetch
/// or rejected block stops the walk.
async fn sync_blocks(
    mut chain: Arc<Chain>,
    fresh: bool,
    client: &mut Client,
    path: &str,
) -> anyhow::Result<Arc<Chain>> {
    let mut height = if fresh { 0 } else { chain.height() + 1 };

    loop {
        let Some(block) = fetch_block(client, height).await else {
            break;
        };

        if height == 0 {
            if fresh && chain.block(0).as_ref() != Some(&block) {
                // The bootstrap chain has no other owners yet; close it
                // before wiping the directory.
                drop(chain);
                Chain::destroy(path)?;
                chain = Arc::new(Chain::create(path, &block)?);
                info!("adopted peer genesis 0x{}", hex::encode(&block.curr_hash()[..8]));
            }
        } else if height == chain.height() + 1 {
            if !chain.accept(&block) {
                warn!("sync stopped: block {height} rejected");
                break;
            }
            info!("synced block {height} hash 0x{}", hex::encode(&block.curr_hash()[..8]));
        }

        height += 1;
    }

    Ok(chain)
}

/// Request one block by height; `None` covers unreachable peers, empty
/// responses and invalid block bytes alike.
pub async fn fetch_block(client: &mut Client, height: u64) -> Option<Block> {
    let msg = Message::new(MSG_GET_BLOCK, height.to_be_bytes().to_vec());
    let resp = client.request(&msg).await.ok()?;
    if resp.body().is_empty() {
        return None;
    }
    Block::load(resp.body()).ok()
}

/// Request the peer's clock.
pub async fn fetch_time(client: &mut Client) -> Option<u64> {
    let resp = client.request(&Message::new(MSG_GET_TIME, vec![])).await.ok()?;
    decode_u64_body(resp.body())
}

/// One-second timer: advance the clock, and on every commit tick run the
/// commit and produce rounds under the dispatch lock so handlers never race
/// them.
pub async fn run_timer(node: Arc<Node>, state: Arc<ChainState>, peers: Vec<String>) {
    loop {
        sleep(Duration::from_secs(1)).await;
        let now = state.current_time.fetch_add(1, Ordering::Relaxed) + 1;
        if now % INTERVAL_TIME != 0 {
            continue;
        }

        let _guard = node.lock_dispatch().await;
        commit_round(&state, &peers).await;
        produce_round(&node, &state);
    }
}

/// Poll every peer for its tip at the local height, tally the same-parent
/// candidates by tip hash and adopt the plurality winner, rolling back one
/// block when the winner differs from the local tip. Unreachable peers
/// simply cast no vote; if no candidate shares our parent, the local tip
/// stands.
pub async fn commit_round(state: &ChainState, peers: &[String]) {
    let chain = &state.chain;
    let height = chain.height();
    let Some(local_tip) = chain.block(height) else {
        warn!("commit round skipped: no tip block at height {height}");
        return;
    };

    let mut candidates = vec![local_tip.clone()];
    for addr in peers {
        let Ok(mut client) = Client::connect(addr).await else {
            debug!("no vote from {addr}: unreachable");
            continue;
        };
        let Some(block) = fetch_block(&mut client, height).await else {
            debug!("no vote from {addr}: no block at height {height}");
            continue;
        };
        if block.prev_hash() == local_tip.prev_hash() {
            candidates.push(block);
        }
    }

    let Some(winner_hash) = plurality_winner(candidates.iter().map(|b| *b.curr_hash())) else {
        return;
    };

    if winner_hash == *local_tip.curr_hash() {
        info!(
            "✅ committed height {height} hash 0x{} votes={}",
            hex::encode(&winner_hash[..8]),
            candidates.len()
        );
        return;
    }

    // A plurality disagrees with us: replace our tip with the winner.
    let Some(winner) = candidates.iter().find(|b| *b.curr_hash() == winner_hash) else {
        return;
    };
    if !chain.rollback(1) {
        warn!("commit round aborted: rollback failed at height {height}");
        return;
    }
    if !chain.accept(winner) {
        warn!("commit round aborted: winner rejected at height {height}");
        return;
    }
    info!(
        "🔁 switched to plurality tip at height {height} hash 0x{}",
        hex::encode(&winner_hash[..8])
    );
}

/// Winner of a tip vote: the hash with the highest count; ties go to the
/// lexicographically smallest hash, so every replica resolves identically.
pub fn plurality_winner(hashes: impl IntoIterator<Item = Hash>) -> Option<Hash> {
    let mut counts: std::collections::BTreeMap<Hash, usize> = std::collections::BTreeMap::new();
    for hash in hashes {
        *counts.entry(hash).or_insert(0) += 1;
    }

    // Ascending iteration order: on a tied count the first (smallest) hash
    // is kept.
    let mut best: Option<(Hash, usize)> = None;
    for (hash, count) in counts {
        match &best {
            Some((_, best_count)) if *best_count >= count => {}
            _ => best = Some((hash, count)),
        }
    }
    best.map(|(hash, _)| hash)
}

/// Build and commit the next block from a full mempool batch, then announce
/// it to the peers.
pub fn produce_round(node: &Node, state: &ChainState) {
    let Some(block) = produce_block(&state.chain) else {
        return;
    };

    let height = state.chain.height();
    info!(
        "📦 produced block {height} hash 0x{} mempool={}",
        hex::encode(&block.curr_hash()[..8]),
        state.chain.mempool().height()
    );

    let body = BlockAnnounce {
        height,
        block: block.to_bytes(),
    }
    .to_bytes();
    node.broadcast(&Message::new(MSG_SET_BLOCK, body));
}

/// Pop a full batch and chain it onto the current tip. Returns the accepted
/// block, or `None` when the mempool is short or the chain rejects it.
pub fn produce_block(chain: &Chain) -> Option<Block> {
    let txs = chain.mempool().pop()?;
    let tip = chain.block(chain.height())?;

    let block = match Block::new(tip.curr_hash().to_vec(), txs) {
        Ok(block) => block,
        Err(e) => {
            warn!("produced batch rejected: {e}");
            return None;
        }
    };

    if !chain.accept(&block) {
        warn!("produced block rejected by chain");
        return None;
    }
    Some(block)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plurality_majority_wins() {
        let a = [1u8; 32];
        let b = [2u8; 32];
        assert_eq!(plurality_winner([a, b, a]), Some(a));
    }

    #[test]
    fn test_plurality_tie_takes_smallest_hash() {
        let small = [1u8; 32];
        let large = [9u8; 32];
        assert_eq!(plurality_winner([large, small]), Some(small));
        assert_eq!(plurality_winner([small, large]), Some(small));
    }

    #[test]
    fn test_plurality_empty() {
        assert_eq!(plurality_winner(Vec::new()), None);
    }

    #[test]
    fn test_plurality_single_vote() {
        let only = [7u8; 32];
        assert_eq!(plurality_winner([only]), Some(only));
    }
}
