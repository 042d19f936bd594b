use unionchain_core::constants::{GENESIS_PREV_BLOCK, TXS_PER_BLOCK};
use unionchain_core::{Block, Result, Transaction};
use unionchain_crypto::Keypair;

/// Build a fresh genesis block over the sentinel parent, filled with
/// placeholder transactions from a throwaway key. Nodes that boot first
/// create one; late joiners adopt the first reachable peer's block 0.
pub fn new_genesis() -> Result<Block> {
    let keypair = Keypair::generate();
    let txs = (0..TXS_PER_BLOCK)
        .map(|i| Transaction::new(&keypair, format!("info-G-{i}").into_bytes()))
        .collect::<Result<Vec<_>>>()?;
    Block::new(GENESIS_PREV_BLOCK.to_vec(), txs)
}
