use crate::constants::TXS_PER_BLOCK;
use crate::{hex_serde, CoreError, Hash, Result, Transaction};
use serde::{Deserialize, Serialize};
use unionchain_crypto::sha256_pair;

/// Fixed-size batch of transactions chained to its predecessor by hash.
///
/// Transactions are kept sorted ascending by transaction hash, and
/// `curr_hash` is the fold of `prev_hash` over the sorted tx hashes:
/// `h0 = prev_hash`, `h_{i+1} = SHA256(h_i || tx_i.hash)`.
///
/// `prev_hash` is the parent's 32-byte `curr_hash` for every block except
/// genesis, whose parent is the [`GENESIS_PREV_BLOCK`] sentinel.
///
/// [`GENESIS_PREV_BLOCK`]: crate::constants::GENESIS_PREV_BLOCK
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    #[serde(with = "hex_serde::bytes")]
    prev_hash: Vec<u8>,
    txs: Vec<Transaction>,
    #[serde(with = "hex_serde::array")]
    curr_hash: Hash,
}

impl Block {
    /// Build a block over `prev_hash` from exactly [`TXS_PER_BLOCK`]
    /// transactions. Sorts the batch by tx hash, rejects duplicates and
    /// invalid transactions, then computes `curr_hash`.
    pub fn new(prev_hash: Vec<u8>, mut txs: Vec<Transaction>) -> Result<Self> {
        if txs.len() != TXS_PER_BLOCK {
            return Err(CoreError::WrongTxCount {
                expected: TXS_PER_BLOCK,
                got: txs.len(),
            });
        }

        if !txs.iter().all(Transaction::is_valid) {
            return Err(CoreError::InvalidTransaction);
        }

        txs.sort_by(|a, b| a.hash().cmp(b.hash()));

        if txs.windows(2).any(|w| w[0].hash() == w[1].hash()) {
            return Err(CoreError::DuplicateTransaction);
        }

        let curr_hash = chain_hash(&prev_hash, &txs);
        Ok(Self {
            prev_hash,
            txs,
            curr_hash,
        })
    }

    /// Parse a block from its canonical bytes, rejecting invalid ones.
    pub fn load(bytes: &[u8]) -> Result<Self> {
        let block: Self = serde_json::from_slice(bytes)?;
        if !block.is_valid() {
            return Err(CoreError::InvalidBlock("validation failed".into()));
        }
        Ok(block)
    }

    /// Canonical serialization, identical on disk and on the wire.
    pub fn to_bytes(&self) -> Vec<u8> {
        // A struct of hex strings cannot fail to encode.
        serde_json::to_vec(self).expect("block JSON encoding")
    }

    pub fn prev_hash(&self) -> &[u8] {
        &self.prev_hash
    }

    pub fn txs(&self) -> &[Transaction] {
        &self.txs
    }

    pub fn into_txs(self) -> Vec<Transaction> {
        self.txs
    }

    pub fn curr_hash(&self) -> &Hash {
        &self.curr_hash
    }

    /// Recheck every block invariant: tx count, sorted order (which also
    /// rules out duplicates), per-tx validity and the stored `curr_hash`.
    pub fn is_valid(&self) -> bool {
        if self.txs.len() != TXS_PER_BLOCK {
            return false;
        }

        if self.txs.windows(2).any(|w| w[0].hash() >= w[1].hash()) {
            return false;
        }

        if !self.txs.iter().all(Transaction::is_valid) {
            return false;
        }

        self.curr_hash == chain_hash(&self.prev_hash, &self.txs)
    }
}

/// Fold `prev_hash` over the tx hashes. `txs` must be non-empty, which every
/// caller guarantees by checking the count first.
fn chain_hash(prev_hash: &[u8], txs: &[Transaction]) -> Hash {
    let mut acc = sha256_pair(prev_hash, txs[0].hash());
    for tx in &txs[1..] {
        acc = sha256_pair(&acc, tx.hash());
    }
    acc
}
