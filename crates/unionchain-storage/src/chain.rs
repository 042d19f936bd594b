use crate::kv::{decode_u64, keys, KvDb, Namespace};
use crate::mempool::Mempool;
use crate::{Result, StorageError};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;
use unionchain_core::constants::TXS_PER_BLOCK;
use unionchain_core::{Block, Hash, Height, Transaction};

/// Persistent ledger state: the block-by-height chain, the committed
/// transaction index and the pending-transaction mempool.
///
/// `accept`, `merge` and `rollback` are linearized under a single internal
/// mutex and commit through one write batch, so readers never observe a
/// partial mutation. Failed mutations leave the store untouched and return
/// `false`; callers log and carry on (the next interval retries).
pub struct Chain {
    db: Arc<KvDb>,
    lock: Mutex<()>,
    mempool: Arc<Mempool>,
    path: PathBuf,
}

impl Chain {
    /// Create a fresh chain at `path` with `genesis` installed at height 0,
    /// its transactions indexed and an empty mempool. Fails if the directory
    /// already exists; a partially created directory is torn down on error.
    pub fn create<P: AsRef<Path>>(path: P, genesis: &Block) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if path.exists() {
            return Err(StorageError::AlreadyExists(path));
        }

        match Self::create_inner(&path, genesis) {
            Ok(chain) => Ok(chain),
            Err(e) => {
                let _ = std::fs::remove_dir_all(&path);
                Err(e)
            }
        }
    }

    fn create_inner(path: &Path, genesis: &Block) -> Result<Self> {
        if !genesis.is_valid() {
            return Err(StorageError::InvalidGenesis);
        }

        let db = Arc::new(KvDb::open(path)?);

        let mut batch = db.batch();
        batch.set(Namespace::Blocks, keys::HEIGHT, &0u64.to_be_bytes())?;
        batch.set(Namespace::Blocks, &keys::block(0), &genesis.to_bytes())?;
        for tx in genesis.txs() {
            batch.set(Namespace::Txs, &keys::tx(tx.hash()), &tx.to_bytes())?;
        }
        batch.set(Namespace::Mempool, keys::MEMPOOL_HEIGHT, &0u64.to_be_bytes())?;
        batch.commit()?;

        Ok(Self::assemble(db, path))
    }

    /// Open an existing chain at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let db = Arc::new(KvDb::open(&path)?);

        if db.get(Namespace::Blocks, keys::HEIGHT)?.is_none() {
            return Err(StorageError::Corrupt("chain height undefined".into()));
        }

        Ok(Self::assemble(db, &path))
    }

    /// Remove a chain directory entirely. Used when a peer's genesis
    /// supersedes a freshly created local one.
    pub fn destroy<P: AsRef<Path>>(path: P) -> Result<()> {
        std::fs::remove_dir_all(path.as_ref())?;
        Ok(())
    }

    fn assemble(db: Arc<KvDb>, path: &Path) -> Self {
        let mempool = Arc::new(Mempool::new(db.clone()));
        Self {
            db,
            lock: Mutex::new(()),
            mempool,
            path: path.to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Height of the chain tip (0 = genesis only).
    pub fn height(&self) -> Height {
        match self.read_height() {
            Ok(height) => height,
            Err(e) => {
                warn!("chain height read failed: {e}");
                0
            }
        }
    }

    /// Block at the given height, if present.
    pub fn block(&self, height: Height) -> Option<Block> {
        match self.read_block(height) {
            Ok(block) => block,
            Err(e) => {
                warn!("chain block({height}) read failed: {e}");
                None
            }
        }
    }

    /// Committed transaction by hash, if present.
    pub fn tx(&self, hash: &Hash) -> Option<Transaction> {
        let bytes = match self.db.get(Namespace::Txs, &keys::tx(hash)) {
            Ok(bytes) => bytes?,
            Err(e) => {
                warn!("chain tx read failed: {e}");
                return None;
            }
        };
        Transaction::load(&bytes).ok()
    }

    pub fn mempool(&self) -> Arc<Mempool> {
        self.mempool.clone()
    }

    /// Append `block` at `height + 1`. Fails, leaving the store unchanged,
    /// if the block is invalid, does not chain onto the current tip, or
    /// carries a transaction that is already committed. On success the block
    /// and its transactions are written in one batch and those transactions
    /// leave the mempool.
    pub fn accept(&self, block: &Block) -> bool {
        let _guard = self.lock.lock();
        match self.accept_inner(block) {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("chain accept failed: {e}");
                false
            }
        }
    }

    fn accept_inner(&self, block: &Block) -> Result<bool> {
        if !block.is_valid() {
            return Ok(false);
        }

        let height = self.read_height()?;
        let tip = self
            .read_block(height)?
            .ok_or_else(|| StorageError::Corrupt(format!("missing tip block at {height}")))?;

        if block.prev_hash() != tip.curr_hash().as_slice() {
            return Ok(false);
        }

        for tx in block.txs() {
            if self.db.get(Namespace::Txs, &keys::tx(tx.hash()))?.is_some() {
                return Ok(false);
            }
        }

        let new_height = height + 1;
        let mut batch = self.db.batch();
        batch.set(Namespace::Blocks, keys::HEIGHT, &new_height.to_be_bytes())?;
        batch.set(Namespace::Blocks, &keys::block(new_height), &block.to_bytes())?;
        for tx in block.txs() {
            batch.set(Namespace::Txs, &keys::tx(tx.hash()), &tx.to_bytes())?;
        }
        batch.commit()?;

        for tx in block.txs() {
            self.mempool.delete(tx.hash());
        }

        Ok(true)
    }

    /// Reconcile a same-height candidate block by unioning its transactions
    /// with the current tip's and keeping the [`TXS_PER_BLOCK`] lowest tx
    /// hashes. Fails unless `height` is the current height and the de-duped
    /// union is strictly larger than one block. Displaced transactions return
    /// to the mempool; newly kept ones leave it.
    pub fn merge(&self, height: Height, incoming: &[Transaction]) -> bool {
        let _guard = self.lock.lock();
        match self.merge_inner(height, incoming) {
            Ok(merged) => merged,
            Err(e) => {
                warn!("chain merge failed: {e}");
                false
            }
        }
    }

    fn merge_inner(&self, height: Height, incoming: &[Transaction]) -> Result<bool> {
        if self.read_height()? != height {
            return Ok(false);
        }

        let tip = self
            .read_block(height)?
            .ok_or_else(|| StorageError::Corrupt(format!("missing tip block at {height}")))?;
        let prev_hash = tip.prev_hash().to_vec();

        // Union keyed by tx hash: ascending order and de-duplication in one go.
        let mut union: BTreeMap<Hash, Transaction> = tip
            .into_txs()
            .into_iter()
            .map(|tx| (*tx.hash(), tx))
            .collect();

        for tx in incoming {
            if !tx.is_valid() || union.contains_key(tx.hash()) {
                continue;
            }
            if self.db.get(Namespace::Txs, &keys::tx(tx.hash()))?.is_some() {
                continue;
            }
            union.insert(*tx.hash(), tx.clone());
        }

        if union.len() <= TXS_PER_BLOCK {
            return Ok(false);
        }

        let mut txs = union.into_values();
        let keep: Vec<Transaction> = txs.by_ref().take(TXS_PER_BLOCK).collect();
        let dropped: Vec<Transaction> = txs.collect();

        let merged = Block::new(prev_hash, keep)
            .map_err(|e| StorageError::Corrupt(format!("merged block rejected: {e}")))?;

        let mut batch = self.db.batch();
        batch.set(Namespace::Blocks, &keys::block(height), &merged.to_bytes())?;
        for tx in merged.txs() {
            batch.set(Namespace::Txs, &keys::tx(tx.hash()), &tx.to_bytes())?;
        }
        for tx in &dropped {
            batch.delete(Namespace::Txs, &keys::tx(tx.hash()))?;
        }
        batch.commit()?;

        for tx in merged.txs() {
            self.mempool.delete(tx.hash());
        }
        for tx in &dropped {
            self.mempool.push(tx);
        }

        Ok(true)
    }

    /// Drop the last `n` blocks, erasing their block keys and tx-index
    /// entries in one batch. Fails if `n` exceeds the height; genesis is
    /// irremovable. `rollback(0)` is a successful no-op.
    pub fn rollback(&self, n: u64) -> bool {
        let _guard = self.lock.lock();
        match self.rollback_inner(n) {
            Ok(rolled) => rolled,
            Err(e) => {
                warn!("chain rollback failed: {e}");
                false
            }
        }
    }

    fn rollback_inner(&self, n: u64) -> Result<bool> {
        if n == 0 {
            return Ok(true);
        }

        let height = self.read_height()?;
        if n > height {
            return Ok(false);
        }

        let mut batch = self.db.batch();
        for h in (height - n + 1)..=height {
            let block = self
                .read_block(h)?
                .ok_or_else(|| StorageError::Corrupt(format!("missing block at {h}")))?;
            batch.delete(Namespace::Blocks, &keys::block(h))?;
            for tx in block.txs() {
                batch.delete(Namespace::Txs, &keys::tx(tx.hash()))?;
            }
        }
        batch.set(Namespace::Blocks, keys::HEIGHT, &(height - n).to_be_bytes())?;
        batch.commit()?;

        Ok(true)
    }

    fn read_height(&self) -> Result<u64> {
        let bytes = self
            .db
            .get(Namespace::Blocks, keys::HEIGHT)?
            .ok_or_else(|| StorageError::Corrupt("chain height undefined".into()))?;
        decode_u64(&bytes)
    }

    fn read_block(&self, height: Height) -> Result<Option<Block>> {
        match self.db.get(Namespace::Blocks, &keys::block(height))? {
            Some(bytes) => Ok(Some(Block::load(&bytes)?)),
            None => Ok(None),
        }
    }
}
