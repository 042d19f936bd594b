use crate::kv::{decode_u64, keys, KvDb, Namespace};
use crate::Result;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::warn;
use unionchain_core::constants::{MEMPOOL_SIZE, TXS_PER_BLOCK};
use unionchain_core::{Hash, Transaction};

/// Bounded persistent buffer of pending transactions, keyed by tx hash with a
/// stored count. Operations are serialized by an internal lock; storage
/// failures degrade to no-ops at this surface (the periodic rounds retry).
pub struct Mempool {
    db: Arc<KvDb>,
    lock: Mutex<()>,
}

impl Mempool {
    pub(crate) fn new(db: Arc<KvDb>) -> Self {
        Self {
            db,
            lock: Mutex::new(()),
        }
    }

    /// Number of pending transactions.
    pub fn height(&self) -> u64 {
        match self.read_height() {
            Ok(height) => height,
            Err(e) => {
                warn!("mempool height read failed: {e}");
                0
            }
        }
    }

    /// Look up a pending transaction by hash.
    pub fn tx(&self, hash: &Hash) -> Option<Transaction> {
        let bytes = match self.db.get(Namespace::Mempool, &keys::mempool_tx(hash)) {
            Ok(bytes) => bytes?,
            Err(e) => {
                warn!("mempool tx read failed: {e}");
                return None;
            }
        };
        Transaction::load(&bytes).ok()
    }

    /// Store a pending transaction. No-op if it is already present or the
    /// mempool is full.
    pub fn push(&self, tx: &Transaction) {
        let _guard = self.lock.lock();
        if let Err(e) = self.push_inner(tx) {
            warn!("mempool push failed: {e}");
        }
    }

    /// Atomically remove and return exactly [`TXS_PER_BLOCK`] transactions,
    /// in prefix-iteration (key) order of the store. Returns `None` without
    /// changes when fewer are pending.
    pub fn pop(&self) -> Option<Vec<Transaction>> {
        let _guard = self.lock.lock();
        match self.pop_inner() {
            Ok(txs) => txs,
            Err(e) => {
                warn!("mempool pop failed: {e}");
                None
            }
        }
    }

    /// Remove a pending transaction if present.
    pub fn delete(&self, hash: &Hash) {
        let _guard = self.lock.lock();
        if let Err(e) = self.delete_inner(hash) {
            warn!("mempool delete failed: {e}");
        }
    }

    /// Remove all pending transactions.
    pub fn clear(&self) {
        let _guard = self.lock.lock();
        if let Err(e) = self.clear_inner() {
            warn!("mempool clear failed: {e}");
        }
    }

    fn read_height(&self) -> Result<u64> {
        match self.db.get(Namespace::Mempool, keys::MEMPOOL_HEIGHT)? {
            Some(bytes) => decode_u64(&bytes),
            None => Ok(0),
        }
    }

    fn push_inner(&self, tx: &Transaction) -> Result<()> {
        let height = self.read_height()?;
        if height >= MEMPOOL_SIZE {
            return Ok(());
        }

        let key = keys::mempool_tx(tx.hash());
        if self.db.get(Namespace::Mempool, &key)?.is_some() {
            return Ok(());
        }

        let mut batch = self.db.batch();
        batch.set(Namespace::Mempool, keys::MEMPOOL_HEIGHT, &(height + 1).to_be_bytes())?;
        batch.set(Namespace::Mempool, &key, &tx.to_bytes())?;
        batch.commit()
    }

    fn pop_inner(&self) -> Result<Option<Vec<Transaction>>> {
        let height = self.read_height()?;
        if height < TXS_PER_BLOCK as u64 {
            return Ok(None);
        }

        let entries = self.db.prefix_iter(Namespace::Mempool, keys::MEMPOOL_TX_PREFIX)?;
        if entries.len() < TXS_PER_BLOCK {
            return Ok(None);
        }

        let mut txs = Vec::with_capacity(TXS_PER_BLOCK);
        let mut batch = self.db.batch();
        for (key, value) in entries.into_iter().take(TXS_PER_BLOCK) {
            let tx = Transaction::load(&value)?;
            batch.delete(Namespace::Mempool, &key)?;
            txs.push(tx);
        }
        batch.set(
            Namespace::Mempool,
            keys::MEMPOOL_HEIGHT,
            &(height - TXS_PER_BLOCK as u64).to_be_bytes(),
        )?;
        batch.commit()?;

        Ok(Some(txs))
    }

    fn delete_inner(&self, hash: &Hash) -> Result<()> {
        let key = keys::mempool_tx(hash);
        if self.db.get(Namespace::Mempool, &key)?.is_none() {
            return Ok(());
        }

        let height = self.read_height()?;
        let mut batch = self.db.batch();
        batch.set(
            Namespace::Mempool,
            keys::MEMPOOL_HEIGHT,
            &height.saturating_sub(1).to_be_bytes(),
        )?;
        batch.delete(Namespace::Mempool, &key)?;
        batch.commit()
    }

    fn clear_inner(&self) -> Result<()> {
        let entries = self.db.prefix_iter(Namespace::Mempool, keys::MEMPOOL_TX_PREFIX)?;
        let mut batch = self.db.batch();
        for (key, _) in &entries {
            batch.delete(Namespace::Mempool, key)?;
        }
        batch.set(Namespace::Mempool, keys::MEMPOOL_HEIGHT, &0u64.to_be_bytes())?;
        batch.commit()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use unionchain_crypto::Keypair;

    fn make_mempool(dir: &TempDir) -> Mempool {
        Mempool::new(Arc::new(KvDb::open(dir.path()).unwrap()))
    }

    fn make_txs(n: usize) -> Vec<Transaction> {
        let keypair = Keypair::generate();
        (0..n)
            .map(|i| Transaction::new(&keypair, format!("tx-{i}").into_bytes()).unwrap())
            .collect()
    }

    #[test]
    fn test_push_and_lookup() {
        let dir = TempDir::new().unwrap();
        let mempool = make_mempool(&dir);
        let tx = &make_txs(1)[0];

        assert_eq!(mempool.height(), 0);
        mempool.push(tx);
        assert_eq!(mempool.height(), 1);
        assert_eq!(mempool.tx(tx.hash()), Some(tx.clone()));
    }

    #[test]
    fn test_push_duplicate_is_noop() {
        let dir = TempDir::new().unwrap();
        let mempool = make_mempool(&dir);
        let tx = &make_txs(1)[0];

        mempool.push(tx);
        mempool.push(tx);
        assert_eq!(mempool.height(), 1);
    }

    #[test]
    fn test_delete_decrements() {
        let dir = TempDir::new().unwrap();
        let mempool = make_mempool(&dir);
        let txs = make_txs(2);

        mempool.push(&txs[0]);
        mempool.push(&txs[1]);
        mempool.delete(txs[0].hash());
        assert_eq!(mempool.height(), 1);
        assert!(mempool.tx(txs[0].hash()).is_none());

        // Deleting an absent tx changes nothing
        mempool.delete(txs[0].hash());
        assert_eq!(mempool.height(), 1);
    }

    #[test]
    fn test_pop_requires_full_batch() {
        let dir = TempDir::new().unwrap();
        let mempool = make_mempool(&dir);

        for tx in make_txs(TXS_PER_BLOCK - 1) {
            mempool.push(&tx);
        }
        assert!(mempool.pop().is_none());
        assert_eq!(mempool.height(), (TXS_PER_BLOCK - 1) as u64);
    }

    #[test]
    fn test_pop_is_sorted_and_removes() {
        let dir = TempDir::new().unwrap();
        let mempool = make_mempool(&dir);

        for tx in make_txs(TXS_PER_BLOCK + 3) {
            mempool.push(&tx);
        }

        let popped = mempool.pop().unwrap();
        assert_eq!(popped.len(), TXS_PER_BLOCK);
        assert!(popped.windows(2).all(|w| w[0].hash() < w[1].hash()));
        assert_eq!(mempool.height(), 3);
        for tx in &popped {
            assert!(mempool.tx(tx.hash()).is_none());
        }
    }

    #[test]
    fn test_clear() {
        let dir = TempDir::new().unwrap();
        let mempool = make_mempool(&dir);

        for tx in make_txs(5) {
            mempool.push(&tx);
        }
        mempool.clear();
        assert_eq!(mempool.height(), 0);
        assert!(mempool.pop().is_none());
    }
}
