use crate::{Result, StorageError};
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, Direction, IteratorMode, Options, WriteBatch, DB};
use std::path::Path;
use unionchain_core::Hash;

const CF_BLOCKS: &str = "blocks";
const CF_TXS: &str = "txs";
const CF_MEMPOOL: &str = "mempool";

/// The three logical namespaces of the persisted keyspace, backed by one
/// column family each so that multi-namespace writes can share a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    Blocks,
    Txs,
    Mempool,
}

impl Namespace {
    fn cf_name(self) -> &'static str {
        match self {
            Namespace::Blocks => CF_BLOCKS,
            Namespace::Txs => CF_TXS,
            Namespace::Mempool => CF_MEMPOOL,
        }
    }
}

/// Byte-keyed, byte-valued store with prefix iteration.
pub struct KvDb {
    db: DB,
}

impl KvDb {
    /// Open (or create) the store at the given path with all namespaces.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cfs = vec![
            ColumnFamilyDescriptor::new(CF_BLOCKS, Options::default()),
            ColumnFamilyDescriptor::new(CF_TXS, Options::default()),
            ColumnFamilyDescriptor::new(CF_MEMPOOL, Options::default()),
        ];

        let db = DB::open_cf_descriptors(&opts, path, cfs)?;
        Ok(Self { db })
    }

    fn cf(&self, ns: Namespace) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(ns.cf_name())
            .ok_or_else(|| StorageError::Database(format!("missing column family {}", ns.cf_name())))
    }

    pub fn get(&self, ns: Namespace, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.db.get_cf(self.cf(ns)?, key)?)
    }

    pub fn set(&self, ns: Namespace, key: &[u8], value: &[u8]) -> Result<()> {
        Ok(self.db.put_cf(self.cf(ns)?, key, value)?)
    }

    pub fn delete(&self, ns: Namespace, key: &[u8]) -> Result<()> {
        Ok(self.db.delete_cf(self.cf(ns)?, key)?)
    }

    /// All entries whose key starts with `prefix`, in key order.
    pub fn prefix_iter(&self, ns: Namespace, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let iter = self
            .db
            .iterator_cf(self.cf(ns)?, IteratorMode::From(prefix, Direction::Forward));

        let mut entries = Vec::new();
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            entries.push((key.to_vec(), value.to_vec()));
        }
        Ok(entries)
    }

    /// Start a write batch; committed writes are observed atomically.
    pub fn batch(&self) -> Batch<'_> {
        Batch {
            db: self,
            inner: WriteBatch::default(),
        }
    }
}

/// Atomic multi-key, multi-namespace write.
pub struct Batch<'a> {
    db: &'a KvDb,
    inner: WriteBatch,
}

impl Batch<'_> {
    pub fn set(&mut self, ns: Namespace, key: &[u8], value: &[u8]) -> Result<()> {
        let cf = self.db.cf(ns)?;
        self.inner.put_cf(cf, key, value);
        Ok(())
    }

    pub fn delete(&mut self, ns: Namespace, key: &[u8]) -> Result<()> {
        let cf = self.db.cf(ns)?;
        self.inner.delete_cf(cf, key);
        Ok(())
    }

    pub fn commit(self) -> Result<()> {
        Ok(self.db.db.write(self.inner)?)
    }
}

/// Key builders for the persisted keyspace.
pub mod keys {
    use super::Hash;

    pub const HEIGHT: &[u8] = b"chain.blocks.height";
    pub const MEMPOOL_HEIGHT: &[u8] = b"chain.mempool.height";
    pub const MEMPOOL_TX_PREFIX: &[u8] = b"chain.mempool.tx[";

    pub fn block(height: u64) -> Vec<u8> {
        format!("chain.blocks.block[{height}]").into_bytes()
    }

    pub fn tx(hash: &Hash) -> Vec<u8> {
        format!("chain.txs.tx[{}]", hex::encode_upper(hash)).into_bytes()
    }

    pub fn mempool_tx(hash: &Hash) -> Vec<u8> {
        format!("chain.mempool.tx[{}]", hex::encode_upper(hash)).into_bytes()
    }
}

/// Decode a stored big-endian u64 counter.
pub fn decode_u64(bytes: &[u8]) -> Result<u64> {
    let arr: [u8; 8] = bytes
        .try_into()
        .map_err(|_| StorageError::Corrupt(format!("bad u64 length: {}", bytes.len())))?;
    Ok(u64::from_be_bytes(arr))
}
