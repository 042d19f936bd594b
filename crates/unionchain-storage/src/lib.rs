//! Persistent ledger state for unionchain: a byte-keyed KV adapter with
//! three logical namespaces, the bounded persistent mempool, and the chain
//! with atomic accept / merge / rollback.

pub mod chain;
pub mod error;
pub mod kv;
pub mod mempool;

pub use chain::Chain;
pub use error::{Result, StorageError};
pub use kv::{KvDb, Namespace};
pub use mempool::Mempool;
