/// Number of transactions in every block.
pub const TXS_PER_BLOCK: usize = 256;

/// Maximum transaction payload size in bytes.
pub const PAYLOAD_SIZE: usize = 1024;

/// Maximum number of pending transactions in the mempool.
pub const MEMPOOL_SIZE: u64 = 2000;

/// Distinguished previous-hash sentinel of the genesis block.
pub const GENESIS_PREV_BLOCK: &[u8] = b"genesis.block";
