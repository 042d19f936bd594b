use std::time::Duration;

/// Maximum number of registered peer connections.
pub const MAX_CONN: usize = 256;

/// Capacity of the gossip dedup set (frame hashes, FIFO eviction).
pub const MAPPING_SIZE: usize = 2048;

/// Consecutive per-connection failures before the connection is closed.
pub const RETRY_LIMIT: u32 = 5;

/// Maximum frame length (2 MiB).
pub const PACK_SIZE: u64 = 2 << 20;

/// Deadline for completing one frame read and for request responses.
pub const TIME_LIMIT: Duration = Duration::from_secs(5);

/// First byte after connect: the peer joins the gossip set.
pub const IS_NODE: u8 = 0x01;

/// First byte after connect: served request/response only.
pub const IS_CLIENT: u8 = 0x02;
