/// Static peer list. A node's listen address must be a member; its peers are
/// the other members.
pub const LIST_ADDR: &[&str] = &["127.0.0.1:7070", "127.0.0.1:8080", "127.0.0.1:9090"];

/// Seconds between commit ticks.
pub const INTERVAL_TIME: u64 = 5;

/// Default number of blocks dropped by the rollback subcommand.
pub const DEFAULT_ROLLBACK: u64 = 10;

/// On-disk chain directory for a node address.
pub fn chain_path(addr: &str) -> String {
    format!("chain{addr}")
}

/// Every peer list member except the node's own address.
pub fn peers_of(addr: &str) -> Vec<String> {
    LIST_ADDR
        .iter()
        .filter(|a| **a != addr)
        .map(|a| a.to_string())
        .collect()
}
