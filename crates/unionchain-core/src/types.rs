/// 32-byte hash type, shared with the crypto crate.
pub use unionchain_crypto::Hash;

/// Monotonic block index starting at 0 (genesis).
pub type Height = u64;
