pub mod block;
pub mod constants;
pub mod error;
pub mod hex_serde;
pub mod transaction;
pub mod types;

pub use block::Block;
pub use error::{CoreError, Result};
pub use transaction::Transaction;
pub use types::{Hash, Height};
