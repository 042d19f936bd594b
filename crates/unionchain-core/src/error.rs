use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("invalid transaction")]
    InvalidTransaction,

    #[error("invalid block: {0}")]
    InvalidBlock(String),

    #[error("payload too large: {got} bytes (max: {max})")]
    PayloadTooLarge { got: usize, max: usize },

    #[error("wrong transaction count: expected {expected}, got {got}")]
    WrongTxCount { expected: usize, got: usize },

    #[error("duplicate transaction in block")]
    DuplicateTransaction,

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("crypto error: {0}")]
    Crypto(#[from] unionchain_crypto::CryptoError),
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
