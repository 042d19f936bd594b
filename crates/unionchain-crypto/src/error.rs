use thiserror::Error;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("invalid secret key length: expected {expected} bits, got {got}")]
    InvalidKeyLength { expected: usize, got: usize },

    #[error("invalid public key bytes")]
    InvalidPublicKey,

    #[error("invalid signature bytes")]
    InvalidSignature,
}

pub type Result<T> = std::result::Result<T, CryptoError>;
