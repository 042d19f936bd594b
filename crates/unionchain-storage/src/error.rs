use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(String),

    #[error("corrupt store: {0}")]
    Corrupt(String),

    #[error("invalid genesis block")]
    InvalidGenesis,

    #[error("chain directory already exists: {0}")]
    AlreadyExists(PathBuf),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rocksdb::Error> for StorageError {
    fn from(err: rocksdb::Error) -> Self {
        StorageError::Database(err.to_string())
    }
}

impl From<unionchain_core::CoreError> for StorageError {
    fn from(err: unionchain_core::CoreError) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;
