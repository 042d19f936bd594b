use thiserror::Error;

#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("read timed out")]
    Timeout,

    #[error("frame too large: {0} bytes")]
    FrameTooLarge(u64),

    #[error("malformed frame: {0}")]
    BadFrame(String),

    #[error("wrong network tag: {0:?}")]
    WrongNetwork(String),

    #[error("unexpected response head: expected {expected:#x}, got {got:#x}")]
    BadResponse { expected: u32, got: u32 },

    #[error("connection limit reached")]
    ConnLimit,
}

impl NetworkError {
    /// Whether this failure tears the connection down rather than counting
    /// toward the retry budget. Framing survives a parse failure (length and
    /// payload were fully consumed), but IO errors and deadline misses do not.
    pub fn closes_connection(&self) -> bool {
        matches!(
            self,
            NetworkError::Io(_) | NetworkError::Timeout | NetworkError::FrameTooLarge(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, NetworkError>;
