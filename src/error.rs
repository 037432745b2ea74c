use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("invalid numeric type tag: {0}")]
    InvalidTypeTag(String),

    #[error("invalid field: {0}")]
    InvalidField(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed number {0:?} in checkpoint")]
    ParseValue(String),

    #[error("truncated checkpoint: expected {0}")]
    TruncatedCheckpoint(&'static str),
}

pub type Result<T> = std::result::Result<T, SimError>;
