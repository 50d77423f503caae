use outpost_core::{FilterKey, RepositoryError};
use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("disconnected and no usable snapshot for filter '{0}'")]
    NoCacheAvailable(FilterKey),

    #[error("required connection settings absent: {0}")]
    Configuration(String),

    #[error("invalid task data: {0}")]
    InvalidTask(String),

    #[error("no local record of task '{0}'")]
    UnknownTask(String),

    #[error("pending-change row {0} is corrupt")]
    CorruptRow(i64),

    #[error("a queue drain is already in progress")]
    DrainInProgress,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("timestamp parse error: {0}")]
    Timestamp(#[from] chrono::ParseError),
}

impl StoreError {
    /// True when the failure means the remote is unreachable rather than the
    /// call being rejected.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, StoreError::Repository(err) if err.is_connectivity())
    }
}
