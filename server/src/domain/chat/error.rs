//! Error types for the session-fanout engine
//!
//! Each component surfaces its own error enum. `EngineError` is the crate-level
//! façade that every component error folds into; `ErrorKind` is what an RPC edge
//! would translate into a status code.

use thiserror::Error;

use crate::data::sqlite::SqliteError;
use crate::data::topics::TopicError;

/// Store façade errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("talk not found")]
    NotFound,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Backend(#[from] SqliteError),
}

/// Router mailbox errors
#[derive(Debug)]
pub enum RouterError {
    /// The mailbox is full; the task was dropped.
    Canceled,
    /// The router worker has shut down.
    Closed,
}

impl std::error::Error for RouterError {}

impl std::fmt::Display for RouterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RouterError::Canceled => write!(f, "canceled: mailbox full"),
            RouterError::Closed => write!(f, "router is shut down"),
        }
    }
}

/// Taxonomy an RPC edge maps onto a transport status code (§7)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgument,
    Unauthenticated,
    NotFound,
    Canceled,
    Aborted,
    Internal,
}

/// Crate-level façade error for the engine
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Router(#[from] RouterError),

    #[error(transparent)]
    Broker(#[from] TopicError),

    #[error("{0}")]
    InvalidArgument(String),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Store(StoreError::NotFound) => ErrorKind::NotFound,
            EngineError::Store(StoreError::InvalidArgument(_)) => ErrorKind::InvalidArgument,
            EngineError::Store(StoreError::Backend(_)) => ErrorKind::Internal,
            EngineError::Router(RouterError::Canceled) => ErrorKind::Canceled,
            EngineError::Router(RouterError::Closed) => ErrorKind::Aborted,
            EngineError::Broker(_) => ErrorKind::Internal,
            EngineError::InvalidArgument(_) => ErrorKind::InvalidArgument,
        }
    }
}
