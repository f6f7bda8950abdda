//! Data storage layer
//!
//! Provides the services the chat engine is built on:
//! - `sqlite` - transactional database for talk/message storage
//! - `cache` - in-memory and Redis caching
//! - `topics` - broadcast/stream messaging fabric used by the broker and
//!   background pipelines
//! - `secrets` - secret storage backends
//! - `types` - shared data types
//! - `error` - unified error type

pub mod cache;
pub mod error;
pub mod secrets;
pub mod sqlite;
pub mod topics;
pub mod types;

pub use error::DataError;
pub use sqlite::SqliteService;

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::core::storage::AppStorage;

/// Transactional database service.
///
/// SQLite is the only supported transactional backend (§4.5); this thin
/// wrapper exists so the rest of the app holds a shared handle without
/// depending on `sqlite::SqliteService` directly, matching how the data
/// layer wraps each backend behind a service type.
pub struct TransactionalService(Arc<SqliteService>);

impl TransactionalService {
    /// Initialize the transactional service
    pub async fn init(storage: &AppStorage) -> Result<Self, DataError> {
        let service = SqliteService::init(storage).await?;
        Ok(Self(Arc::new(service)))
    }

    /// Get the underlying `SqliteService`
    pub fn as_sqlite(&self) -> Arc<SqliteService> {
        Arc::clone(&self.0)
    }

    /// Run a WAL checkpoint
    pub async fn checkpoint(&self) -> Result<(), DataError> {
        self.0.checkpoint().await.map_err(Into::into)
    }

    /// Close the database connection gracefully
    pub async fn close(&self) {
        self.0.close().await;
    }

    /// Start the background checkpoint task
    pub fn start_checkpoint_task(&self, shutdown_rx: watch::Receiver<bool>) -> JoinHandle<()> {
        Arc::clone(&self.0).start_checkpoint_task(shutdown_rx)
    }
}
