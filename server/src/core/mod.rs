//! Core application infrastructure

pub(crate) mod banner;
pub mod cli;
pub mod config;
pub mod constants;
pub mod shutdown;
pub mod storage;
pub(crate) mod update;

pub use crate::app::CoreApp;
pub use cli::{CliConfig, Commands};
pub use config::AppConfig;
pub use storage::{AppStorage, DataSubdir};

// Re-export the transactional service from the data layer
pub use crate::data::{SqliteService, TransactionalService};

pub use shutdown::ShutdownService;

// Re-export topic types from data::topics for backward compatibility
// The canonical location is now data::topics
pub use crate::data::topics::{
    Publisher, Subscriber, Topic, TopicConfig, TopicError, TopicMessage, TopicService,
};
