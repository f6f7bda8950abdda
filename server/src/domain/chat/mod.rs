//! Session-fanout engine for the multi-tenant customer-support chat service.
//!
//! Five components (§2): Store Façade (`store`), Broker Fabric (`broker`),
//! Customer Session Manager and Servicer Session Manager (`csm`, `ssm` — both
//! implemented as methods on the Router's private state), and the Router
//! itself (`router`), which is the single point where they all meet.

mod broker;
mod csm;
pub mod envelope;
pub mod error;
mod router;
mod ssm;
pub mod store;
pub mod types;

pub use broker::{BrokerEvent, BrokerFabric};
pub use router::RouterHandle;
pub use store::StoreFacade;
pub use types::UniqueIdGenerator;

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::core::config::{ChatConfig, ChatDeployment};
use crate::data::cache::CacheService;
use crate::data::sqlite::SqliteService;
use crate::data::topics::TopicService;

/// Everything the session-fanout engine needs at runtime, wired together for
/// the all-in-one deployment (§4.6). The split deployment would construct
/// `StoreFacade`/`BrokerFabric` against a shared backend instead and hand a
/// `RouterHandle` to only the customer or only the servicer RPC edge.
pub struct ChatEngine {
    pub router: RouterHandle,
    pub uid_gen: Arc<UniqueIdGenerator>,
    broker: Arc<BrokerFabric>,
    worker: tokio::task::JoinHandle<()>,
}

impl ChatEngine {
    pub fn start(
        sqlite: Arc<SqliteService>,
        cache: Option<Arc<CacheService>>,
        topics: Arc<TopicService>,
        config: &ChatConfig,
    ) -> Self {
        if config.deployment == ChatDeployment::Split {
            tracing::warn!(
                "chat.deployment=split requested, but only the all-in-one wiring is built; \
                 running all-in-one"
            );
        }

        let store = Arc::new(StoreFacade::new(sqlite, cache));

        let (events_tx, events_rx) = mpsc::channel(config.message_capacity);
        let broker = Arc::new(BrokerFabric::new(topics, events_tx));

        let (router, worker) = router::spawn(
            Arc::clone(&store),
            Arc::clone(&broker),
            events_rx,
            config.control_capacity,
            config.message_capacity,
        );

        Self { router, uid_gen: Arc::new(UniqueIdGenerator::new()), broker, worker }
    }

    /// Drains in-flight Router work, then tears down broker dispatchers (§5).
    ///
    /// Dropping `router` closes the mailbox senders; the worker processes
    /// whatever is already queued and exits on its own once both channels
    /// report closed.
    pub async fn shutdown(self) {
        drop(self.router);
        if let Err(e) = self.worker.await {
            tracing::warn!(error = %e, "router worker task panicked during shutdown");
        }
        self.broker.shutdown();
    }
}
