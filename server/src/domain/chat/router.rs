//! Router (R) — the single-threaded mailbox that sequences every mutation to
//! the customer/servicer indexes and every broker callback (§4.1).
//!
//! One worker task owns `RouterState` exclusively; CSM and SSM operations
//! (csm.rs, ssm.rs) are plain `impl RouterState` methods that only ever run
//! from inside that worker, so they need no further locking.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;

use super::broker::{BrokerEvent, BrokerFabric};
use super::envelope::{ServiceResponse, TalkResponse};
use super::error::RouterError;
use super::store::StoreFacade;
use super::types::{CustomerSocket, ServicerSocket, TalkMessage};
use crate::core::constants::{DEFAULT_CHAT_CONTROL_CAPACITY, DEFAULT_CHAT_MESSAGE_CAPACITY};

/// Control-plane commands: install/uninstall/attach/detach/query (§4.1 "control channels 10").
pub enum ControlCommand {
    InstallCustomer(CustomerSocket),
    UninstallCustomer { talk_id: String, unique_id: u64 },
    CustomerClose { talk_id: String },
    InstallServicer(ServicerSocket),
    UninstallServicer { user_id: u64, unique_id: u64 },
    ServicerAttachTalk { user_id: u64, unique_id: u64, talk_id: String },
    ServicerDetachTalk { user_id: u64, unique_id: u64, talk_id: String },
    ServicerQueryAttachedTalks { user_id: u64, unique_id: u64 },
    ServicerQueryPendingTalks { user_id: u64, unique_id: u64 },
    ServicerReloadTalk { user_id: u64, unique_id: u64, talk_id: String },
}

/// Message-bearing commands (§4.1 "message channels 100").
///
/// `message` arrives already persisted: the RPC edge appends to the store before
/// posting here (§4.3/§4.4 precondition), so the Router only needs to confirm
/// and fan out, never to decide storage. Broker deliveries travel on their own
/// channel (`BrokerFabric`'s `events_tx`), read directly by the worker loop.
pub enum MessageCommand {
    CustomerMessage {
        talk_id: String,
        unique_id: u64,
        seq_id: u64,
        message: TalkMessage,
    },
    ServicerMessage {
        user_id: u64,
        unique_id: u64,
        talk_id: String,
        seq_id: u64,
        message: TalkMessage,
    },
}

/// Default mailbox capacities (§3, §4.1), overridable via configuration (§10).
pub const CONTROL_CHANNEL_CAPACITY: usize = DEFAULT_CHAT_CONTROL_CAPACITY;
pub const MESSAGE_CHANNEL_CAPACITY: usize = DEFAULT_CHAT_MESSAGE_CAPACITY;

/// State exclusively owned by the Router worker.
pub(super) struct RouterState {
    pub(super) customers: HashMap<String, HashMap<u64, CustomerSocket>>,
    pub(super) servicers: HashMap<u64, HashMap<u64, ServicerSocket>>,
    pub(super) store: Arc<StoreFacade>,
    pub(super) broker: Arc<BrokerFabric>,
}

/// Handle used by RPC edges (out of scope) to post work into the Router.
#[derive(Clone)]
pub struct RouterHandle {
    control_tx: mpsc::Sender<ControlCommand>,
    message_tx: mpsc::Sender<MessageCommand>,
}

impl RouterHandle {
    fn post_control(&self, cmd: ControlCommand) -> Result<(), RouterError> {
        self.control_tx.try_send(cmd).map_err(|_| RouterError::Canceled)
    }

    fn post_message(&self, cmd: MessageCommand) -> Result<(), RouterError> {
        self.message_tx.try_send(cmd).map_err(|_| RouterError::Canceled)
    }

    pub fn install_customer(&self, socket: CustomerSocket) -> Result<(), RouterError> {
        self.post_control(ControlCommand::InstallCustomer(socket))
    }

    pub fn uninstall_customer(&self, talk_id: String, unique_id: u64) -> Result<(), RouterError> {
        self.post_control(ControlCommand::UninstallCustomer { talk_id, unique_id })
    }

    pub fn customer_close(&self, talk_id: String) -> Result<(), RouterError> {
        self.post_control(ControlCommand::CustomerClose { talk_id })
    }

    pub fn install_servicer(&self, socket: ServicerSocket) -> Result<(), RouterError> {
        self.post_control(ControlCommand::InstallServicer(socket))
    }

    pub fn uninstall_servicer(&self, user_id: u64, unique_id: u64) -> Result<(), RouterError> {
        self.post_control(ControlCommand::UninstallServicer { user_id, unique_id })
    }

    pub fn servicer_attach_talk(
        &self,
        user_id: u64,
        unique_id: u64,
        talk_id: String,
    ) -> Result<(), RouterError> {
        self.post_control(ControlCommand::ServicerAttachTalk { user_id, unique_id, talk_id })
    }

    pub fn servicer_detach_talk(
        &self,
        user_id: u64,
        unique_id: u64,
        talk_id: String,
    ) -> Result<(), RouterError> {
        self.post_control(ControlCommand::ServicerDetachTalk { user_id, unique_id, talk_id })
    }

    pub fn servicer_query_attached_talks(&self, user_id: u64, unique_id: u64) -> Result<(), RouterError> {
        self.post_control(ControlCommand::ServicerQueryAttachedTalks { user_id, unique_id })
    }

    pub fn servicer_query_pending_talks(&self, user_id: u64, unique_id: u64) -> Result<(), RouterError> {
        self.post_control(ControlCommand::ServicerQueryPendingTalks { user_id, unique_id })
    }

    pub fn servicer_reload_talk(
        &self,
        user_id: u64,
        unique_id: u64,
        talk_id: String,
    ) -> Result<(), RouterError> {
        self.post_control(ControlCommand::ServicerReloadTalk { user_id, unique_id, talk_id })
    }

    pub fn customer_message_incoming(
        &self,
        talk_id: String,
        unique_id: u64,
        seq_id: u64,
        message: TalkMessage,
    ) -> Result<(), RouterError> {
        self.post_message(MessageCommand::CustomerMessage {
            talk_id,
            unique_id,
            seq_id,
            message,
        })
    }

    pub fn servicer_message(
        &self,
        user_id: u64,
        unique_id: u64,
        talk_id: String,
        seq_id: u64,
        message: TalkMessage,
    ) -> Result<(), RouterError> {
        self.post_message(MessageCommand::ServicerMessage {
            user_id,
            unique_id,
            talk_id,
            seq_id,
            message,
        })
    }

}

/// Spawns the Router worker and returns a handle to post work into it.
///
/// `broker_events` is `BrokerFabric`'s delivery channel; the worker reads it
/// directly rather than forwarding through another mailbox, since it is
/// already the single consumer every broker-sourced callback must run on.
/// `control_capacity`/`message_capacity` override the §3/§4.1 defaults
/// (see `core::config::ChatConfig`).
pub fn spawn(
    store: Arc<StoreFacade>,
    broker: Arc<BrokerFabric>,
    broker_events: mpsc::Receiver<BrokerEvent>,
    control_capacity: usize,
    message_capacity: usize,
) -> (RouterHandle, tokio::task::JoinHandle<()>) {
    let (control_tx, control_rx) = mpsc::channel(control_capacity);
    let (message_tx, message_rx) = mpsc::channel(message_capacity);

    let state = RouterState {
        customers: HashMap::new(),
        servicers: HashMap::new(),
        store,
        broker,
    };

    let worker = tokio::spawn(worker_loop(state, control_rx, message_rx, broker_events));

    (RouterHandle { control_tx, message_tx }, worker)
}

async fn worker_loop(
    mut state: RouterState,
    mut control_rx: mpsc::Receiver<ControlCommand>,
    mut message_rx: mpsc::Receiver<MessageCommand>,
    mut broker_events: mpsc::Receiver<BrokerEvent>,
) {
    loop {
        tokio::select! {
            biased;
            cmd = control_rx.recv() => {
                match cmd {
                    Some(cmd) => dispatch_control(&mut state, cmd).await,
                    None => break,
                }
            }
            cmd = message_rx.recv() => {
                match cmd {
                    Some(cmd) => dispatch_message(&mut state, cmd).await,
                    None => break,
                }
            }
            event = broker_events.recv() => {
                match event {
                    Some(event) => state.on_broker_event(event).await,
                    None => break,
                }
            }
        }
    }
    tracing::debug!("router worker exiting");
}

async fn dispatch_control(state: &mut RouterState, cmd: ControlCommand) {
    match cmd {
        ControlCommand::InstallCustomer(socket) => state.install_customer(socket).await,
        ControlCommand::UninstallCustomer { talk_id, unique_id } => {
            state.uninstall_customer(&talk_id, unique_id)
        }
        ControlCommand::CustomerClose { talk_id } => state.customer_close(&talk_id).await,
        ControlCommand::InstallServicer(socket) => state.install_servicer(socket).await,
        ControlCommand::UninstallServicer { user_id, unique_id } => {
            state.uninstall_servicer(user_id, unique_id).await
        }
        ControlCommand::ServicerAttachTalk { user_id, unique_id, talk_id } => {
            state.servicer_attach_talk(user_id, unique_id, &talk_id).await
        }
        ControlCommand::ServicerDetachTalk { user_id, unique_id, talk_id } => {
            state.servicer_detach_talk(user_id, unique_id, &talk_id).await
        }
        ControlCommand::ServicerQueryAttachedTalks { user_id, unique_id } => {
            state.servicer_query_attached_talks(user_id, unique_id).await
        }
        ControlCommand::ServicerQueryPendingTalks { user_id, unique_id } => {
            state.servicer_query_pending_talks(user_id, unique_id).await
        }
        ControlCommand::ServicerReloadTalk { user_id, unique_id, talk_id } => {
            state.servicer_reload_talk(user_id, unique_id, &talk_id).await
        }
    }
}

async fn dispatch_message(state: &mut RouterState, cmd: MessageCommand) {
    match cmd {
        MessageCommand::CustomerMessage { talk_id, unique_id, seq_id, message } => {
            state
                .customer_message_incoming(&talk_id, unique_id, seq_id, message)
                .await
        }
        MessageCommand::ServicerMessage { user_id, unique_id, talk_id, seq_id, message } => {
            state
                .servicer_message(user_id, unique_id, &talk_id, seq_id, message)
                .await
        }
    }
}

pub(super) fn push_talk_response(socket: &CustomerSocket, response: TalkResponse) -> bool {
    socket.outbound.try_send(response).is_ok()
}

pub(super) fn push_service_response(socket: &ServicerSocket, response: ServiceResponse) -> bool {
    socket.outbound.try_send(response).is_ok()
}

/// Best-effort `KickOut` ahead of a server-initiated socket removal (§5, §7).
/// Ignores its own failure — the socket is already on its way out either way.
pub(super) fn kick_out_customer(socket: &CustomerSocket, code: &str, msg: &str) {
    let _ = socket.outbound.try_send(TalkResponse::KickOut {
        code: code.to_string(),
        msg: msg.to_string(),
    });
}

/// Best-effort `KickOut` ahead of a server-initiated socket removal (§5, §7).
pub(super) fn kick_out_servicer(socket: &ServicerSocket, code: &str, msg: &str) {
    let _ = socket.outbound.try_send(ServiceResponse::KickOut {
        code: code.to_string(),
        msg: msg.to_string(),
    });
}

impl RouterState {
    /// Dispatches one delivered broker envelope to CSM and/or SSM (§4.2 delivery callback).
    pub(super) async fn on_broker_event(&mut self, event: BrokerEvent) {
        use super::envelope::BrokerVariant;

        let talk_id = event.envelope.talk_id;
        match event.envelope.variant {
            BrokerVariant::Message { sender_unique_id, message } => {
                self.csm_on_message_incoming(sender_unique_id, &talk_id, &message);
                self.ssm_on_message_incoming(sender_unique_id, &talk_id, &message).await;
            }
            BrokerVariant::TalkCreate => {
                self.ssm_on_talk_create(&talk_id).await;
            }
            BrokerVariant::TalkClose => {
                self.csm_on_talk_close(&talk_id);
                self.ssm_on_talk_close(&talk_id);
            }
            BrokerVariant::ServicerAttach { servicer_id } => {
                self.ssm_on_servicer_attach(&talk_id, servicer_id).await;
            }
            BrokerVariant::ServicerDetach { servicer_id } => {
                self.ssm_on_servicer_detach(&talk_id, servicer_id).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::mpsc as tokio_mpsc;
    use tokio::time::timeout;

    use super::*;
    use crate::data::sqlite::SqliteService;
    use crate::data::topics::TopicService;
    use crate::data::types::{TalkMessageKind, TalkStatus};
    use crate::domain::chat::envelope::{ServiceResponse, TalkResponse};
    use crate::domain::chat::store::NewTalkMessage;

    const RECV_TIMEOUT: Duration = Duration::from_secs(1);

    async fn recv<T>(rx: &mut tokio_mpsc::Receiver<T>) -> T {
        timeout(RECV_TIMEOUT, rx.recv())
            .await
            .expect("timed out waiting for response")
            .expect("channel closed")
    }

    async fn setup() -> (RouterHandle, tokio::task::JoinHandle<()>, Arc<StoreFacade>) {
        let pool = sqlx::SqlitePool::connect(":memory:").await.unwrap();
        sqlx::query(crate::data::sqlite::schema::SCHEMA)
            .execute(&pool)
            .await
            .unwrap();
        let sqlite = Arc::new(SqliteService::from_pool(pool));
        let store = Arc::new(StoreFacade::new(sqlite, None));

        let topics = Arc::new(TopicService::new());
        let (events_tx, events_rx) = mpsc::channel(100);
        let broker = Arc::new(BrokerFabric::new(topics, events_tx));

        let (handle, worker) = spawn(Arc::clone(&store), broker, events_rx, 10, 100);
        (handle, worker, store)
    }

    fn customer_socket(talk_id: &str, unique_id: u64, create_talk_flag: bool) -> (CustomerSocket, tokio_mpsc::Receiver<TalkResponse>) {
        let (tx, rx) = tokio_mpsc::channel(16);
        (
            CustomerSocket {
                unique_id,
                talk_id: talk_id.to_string(),
                user_id: 1,
                create_talk_flag,
                outbound: tx,
            },
            rx,
        )
    }

    fn servicer_socket(user_id: u64, unique_id: u64) -> (ServicerSocket, tokio_mpsc::Receiver<ServiceResponse>) {
        let (tx, rx) = tokio_mpsc::channel(16);
        (ServicerSocket { unique_id, user_id, outbound: tx }, rx)
    }

    #[tokio::test]
    async fn test_create_and_echo_history() {
        let (handle, _worker, store) = setup().await;
        let talk = store.create_talk("help", 1, "alice").await.unwrap();

        let (socket, mut rx) = customer_socket(&talk.talk_id, 1, false);
        handle.install_customer(socket).unwrap();

        match recv(&mut rx).await {
            TalkResponse::Messages { talk_id, history } => {
                assert_eq!(talk_id, talk.talk_id);
                assert!(history.is_empty());
            }
            other => panic!("expected Messages, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_peer_fan_out_and_sender_confirmation() {
        let (handle, _worker, store) = setup().await;
        let talk = store.create_talk("help", 1, "alice").await.unwrap();

        let (socket_a, mut rx_a) = customer_socket(&talk.talk_id, 1, false);
        let (socket_b, mut rx_b) = customer_socket(&talk.talk_id, 2, false);
        handle.install_customer(socket_a).unwrap();
        handle.install_customer(socket_b).unwrap();
        let _ = recv(&mut rx_a).await; // initial Messages
        let _ = recv(&mut rx_b).await; // initial Messages

        let message = store
            .add_talk_message(
                &talk.talk_id,
                NewTalkMessage {
                    customer_message: true,
                    sender_id: 1,
                    sender_user_name: "alice",
                    kind: TalkMessageKind::Text,
                    text: Some("hi"),
                    data: None,
                },
            )
            .await
            .unwrap();

        handle
            .customer_message_incoming(talk.talk_id.clone(), 1, 1, message)
            .unwrap();

        match recv(&mut rx_a).await {
            TalkResponse::MessageConfirmed { seq_id, .. } => assert_eq!(seq_id, 1),
            other => panic!("expected MessageConfirmed, got {other:?}"),
        }
        match recv(&mut rx_b).await {
            TalkResponse::Message(msg) => assert_eq!(msg.text.as_deref(), Some("hi")),
            other => panic!("expected Message, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_servicer_attach_reload_and_detach_notice() {
        let (handle, _worker, store) = setup().await;
        let talk = store.create_talk("help", 1, "alice").await.unwrap();

        let (socket, mut rx) = servicer_socket(42, 1);
        handle.install_servicer(socket).unwrap();
        match recv(&mut rx).await {
            ServiceResponse::AttachedTalks(bundle) => assert!(bundle.is_empty()),
            other => panic!("expected AttachedTalks, got {other:?}"),
        }
        match recv(&mut rx).await {
            ServiceResponse::PendingTalks(talks) => assert_eq!(talks.len(), 1),
            other => panic!("expected PendingTalks, got {other:?}"),
        }

        handle
            .servicer_attach_talk(42, 1, talk.talk_id.clone())
            .unwrap();
        match recv(&mut rx).await {
            ServiceResponse::Reload { talk: reloaded, .. } => {
                assert_eq!(reloaded.service_id, 42);
            }
            other => panic!("expected Reload, got {other:?}"),
        }

        handle
            .servicer_detach_talk(42, 1, talk.talk_id.clone())
            .unwrap();
        // the detach broadcast round-trips back to this same servicer socket,
        // so receiving it proves the store write already landed
        match recv(&mut rx).await {
            ServiceResponse::Detach { detached_service_id, .. } => {
                assert_eq!(detached_service_id, 42);
            }
            other => panic!("expected Detach, got {other:?}"),
        }
        assert_eq!(store.get_talk_servicer_id(&talk.talk_id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_customer_close_notifies_remaining_peer() {
        let (handle, _worker, store) = setup().await;
        let talk = store.create_talk("help", 1, "alice").await.unwrap();

        let (socket_a, mut rx_a) = customer_socket(&talk.talk_id, 1, false);
        handle.install_customer(socket_a).unwrap();
        let _ = recv(&mut rx_a).await; // initial Messages

        handle.customer_close(talk.talk_id.clone()).unwrap();
        match recv(&mut rx_a).await {
            TalkResponse::Close => {}
            other => panic!("expected Close, got {other:?}"),
        }

        let info = store.get_talk_info(&talk.talk_id).await.unwrap().unwrap();
        assert_eq!(info.status, TalkStatus::Closed);
    }

    #[tokio::test]
    async fn test_full_control_mailbox_returns_canceled() {
        // one-slot channel with no consumer draining it (§4.1 back-pressure policy)
        let (control_tx, _control_rx) = mpsc::channel(1);
        let (message_tx, _message_rx) = mpsc::channel(1);
        let handle = RouterHandle { control_tx, message_tx };

        handle.uninstall_customer("t1".to_string(), 1).unwrap();
        let err = handle.uninstall_customer("t1".to_string(), 2).unwrap_err();
        assert!(matches!(err, RouterError::Canceled));
    }
}
