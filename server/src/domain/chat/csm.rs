//! Customer Session Manager (CSM, §4.3) — operations on `RouterState` that
//! touch the customer index. All methods here only ever run inside the
//! Router worker.

use super::envelope::{BrokerEnvelope, BrokerVariant, TalkResponse};
use super::router::{RouterState, kick_out_customer, push_talk_response};
use super::types::{CustomerSocket, TalkMessage};

impl RouterState {
    pub(super) async fn install_customer(&mut self, socket: CustomerSocket) {
        let talk_id = socket.talk_id.clone();
        let unique_id = socket.unique_id;
        let create_talk_flag = socket.create_talk_flag;

        match self.store.talk_exists(&talk_id).await {
            Ok(true) => {}
            Ok(false) => {
                let _ = socket.outbound.try_send(TalkResponse::KickOut {
                    code: "TalkNotExists".to_string(),
                    msg: format!("talk {talk_id} does not exist"),
                });
                return;
            }
            Err(e) => {
                tracing::warn!(%talk_id, error = %e, "InstallCustomer: store lookup failed");
                let _ = socket.outbound.try_send(TalkResponse::KickOut {
                    code: "TalkNotExists".to_string(),
                    msg: "store error".to_string(),
                });
                return;
            }
        }

        self.broker.add_track(&talk_id);

        let outbound = socket.outbound.clone();
        self.customers.entry(talk_id.clone()).or_default().insert(unique_id, socket);

        if create_talk_flag {
            self.broker
                .publish(BrokerEnvelope {
                    talk_id: talk_id.clone(),
                    variant: BrokerVariant::TalkCreate,
                })
                .await;
        }

        let store = std::sync::Arc::clone(&self.store);
        tokio::spawn(async move {
            match store.get_talk_messages(&talk_id, 0, 0).await {
                Ok(history) => {
                    let _ = outbound.try_send(TalkResponse::Messages { talk_id, history });
                }
                Err(e) => {
                    tracing::warn!(%talk_id, error = %e, "InstallCustomer: history fetch failed");
                }
            }
        });
    }

    pub(super) fn uninstall_customer(&mut self, talk_id: &str, unique_id: u64) {
        self.broker.remove_track(talk_id);
        if let Some(sockets) = self.customers.get_mut(talk_id) {
            sockets.remove(&unique_id);
            if sockets.is_empty() {
                self.customers.remove(talk_id);
            }
        }
    }

    /// Precondition (§4.3): the RPC edge has already appended `message` to the store.
    pub(super) async fn customer_message_incoming(
        &mut self,
        talk_id: &str,
        unique_id: u64,
        seq_id: u64,
        message: TalkMessage,
    ) {
        let mut faulted = false;
        if let Some(sockets) = self.customers.get(talk_id)
            && let Some(socket) = sockets.get(&unique_id)
        {
            faulted = !push_talk_response(
                socket,
                TalkResponse::MessageConfirmed { seq_id, at: message.at },
            );
            if faulted {
                kick_out_customer(socket, "SendFailed", "outbound queue full");
            }
        }
        if faulted {
            self.uninstall_customer(talk_id, unique_id);
        }

        self.broker
            .publish(BrokerEnvelope {
                talk_id: talk_id.to_string(),
                variant: BrokerVariant::Message {
                    sender_unique_id: unique_id,
                    message,
                },
            })
            .await;
    }

    pub(super) async fn customer_close(&mut self, talk_id: &str) {
        if let Err(e) = self.store.close_talk(talk_id).await {
            tracing::warn!(%talk_id, error = %e, "CustomerClose: store write failed");
            return;
        }

        self.broker
            .publish(BrokerEnvelope {
                talk_id: talk_id.to_string(),
                variant: BrokerVariant::TalkClose,
            })
            .await;
    }

    /// Broker-sourced: a message arrived for `talk_id`, possibly from another instance.
    pub(super) fn csm_on_message_incoming(
        &mut self,
        sender_unique_id: u64,
        talk_id: &str,
        message: &TalkMessage,
    ) {
        let Some(sockets) = self.customers.get(talk_id) else {
            return;
        };

        let mut faulted = Vec::new();
        for (unique_id, socket) in sockets.iter() {
            if *unique_id == sender_unique_id {
                continue;
            }
            if !push_talk_response(socket, TalkResponse::Message(message.clone())) {
                kick_out_customer(socket, "SendFailed", "outbound queue full");
                faulted.push(*unique_id);
            }
        }
        for unique_id in faulted {
            self.uninstall_customer(talk_id, unique_id);
        }
    }

    pub(super) fn csm_on_talk_close(&mut self, talk_id: &str) {
        let Some(sockets) = self.customers.get(talk_id) else {
            return;
        };

        let mut faulted = Vec::new();
        for (unique_id, socket) in sockets.iter() {
            if !push_talk_response(socket, TalkResponse::Close) {
                kick_out_customer(socket, "SendFailed", "outbound queue full");
                faulted.push(*unique_id);
            }
        }
        for unique_id in faulted {
            self.uninstall_customer(talk_id, unique_id);
        }
    }
}
