//! Servicer Session Manager (SSM, §4.4) — operations on `RouterState` that
//! touch the servicer index. All methods here only ever run inside the
//! Router worker.

use super::envelope::{BrokerEnvelope, BrokerVariant, ServiceResponse};
use super::router::{RouterState, kick_out_servicer, push_service_response};
use super::types::{ServicerSocket, TalkMessage};

impl RouterState {
    pub(super) async fn install_servicer(&mut self, socket: ServicerSocket) {
        let user_id = socket.user_id;
        let unique_id = socket.unique_id;

        let attached = match self.store.get_servicer_talk_infos(user_id).await {
            Ok(talks) => talks,
            Err(e) => {
                tracing::warn!(user_id, error = %e, "InstallServicer: attached talks lookup failed");
                Vec::new()
            }
        };

        let mut bundle = Vec::new();
        for talk in attached {
            // tracked unconditionally so refcounting stays symmetric with uninstall_servicer,
            // even for a talk whose history happens to be empty right now
            self.broker.add_track(&talk.talk_id);
            match self.store.get_talk_messages(&talk.talk_id, 0, 0).await {
                Ok(history) if history.is_empty() => {}
                Ok(history) => bundle.push((talk, history)),
                Err(e) => {
                    tracing::warn!(talk_id = %talk.talk_id, error = %e, "InstallServicer: history fetch failed");
                }
            }
        }
        let _ = socket.outbound.try_send(ServiceResponse::AttachedTalks(bundle));

        let pending = self.store.get_pending_talk_infos().await.unwrap_or_else(|e| {
            tracing::warn!(user_id, error = %e, "InstallServicer: pending talks lookup failed");
            Vec::new()
        });
        let _ = socket.outbound.try_send(ServiceResponse::PendingTalks(pending));

        self.servicers.entry(user_id).or_default().insert(unique_id, socket);
    }

    pub(super) async fn uninstall_servicer(&mut self, user_id: u64, unique_id: u64) {
        let last_socket = if let Some(sockets) = self.servicers.get_mut(&user_id) {
            sockets.remove(&unique_id);
            sockets.is_empty()
        } else {
            false
        };

        if last_socket {
            self.servicers.remove(&user_id);
            match self.store.get_servicer_talk_infos(user_id).await {
                Ok(talks) => {
                    for talk in talks {
                        self.broker.remove_track(&talk.talk_id);
                    }
                }
                Err(e) => {
                    tracing::warn!(user_id, error = %e, "UninstallServicer: attached talks lookup failed");
                }
            }
        }
    }

    pub(super) async fn servicer_attach_talk(&mut self, user_id: u64, unique_id: u64, talk_id: &str) {
        let current = match self.store.get_talk_servicer_id(talk_id).await {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!(%talk_id, error = %e, "ServicerAttachTalk: store read failed");
                return;
            }
        };

        if current == user_id {
            tracing::warn!(user_id, %talk_id, "ServicerAttachTalk: already attached, no-op");
            return;
        }

        // Store is the oracle: an unconditional overwrite, not a compare-and-swap (§9).
        if let Err(e) = self.store.update_talk_service_id(talk_id, user_id).await {
            tracing::warn!(%talk_id, error = %e, "ServicerAttachTalk: store write failed");
            return;
        }

        self.broker
            .publish(BrokerEnvelope {
                talk_id: talk_id.to_string(),
                variant: BrokerVariant::ServicerAttach { servicer_id: user_id },
            })
            .await;

        self.push_reload(user_id, unique_id, talk_id).await;
    }

    pub(super) async fn servicer_detach_talk(&mut self, user_id: u64, unique_id: u64, talk_id: &str) {
        let current = match self.store.get_talk_servicer_id(talk_id).await {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!(%talk_id, error = %e, "ServicerDetachTalk: store read failed");
                return;
            }
        };

        if current != user_id {
            self.push_notify(user_id, unique_id, "talkNotAttached");
            return;
        }

        if let Err(e) = self.store.update_talk_service_id(talk_id, 0).await {
            tracing::warn!(%talk_id, error = %e, "ServicerDetachTalk: store write failed");
            return;
        }

        self.broker
            .publish(BrokerEnvelope {
                talk_id: talk_id.to_string(),
                variant: BrokerVariant::ServicerDetach { servicer_id: user_id },
            })
            .await;
    }

    pub(super) async fn servicer_query_attached_talks(&mut self, user_id: u64, unique_id: u64) {
        let talks = self.store.get_servicer_talk_infos(user_id).await.unwrap_or_else(|e| {
            tracing::warn!(user_id, error = %e, "ServicerQueryAttachedTalks: store read failed");
            Vec::new()
        });
        self.push_to_one(user_id, unique_id, ServiceResponse::Talks(talks));
    }

    pub(super) async fn servicer_query_pending_talks(&mut self, user_id: u64, unique_id: u64) {
        let talks = self.store.get_pending_talk_infos().await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "ServicerQueryPendingTalks: store read failed");
            Vec::new()
        });
        self.push_to_one(user_id, unique_id, ServiceResponse::PendingTalks(talks));
    }

    pub(super) async fn servicer_reload_talk(&mut self, user_id: u64, unique_id: u64, talk_id: &str) {
        self.push_reload(user_id, unique_id, talk_id).await;
    }

    /// Precondition (§4.4): the RPC edge has already appended `message` to the store.
    pub(super) async fn servicer_message(
        &mut self,
        user_id: u64,
        unique_id: u64,
        talk_id: &str,
        seq_id: u64,
        message: TalkMessage,
    ) {
        match self.store.get_talk_servicer_id(talk_id).await {
            Ok(owner) if owner == user_id => {}
            Ok(_) => {
                tracing::warn!(user_id, %talk_id, "ServicerMessage: ownership mismatch, dropped");
                return;
            }
            Err(e) => {
                tracing::warn!(%talk_id, error = %e, "ServicerMessage: store read failed");
                return;
            }
        }

        self.push_to_one(
            user_id,
            unique_id,
            ServiceResponse::MessageConfirmed { seq_id, at: message.at },
        );

        self.broker
            .publish(BrokerEnvelope {
                talk_id: talk_id.to_string(),
                variant: BrokerVariant::Message { sender_unique_id: unique_id, message },
            })
            .await;
    }

    // ------------------------------------------------------------------
    // Broker-sourced callbacks
    // ------------------------------------------------------------------

    pub(super) async fn ssm_on_message_incoming(
        &mut self,
        sender_unique_id: u64,
        talk_id: &str,
        message: &TalkMessage,
    ) {
        let owner = match self.store.get_talk_servicer_id(talk_id).await {
            Ok(0) => return,
            Ok(id) => id,
            Err(e) => {
                tracing::warn!(%talk_id, error = %e, "ssm_on_message_incoming: store read failed");
                return;
            }
        };
        self.broadcast_to_user_except(owner, sender_unique_id, ServiceResponse::Message(message.clone()));
    }

    pub(super) async fn ssm_on_talk_create(&mut self, talk_id: &str) {
        // Re-uses the Detach response shape with detached_service_id=0 to nudge every
        // connected servicer that a new pending talk exists (§4.4, §9 resolved).
        let Some(talk) = self.fetch_talk_info(talk_id).await else {
            return;
        };
        self.broadcast_to_all(ServiceResponse::Detach { talk, detached_service_id: 0 });
    }

    pub(super) fn ssm_on_talk_close(&mut self, _talk_id: &str) {
        self.broadcast_to_all(ServiceResponse::Close);
    }

    pub(super) async fn ssm_on_servicer_attach(&mut self, talk_id: &str, user_id: u64) {
        let Some(talk) = self.fetch_talk_info(talk_id).await else {
            return;
        };
        self.broadcast_to_all(ServiceResponse::Attach {
            talk: talk.clone(),
            attached_service_id: user_id,
        });
        self.push_reload_to_user(user_id, &talk).await;
    }

    pub(super) async fn ssm_on_servicer_detach(&mut self, talk_id: &str, user_id: u64) {
        let Some(talk) = self.fetch_talk_info(talk_id).await else {
            return;
        };
        self.broadcast_to_all(ServiceResponse::Detach { talk, detached_service_id: user_id });
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    async fn fetch_talk_info(&self, talk_id: &str) -> Option<super::types::TalkInfo> {
        match self.store.get_talk_info(talk_id).await {
            Ok(Some(talk)) => Some(talk),
            Ok(None) => {
                tracing::warn!(%talk_id, "broker callback: talk vanished from store");
                None
            }
            Err(e) => {
                tracing::warn!(%talk_id, error = %e, "broker callback: talk info fetch failed");
                None
            }
        }
    }

    async fn push_reload(&mut self, user_id: u64, unique_id: u64, talk_id: &str) {
        let Some(talk) = self.fetch_talk_info(talk_id).await else {
            return;
        };
        let history = self.store.get_talk_messages(talk_id, 0, 0).await.unwrap_or_else(|e| {
            tracing::warn!(%talk_id, error = %e, "push_reload: history fetch failed");
            Vec::new()
        });
        self.push_to_one(user_id, unique_id, ServiceResponse::Reload { talk, history });
    }

    async fn push_reload_to_user(&mut self, user_id: u64, talk: &super::types::TalkInfo) {
        let history = self.store.get_talk_messages(&talk.talk_id, 0, 0).await.unwrap_or_else(|e| {
            tracing::warn!(talk_id = %talk.talk_id, error = %e, "push_reload_to_user: history fetch failed");
            Vec::new()
        });
        let Some(sockets) = self.servicers.get(&user_id) else {
            return;
        };
        let mut faulted = Vec::new();
        for (unique_id, socket) in sockets.iter() {
            if !push_service_response(
                socket,
                ServiceResponse::Reload { talk: talk.clone(), history: history.clone() },
            ) {
                kick_out_servicer(socket, "SendFailed", "outbound queue full");
                faulted.push(*unique_id);
            }
        }
        for unique_id in faulted {
            if let Some(sockets) = self.servicers.get_mut(&user_id) {
                sockets.remove(&unique_id);
            }
        }
    }

    fn push_notify(&mut self, user_id: u64, unique_id: u64, msg: &str) {
        self.push_to_one(user_id, unique_id, ServiceResponse::Notify { msg: msg.to_string() });
    }

    fn push_to_one(&mut self, user_id: u64, unique_id: u64, response: ServiceResponse) {
        let faulted = if let Some(sockets) = self.servicers.get(&user_id)
            && let Some(socket) = sockets.get(&unique_id)
        {
            let ok = push_service_response(socket, response);
            if !ok {
                kick_out_servicer(socket, "SendFailed", "outbound queue full");
            }
            !ok
        } else {
            false
        };
        if faulted && let Some(sockets) = self.servicers.get_mut(&user_id) {
            sockets.remove(&unique_id);
        }
    }

    fn broadcast_to_all(&mut self, response: ServiceResponse) {
        let mut faulted: Vec<(u64, u64)> = Vec::new();
        for (user_id, sockets) in self.servicers.iter() {
            for (unique_id, socket) in sockets.iter() {
                if !push_service_response(socket, response.clone()) {
                    kick_out_servicer(socket, "SendFailed", "outbound queue full");
                    faulted.push((*user_id, *unique_id));
                }
            }
        }
        self.remove_faulted(faulted);
    }

    fn broadcast_to_user_except(&mut self, user_id: u64, except_unique_id: u64, response: ServiceResponse) {
        let Some(sockets) = self.servicers.get(&user_id) else {
            return;
        };
        let mut faulted = Vec::new();
        for (unique_id, socket) in sockets.iter() {
            if *unique_id == except_unique_id {
                continue;
            }
            if !push_service_response(socket, response.clone()) {
                kick_out_servicer(socket, "SendFailed", "outbound queue full");
                faulted.push(*unique_id);
            }
        }
        for unique_id in faulted {
            if let Some(sockets) = self.servicers.get_mut(&user_id) {
                sockets.remove(&unique_id);
            }
        }
    }

    fn remove_faulted(&mut self, faulted: Vec<(u64, u64)>) {
        for (user_id, unique_id) in faulted {
            if let Some(sockets) = self.servicers.get_mut(&user_id) {
                sockets.remove(&unique_id);
            }
        }
    }
}
