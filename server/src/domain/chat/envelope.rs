//! Fan-out envelopes and per-socket outbound response variants

use serde::{Deserialize, Serialize};

use super::types::{TalkInfo, TalkMessage};

/// The tagged union published to a `talk:<talkID>` broker exchange (§4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerEnvelope {
    pub talk_id: String,
    pub variant: BrokerVariant,
}

impl crate::data::topics::TopicMessage for BrokerEnvelope {
    fn size_bytes(&self) -> usize {
        match &self.variant {
            BrokerVariant::Message { message, .. } => {
                64 + message.text.as_ref().map(String::len).unwrap_or(0)
                    + message.data.as_ref().map(Vec::len).unwrap_or(0)
            }
            _ => 64,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BrokerVariant {
    Message {
        sender_unique_id: u64,
        message: TalkMessage,
    },
    TalkCreate,
    TalkClose,
    ServicerAttach { servicer_id: u64 },
    ServicerDetach { servicer_id: u64 },
}

/// Outbound frames for `CustomerTalk.Talk` (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TalkResponse {
    Messages { talk_id: String, history: Vec<TalkMessage> },
    Message(TalkMessage),
    MessageConfirmed { seq_id: u64, at: i64 },
    Close,
    KickOut { code: String, msg: String },
}

/// Outbound frames for `ServiceTalk.Service` (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ServiceResponse {
    Talks(Vec<TalkInfo>),
    PendingTalks(Vec<TalkInfo>),
    Reload { talk: TalkInfo, history: Vec<TalkMessage> },
    AttachedTalks(Vec<(TalkInfo, Vec<TalkMessage>)>),
    Attach { talk: TalkInfo, attached_service_id: u64 },
    Detach { talk: TalkInfo, detached_service_id: u64 },
    Message(TalkMessage),
    MessageConfirmed { seq_id: u64, at: i64 },
    Notify { msg: String },
    Close,
    KickOut { code: String, msg: String },
}
