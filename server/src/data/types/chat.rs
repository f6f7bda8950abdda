//! Row types for the chat engine's transactional tables (talk_info, talk_message)

use serde::{Deserialize, Serialize};

/// Talk lifecycle status, stored as a short string in `talk_info.status`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TalkStatus {
    None,
    Opened,
    Closed,
}

impl TalkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TalkStatus::None => "none",
            TalkStatus::Opened => "opened",
            TalkStatus::Closed => "closed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "none" => Some(TalkStatus::None),
            "opened" => Some(TalkStatus::Opened),
            "closed" => Some(TalkStatus::Closed),
            _ => None,
        }
    }
}

/// Talk row from `talk_info`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TalkInfoRow {
    pub talk_id: String,
    pub status: TalkStatus,
    pub title: String,
    pub creator_id: u64,
    pub creator_user_name: String,
    pub service_id: u64,
    pub started_at: i64,
    pub finished_at: Option<i64>,
}

/// Message kind, stored as a short string in `talk_message.kind`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TalkMessageKind {
    Text,
    Image,
}

impl TalkMessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TalkMessageKind::Text => "text",
            TalkMessageKind::Image => "image",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(TalkMessageKind::Text),
            "image" => Some(TalkMessageKind::Image),
            _ => None,
        }
    }
}

/// Message row from `talk_message`, ordered by `message_id` within a talk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TalkMessageRow {
    pub message_id: i64,
    pub talk_id: String,
    pub at: i64,
    pub customer_message: bool,
    pub sender_id: u64,
    pub sender_user_name: String,
    pub kind: TalkMessageKind,
    pub text: Option<String>,
    pub data: Option<Vec<u8>>,
}
