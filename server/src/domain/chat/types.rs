//! Core value objects for the session-fanout engine
//!
//! These mirror the store row shapes (see `data::types::chat`) but are the
//! in-memory vocabulary the engine's components pass to one another.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::data::types::{TalkInfoRow, TalkMessageKind, TalkMessageRow, TalkStatus};

use super::envelope::{ServiceResponse, TalkResponse};

/// Per-process unique session id generator.
///
/// Seeded from the process start time so restarts don't reuse ids a peer might
/// still be comparing against from a previous process lifetime. Only needs to be
/// unique within this instance: a sender never needs to recognize another
/// instance's id, it only compares against its own locally-held sockets.
pub struct UniqueIdGenerator {
    counter: AtomicU64,
}

impl UniqueIdGenerator {
    pub fn new() -> Self {
        let seed = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        Self {
            counter: AtomicU64::new(seed),
        }
    }

    pub fn next(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for UniqueIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// A conversation's identity and lifecycle, as held in memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TalkInfo {
    pub talk_id: String,
    pub status: TalkStatus,
    pub title: String,
    pub creator_id: u64,
    pub creator_user_name: String,
    pub service_id: u64,
    pub started_at: i64,
    pub finished_at: Option<i64>,
}

impl From<TalkInfoRow> for TalkInfo {
    fn from(row: TalkInfoRow) -> Self {
        Self {
            talk_id: row.talk_id,
            status: row.status,
            title: row.title,
            creator_id: row.creator_id,
            creator_user_name: row.creator_user_name,
            service_id: row.service_id,
            started_at: row.started_at,
            finished_at: row.finished_at,
        }
    }
}

/// One item in a talk's append-only message log, as held in memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TalkMessage {
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

impl From<TalkMessageRow> for TalkMessage {
    fn from(row: TalkMessageRow) -> Self {
        Self {
            message_id: row.message_id,
            talk_id: row.talk_id,
            at: row.at,
            customer_message: row.customer_message,
            sender_id: row.sender_id,
            sender_user_name: row.sender_user_name,
            kind: row.kind,
            text: row.text,
            data: row.data,
        }
    }
}

/// Outbound queue capacity for one socket (§3).
pub const SOCKET_OUTBOUND_CAPACITY: usize = 100;

/// Local representation of one connected customer stream.
pub struct CustomerSocket {
    pub unique_id: u64,
    pub talk_id: String,
    pub user_id: u64,
    pub create_talk_flag: bool,
    pub outbound: mpsc::Sender<TalkResponse>,
}

/// Local representation of one connected servicer stream.
pub struct ServicerSocket {
    pub unique_id: u64,
    pub user_id: u64,
    pub outbound: mpsc::Sender<ServiceResponse>,
}
