//! Shared data types for the transactional backend

mod chat;

pub use chat::{TalkInfoRow, TalkMessageKind, TalkMessageRow, TalkStatus};
