//! SQLite repositories
//!
//! Types (TalkRow, MessageRow, etc.) should be imported from `crate::data::types`.

pub mod message;
pub mod talk;
