//! Domain logic
//!
//! - `chat` - session-fanout engine for the multi-tenant support chat service

pub mod chat;
