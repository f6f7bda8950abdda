//! SQLite schema definitions
//!
//! Initial schema with all tables. No migrations needed for first version.

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// Complete schema SQL
pub const SCHEMA: &str = r#"
-- =============================================================================
-- Infrastructure: Schema version tracking
-- =============================================================================
CREATE TABLE IF NOT EXISTS schema_version (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    version INTEGER NOT NULL,
    applied_at INTEGER NOT NULL,
    description TEXT
);

CREATE TABLE IF NOT EXISTS schema_migrations (
    version INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    applied_at INTEGER NOT NULL,
    checksum TEXT NOT NULL,
    execution_time_ms INTEGER,
    success INTEGER NOT NULL DEFAULT 1
);

-- =============================================================================
-- 1. Talk info: identity and lifecycle of one support conversation
-- =============================================================================
CREATE TABLE IF NOT EXISTS talk_info (
    talk_id TEXT PRIMARY KEY,
    status TEXT NOT NULL CHECK(status IN ('none', 'opened', 'closed')),
    title TEXT NOT NULL,
    creator_id INTEGER NOT NULL,
    creator_user_name TEXT NOT NULL,
    service_id INTEGER NOT NULL DEFAULT 0,
    started_at INTEGER NOT NULL,
    finished_at INTEGER
);

CREATE INDEX IF NOT EXISTS idx_talk_info_pending ON talk_info(service_id, status);
CREATE INDEX IF NOT EXISTS idx_talk_info_creator ON talk_info(creator_id);
CREATE INDEX IF NOT EXISTS idx_talk_info_service ON talk_info(service_id);

-- =============================================================================
-- 2. Talk message: append-only per-talk message log
-- =============================================================================
CREATE TABLE IF NOT EXISTS talk_message (
    message_id INTEGER PRIMARY KEY AUTOINCREMENT,
    talk_id TEXT NOT NULL REFERENCES talk_info(talk_id) ON DELETE CASCADE,
    at INTEGER NOT NULL,
    customer_message INTEGER NOT NULL,
    sender_id INTEGER NOT NULL,
    sender_user_name TEXT NOT NULL,
    kind TEXT NOT NULL CHECK(kind IN ('text', 'image')),
    text TEXT,
    data BLOB
);

CREATE INDEX IF NOT EXISTS idx_talk_message_talk ON talk_message(talk_id, message_id);
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[allow(clippy::assertions_on_constants)]
    fn test_schema_version_is_positive() {
        assert!(SCHEMA_VERSION > 0);
    }

    #[test]
    #[allow(clippy::const_is_empty)]
    fn test_schema_is_not_empty() {
        assert!(!SCHEMA.is_empty());
    }

    #[test]
    fn test_schema_contains_required_tables() {
        let required_tables = ["schema_version", "schema_migrations", "talk_info", "talk_message"];

        for table in required_tables {
            assert!(
                SCHEMA.contains(&format!("CREATE TABLE IF NOT EXISTS {}", table)),
                "Schema missing table: {}",
                table
            );
        }
    }
}
