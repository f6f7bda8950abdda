// =============================================================================
// Application Identity
// =============================================================================

/// Application name in title case (for display and platform directories)
pub const APP_NAME: &str = "ChatFabric";

/// Application name in lowercase (for paths and identifiers)
pub const APP_NAME_LOWER: &str = "chatfabric";

/// Unix-style dotfile folder name
pub const APP_DOT_FOLDER: &str = ".chatfabric";

// =============================================================================
// Configuration Files
// =============================================================================

/// Config file name
pub const CONFIG_FILE_NAME: &str = "chatfabric.json";

/// Environment variable for config file path
pub const ENV_CONFIG: &str = "CHATFABRIC_CONFIG";

// =============================================================================
// Environment Variables - Logging
// =============================================================================

/// Environment variable for log level/filter
pub const ENV_LOG: &str = "CHATFABRIC_LOG";

// =============================================================================
// Environment Variables - Storage
// =============================================================================

/// Environment variable to override data directory
pub const ENV_DATA_DIR: &str = "CHATFABRIC_DATA_DIR";

// =============================================================================
// Environment Variables - Secrets
// =============================================================================

/// Environment variable to force specific secrets backend
///
/// Platform-specific values:
/// - macOS: `keychain` (default)
/// - Windows: `credential-manager`
/// - Linux: `secret-service`, `keyutils`
/// - All platforms: `file`, `env`, `aws`, `vault`
pub const ENV_SECRETS_BACKEND: &str = "CHATFABRIC_SECRETS_BACKEND";

/// Service name for keychain/credential manager entries
pub const SECRET_SERVICE_NAME: &str = "chatfabric";

/// Secret key name for JWT signing key
pub const SECRET_KEY_JWT_SIGNING: &str = "jwt_signing_key";

/// Secret key name for API key HMAC secret
pub const SECRET_KEY_API_KEY: &str = "api_key_secret";

// =============================================================================
// Secrets Backends
// =============================================================================

pub const ENV_SECRETS_ENV_PREFIX: &str = "CHATFABRIC_SECRETS_ENV_PREFIX";
pub const ENV_SECRETS_AWS_REGION: &str = "CHATFABRIC_SECRETS_AWS_REGION";
pub const ENV_SECRETS_AWS_PREFIX: &str = "CHATFABRIC_SECRETS_AWS_PREFIX";
pub const ENV_SECRETS_VAULT_ADDR: &str = "CHATFABRIC_SECRETS_VAULT_ADDR";
pub const ENV_SECRETS_VAULT_TOKEN: &str = "CHATFABRIC_SECRETS_VAULT_TOKEN";
pub const ENV_SECRETS_VAULT_MOUNT: &str = "CHATFABRIC_SECRETS_VAULT_MOUNT";
pub const ENV_SECRETS_VAULT_PREFIX: &str = "CHATFABRIC_SECRETS_VAULT_PREFIX";

pub const SECRETS_DEFAULT_AWS_PREFIX: &str = "chatfabric";
pub const SECRETS_DEFAULT_VAULT_MOUNT: &str = "secret";
pub const SECRETS_DEFAULT_VAULT_PREFIX: &str = "chatfabric";
pub const SECRETS_DEFAULT_ENV_PREFIX: &str = "CHATFABRIC_SECRET_";

// =============================================================================
// SQLite Database
// =============================================================================

/// SQLite database filename
pub const SQLITE_DB_FILENAME: &str = "chatfabric.db";

/// SQLite connection pool max connections
pub const SQLITE_MAX_CONNECTIONS: u32 = 5;

/// SQLite busy timeout in seconds
pub const SQLITE_BUSY_TIMEOUT_SECS: u64 = 30;

/// SQLite cache size (negative = KB, so -64000 = 64MB)
pub const SQLITE_CACHE_SIZE: &str = "-64000";

/// SQLite WAL auto-checkpoint threshold (pages, ~4MB at 1000)
pub const SQLITE_WAL_AUTOCHECKPOINT: &str = "1000";

/// WAL checkpoint interval in seconds (5 minutes)
pub const SQLITE_CHECKPOINT_INTERVAL_SECS: u64 = 300;

// =============================================================================
// Topic Configuration
// =============================================================================

/// Environment variable for topic buffer size
pub const ENV_TOPIC_BUFFER_SIZE: &str = "CHATFABRIC_TOPIC_BUFFER_SIZE";

/// Environment variable for topic channel capacity
pub const ENV_TOPIC_CHANNEL_CAPACITY: &str = "CHATFABRIC_TOPIC_CHANNEL_CAPACITY";

/// Default topic buffer size (100 MB)
pub const DEFAULT_TOPIC_BUFFER_SIZE: usize = 100 * 1024 * 1024;

/// Default topic channel capacity (message count)
pub const DEFAULT_TOPIC_CHANNEL_CAPACITY: usize = 100_000;

// =============================================================================
// Chat engine (Router mailbox capacities, deployment variant)
// =============================================================================

/// Environment variable for the Router's control-channel mailbox capacity
pub const ENV_CHAT_CONTROL_CAPACITY: &str = "CHATFABRIC_CHAT_CONTROL_CAPACITY";

/// Environment variable for the Router's message-channel mailbox capacity
pub const ENV_CHAT_MESSAGE_CAPACITY: &str = "CHATFABRIC_CHAT_MESSAGE_CAPACITY";

/// Environment variable selecting the chat engine's deployment variant
pub const ENV_CHAT_DEPLOYMENT: &str = "CHATFABRIC_CHAT_DEPLOYMENT";

/// Default Router control-channel capacity
pub const DEFAULT_CHAT_CONTROL_CAPACITY: usize = 10;

/// Default Router message-channel capacity
pub const DEFAULT_CHAT_MESSAGE_CAPACITY: usize = 100;

// =============================================================================
// Shutdown
// =============================================================================

/// Graceful shutdown timeout in seconds (5 minutes)
pub const SHUTDOWN_TIMEOUT_SECS: u64 = 300;

// =============================================================================
// Update Check
// =============================================================================

/// NPM registry URL for checking latest version
pub const NPM_REGISTRY_URL: &str = "https://registry.npmjs.org/chatfabric/latest";

/// Update check HTTP timeout in seconds
pub const UPDATE_CHECK_TIMEOUT_SECS: u64 = 3;

/// Number of retry attempts for update check
pub const UPDATE_CHECK_RETRIES: u32 = 2;

/// Delay between retry attempts in milliseconds
pub const UPDATE_CHECK_RETRY_DELAY_MS: u64 = 500;

/// Environment variable to disable update check
pub const ENV_NO_UPDATE_CHECK: &str = "CHATFABRIC_NO_UPDATE_CHECK";

// =============================================================================
// Cache
// =============================================================================

/// Environment variable for cache backend
pub const ENV_CACHE_BACKEND: &str = "CHATFABRIC_CACHE_BACKEND";

/// Environment variable for cache max entries
pub const ENV_CACHE_MAX_ENTRIES: &str = "CHATFABRIC_CACHE_MAX_ENTRIES";

/// Environment variable for cache eviction policy
pub const ENV_CACHE_EVICTION_POLICY: &str = "CHATFABRIC_CACHE_EVICTION_POLICY";

/// Environment variable for Redis-compatible cache URL
/// Supports: redis://, rediss://, redis+sentinel://, rediss+sentinel://
pub const ENV_CACHE_REDIS_URL: &str = "CHATFABRIC_CACHE_REDIS_URL";

/// Default cache max entries
pub const DEFAULT_CACHE_MAX_ENTRIES: u64 = 100_000;

/// Cache key version (bump on schema changes to invalidate all cached data)
pub const CACHE_KEY_VERSION: &str = "v1";

/// Cache TTL for talk info and owning-servicer lookups (30 sec - talks mutate often)
pub const CACHE_TTL_TALK_INFO: u64 = 30;
