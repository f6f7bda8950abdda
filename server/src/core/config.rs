use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::utils::file::expand_path;

use super::cli::CliConfig;
use super::constants::{
    APP_DOT_FOLDER, CONFIG_FILE_NAME, DEFAULT_CACHE_MAX_ENTRIES, DEFAULT_CHAT_CONTROL_CAPACITY,
    DEFAULT_CHAT_MESSAGE_CAPACITY, ENV_SECRETS_AWS_PREFIX, ENV_SECRETS_AWS_REGION,
    ENV_SECRETS_ENV_PREFIX, ENV_SECRETS_VAULT_ADDR, ENV_SECRETS_VAULT_MOUNT,
    ENV_SECRETS_VAULT_PREFIX, ENV_SECRETS_VAULT_TOKEN, SECRETS_DEFAULT_AWS_PREFIX,
    SECRETS_DEFAULT_ENV_PREFIX, SECRETS_DEFAULT_VAULT_MOUNT, SECRETS_DEFAULT_VAULT_PREFIX,
};

// =============================================================================
// Chat Engine Deployment Variant (§4.6)
// =============================================================================

/// Which wiring the session-fanout engine runs: a single binary owning both
/// session managers against an in-process broker, or two halves split across
/// processes sharing a real external broker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChatDeployment {
    #[default]
    AllInOne,
    Split,
}

impl fmt::Display for ChatDeployment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatDeployment::AllInOne => write!(f, "all-in-one"),
            ChatDeployment::Split => write!(f, "split"),
        }
    }
}

// =============================================================================
// Cache Backend Enum
// =============================================================================

/// Cache backend type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackendType {
    #[default]
    Memory,
    Redis,
}

impl fmt::Display for CacheBackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheBackendType::Memory => write!(f, "memory"),
            CacheBackendType::Redis => write!(f, "redis"),
        }
    }
}

// =============================================================================
// Eviction Policy Enum
// =============================================================================

/// Cache eviction policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionPolicy {
    /// TinyLFU - LRU eviction + LFU admission (near-optimal hit ratio)
    #[default]
    TinyLfu,
    /// Simple LRU (better for recency-biased workloads)
    Lru,
}

impl fmt::Display for EvictionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvictionPolicy::TinyLfu => write!(f, "tinylfu"),
            EvictionPolicy::Lru => write!(f, "lru"),
        }
    }
}

// =============================================================================
// Secrets Backend Enum
// =============================================================================

/// Secrets storage backend type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SecretsBackend {
    DataProtectionKeychain,
    Keychain,
    CredentialManager,
    SecretService,
    Keyutils,
    File,
    Env,
    Aws,
    Vault,
}

impl SecretsBackend {
    /// Auto-detect best available backend for the current platform.
    pub fn detect() -> Self {
        #[cfg(target_os = "macos")]
        {
            Self::DataProtectionKeychain
        }
        #[cfg(target_os = "windows")]
        {
            Self::CredentialManager
        }
        #[cfg(target_os = "linux")]
        {
            Self::SecretService
        }
        #[cfg(not(any(target_os = "macos", target_os = "windows", target_os = "linux")))]
        {
            Self::File
        }
    }

    /// Whether this backend uses vault-blob storage (keychain/file variants)
    pub fn is_vault_based(&self) -> bool {
        matches!(
            self,
            Self::DataProtectionKeychain
                | Self::Keychain
                | Self::CredentialManager
                | Self::SecretService
                | Self::Keyutils
                | Self::File
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DataProtectionKeychain => "data-protection-keychain",
            Self::Keychain => "keychain",
            Self::CredentialManager => "credential-manager",
            Self::SecretService => "secret-service",
            Self::Keyutils => "keyutils",
            Self::File => "file",
            Self::Env => "env",
            Self::Aws => "aws",
            Self::Vault => "vault",
        }
    }
}

impl fmt::Display for SecretsBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// File Config Structs (JSON deserialization)
// =============================================================================

/// Chat engine configuration section (from JSON config file)
#[derive(Debug, Default, Clone, Deserialize)]
pub struct ChatFileConfig {
    pub control_capacity: Option<usize>,
    pub message_capacity: Option<usize>,
    pub deployment: Option<ChatDeployment>,
}

/// Update check configuration section (from JSON config file)
#[derive(Debug, Default, Clone, Deserialize)]
pub struct UpdateFileConfig {
    pub enabled: Option<bool>,
}

/// Redis cache configuration section (from JSON config file)
#[derive(Debug, Default, Clone, Deserialize)]
pub struct RedisFileConfig {
    /// Connection URL for Redis-compatible backends
    pub url: Option<String>,
}

/// Memory cache configuration section (from JSON config file)
#[derive(Debug, Default, Clone, Deserialize)]
pub struct MemoryCacheFileConfig {
    /// Maximum number of cache entries
    pub max_entries: Option<u64>,
    /// Cache eviction policy
    pub eviction_policy: Option<EvictionPolicy>,
}

/// Database configuration section (from JSON config file)
#[derive(Debug, Default, Clone, Deserialize)]
pub struct DatabaseFileConfig {
    /// Cache backend: memory (default) or redis
    pub cache: Option<CacheBackendType>,
    /// Redis cache configuration
    pub redis: Option<RedisFileConfig>,
    /// Memory cache configuration
    pub memory_cache: Option<MemoryCacheFileConfig>,
}

/// Secrets env backend configuration section (from JSON config file)
#[derive(Debug, Default, Clone, Deserialize)]
pub struct SecretsEnvFileConfig {
    pub prefix: Option<String>,
}

/// Secrets AWS backend configuration section (from JSON config file)
#[derive(Debug, Default, Clone, Deserialize)]
pub struct SecretsAwsFileConfig {
    pub region: Option<String>,
    pub prefix: Option<String>,
    pub recovery_window_days: Option<u32>,
}

/// Secrets Vault backend configuration section (from JSON config file)
#[derive(Debug, Default, Clone, Deserialize)]
pub struct SecretsVaultFileConfig {
    pub address: Option<String>,
    pub mount: Option<String>,
    pub prefix: Option<String>,
    pub token: Option<String>,
}

/// Secrets configuration section (from JSON config file)
#[derive(Debug, Default, Clone, Deserialize)]
pub struct SecretsFileConfig {
    pub backend: Option<SecretsBackend>,
    pub env: Option<SecretsEnvFileConfig>,
    pub aws: Option<SecretsAwsFileConfig>,
    pub vault: Option<SecretsVaultFileConfig>,
}

/// File-based configuration (JSON)
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    pub chat: Option<ChatFileConfig>,
    pub update: Option<UpdateFileConfig>,
    pub database: Option<DatabaseFileConfig>,
    pub secrets: Option<SecretsFileConfig>,
    #[serde(flatten)]
    pub extra: serde_json::Value,
}

impl FileConfig {
    /// Load configuration from a JSON file
    fn load_from_file(path: &Path) -> Result<Self> {
        tracing::debug!(path = %path.display(), "Loading config file");
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        tracing::trace!(config = ?config, "Parsed config file");
        Ok(config)
    }

    /// Warn about unknown fields in the config
    fn warn_unknown_fields(&self) {
        if let serde_json::Value::Object(map) = &self.extra
            && !map.is_empty()
        {
            let keys_str: String = map
                .keys()
                .map(|k| k.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            tracing::warn!(
                fields = %keys_str,
                "Unknown fields in config file (possible typos)"
            );
        }
    }

    /// Merge another FileConfig into this one (other takes precedence)
    fn merge(&mut self, other: FileConfig) {
        // Chat
        if let Some(chat) = other.chat {
            let current = self.chat.get_or_insert_with(ChatFileConfig::default);
            if chat.control_capacity.is_some() {
                tracing::trace!(control_capacity = ?chat.control_capacity, "Merging chat.control_capacity");
                current.control_capacity = chat.control_capacity;
            }
            if chat.message_capacity.is_some() {
                tracing::trace!(message_capacity = ?chat.message_capacity, "Merging chat.message_capacity");
                current.message_capacity = chat.message_capacity;
            }
            if chat.deployment.is_some() {
                tracing::trace!(deployment = ?chat.deployment, "Merging chat.deployment");
                current.deployment = chat.deployment;
            }
        }

        // Update
        if let Some(update) = other.update {
            let current = self.update.get_or_insert_with(UpdateFileConfig::default);
            if update.enabled.is_some() {
                tracing::trace!(enabled = ?update.enabled, "Merging update.enabled");
                current.enabled = update.enabled;
            }
        }

        // Database
        if let Some(database) = other.database {
            let current = self
                .database
                .get_or_insert_with(DatabaseFileConfig::default);
            if database.cache.is_some() {
                tracing::trace!(cache = ?database.cache, "Merging database.cache");
                current.cache = database.cache;
            }
            if let Some(redis) = database.redis {
                let current_redis = current.redis.get_or_insert_with(RedisFileConfig::default);
                if redis.url.is_some() {
                    tracing::trace!(url = "***", "Merging database.redis.url");
                    current_redis.url = redis.url;
                }
            }
            if let Some(memory_cache) = database.memory_cache {
                let current_mc = current
                    .memory_cache
                    .get_or_insert_with(MemoryCacheFileConfig::default);
                if memory_cache.max_entries.is_some() {
                    tracing::trace!(max_entries = ?memory_cache.max_entries, "Merging database.memory_cache.max_entries");
                    current_mc.max_entries = memory_cache.max_entries;
                }
                if memory_cache.eviction_policy.is_some() {
                    tracing::trace!(eviction_policy = ?memory_cache.eviction_policy, "Merging database.memory_cache.eviction_policy");
                    current_mc.eviction_policy = memory_cache.eviction_policy;
                }
            }
        }

        // Secrets
        if let Some(secrets) = other.secrets {
            let current = self.secrets.get_or_insert_with(SecretsFileConfig::default);
            if secrets.backend.is_some() {
                tracing::trace!(backend = ?secrets.backend, "Merging secrets.backend");
                current.backend = secrets.backend;
            }
            if let Some(env_cfg) = secrets.env {
                let ce = current
                    .env
                    .get_or_insert_with(SecretsEnvFileConfig::default);
                if env_cfg.prefix.is_some() {
                    ce.prefix = env_cfg.prefix;
                }
            }
            if let Some(aws_cfg) = secrets.aws {
                let ca = current
                    .aws
                    .get_or_insert_with(SecretsAwsFileConfig::default);
                if aws_cfg.region.is_some() {
                    ca.region = aws_cfg.region;
                }
                if aws_cfg.prefix.is_some() {
                    ca.prefix = aws_cfg.prefix;
                }
                if aws_cfg.recovery_window_days.is_some() {
                    ca.recovery_window_days = aws_cfg.recovery_window_days;
                }
            }
            if let Some(vault_cfg) = secrets.vault {
                let cv = current
                    .vault
                    .get_or_insert_with(SecretsVaultFileConfig::default);
                if vault_cfg.address.is_some() {
                    tracing::trace!(address = "***", "Merging secrets.vault.address");
                    cv.address = vault_cfg.address;
                }
                if vault_cfg.mount.is_some() {
                    cv.mount = vault_cfg.mount;
                }
                if vault_cfg.prefix.is_some() {
                    cv.prefix = vault_cfg.prefix;
                }
                if vault_cfg.token.is_some() {
                    tracing::trace!(token = "***", "Merging secrets.vault.token");
                    cv.token = vault_cfg.token;
                }
            }
        }
    }
}

// =============================================================================
// Runtime Config Structs (final merged configuration)
// =============================================================================

/// Chat engine configuration (final/runtime) — Router mailbox capacities and
/// deployment variant (§4.1, §4.6, §10).
#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub control_capacity: usize,
    pub message_capacity: usize,
    pub deployment: ChatDeployment,
}

/// Update check configuration (final/runtime)
#[derive(Debug, Clone)]
pub struct UpdateConfig {
    pub enabled: bool,
}

/// Redis cache configuration (final/runtime)
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Connection URL for Redis-compatible backends
    pub url: String,
}

/// Memory cache configuration (final/runtime)
#[derive(Debug, Clone)]
pub struct MemoryCacheConfig {
    /// Maximum number of cache entries
    pub max_entries: u64,
    /// Cache eviction policy
    pub eviction_policy: EvictionPolicy,
}

/// Cache configuration (used internally by CacheService)
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Cache backend type
    pub backend: CacheBackendType,
    /// Maximum entries (memory backend)
    pub max_entries: u64,
    /// Eviction policy (memory backend)
    pub eviction_policy: EvictionPolicy,
    /// Redis URL (redis backend)
    pub redis_url: Option<String>,
}

/// Database configuration (final/runtime)
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Cache backend: memory (default) or redis
    pub cache: CacheBackendType,
    /// Redis cache configuration (only used if cache = redis)
    pub redis: Option<RedisConfig>,
    /// Memory cache configuration
    pub memory_cache: MemoryCacheConfig,
}

// =============================================================================
// Secrets Runtime Config
// =============================================================================

/// Secrets env backend configuration (final/runtime)
#[derive(Debug, Clone)]
pub struct SecretsEnvConfig {
    pub prefix: String,
}

/// Secrets AWS backend configuration (final/runtime)
#[derive(Debug, Clone)]
pub struct SecretsAwsConfig {
    pub region: Option<String>,
    pub prefix: String,
    pub recovery_window_days: Option<u32>,
}

/// Secrets Vault backend configuration (final/runtime)
#[derive(Debug, Clone)]
pub struct SecretsVaultConfig {
    pub address: String,
    pub mount: String,
    pub prefix: String,
    pub token: String,
}

/// Secrets configuration (final/runtime)
#[derive(Debug, Clone)]
pub struct SecretsConfig {
    pub backend: SecretsBackend,
    pub env: Option<SecretsEnvConfig>,
    pub aws: Option<SecretsAwsConfig>,
    pub vault: Option<SecretsVaultConfig>,
}

impl DatabaseConfig {
    /// Build a CacheConfig for use by CacheService
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            backend: self.cache,
            max_entries: self.memory_cache.max_entries,
            eviction_policy: self.memory_cache.eviction_policy,
            redis_url: self.redis.as_ref().map(|r| r.url.clone()),
        }
    }
}

/// Final merged application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub chat: ChatConfig,
    pub update: UpdateConfig,
    pub database: DatabaseConfig,
    pub secrets: SecretsConfig,
}

impl AppConfig {
    /// Load configuration from all sources
    ///
    /// Priority (lowest to highest):
    /// 1. Defaults
    /// 2. Profile directory config (~/.chatfabric/chatfabric.json)
    /// 3. Local directory config OR CLI-specified config path
    /// 4. CLI arguments (which include env var fallbacks via clap)
    pub fn load(cli: &CliConfig) -> Result<Self> {
        tracing::debug!("Loading application configuration");
        tracing::trace!(cli = ?cli, "CLI config");

        let mut file_config = FileConfig::default();
        let mut found_configs: Vec<String> = Vec::new();

        // 1. Load from profile dir (~/.chatfabric/chatfabric.json) - skip if not exists
        if let Some(profile_path) = get_profile_config_path()
            && profile_path.exists()
        {
            let profile_config = FileConfig::load_from_file(&profile_path)?;
            profile_config.warn_unknown_fields();
            file_config.merge(profile_config);
            found_configs.push(profile_path.display().to_string());
        }

        // 2. Load from CLI-specified path OR local directory
        let overlay_path = if let Some(ref path) = cli.config {
            let expanded = expand_path(&path.to_string_lossy());
            if !expanded.exists() {
                anyhow::bail!("Config file not found: {}", expanded.display());
            }
            Some(expanded)
        } else {
            let local = PathBuf::from(CONFIG_FILE_NAME);
            if local.exists() { Some(local) } else { None }
        };

        if let Some(path) = overlay_path {
            let overlay_config = FileConfig::load_from_file(&path)?;
            overlay_config.warn_unknown_fields();
            file_config.merge(overlay_config);
            found_configs.push(path.display().to_string());
        }

        tracing::debug!(configs = ?found_configs, "Config files loaded");

        // 3. Extract file config values with defaults
        let file_chat = file_config.chat.unwrap_or_default();
        let file_update = file_config.update.unwrap_or_default();
        let file_database = file_config.database.unwrap_or_default();

        // 4. Layer configs: defaults -> file config -> CLI/env overrides

        // chat config: CLI/env overrides file config
        let chat_control_capacity = cli
            .chat_control_capacity
            .or(file_chat.control_capacity)
            .unwrap_or(DEFAULT_CHAT_CONTROL_CAPACITY);
        let chat_message_capacity = cli
            .chat_message_capacity
            .or(file_chat.message_capacity)
            .unwrap_or(DEFAULT_CHAT_MESSAGE_CAPACITY);
        let chat_deployment = cli
            .chat_deployment
            .or(file_chat.deployment)
            .unwrap_or_default();

        // update config: CLI flag overrides file config, default enabled
        let update_enabled = if cli.no_update_check {
            false
        } else {
            file_update.enabled.unwrap_or(true)
        };

        // cache config: CLI/env overrides file config
        let cache_backend = cli
            .cache_backend
            .or(file_database.cache)
            .unwrap_or_default();

        // Memory cache config
        let file_memory_cache = file_database.memory_cache.unwrap_or_default();
        let cache_max_entries = cli
            .cache_max_entries
            .or(file_memory_cache.max_entries)
            .unwrap_or(DEFAULT_CACHE_MAX_ENTRIES);
        let cache_eviction_policy = cli
            .cache_eviction_policy
            .or(file_memory_cache.eviction_policy)
            .unwrap_or_default();
        let memory_cache_config = MemoryCacheConfig {
            max_entries: cache_max_entries,
            eviction_policy: cache_eviction_policy,
        };

        // Redis config (only populated if using redis backend)
        let redis_config = if cache_backend == CacheBackendType::Redis {
            let file_redis = file_database.redis.unwrap_or_default();
            let url = cli
                .cache_redis_url
                .clone()
                .or(file_redis.url)
                .unwrap_or_default();
            Some(RedisConfig { url })
        } else {
            None
        };

        let database = DatabaseConfig {
            cache: cache_backend,
            redis: redis_config,
            memory_cache: memory_cache_config,
        };

        // Secrets config: CLI > file > platform auto-detect
        let file_secrets = file_config.secrets.unwrap_or_default();

        let secrets_backend = cli
            .secrets_backend
            .or(file_secrets.backend)
            .unwrap_or_else(SecretsBackend::detect);

        let secrets_env = if secrets_backend == SecretsBackend::Env {
            let file_env = file_secrets.env.unwrap_or_default();
            Some(SecretsEnvConfig {
                prefix: std::env::var(ENV_SECRETS_ENV_PREFIX)
                    .ok()
                    .or(file_env.prefix)
                    .unwrap_or_else(|| SECRETS_DEFAULT_ENV_PREFIX.to_string()),
            })
        } else {
            None
        };

        let secrets_aws = if secrets_backend == SecretsBackend::Aws {
            let file_aws = file_secrets.aws.unwrap_or_default();
            Some(SecretsAwsConfig {
                region: std::env::var(ENV_SECRETS_AWS_REGION)
                    .ok()
                    .or(file_aws.region),
                prefix: std::env::var(ENV_SECRETS_AWS_PREFIX)
                    .ok()
                    .or(file_aws.prefix)
                    .unwrap_or_else(|| SECRETS_DEFAULT_AWS_PREFIX.to_string()),
                recovery_window_days: file_aws.recovery_window_days,
            })
        } else {
            None
        };

        let secrets_vault = if secrets_backend == SecretsBackend::Vault {
            let file_vault = file_secrets.vault.unwrap_or_default();
            Some(SecretsVaultConfig {
                address: std::env::var(ENV_SECRETS_VAULT_ADDR)
                    .ok()
                    .or(file_vault.address)
                    .unwrap_or_default()
                    .trim_end_matches('/')
                    .to_string(),
                mount: std::env::var(ENV_SECRETS_VAULT_MOUNT)
                    .ok()
                    .or(file_vault.mount)
                    .unwrap_or_else(|| SECRETS_DEFAULT_VAULT_MOUNT.to_string()),
                prefix: std::env::var(ENV_SECRETS_VAULT_PREFIX)
                    .ok()
                    .or(file_vault.prefix)
                    .unwrap_or_else(|| SECRETS_DEFAULT_VAULT_PREFIX.to_string()),
                token: std::env::var(ENV_SECRETS_VAULT_TOKEN)
                    .ok()
                    .or_else(|| std::env::var("VAULT_TOKEN").ok())
                    .or(file_vault.token)
                    .unwrap_or_default(),
            })
        } else {
            None
        };

        let secrets = SecretsConfig {
            backend: secrets_backend,
            env: secrets_env,
            aws: secrets_aws,
            vault: secrets_vault,
        };

        let config = Self {
            chat: ChatConfig {
                control_capacity: chat_control_capacity,
                message_capacity: chat_message_capacity,
                deployment: chat_deployment,
            },
            update: UpdateConfig {
                enabled: update_enabled,
            },
            database,
            secrets,
        };

        // Validate configuration
        config.validate()?;

        tracing::debug!(
            cache_backend = %config.database.cache,
            cache_max_entries = config.database.memory_cache.max_entries,
            update_enabled = config.update.enabled,
            chat_control_capacity = config.chat.control_capacity,
            chat_message_capacity = config.chat.message_capacity,
            chat_deployment = %config.chat.deployment,
            "Configuration loaded"
        );

        Ok(config)
    }

    /// Validate the configuration for consistency and correctness
    fn validate(&self) -> Result<()> {
        // Redis URL required when using Redis cache backend
        if self.database.cache == CacheBackendType::Redis
            && self
                .database
                .redis
                .as_ref()
                .is_none_or(|r| r.url.is_empty())
        {
            anyhow::bail!(
                "Configuration error: database.redis.url is required when database.cache is 'redis'"
            );
        }

        // Router mailbox capacities must be non-zero (a zero-capacity mpsc channel never admits sends)
        if self.chat.control_capacity == 0 {
            anyhow::bail!("Configuration error: chat.control_capacity must be greater than 0");
        }
        if self.chat.message_capacity == 0 {
            anyhow::bail!("Configuration error: chat.message_capacity must be greater than 0");
        }

        // AWS recovery_window_days must be 7-30 if set
        if let Some(ref aws) = self.secrets.aws
            && let Some(d) = aws.recovery_window_days
            && !(7..=30).contains(&d)
        {
            anyhow::bail!(
                "Configuration error: secrets.aws.recovery_window_days must be between 7 and 30 (got {})",
                d
            );
        }

        // Vault address and token required when using Vault secrets backend
        if self.secrets.backend == SecretsBackend::Vault {
            if let Some(ref v) = self.secrets.vault {
                if v.address.is_empty() {
                    anyhow::bail!(
                        "Configuration error: secrets.vault.address is required when secrets.backend is 'vault'. \
                         Set via {} env var or secrets.vault.address in config file.",
                        ENV_SECRETS_VAULT_ADDR
                    );
                }
                if !v.address.starts_with("http://") && !v.address.starts_with("https://") {
                    anyhow::bail!(
                        "Configuration error: secrets.vault.address must start with http:// or https://. Got: {}",
                        v.address
                    );
                }
                if v.token.is_empty() {
                    anyhow::bail!(
                        "Configuration error: Vault token required when secrets.backend is 'vault'. \
                         Set via VAULT_TOKEN, {} env var, or secrets.vault.token in config file.",
                        ENV_SECRETS_VAULT_TOKEN
                    );
                }
            } else {
                anyhow::bail!(
                    "Configuration error: Vault configuration missing when secrets.backend is 'vault'"
                );
            }
        }

        Ok(())
    }
}

/// Get the profile config path (~/.chatfabric/chatfabric.json)
fn get_profile_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(APP_DOT_FOLDER).join(CONFIG_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_config_parse_chat() {
        let json = r#"{ "chat": { "control_capacity": 20, "message_capacity": 200 } }"#;
        let config: FileConfig = serde_json::from_str(json).unwrap();
        let chat = config.chat.unwrap();
        assert_eq!(chat.control_capacity, Some(20));
        assert_eq!(chat.message_capacity, Some(200));
    }

    #[test]
    fn test_file_config_parse_empty() {
        let json = "{}";
        let config: FileConfig = serde_json::from_str(json).unwrap();
        assert!(config.chat.is_none());
        assert!(config.database.is_none());
    }

    #[test]
    fn test_file_config_parse_extra_fields() {
        let json = r#"{ "unknown_field": 123 }"#;
        let config: FileConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.extra.get("unknown_field").unwrap(), 123);
    }

    #[test]
    fn test_file_config_merge() {
        let mut base = FileConfig {
            chat: Some(ChatFileConfig {
                control_capacity: Some(10),
                message_capacity: None,
                deployment: None,
            }),
            update: None,
            database: None,
            secrets: None,
            extra: serde_json::Value::Null,
        };

        let overlay = FileConfig {
            chat: Some(ChatFileConfig {
                control_capacity: None,
                message_capacity: Some(50),
                deployment: Some(ChatDeployment::Split),
            }),
            update: None,
            database: None,
            secrets: None,
            extra: serde_json::Value::Null,
        };

        base.merge(overlay);

        let chat = base.chat.as_ref().unwrap();
        assert_eq!(chat.control_capacity, Some(10));
        assert_eq!(chat.message_capacity, Some(50));
        assert_eq!(chat.deployment, Some(ChatDeployment::Split));
    }

    #[test]
    fn test_app_config_defaults() {
        let cli = CliConfig::default();
        let config = AppConfig::load(&cli).unwrap();

        assert_eq!(config.chat.control_capacity, DEFAULT_CHAT_CONTROL_CAPACITY);
        assert_eq!(config.chat.message_capacity, DEFAULT_CHAT_MESSAGE_CAPACITY);
        assert!(config.update.enabled);
        assert_eq!(config.database.cache, CacheBackendType::Memory);
    }

    #[test]
    fn test_app_config_cli_override() {
        let cli = CliConfig {
            chat_control_capacity: Some(30),
            chat_message_capacity: Some(300),
            no_update_check: true,
            ..Default::default()
        };
        let config = AppConfig::load(&cli).unwrap();

        assert_eq!(config.chat.control_capacity, 30);
        assert_eq!(config.chat.message_capacity, 300);
        assert!(!config.update.enabled);
    }

    #[test]
    fn test_file_config_parse_update() {
        let json = r#"{ "update": { "enabled": false } }"#;
        let config: FileConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.update.as_ref().unwrap().enabled, Some(false));
    }

    #[test]
    fn test_app_config_update_defaults() {
        let cli = CliConfig::default();
        let config = AppConfig::load(&cli).unwrap();
        assert!(config.update.enabled);
    }

    #[test]
    fn test_app_config_update_cli_override() {
        let cli = CliConfig {
            no_update_check: true,
            ..Default::default()
        };
        let config = AppConfig::load(&cli).unwrap();
        assert!(!config.update.enabled);
    }

    #[test]
    fn test_app_config_validation_control_capacity_zero() {
        let cli = CliConfig {
            chat_control_capacity: Some(0),
            ..Default::default()
        };
        let result = AppConfig::load(&cli);
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("chat.control_capacity must be greater than 0")
        );
    }

    #[test]
    fn test_app_config_validation_redis_url_required() {
        let cli = CliConfig {
            cache_backend: Some(CacheBackendType::Redis),
            ..Default::default()
        };
        let result = AppConfig::load(&cli);
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("database.redis.url is required")
        );
    }

    #[test]
    fn test_app_config_redis_url_from_cli() {
        let cli = CliConfig {
            cache_backend: Some(CacheBackendType::Redis),
            cache_redis_url: Some("redis://localhost:6379".to_string()),
            ..Default::default()
        };
        let config = AppConfig::load(&cli).unwrap();
        assert_eq!(
            config.database.redis.unwrap().url,
            "redis://localhost:6379"
        );
    }

    #[test]
    fn test_secrets_aws_recovery_window_days_from_json() {
        let json = r#"{ "secrets": { "backend": "aws", "aws": { "recovery_window_days": 14 } } }"#;
        let config: FileConfig = serde_json::from_str(json).unwrap();
        let aws = config.secrets.unwrap().aws.unwrap();
        assert_eq!(aws.recovery_window_days, Some(14));
    }

    #[test]
    fn test_secrets_aws_recovery_window_days_validation_too_low() {
        use std::io::Write;
        let json = r#"{ "secrets": { "backend": "aws", "aws": { "recovery_window_days": 5 } } }"#;
        let mut temp_file = tempfile::NamedTempFile::new().unwrap();
        temp_file.write_all(json.as_bytes()).unwrap();
        let cli = CliConfig {
            config: Some(temp_file.path().to_path_buf()),
            secrets_backend: Some(SecretsBackend::Aws),
            ..Default::default()
        };
        let result = AppConfig::load(&cli);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("between 7 and 30"));
    }

    #[test]
    fn test_secrets_aws_recovery_window_days_validation_too_high() {
        use std::io::Write;
        let json = r#"{ "secrets": { "backend": "aws", "aws": { "recovery_window_days": 50 } } }"#;
        let mut temp_file = tempfile::NamedTempFile::new().unwrap();
        temp_file.write_all(json.as_bytes()).unwrap();
        let cli = CliConfig {
            config: Some(temp_file.path().to_path_buf()),
            secrets_backend: Some(SecretsBackend::Aws),
            ..Default::default()
        };
        let result = AppConfig::load(&cli);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("between 7 and 30"));
    }

    #[test]
    fn test_secrets_aws_recovery_window_days_valid() {
        use std::io::Write;
        let json = r#"{ "secrets": { "backend": "aws", "aws": { "recovery_window_days": 7 } } }"#;
        let mut temp_file = tempfile::NamedTempFile::new().unwrap();
        temp_file.write_all(json.as_bytes()).unwrap();
        let cli = CliConfig {
            config: Some(temp_file.path().to_path_buf()),
            secrets_backend: Some(SecretsBackend::Aws),
            ..Default::default()
        };
        let config = AppConfig::load(&cli).unwrap();
        let aws = config.secrets.aws.unwrap();
        assert_eq!(aws.recovery_window_days, Some(7));
    }

    #[test]
    fn test_secrets_aws_recovery_window_days_omitted() {
        use std::io::Write;
        let json = r#"{ "secrets": { "backend": "aws", "aws": { "region": "us-east-1" } } }"#;
        let mut temp_file = tempfile::NamedTempFile::new().unwrap();
        temp_file.write_all(json.as_bytes()).unwrap();
        let cli = CliConfig {
            config: Some(temp_file.path().to_path_buf()),
            secrets_backend: Some(SecretsBackend::Aws),
            ..Default::default()
        };
        let config = AppConfig::load(&cli).unwrap();
        let aws = config.secrets.aws.unwrap();
        assert!(aws.recovery_window_days.is_none());
    }
}
