use clap::{Parser, Subcommand};

use std::path::PathBuf;

use super::config::{CacheBackendType, ChatDeployment, EvictionPolicy, SecretsBackend};
use super::constants::{
    ENV_CACHE_BACKEND, ENV_CACHE_EVICTION_POLICY, ENV_CACHE_MAX_ENTRIES, ENV_CACHE_REDIS_URL,
    ENV_CHAT_CONTROL_CAPACITY, ENV_CHAT_DEPLOYMENT, ENV_CHAT_MESSAGE_CAPACITY, ENV_CONFIG,
    ENV_NO_UPDATE_CHECK, ENV_SECRETS_BACKEND,
};

#[derive(Parser)]
#[command(name = "chatfabric")]
#[command(version, about = "AI Development Workbench", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to config file
    #[arg(long, short = 'c', global = true, env = ENV_CONFIG)]
    pub config: Option<PathBuf>,

    /// Disable update check on startup
    #[arg(long, global = true, env = ENV_NO_UPDATE_CHECK)]
    pub no_update_check: bool,

    // Cache options
    /// Cache backend (memory or redis)
    #[arg(long, global = true, env = ENV_CACHE_BACKEND, value_parser = parse_cache_backend_type)]
    pub cache_backend: Option<CacheBackendType>,

    /// Maximum number of cache entries
    #[arg(long, global = true, env = ENV_CACHE_MAX_ENTRIES)]
    pub cache_max_entries: Option<u64>,

    /// Cache eviction policy (tinylfu or lru)
    #[arg(long, global = true, env = ENV_CACHE_EVICTION_POLICY, value_parser = parse_eviction_policy)]
    pub cache_eviction_policy: Option<EvictionPolicy>,

    /// Redis-compatible cache URL. Supports Redis, Sentinel, Valkey, Dragonfly.
    /// Formats: redis://host:port/db, redis+sentinel://s1:port,s2:port/master/db
    #[arg(long, global = true, env = ENV_CACHE_REDIS_URL)]
    pub cache_redis_url: Option<String>,

    /// Secrets backend
    #[arg(long, global = true, env = ENV_SECRETS_BACKEND, value_parser = parse_secrets_backend)]
    pub secrets_backend: Option<SecretsBackend>,

    // Chat engine options
    /// Router control-channel mailbox capacity
    #[arg(long, global = true, env = ENV_CHAT_CONTROL_CAPACITY)]
    pub chat_control_capacity: Option<usize>,

    /// Router message-channel mailbox capacity
    #[arg(long, global = true, env = ENV_CHAT_MESSAGE_CAPACITY)]
    pub chat_message_capacity: Option<usize>,

    /// Chat engine deployment variant (all-in-one or split)
    #[arg(long, global = true, env = ENV_CHAT_DEPLOYMENT, value_parser = parse_chat_deployment)]
    pub chat_deployment: Option<ChatDeployment>,
}

/// Parse cache backend type from CLI/env string
fn parse_cache_backend_type(s: &str) -> Result<CacheBackendType, String> {
    match s.to_lowercase().as_str() {
        "memory" => Ok(CacheBackendType::Memory),
        "redis" => Ok(CacheBackendType::Redis),
        _ => Err(format!(
            "Invalid cache backend '{}'. Valid options: memory, redis",
            s
        )),
    }
}

/// Parse eviction policy from CLI/env string
fn parse_eviction_policy(s: &str) -> Result<EvictionPolicy, String> {
    match s.to_lowercase().as_str() {
        "tinylfu" => Ok(EvictionPolicy::TinyLfu),
        "lru" => Ok(EvictionPolicy::Lru),
        _ => Err(format!(
            "Invalid eviction policy '{}'. Valid options: tinylfu, lru",
            s
        )),
    }
}

/// Parse chat deployment variant from CLI/env string
fn parse_chat_deployment(s: &str) -> Result<ChatDeployment, String> {
    match s.to_lowercase().as_str() {
        "all-in-one" | "all_in_one" | "allinone" => Ok(ChatDeployment::AllInOne),
        "split" => Ok(ChatDeployment::Split),
        _ => Err(format!(
            "Invalid chat deployment '{}'. Valid options: all-in-one, split",
            s
        )),
    }
}

/// Parse secrets backend from CLI/env string
fn parse_secrets_backend(s: &str) -> Result<SecretsBackend, String> {
    match s.to_lowercase().as_str() {
        "keychain" => Ok(SecretsBackend::Keychain),
        "credential-manager" => Ok(SecretsBackend::CredentialManager),
        "secret-service" => Ok(SecretsBackend::SecretService),
        "keyutils" => Ok(SecretsBackend::Keyutils),
        "file" => Ok(SecretsBackend::File),
        "env" => Ok(SecretsBackend::Env),
        "aws" => Ok(SecretsBackend::Aws),
        "vault" | "hashicorp" => Ok(SecretsBackend::Vault),
        _ => Err(format!(
            "Invalid secrets backend '{}'. Valid: keychain, \
             credential-manager, secret-service, keyutils, file, env, aws, vault",
            s
        )),
    }
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Start the server (default command)
    Start,
    /// System maintenance commands
    System {
        #[command(subcommand)]
        command: SystemCommands,
    },
}

#[derive(Subcommand, Clone, Debug)]
pub enum SystemCommands {
    /// Delete local data directory (databases, caches). Requires confirmation.
    Prune {
        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

/// Configuration derived from CLI arguments
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub config: Option<PathBuf>,
    pub no_update_check: bool,
    pub cache_backend: Option<CacheBackendType>,
    pub cache_max_entries: Option<u64>,
    pub cache_eviction_policy: Option<EvictionPolicy>,
    pub cache_redis_url: Option<String>,
    pub secrets_backend: Option<SecretsBackend>,
    pub chat_control_capacity: Option<usize>,
    pub chat_message_capacity: Option<usize>,
    pub chat_deployment: Option<ChatDeployment>,
}

/// Parse CLI arguments and return config with command
pub fn parse() -> (CliConfig, Option<Commands>) {
    let cli = Cli::parse();
    let config = CliConfig {
        config: cli.config,
        no_update_check: cli.no_update_check,
        cache_backend: cli.cache_backend,
        cache_max_entries: cli.cache_max_entries,
        cache_eviction_policy: cli.cache_eviction_policy,
        cache_redis_url: cli.cache_redis_url,
        secrets_backend: cli.secrets_backend,
        chat_control_capacity: cli.chat_control_capacity,
        chat_message_capacity: cli.chat_message_capacity,
        chat_deployment: cli.chat_deployment,
    };
    (config, cli.command)
}
