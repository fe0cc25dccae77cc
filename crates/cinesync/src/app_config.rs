//! 🔧 App Configuration — the sacred TOML-to-struct pipeline.
//!
//! 🏗️ Powered by Figment, because manually parsing env vars is a form of
//! self-harm that even the borrow checker wouldn't approve of.
//!
//! One [`AppConfig`] is built exactly once at process start and handed to
//! every constructor that needs it. No global singleton, no import-time
//! side effects — tests get to build their own config and nobody fights
//! over a static.

use anyhow::Context;
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::Deserialize;
use std::path::Path;
use tracing::info;

pub use crate::retry::RetryPolicy;

/// 📦 The AppConfig: one struct to rule them all, one struct to find them,
/// one struct to bring them all, and in the Figment bind them.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    /// 🐘 Where the catalog actually lives.
    pub postgres: PostgresConfig,
    /// 📡 Where the catalog goes to be found.
    pub elasticsearch: ElasticsearchConfig,
    /// 🔑 Where the pipeline remembers how far it got.
    pub redis: RedisConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PostgresConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

/// 🔧 Auth is tri-modal: username+password, api_key, or "I hope anonymous
/// works" (it won't, but we respect the optimism). api_key outranks basic
/// auth everywhere it matters.
#[derive(Debug, Deserialize, Clone)]
pub struct ElasticsearchConfig {
    /// 📡 The URL of your Elasticsearch cluster. Include scheme + port.
    /// Yes, all of it. No, `localhost` alone is not enough.
    pub url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
}

/// 🔄 The knobs of the drain loop itself.
#[derive(Debug, Deserialize, Clone)]
pub struct SyncConfig {
    /// 📦 Rows per extracted batch, documents per bulk request.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// 💤 How long a worker naps between full drains. `timeout` is the name
    /// this knob wore in a previous life; we still answer to it.
    #[serde(default = "default_sleep_secs", alias = "timeout")]
    pub sleep_secs: u64,
    /// ⏳ How long a booting replica waits on another replica's schema init
    /// before declaring the situation unrecoverable.
    #[serde(default = "default_schema_wait_secs")]
    pub schema_wait_secs: u64,
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            sleep_secs: default_sleep_secs(),
            schema_wait_secs: default_schema_wait_secs(),
            retry: RetryPolicy::default(),
        }
    }
}

fn default_max_connections() -> u32 {
    5
}

fn default_batch_size() -> usize {
    100
}

fn default_sleep_secs() -> u64 {
    10
}

fn default_schema_wait_secs() -> u64 {
    300
}

/// 🚀 Load the config — from a file, from env vars, or from the sheer power of hoping.
///
/// 🔧 Merges environment variables (CINESYNC_*) with an optional TOML file.
///
/// 📐 DESIGN NOTE:
///   - If `config_file_name` is None  → env vars only. No file. No assumptions.
///   - If `config_file_name` is Some  → env vars + TOML file, merged. TOML wins on conflicts.
///
/// 💀 Returns an error if config is unparseable — with a context message that
/// actually tells you which of the two sources to go stare at.
pub fn load_config(config_file_name: Option<&Path>) -> anyhow::Result<AppConfig> {
    info!(
        "🔧 Loading configuration: {:#?}",
        config_file_name.unwrap_or(Path::new(""))
    );

    let config = Figment::new().merge(Env::prefixed("CINESYNC_"));

    let config = match config_file_name {
        Some(file_name) => config.merge(Toml::file(file_name)),
        None => config,
    };

    let context_msg = match config_file_name {
        Some(path) => format!(
            "💀 Failed to parse configuration from file '{}' and environment variables (CINESYNC_*). \
             The file exists in our hearts, but apparently not on disk.",
            path.display()
        ),
        None => "💀 Failed to parse configuration from environment variables (CINESYNC_*). \
                 No file was provided — this one's all on the environment. Classic."
            .to_string(),
    };

    config.extract().context(context_msg)
}
