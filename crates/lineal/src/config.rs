//! TOML configuration parsing and validation.
//!
//! Lineal is configured via a TOML file (default: `config/lineal.toml`).
//! The `[schemas.<name>]` table maps schema names to lineage schemas so
//! callers can select one by name instead of spelling out field mappings in
//! every request.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use lineal_core::schema::LineageSchema;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub store: StoreConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    pub server: ServerConfig,
    /// Named lineage schemas selectable via `schema_name`.
    #[serde(default)]
    pub schemas: BTreeMap<String, LineageSchema>,
}

/// Connection settings for the backing document store.
#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// Base URL of the store, e.g. `http://localhost:9200`.
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Environment variable holding the store API key, if any.
    #[serde(default)]
    pub api_key_env: Option<String>,
}

fn default_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    3
}

/// Defaults applied when a fetch request leaves bounds unspecified.
#[derive(Debug, Deserialize, Clone)]
pub struct FetchConfig {
    /// Index patterns queried when a request names none.
    #[serde(default)]
    pub index_patterns: Vec<String>,
    #[serde(default = "default_depth")]
    pub ancestor_depth: usize,
    #[serde(default = "default_limit")]
    pub ancestor_limit: usize,
    #[serde(default = "default_depth")]
    pub descendant_depth: usize,
    #[serde(default = "default_limit")]
    pub descendant_limit: usize,
}

fn default_depth() -> usize {
    10
}
fn default_limit() -> usize {
    200
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            index_patterns: Vec::new(),
            ancestor_depth: default_depth(),
            ancestor_limit: default_limit(),
            descendant_depth: default_depth(),
            descendant_limit: default_limit(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.store.base_url.trim().is_empty() {
        anyhow::bail!("store.base_url must not be empty");
    }
    if config.store.timeout_secs == 0 {
        anyhow::bail!("store.timeout_secs must be > 0");
    }
    if config.fetch.ancestor_limit == 0 && config.fetch.descendant_limit == 0 {
        anyhow::bail!("fetch limits disable both directions; raise ancestor_limit or descendant_limit");
    }

    Ok(config)
}
