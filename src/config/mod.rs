//! Configuration management.
//!
//! Settings live in a single JSON file, `~/.threadsync/config.json`, with
//! every section optional. Credentials can also come from the environment,
//! which wins over the file so secrets need not be written to disk.
//!
//! # Paths
//!
//! - **Config**: `--config` flag, then `THREADSYNC_CONFIG`, then
//!   `~/.threadsync/config.json`
//! - **Database**: `--db` flag, then `THREADSYNC_DB`, then
//!   `~/.threadsync/data/threadsync.db`

use crate::error::{Error, Result};
use crate::model::SourcePlatform;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default Notion API origin.
pub const NOTION_BASE_URL: &str = "https://api.notion.com";

/// Notion API version sent with every request.
pub const NOTION_API_VERSION: &str = "2022-06-28";

/// Full configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sources: SourcesConfig,
    pub notion: NotionConfig,
    pub dispatch: DispatchConfig,
    pub sync: SyncConfig,
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    pub chatgpt: SourceConfig,
    pub claude: SourceConfig,
    pub perplexity: SourceConfig,
}

impl SourcesConfig {
    #[must_use]
    pub fn get(&self, platform: SourcePlatform) -> &SourceConfig {
        match platform {
            SourcePlatform::ChatGpt => &self.chatgpt,
            SourcePlatform::Claude => &self.claude,
            SourcePlatform::Perplexity => &self.perplexity,
        }
    }

    fn get_mut(&mut self, platform: SourcePlatform) -> &mut SourceConfig {
        match platform {
            SourcePlatform::ChatGpt => &mut self.chatgpt,
            SourcePlatform::Claude => &mut self.claude,
            SourcePlatform::Perplexity => &mut self.perplexity,
        }
    }
}

/// Per-source settings. Unset fields fall back to the adapter defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub enabled: bool,
    pub base_url: Option<String>,
    /// Bearer token (ChatGPT).
    pub token: Option<String>,
    /// Session `Cookie` header (Claude, Perplexity).
    pub cookie: Option<String>,
    pub organization_id: Option<String>,
    pub page_size: Option<usize>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: None,
            token: None,
            cookie: None,
            organization_id: None,
            page_size: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotionConfig {
    pub token: Option<String>,
    /// Page under which exported threads are created.
    pub parent_page_id: Option<String>,
    /// Database to create pages in instead of a parent page.
    pub database_id: Option<String>,
    pub base_url: String,
    pub api_version: String,
}

impl Default for NotionConfig {
    fn default() -> Self {
        Self {
            token: None,
            parent_page_id: None,
            database_id: None,
            base_url: NOTION_BASE_URL.to_string(),
            api_version: NOTION_API_VERSION.to_string(),
        }
    }
}

/// Outbound write budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub max_requests: usize,
    pub window_secs: u64,
    pub stale_after_secs: u64,
    /// Pause after a success while more than `deep_queue` tasks wait.
    pub fast_pace_ms: u64,
    /// Pause after a success otherwise.
    pub slow_pace_ms: u64,
    pub deep_queue: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_requests: 30,
            window_secs: 60,
            stale_after_secs: 300,
            fast_pace_ms: 350,
            slow_pace_ms: 1000,
            deep_queue: 5,
        }
    }
}

impl DispatchConfig {
    #[must_use]
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    #[must_use]
    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub max_items_per_cycle: usize,
    pub sub_batch_size: usize,
    pub sub_batch_pause_ms: u64,
    pub interval_secs: u64,
    /// Re-check already exported threads that show new activity.
    pub refresh_changed: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_items_per_cycle: 10,
            sub_batch_size: 5,
            sub_batch_pause_ms: 1500,
            interval_secs: 900,
            refresh_changed: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            user_agent: concat!("threadsync/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl Config {
    /// Load the config file at `path`, or the defaults when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the file cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config file: {e}")))?;

        serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config file: {e}")))
    }

    /// Load the resolved config file and apply environment overrides.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if no location can be determined or the file is invalid.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let path = resolve_config_path(explicit_path)
            .ok_or_else(|| Error::Config("Could not determine home directory".into()))?;
        let mut config = Self::load_from(&path)?;
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Write the config as pretty JSON, creating the parent directory.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` on any filesystem or serialization failure.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| Error::Config(format!("Failed to create config directory: {e}")))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {e}")))?;

        fs::write(path, content)
            .map_err(|e| Error::Config(format!("Failed to write config file: {e}")))
    }

    /// Override credentials from environment variables.
    ///
    /// `lookup` is `std::env::var` in production; empty values are ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(token) = var("THREADSYNC_NOTION_TOKEN") {
            self.notion.token = Some(token);
        }
        if let Some(parent) = var("THREADSYNC_NOTION_PARENT") {
            self.notion.parent_page_id = Some(parent);
        }
        if let Some(token) = var("THREADSYNC_CHATGPT_TOKEN") {
            self.sources.get_mut(SourcePlatform::ChatGpt).token = Some(token);
        }
        if let Some(cookie) = var("THREADSYNC_CLAUDE_COOKIE") {
            self.sources.get_mut(SourcePlatform::Claude).cookie = Some(cookie);
        }
        if let Some(cookie) = var("THREADSYNC_PERPLEXITY_COOKIE") {
            self.sources.get_mut(SourcePlatform::Perplexity).cookie = Some(cookie);
        }
    }

    /// Platforms whose `enabled` flag is set, in canonical order.
    #[must_use]
    pub fn enabled_sources(&self) -> Vec<SourcePlatform> {
        SourcePlatform::ALL
            .into_iter()
            .filter(|p| self.sources.get(*p).enabled)
            .collect()
    }
}

/// Get the global ThreadSync directory location (`~/.threadsync/`).
#[must_use]
pub fn global_threadsync_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(".threadsync"))
}

/// Resolve the config file path.
///
/// Priority:
/// 1. If `explicit_path` is provided, use it directly
/// 2. `THREADSYNC_CONFIG` environment variable
/// 3. Global location: `~/.threadsync/config.json`
#[must_use]
pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var("THREADSYNC_CONFIG") {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    global_threadsync_dir().map(|dir| dir.join("config.json"))
}

/// Resolve the database path.
///
/// Priority:
/// 1. If `explicit_path` is provided, use it directly
/// 2. `THREADSYNC_DB` environment variable
/// 3. Global location: `~/.threadsync/data/threadsync.db`
#[must_use]
pub fn resolve_db_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return Some(path.to_path_buf());
    }

    if let Ok(db_path) = std::env::var("THREADSYNC_DB") {
        if !db_path.trim().is_empty() {
            return Some(PathBuf::from(db_path));
        }
    }

    global_threadsync_dir().map(|dir| dir.join("data").join("threadsync.db"))
}
