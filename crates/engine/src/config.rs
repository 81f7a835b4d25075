//! Configuration system for blocksync
//!
//! Reads config from ~/.config/blocksync/config.toml

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// How a session treats local edits submitted before the handshake completes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PendingEdits {
    /// Write them to the local replica; the handshake delivers them to peers
    #[default]
    Retain,
    /// Ignore them
    Discard,
}

/// Identity announced to other peers
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UserConfig {
    pub name: String,
    /// CSS color; empty picks one from the presence palette
    pub color: String,
    pub avatar: Option<String>,
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            name: "Anonymous".to_string(),
            color: String::new(),
            avatar: None,
        }
    }
}

/// Synchronization configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Channel (room) joined by default
    pub channel: String,
    pub pending_edits: PendingEdits,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            channel: "default".to_string(),
            pending_edits: PendingEdits::Retain,
        }
    }
}

/// Full application configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub user: UserConfig,
    pub sync: SyncConfig,
}

const DEFAULT_CONFIG: &str = r##"# blocksync Configuration

[user]
name = "Anonymous"
# color = "#e06c75"
# avatar = "https://example.com/me.png"

[sync]
channel = "default"
# "retain" writes edits made before the handshake completes into the local
# replica and syncs them afterwards; "discard" drops them.
pending_edits = "retain"
"##;

impl Config {
    /// Load configuration from default path
    pub fn load() -> Self {
        Self::load_from_path(&Self::default_config_path())
    }

    /// Get default config path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("blocksync")
            .join("config.toml")
    }

    /// Load from a specific path, falling back to defaults
    pub fn load_from_path(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => return config,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "failed to parse config");
                }
            },
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to read config"),
        }
        Self::default()
    }

    /// Create default config file if it doesn't exist
    pub fn create_default_if_missing() -> anyhow::Result<PathBuf> {
        let path = Self::default_config_path();
        Self::write_default_to(&path)?;
        Ok(path)
    }

    /// Write the commented default config to `path` unless a file is there
    pub fn write_default_to(path: &Path) -> anyhow::Result<()> {
        if path.exists() {
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, DEFAULT_CONFIG)?;
        Ok(())
    }
}
