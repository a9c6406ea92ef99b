//! Pipeline settings stored in settings.toml

use crate::PathManager;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("could not determine settings path")]
    NoPath,

    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },

    #[error("failed to serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("failed to write settings: {0}")]
    Write(#[from] std::io::Error),
}

/// Reasoning backend connection settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BackendSettings {
    /// Model id sent with every request (e.g., "claude-sonnet-4-5")
    pub model: String,
    pub base_url: String,
    pub max_tokens: u32,
    /// Per-request timeout
    pub timeout_secs: u64,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            model: "claude-sonnet-4-5".to_string(),
            base_url: "https://api.anthropic.com/v1".to_string(),
            max_tokens: 4096,
            timeout_secs: 120,
        }
    }
}

/// Enrichment run settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EnrichmentSettings {
    /// Images processed concurrently; keep below the backend rate limit
    pub concurrency: usize,
    /// Attempts per image including the first
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for EnrichmentSettings {
    fn default() -> Self {
        Self {
            concurrency: 4,
            max_attempts: 4,
            base_delay_ms: 500,
            max_delay_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub backend: BackendSettings,
    pub enrichment: EnrichmentSettings,
}

impl Settings {
    /// Load settings from the settings file, or return defaults if it does not exist
    pub fn load() -> Result<Self, SettingsError> {
        let path = PathManager::settings_path().ok_or(SettingsError::NoPath)?;
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self, SettingsError> {
        let content = fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| SettingsError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Save settings to the settings file
    pub fn save(&self) -> Result<(), SettingsError> {
        let path = PathManager::settings_path().ok_or(SettingsError::NoPath)?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}
