use directories::BaseDirs;
use std::path::PathBuf;
use std::sync::OnceLock;

static DATA_DIR_OVERRIDE: OnceLock<PathBuf> = OnceLock::new();

const APP_DIR: &str = "docsight";

pub struct PathManager;

impl PathManager {
    /// Set a custom data directory (tests, sandboxed runs)
    pub fn set_data_dir(path: PathBuf) {
        let _ = DATA_DIR_OVERRIDE.set(path);
    }

    fn base_data_dir() -> Option<PathBuf> {
        if let Some(d) = DATA_DIR_OVERRIDE.get() {
            return Some(d.clone());
        }
        BaseDirs::new().map(|d| d.data_dir().join(APP_DIR))
    }

    pub fn data_dir() -> Option<PathBuf> {
        Self::base_data_dir()
    }

    pub fn config_dir() -> Option<PathBuf> {
        if let Some(d) = DATA_DIR_OVERRIDE.get() {
            return Some(d.join("config"));
        }
        BaseDirs::new().map(|d| d.config_dir().join(APP_DIR))
    }

    pub fn cache_dir() -> Option<PathBuf> {
        if let Some(d) = DATA_DIR_OVERRIDE.get() {
            return Some(d.join("cache"));
        }
        BaseDirs::new().map(|d| d.cache_dir().join(APP_DIR))
    }

    /// Directory holding cached parser output, one JSON file per document
    pub fn parse_cache_dir() -> Option<PathBuf> {
        Self::cache_dir().map(|d| d.join("parsed"))
    }

    pub fn logs_dir() -> Option<PathBuf> {
        Self::data_dir().map(|d| d.join("logs"))
    }

    pub fn log_file_path() -> Option<PathBuf> {
        Self::logs_dir().map(|d| d.join("docsight.log"))
    }

    /// Truncated request/response log for backend calls
    pub fn traffic_log_path() -> Option<PathBuf> {
        Self::logs_dir().map(|d| d.join("traffic.log"))
    }

    pub fn settings_path() -> Option<PathBuf> {
        Self::config_dir().map(|d| d.join("settings.toml"))
    }

    pub fn ensure_dirs_exist() -> std::io::Result<()> {
        for dir in [
            Self::data_dir(),
            Self::config_dir(),
            Self::logs_dir(),
            Self::parse_cache_dir(),
        ]
        .into_iter()
        .flatten()
        {
            std::fs::create_dir_all(&dir)?;
        }
        Ok(())
    }
}
