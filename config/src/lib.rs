pub mod paths;
pub mod settings;

pub use paths::PathManager;
pub use settings::{BackendSettings, EnrichmentSettings, Settings, SettingsError};

/// Environment variable holding the reasoning backend API key.
pub const API_KEY_ENV: &str = "CLAUDE_API_KEY";

/// Load environment variables from .env files.
/// First loads from ~/.env (home directory), then from ./.env (project directory).
/// Project directory values take precedence over home directory values.
/// Call this before parsing CLI args to ensure env vars are available.
pub fn load_env_file() {
    if let Some(home) = dirs::home_dir() {
        let home_env_path = home.join(".env");
        dotenv::from_path(home_env_path).ok();
    }

    dotenv::dotenv().ok();
}
