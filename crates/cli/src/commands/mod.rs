pub mod doctor;
pub mod ground;
pub mod observe;
pub mod onboard;
pub mod run;
pub mod sop;

use std::path::{Path, PathBuf};

use sopilot_config::AppConfig;

pub fn config_path(explicit: Option<PathBuf>) -> PathBuf {
    explicit.unwrap_or_else(AppConfig::config_path)
}

/// Load the config at `path` (or the default location) with env overrides.
pub fn load_config(path: &Path) -> Result<AppConfig, Box<dyn std::error::Error>> {
    AppConfig::load_with_env(path).map_err(|e| format!("Failed to load config: {e}").into())
}
