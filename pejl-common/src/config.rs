//! Configuration loading and root folder resolution

use crate::{Error, Result};
use sqlx::SqlitePool;
use std::path::PathBuf;

/// Root folder resolution priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. TOML config file
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_root_folder(cli_arg: Option<&str>, env_var_name: &str) -> Result<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Ok(PathBuf::from(path));
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        return Ok(PathBuf::from(path));
    }

    // Priority 3: TOML config file
    if let Ok(config_path) = find_config_file() {
        if let Ok(toml_content) = std::fs::read_to_string(&config_path) {
            if let Ok(config) = toml::from_str::<toml::Value>(&toml_content) {
                if let Some(root_folder) = config.get("root_folder").and_then(|v| v.as_str()) {
                    return Ok(PathBuf::from(root_folder));
                }
            }
        }
    }

    // Priority 4: OS-dependent compiled default
    Ok(default_root_folder())
}

/// Locate the platform config file (~/.config/pejl/config.toml, with
/// /etc/pejl/config.toml as the system-wide fallback on Linux)
fn find_config_file() -> Result<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("pejl").join("config.toml"));

    if let Some(path) = user_config {
        if path.exists() {
            return Ok(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/pejl/config.toml");
        if system_config.exists() {
            return Ok(system_config);
        }
    }

    Err(Error::Config("No config file found".to_string()))
}

/// OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("pejl"))
        .unwrap_or_else(|| PathBuf::from("/var/lib/pejl"))
}

/// Database file path under the root folder
pub fn database_path(root_folder: &std::path::Path) -> PathBuf {
    root_folder.join("pejl.db")
}

/// Likert scale bounds for the current database
///
/// Historically both 1-5 and 1-7 scales have been deployed; all scoring
/// thresholds are expressed relative to `max` so classification is
/// scale-invariant. Loaded from the settings table, falling back to the
/// compiled 1-5 default.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleConfig {
    pub min: i64,
    pub max: i64,
}

impl Default for ScaleConfig {
    fn default() -> Self {
        Self { min: 1, max: 5 }
    }
}

impl ScaleConfig {
    /// Load scale bounds from database settings
    pub async fn from_database(pool: &SqlitePool) -> Self {
        let mut config = Self::default();

        if let Ok(Some(value)) =
            sqlx::query_scalar::<_, String>("SELECT value FROM settings WHERE key = 'scale_min'")
                .fetch_optional(pool)
                .await
        {
            if let Ok(min) = value.parse::<i64>() {
                config.min = min;
            }
        }

        if let Ok(Some(value)) =
            sqlx::query_scalar::<_, String>("SELECT value FROM settings WHERE key = 'scale_max'")
                .fetch_optional(pool)
                .await
        {
            if let Ok(max) = value.parse::<i64>() {
                config.max = max;
            }
        }

        config
    }

    /// True when a raw score lies inside the scale bounds
    pub fn contains(&self, score: i64) -> bool {
        score >= self.min && score <= self.max
    }

    /// Scale factor relative to the canonical 5-point scale
    ///
    /// Thresholds tuned on the 1-5 scale are multiplied by this before
    /// comparison, so the 1-7 variant classifies identically.
    pub fn relative(&self) -> f64 {
        self.max as f64 / 5.0
    }
}
