use anyhow::Result;
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

use crate::plugin::source::PluginSource;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    pub general: GeneralConfig,
    pub plugins: PluginsConfig,
}

#[derive(Debug, Deserialize)]
pub struct GeneralConfig {
    /// Application data directory. Empty means the platform default.
    pub data_dir: String,
}

#[derive(Debug, Deserialize)]
pub struct PluginsConfig {
    pub owner: String,
    pub repository: String,
    pub branch: String,
    pub remote_enabled: bool,
}

impl AppConfig {
    /// Load configuration with layering: defaults → user config.
    pub fn load() -> Result<Self> {
        let defaults = include_str!("../../config/default.toml");
        let mut config: AppConfig = toml::from_str(defaults)?;

        if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "famulus") {
            let config_path = proj_dirs.config_dir().join("config.toml");
            if config_path.exists() {
                let user_str = fs::read_to_string(&config_path)?;
                config = toml::from_str(&user_str)?; // TODO: deep merge instead of full replace
            }
        }

        // Expand ~ in data_dir
        if config.general.data_dir.starts_with('~') {
            if let Some(base_dirs) = directories::BaseDirs::new() {
                let home = base_dirs.home_dir().to_string_lossy().into_owned();
                config.general.data_dir = config.general.data_dir.replacen('~', &home, 1);
            }
        }

        Ok(config)
    }

    pub fn data_dir(&self) -> PathBuf {
        if !self.general.data_dir.is_empty() {
            return PathBuf::from(&self.general.data_dir);
        }

        directories::ProjectDirs::from("", "", "famulus")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from(".famulus"))
    }

    pub fn plugins_root(&self) -> PathBuf {
        self.data_dir().join("plugins")
    }

    pub fn plugin_source(&self) -> PluginSource {
        PluginSource::new(
            non_empty(&self.plugins.owner),
            non_empty(&self.plugins.repository),
            non_empty(&self.plugins.branch),
        )
    }
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}
