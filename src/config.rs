use crate::mapping::MappingDefaults;
use color_eyre::eyre::{eyre, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

const CONFIG_DIR: &str = "padmapper";
const SETTINGS_FILE: &str = "settings.toml";

/// Application settings, stored next to the mapping file
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Delay between frames; 16ms is roughly one display refresh at 60 Hz
    pub frame_interval_ms: u64,
    pub autosave_interval_secs: u64,
    /// Log actuation instead of synthesizing input
    pub dry_run: bool,
    /// Parameters used for new axis mappings and the starter layout
    pub mapping_defaults: MappingDefaults,
    /// Give device 0 a starter layout when no mappings are stored
    pub seed_default_layout: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            frame_interval_ms: 16,
            autosave_interval_secs: 300,
            dry_run: false,
            mapping_defaults: MappingDefaults::default(),
            seed_default_layout: true,
        }
    }
}

impl AppConfig {
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms.max(1))
    }

    pub fn default_path() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| {
            warn!("Could not determine config directory, using current directory");
            PathBuf::from(".")
        });
        path.push(CONFIG_DIR);
        path.push(SETTINGS_FILE);
        path
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| eyre!("Failed to read settings file {}: {}", path.display(), e))?;

        toml::from_str(&content)
            .map_err(|e| eyre!("Failed to parse settings file {}: {}", path.display(), e))
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| eyre!("Failed to create config directory: {}", e))?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| eyre!("Failed to serialize settings: {}", e))?;

        tokio::fs::write(path, content)
            .await
            .map_err(|e| eyre!("Failed to write settings file: {}", e))?;

        debug!("Settings written to {}", path.display());
        Ok(())
    }

    /// Loads the settings, falling back to defaults when they cannot be read
    pub async fn load_or_default(path: &Path) -> Self {
        match Self::load(path).await {
            Ok(config) => {
                info!("Loaded settings from {}", path.display());
                config
            }
            Err(e) => {
                warn!("{}; using default settings", e);
                Self::default()
            }
        }
    }
}

/// Writes default settings on first run
pub async fn ensure_default_config(path: &Path) -> Result<()> {
    let exists = tokio::fs::try_exists(path)
        .await
        .map_err(|e| eyre!("Failed to check if settings file exists: {}", e))?;

    if !exists {
        info!("Creating default settings at {}", path.display());
        AppConfig::default().save(path).await?;
    }

    Ok(())
}
