//! Settings file loading and saving

use std::path::{Path, PathBuf};

use console_core::prelude::*;

use super::types::BridgeSettings;

const APP_DIR: &str = "console-bridge";
const CONFIG_FILENAME: &str = "config.toml";

/// `<config_dir>/console-bridge/config.toml`, if the platform has a config dir
pub fn default_settings_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILENAME))
}

/// Load settings, falling back to defaults when the file is missing or invalid
pub fn load_settings(path: &Path) -> BridgeSettings {
    if !path.exists() {
        debug!("No config file at {:?}, using defaults", path);
        return BridgeSettings::default();
    }

    match load_settings_strict(path) {
        Ok(settings) => settings,
        Err(e) => {
            warn!("Ignoring settings file {:?}: {}", path, e);
            BridgeSettings::default()
        }
    }
}

/// Load settings, reporting read and parse errors
pub fn load_settings_strict(path: &Path) -> Result<BridgeSettings> {
    let content = std::fs::read_to_string(path)?;
    let settings: BridgeSettings = toml::from_str(&content)?;
    debug!("Loaded settings from {:?}", path);
    Ok(settings.clamped())
}

/// Write settings as pretty TOML, creating the parent directory
pub fn save_settings(path: &Path, settings: &BridgeSettings) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }

    let content = toml::to_string_pretty(settings)
        .map_err(|e| Error::config(format!("Failed to serialize settings: {}", e)))?;

    std::fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;

    debug!("Saved settings to {:?}", path);
    Ok(())
}
