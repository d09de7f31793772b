//! ConfigStore - Manager Configuration Files
//!
//! TOML files holding [`ManagerConfig`]. A missing file yields the defaults.

use std::fs;
use std::path::Path;

use crate::domain::config::ManagerConfig;
use crate::error::Result;

/// Load a manager config file, falling back to defaults if it does not exist
pub fn load_config(path: impl AsRef<Path>) -> Result<ManagerConfig> {
    let path = path.as_ref();
    if !path.exists() {
        tracing::debug!("Config {} not found, using defaults", path.display());
        return Ok(ManagerConfig::default());
    }

    let content = fs::read_to_string(path)?;
    let config = ManagerConfig::from_toml_str(&content)?;
    tracing::info!("Loaded config from {}", path.display());
    Ok(config)
}

/// Save a manager config file, creating parent directories as needed
pub fn save_config(path: impl AsRef<Path>, config: &ManagerConfig) -> Result<()> {
    let path = path.as_ref();
    config.validate()?;

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, config.to_toml_string()?)?;
    Ok(())
}
