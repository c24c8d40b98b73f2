//! Application service: configuration use-cases.

use anyhow::Result;

use crate::application::ports::ConfigStore;
use crate::domain::StationConfig;

/// Load configuration.
pub fn load_config(store: &impl ConfigStore) -> Result<StationConfig> {
    store.load()
}

/// Save configuration.
pub fn save_config(store: &impl ConfigStore, config: &StationConfig) -> Result<()> {
    store.save(config)
}

/// Read one dotted key.
///
/// # Errors
///
/// Returns an error if the key is unknown or the file cannot be read.
pub fn get_value(store: &impl ConfigStore, key: &str) -> Result<Option<String>> {
    store.load()?.get(key)
}

/// Validate and persist one dotted key. The whole configuration must still
/// be valid after the change, otherwise nothing is written.
///
/// # Errors
///
/// Returns a [`crate::domain::ConfigError`] for an unknown key or bad value.
pub fn set_value(store: &impl ConfigStore, key: &str, value: &str) -> Result<StationConfig> {
    let mut config = store.load()?;
    config.set(key, value)?;
    config.validate()?;
    store.save(&config)?;
    Ok(config)
}
