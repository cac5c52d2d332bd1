//! Configuration file loading and validation.

use crate::error::ConfigError;
use crate::types::IncrementalConfig;
use std::path::Path;

/// Name of the configuration file within a module directory.
pub const CONFIG_FILE: &str = "delta.toml";

/// Loads and validates a `delta.toml` configuration from a module directory.
///
/// Reads `<module_dir>/delta.toml`, parses it, and validates required fields.
pub fn load_config(module_dir: &Path) -> Result<IncrementalConfig, ConfigError> {
    let config_path = module_dir.join(CONFIG_FILE);
    let content = std::fs::read_to_string(&config_path)?;
    load_config_from_str(&content)
}

/// Parses and validates a `delta.toml` configuration from a string.
///
/// Useful for testing without filesystem dependencies.
pub fn load_config_from_str(content: &str) -> Result<IncrementalConfig, ConfigError> {
    let config: IncrementalConfig =
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    validate_config(&config)?;
    Ok(config)
}

/// Validates that required fields are present and values are consistent.
fn validate_config(config: &IncrementalConfig) -> Result<(), ConfigError> {
    if config.working_dir.as_os_str().is_empty() {
        return Err(ConfigError::MissingField("working_dir".to_string()));
    }
    if config.destination_dir.as_os_str().is_empty() {
        return Err(ConfigError::MissingField("destination_dir".to_string()));
    }
    if config.history_retention == 0 {
        return Err(ConfigError::ValidationError(
            "history_retention must be at least 1".to_string(),
        ));
    }
    if config.source_extensions.is_empty() {
        return Err(ConfigError::ValidationError(
            "source_extensions must not be empty".to_string(),
        ));
    }
    if let Some(dirs) = &config.output_dirs {
        for required in [&config.destination_dir, &config.working_dir] {
            if !dirs.contains(required) {
                return Err(ConfigError::ValidationError(format!(
                    "output_dirs is missing {}",
                    required.display()
                )));
            }
        }
    }
    Ok(())
}
