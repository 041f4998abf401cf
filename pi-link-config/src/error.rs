//! Typed error variants for the pi-link-config crate.

use thiserror::Error;

/// Errors that can occur while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An I/O error occurred reading the config file.
    #[error("I/O error reading config: {0}")]
    Io(#[from] std::io::Error),

    /// The config file contained invalid YAML.
    #[error("YAML parse error in config: {0}")]
    Parse(#[from] serde_yaml_ng::Error),

    /// A field value failed validation.
    ///
    /// The inner string names the field, where the value came from and why it was rejected.
    #[error("Config validation error: {0}")]
    Validation(String),

    /// The home directory could not be determined, so `~/.ssh` cannot be located.
    #[error("Could not determine home directory")]
    NoHomeDir,
}
