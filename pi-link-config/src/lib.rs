//! Configuration system for pi-link.
//!
//! Resolves the connection parameters for the Raspberry Pi host in layers:
//!
//! - Built-in defaults ([`defaults`])
//! - Optional YAML file at `~/.config/pi-link/config.yaml`
//! - `PI_HOST` / `PI_USER` / `PI_PORT` environment variables
//! - CLI overrides applied by the binary
//!
//! The resolved [`Settings`] are then frozen into a [`ProvisionConfig`], which
//! also carries the fixed (non-overridable) key path, alias and probe pattern.

pub mod defaults;
pub mod env_vars;
pub mod error;
pub mod persistence;
pub mod provision;
pub mod settings;

pub use error::ConfigError;
pub use provision::ProvisionConfig;
pub use settings::{SettingSource, Settings};
