//! Config file discovery and layered loading.

use crate::env_vars;
use crate::error::ConfigError;
use crate::settings::{SettingSource, Settings};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Subset of [`Settings`] accepted in `config.yaml`.
///
/// Unknown keys are rejected so a file cannot appear to override the fixed
/// key path or alias.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileSettings {
    pub host: Option<String>,
    pub user: Option<String>,
    pub port: Option<u16>,
}

impl FileSettings {
    /// Parse a YAML document. An empty document yields no overrides.
    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml_ng::from_str(contents)?)
    }

    fn apply(self, settings: &mut Settings) {
        if let Some(host) = self.host {
            settings.set_host(host, SettingSource::File);
        }
        if let Some(user) = self.user {
            settings.set_user(user, SettingSource::File);
        }
        if let Some(port) = self.port {
            settings.set_port(port, SettingSource::File);
        }
    }
}

/// Get the configuration directory (`~/.config/pi-link` on Unix).
pub fn config_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("pi-link")
        } else {
            PathBuf::from(".")
        }
    }
    #[cfg(not(target_os = "windows"))]
    {
        if let Some(home_dir) = dirs::home_dir() {
            home_dir.join(".config").join("pi-link")
        } else {
            PathBuf::from(".")
        }
    }
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.yaml")
}

impl Settings {
    /// Load defaults, then `config.yaml`, then the process environment.
    ///
    /// The result is not validated yet: the binary applies CLI overrides first
    /// and calls [`Settings::validate`] on the final value.
    pub fn load() -> Result<Self, ConfigError> {
        let mut settings = Self::load_file_layer(&config_path())?;
        env_vars::apply_process_env(&mut settings)?;
        Ok(settings)
    }

    /// Defaults overlaid with the YAML file at `path`, if it exists.
    pub fn load_file_layer(path: &Path) -> Result<Self, ConfigError> {
        let mut settings = Self::default();
        if !path.exists() {
            log::debug!("No config file at {:?}, using defaults", path);
            return Ok(settings);
        }

        log::info!("Loading config from {:?}", path);
        warn_if_shared(path);

        let contents = fs::read_to_string(path)?;
        FileSettings::from_yaml(&contents)?.apply(&mut settings);
        Ok(settings)
    }
}

/// Warn when the config file is readable by group or others.
#[cfg(unix)]
fn warn_if_shared(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Ok(metadata) = fs::metadata(path) {
        let mode = metadata.permissions().mode();
        if mode & 0o044 != 0 {
            log::warn!(
                "Config file {:?} is readable by group or others (mode {:04o}). Run: chmod 600 {:?}",
                path,
                mode & 0o777,
                path,
            );
        }
    }
}

#[cfg(not(unix))]
fn warn_if_shared(_path: &Path) {}
