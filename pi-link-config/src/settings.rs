//! Overridable connection settings and their validation.

use crate::defaults;
use crate::error::ConfigError;
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

/// POSIX-portable login names, optionally ending in `$` (Samba machine accounts).
static USER_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z_][a-z0-9_-]*[$]?$")
        .expect("user-name validation regex is a compile-time constant and must be valid")
});

/// Which configuration layer supplied a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SettingSource {
    #[default]
    Default,
    File,
    Env,
    Cli,
}

impl fmt::Display for SettingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => write!(f, "default"),
            Self::File => write!(f, "config file"),
            Self::Env => write!(f, "environment"),
            Self::Cli => write!(f, "command line"),
        }
    }
}

/// Per-field record of where the effective value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Sources {
    pub host: SettingSource,
    pub user: SettingSource,
    pub port: SettingSource,
}

/// The parameters a user may override: target host, login user and port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub host: String,
    pub user: String,
    pub port: u16,
    pub sources: Sources,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: defaults::host(),
            user: defaults::user(),
            port: defaults::port(),
            sources: Sources::default(),
        }
    }
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_host(&mut self, host: impl Into<String>, source: SettingSource) {
        self.host = host.into();
        self.sources.host = source;
    }

    pub fn set_user(&mut self, user: impl Into<String>, source: SettingSource) {
        self.user = user.into();
        self.sources.user = source;
    }

    pub fn set_port(&mut self, port: u16, source: SettingSource) {
        self.port = port;
        self.sources.port = source;
    }

    /// Check every field, naming the offending layer in the error.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "host is empty (from {})",
                self.sources.host
            )));
        }
        if self.host.chars().any(char::is_whitespace) {
            return Err(ConfigError::Validation(format!(
                "host {:?} contains whitespace (from {})",
                self.host, self.sources.host
            )));
        }
        if !USER_PATTERN.is_match(&self.user) {
            return Err(ConfigError::Validation(format!(
                "user {:?} is not a valid login name (from {})",
                self.user, self.sources.user
            )));
        }
        if self.port == 0 {
            return Err(ConfigError::Validation(format!(
                "port must be between 1 and 65535 (from {})",
                self.sources.port
            )));
        }
        Ok(())
    }
}

/// Parse a port value from a textual source such as an env var or CLI flag.
pub fn parse_port(value: &str) -> Result<u16, String> {
    match value.trim().parse::<u16>() {
        Ok(0) => Err("port must be between 1 and 65535".to_string()),
        Ok(port) => Ok(port),
        Err(e) => Err(format!("invalid port {:?}: {}", value, e)),
    }
}
