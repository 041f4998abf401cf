//! The immutable parameter object handed to every provisioning step.

use crate::defaults;
use crate::error::ConfigError;
use crate::settings::Settings;
use std::path::PathBuf;
use std::time::Duration;

/// Fully resolved provisioning parameters.
///
/// Built once from validated [`Settings`] and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionConfig {
    pub host: String,
    pub user: String,
    pub port: u16,
    /// Directory holding keys, `config` and `known_hosts` (normally `~/.ssh`).
    pub ssh_dir: PathBuf,
    pub key_path: PathBuf,
    pub ssh_config_path: PathBuf,
    pub known_hosts_path: PathBuf,
    pub alias: String,
    pub key_comment: String,
    pub key_bits: u32,
    pub process_pattern: String,
    pub service_port: u16,
    pub connect_timeout: Duration,
    /// Upper bound on the whole verification or probe command.
    pub command_deadline: Duration,
}

impl ProvisionConfig {
    /// Resolve against the current user's `~/.ssh`.
    pub fn from_settings(settings: &Settings) -> Result<Self, ConfigError> {
        let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
        Self::with_ssh_dir(settings, home.join(".ssh"))
    }

    /// Resolve against an explicit ssh directory.
    pub fn with_ssh_dir(
        settings: &Settings,
        ssh_dir: impl Into<PathBuf>,
    ) -> Result<Self, ConfigError> {
        settings.validate()?;
        let ssh_dir = ssh_dir.into();
        let connect_timeout = Duration::from_secs(defaults::CONNECT_TIMEOUT_SECS);
        Ok(Self {
            host: settings.host.clone(),
            user: settings.user.clone(),
            port: settings.port,
            key_path: ssh_dir.join(defaults::KEY_FILE_NAME),
            ssh_config_path: ssh_dir.join("config"),
            known_hosts_path: ssh_dir.join("known_hosts"),
            ssh_dir,
            alias: defaults::HOST_ALIAS.to_string(),
            key_comment: defaults::KEY_COMMENT.to_string(),
            key_bits: defaults::KEY_BITS,
            process_pattern: defaults::PROCESS_PATTERN.to_string(),
            service_port: defaults::SERVICE_PORT,
            connect_timeout,
            command_deadline: connect_timeout + Duration::from_secs(defaults::COMMAND_GRACE_SECS),
        })
    }

    /// `user@host`, as passed to ssh and ssh-copy-id.
    pub fn destination(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }

    /// URL of the Pi Orchestrator web service.
    ///
    /// IPv6 literals are bracketed so the port stays unambiguous.
    pub fn service_url(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("http://[{}]:{}", self.host, self.service_port)
        } else {
            format!("http://{}:{}", self.host, self.service_port)
        }
    }
}
