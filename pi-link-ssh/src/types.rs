//! SSH host types shared by the config document, verification and discovery.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Where and as whom to connect.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SshTarget {
    pub host: String,
    pub user: String,
    pub port: u16,
}

impl SshTarget {
    pub fn new(host: impl Into<String>, user: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            user: user.into(),
            port,
        }
    }

    /// `user@host`
    pub fn destination(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }

    /// Build ssh arguments for this target: identity, port, `-o` options, then destination.
    ///
    /// The remote command (if any) is appended by the caller.
    pub fn ssh_args(&self, identity: Option<&Path>, options: &[(&str, String)]) -> Vec<String> {
        let mut args = Vec::new();

        if let Some(identity) = identity {
            args.push("-i".to_string());
            args.push(identity.display().to_string());
        }

        args.push("-p".to_string());
        args.push(self.port.to_string());

        for (key, value) in options {
            args.push("-o".to_string());
            args.push(format!("{key}={value}"));
        }

        args.push(self.destination());
        args
    }

    /// Build a display string showing user@host:port
    pub fn connection_string(&self) -> String {
        if self.port == 22 {
            self.destination()
        } else {
            format!("{}:{}", self.destination(), self.port)
        }
    }
}

/// One `Host` stanza of an SSH client config, reduced to the fields pi-link manages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostEntry {
    /// The Host alias
    pub alias: String,
    /// Resolved hostname or IP address
    pub hostname: Option<String>,
    /// SSH username
    pub user: Option<String>,
    /// SSH port (None means default 22)
    pub port: Option<u16>,
    /// Path to identity file, with `~/` expanded
    pub identity_file: Option<PathBuf>,
    /// `StrictHostKeyChecking` policy
    pub strict_host_key_checking: Option<String>,
}

impl HostEntry {
    /// The stanza pi-link writes for a target: trust-on-first-use host keys
    /// and a pinned identity.
    pub fn managed(alias: &str, target: &SshTarget, identity_file: &Path) -> Self {
        Self {
            alias: alias.to_string(),
            hostname: Some(target.host.clone()),
            user: Some(target.user.clone()),
            port: Some(target.port),
            identity_file: Some(identity_file.to_path_buf()),
            strict_host_key_checking: Some("accept-new".to_string()),
        }
    }

    /// Effective port, applying the ssh default.
    pub fn effective_port(&self) -> u16 {
        self.port.unwrap_or(22)
    }
}

/// An SSH service seen on the local network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredHost {
    /// Advertised service instance name
    pub name: String,
    /// mDNS hostname with the trailing dot removed
    pub hostname: String,
    pub port: u16,
}

impl DiscoveredHost {
    /// Heuristic for Raspberry Pi OS images, which advertise `raspberrypi.local`
    /// or a name containing "pi" as a separate word.
    pub fn looks_like_pi(&self) -> bool {
        let candidates = [self.name.to_lowercase(), self.hostname.to_lowercase()];
        candidates.iter().any(|s| {
            s.contains("raspberry")
                || s
                    .split(|c: char| !c.is_ascii_alphanumeric())
                    .any(|word| word == "pi" || word.starts_with("rpi"))
        })
    }
}
