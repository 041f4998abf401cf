//! The connection provisioning pipeline.
//!
//! Five steps run in a fixed order, each attempted exactly once:
//!
//! 1. [`Provisioner::ensure_key_pair`]
//! 2. [`Provisioner::ensure_client_config`]
//! 3. [`Provisioner::distribute_key`]
//! 4. [`Provisioner::verify_connection`]
//! 5. [`Provisioner::probe_remote_service`]
//!
//! Steps 1-4 are preconditions for their successors and abort the run on
//! failure. Step 5 is advisory and never fails the run.

pub mod report;

use crate::remote::{AccessError, AccessErrorKind, AccessProvider, ExecRequest};
use pi_link_config::ProvisionConfig;
use pi_link_ssh::client_config::{Drift, EntryStatus, ReplaceOutcome, SshConfigDocument};
use pi_link_ssh::known_hosts::{self, HostKeyState};
use pi_link_ssh::{HostEntry, KeyPair, KeySpec, KeyState, SshTarget};
use std::path::PathBuf;
use thiserror::Error;

/// Pipeline states, in order. Each names the condition established by its step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    KeyReady,
    ConfigReady,
    KeyDistributed,
    ConnectionVerified,
    ServiceChecked,
}

impl Stage {
    /// What the step leading to this stage does, for progress output.
    pub fn description(self) -> &'static str {
        match self {
            Self::KeyReady => "Checking local key pair",
            Self::ConfigReady => "Checking SSH client config",
            Self::KeyDistributed => "Installing public key on the Pi",
            Self::ConnectionVerified => "Verifying passwordless login",
            Self::ServiceChecked => "Looking for the Pi Orchestrator process",
        }
    }
}

/// A step failure that aborts the pipeline.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("key generation failed: {0}")]
    KeyGeneration(#[source] AccessError),

    #[error("could not access key file {path:?}: {source}")]
    KeyFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not update SSH client config {path:?}: {source}")]
    ClientConfig {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not install the public key on {destination}: {source}")]
    KeyDistribution {
        destination: String,
        #[source]
        source: AccessError,
    },

    #[error("passwordless login to {destination} failed: {source}")]
    Verification {
        destination: String,
        #[source]
        source: AccessError,
    },
}

impl ProvisionError {
    /// The stage whose step failed.
    pub fn stage(&self) -> Stage {
        match self {
            Self::KeyGeneration(_) | Self::KeyFile { .. } => Stage::KeyReady,
            Self::ClientConfig { .. } => Stage::ConfigReady,
            Self::KeyDistribution { .. } => Stage::KeyDistributed,
            Self::Verification { .. } => Stage::ConnectionVerified,
        }
    }
}

/// What [`Provisioner::ensure_key_pair`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Generated,
    /// The private key existed; its missing `.pub` was re-derived.
    PublicKeyRestored,
    Existing,
}

/// What [`Provisioner::ensure_client_config`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigAction {
    Appended,
    AlreadyPresent,
    /// The alias exists with different values and was left untouched.
    Stale(Vec<Drift>),
    /// The alias existed with different values and was rewritten in place.
    Rewritten(Vec<Drift>),
    /// The alias shares a `Host` line with other patterns, so it cannot be rewritten.
    SharedBlock(Vec<Drift>),
}

/// Result of the advisory service probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceStatus {
    /// Matching process IDs on the remote host.
    Running(Vec<u32>),
    NotRunning,
    /// The probe itself could not be carried out.
    ProbeFailed(String),
}

/// Outcome of a full setup run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupReport {
    pub key: KeyAction,
    pub config: ConfigAction,
    pub host_key: HostKeyState,
    pub service: ServiceStatus,
}

/// Outcome of a test run (verification + probe only).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestReport {
    pub host_key: HostKeyState,
    pub service: ServiceStatus,
}

/// Switches that change step behavior.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProvisionOptions {
    /// Replace a drifted alias block instead of leaving it alone.
    pub rewrite_config: bool,
}

/// Runs the provisioning steps against one [`AccessProvider`].
pub struct Provisioner<'a, P: AccessProvider> {
    config: &'a ProvisionConfig,
    provider: &'a P,
    options: ProvisionOptions,
}

impl<'a, P: AccessProvider> Provisioner<'a, P> {
    pub fn new(config: &'a ProvisionConfig, provider: &'a P) -> Self {
        Self {
            config,
            provider,
            options: ProvisionOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ProvisionOptions) -> Self {
        self.options = options;
        self
    }

    fn target(&self) -> SshTarget {
        SshTarget::new(&self.config.host, &self.config.user, self.config.port)
    }

    fn key_pair(&self) -> KeyPair {
        KeyPair::at(&self.config.key_path)
    }

    /// The stanza this run wants in `~/.ssh/config`.
    pub fn desired_entry(&self) -> HostEntry {
        HostEntry::managed(&self.config.alias, &self.target(), &self.config.key_path)
    }

    /// Full pipeline. `on_stage` is called before each step starts.
    pub fn run_setup(
        &self,
        on_stage: &mut dyn FnMut(Stage),
    ) -> Result<SetupReport, ProvisionError> {
        on_stage(Stage::KeyReady);
        let key = self.ensure_key_pair()?;

        on_stage(Stage::ConfigReady);
        let config = self.ensure_client_config()?;

        on_stage(Stage::KeyDistributed);
        self.distribute_key()?;

        on_stage(Stage::ConnectionVerified);
        let host_key = self.verify_connection()?;

        on_stage(Stage::ServiceChecked);
        let service = self.probe_remote_service();

        Ok(SetupReport {
            key,
            config,
            host_key,
            service,
        })
    }

    /// Verification and probe only; nothing local is created or changed.
    pub fn run_test(&self, on_stage: &mut dyn FnMut(Stage)) -> Result<TestReport, ProvisionError> {
        on_stage(Stage::ConnectionVerified);
        let host_key = self.verify_connection()?;

        on_stage(Stage::ServiceChecked);
        let service = self.probe_remote_service();

        Ok(TestReport { host_key, service })
    }

    /// Generate the key pair if the private key is missing. Never overwrites.
    pub fn ensure_key_pair(&self) -> Result<KeyAction, ProvisionError> {
        let pair = self.key_pair();
        match pair.state() {
            KeyState::Complete => {
                log::info!("Using existing key pair {:?}", pair.private);
                Ok(KeyAction::Existing)
            }
            KeyState::PublicMissing => {
                log::warn!(
                    "Public key {:?} is missing, deriving it from the private key",
                    pair.public
                );
                let line = self
                    .provider
                    .derive_public_key(&pair.private)
                    .map_err(ProvisionError::KeyGeneration)?;
                pair.write_public(&line)
                    .map_err(|source| ProvisionError::KeyFile {
                        path: pair.public.clone(),
                        source,
                    })?;
                Ok(KeyAction::PublicKeyRestored)
            }
            KeyState::Missing => {
                self.ensure_ssh_dir()?;
                let spec = KeySpec::rsa(self.config.key_bits, &self.config.key_comment);
                log::info!(
                    "Generating {}-bit {} key pair at {:?}",
                    spec.bits,
                    spec.key_type,
                    pair.private
                );
                self.provider
                    .generate_key(&spec, &pair.private)
                    .map_err(ProvisionError::KeyGeneration)?;
                Ok(KeyAction::Generated)
            }
        }
    }

    /// Make sure `~/.ssh` exists with owner-only permissions before writing into it.
    fn ensure_ssh_dir(&self) -> Result<(), ProvisionError> {
        let dir = &self.config.ssh_dir;
        if dir.exists() {
            return Ok(());
        }
        let key_file = |source| ProvisionError::KeyFile {
            path: dir.clone(),
            source,
        };
        std::fs::create_dir_all(dir).map_err(key_file)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700))
                .map_err(key_file)?;
        }
        Ok(())
    }

    /// Append the alias block if the alias is absent.
    ///
    /// An existing block is never modified unless
    /// [`ProvisionOptions::rewrite_config`] is set and the block has drifted.
    pub fn ensure_client_config(&self) -> Result<ConfigAction, ProvisionError> {
        let path = &self.config.ssh_config_path;
        let config_error = |source| ProvisionError::ClientConfig {
            path: path.clone(),
            source,
        };

        let mut doc = SshConfigDocument::load(path).map_err(config_error)?;
        let desired = self.desired_entry();

        match doc.entry_status(&desired) {
            EntryStatus::Matches => {
                log::info!("Host {} already configured in {:?}", desired.alias, path);
                Ok(ConfigAction::AlreadyPresent)
            }
            EntryStatus::Missing => {
                doc.append(&desired);
                doc.save(path).map_err(config_error)?;
                log::info!("Added Host {} to {:?}", desired.alias, path);
                Ok(ConfigAction::Appended)
            }
            EntryStatus::Differs(drift) if self.options.rewrite_config => {
                match doc.replace(&desired) {
                    ReplaceOutcome::Replaced => {
                        doc.save(path).map_err(config_error)?;
                        log::info!("Rewrote Host {} in {:?}", desired.alias, path);
                        Ok(ConfigAction::Rewritten(drift))
                    }
                    ReplaceOutcome::SharedBlock => {
                        log::warn!(
                            "Host {} shares its block with other hosts; not rewriting",
                            desired.alias
                        );
                        Ok(ConfigAction::SharedBlock(drift))
                    }
                    // entry_status and replace use the same lookup, so this means
                    // the document changed between them; fall back to appending
                    ReplaceOutcome::NotFound => {
                        log::warn!("Host {} vanished before rewrite; appending", desired.alias);
                        doc.append(&desired);
                        doc.save(path).map_err(config_error)?;
                        Ok(ConfigAction::Appended)
                    }
                }
            }
            EntryStatus::Differs(drift) => {
                for d in &drift {
                    log::warn!("Host {} is stale: {}", desired.alias, d);
                }
                Ok(ConfigAction::Stale(drift))
            }
        }
    }

    /// Install the public key on the remote host via `ssh-copy-id`.
    pub fn distribute_key(&self) -> Result<(), ProvisionError> {
        let pair = self.key_pair();
        let target = self.target();
        log::info!("Copying {:?} to {}", pair.public, target.connection_string());
        self.provider
            .copy_id(&pair.public, &target, None)
            .map_err(|source| ProvisionError::KeyDistribution {
                destination: target.connection_string(),
                source,
            })
    }

    /// Log in non-interactively and run a trivial command.
    ///
    /// On success, reports whether the host key is now pinned in known_hosts.
    pub fn verify_connection(&self) -> Result<HostKeyState, ProvisionError> {
        let target = self.target();
        let request = self.exec_request("true".to_string());
        self.provider
            .exec(&request)
            .map_err(|source| ProvisionError::Verification {
                destination: target.connection_string(),
                source,
            })?;

        let host_key =
            known_hosts::host_key_state(&self.config.known_hosts_path, &target.host, target.port);
        log::info!(
            "Verified login to {}; host key {}",
            target.connection_string(),
            host_key
        );
        Ok(host_key)
    }

    /// Look for the service process on the remote host. Never fails the run.
    pub fn probe_remote_service(&self) -> ServiceStatus {
        let command = format!(
            "pgrep -f {}",
            shell_words::quote(&self_excluding_pattern(&self.config.process_pattern))
        );
        let status = match self.provider.exec(&self.exec_request(command)) {
            Ok(output) => ServiceStatus::Running(parse_pids(&output.stdout)),
            // pgrep exits 1 when nothing matched
            Err(e) if e.kind() == AccessErrorKind::Rejected && e.exit_code() == Some(1) => {
                ServiceStatus::NotRunning
            }
            Err(e) => ServiceStatus::ProbeFailed(e.to_string()),
        };
        match &status {
            ServiceStatus::Running(pids) => log::info!("Service running, pids {:?}", pids),
            ServiceStatus::NotRunning => log::warn!("Service process not found"),
            ServiceStatus::ProbeFailed(reason) => log::warn!("Service probe failed: {}", reason),
        }
        status
    }

    fn exec_request(&self, command: String) -> ExecRequest {
        ExecRequest {
            target: self.target(),
            identity: self.config.key_path.clone(),
            command,
            connect_timeout: self.config.connect_timeout,
            deadline: Some(self.config.command_deadline),
        }
    }
}

/// Wrap the first character in a bracket expression (`abc` -> `[a]bc`).
///
/// The remote shell running `pgrep -f` carries the pattern in its own command
/// line; the bracketed form still matches the service but not that shell.
fn self_excluding_pattern(pattern: &str) -> String {
    let mut chars = pattern.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphanumeric() => format!("[{}]{}", first, chars.as_str()),
        _ => pattern.to_string(),
    }
}

fn parse_pids(stdout: &str) -> Vec<u32> {
    stdout
        .split_whitespace()
        .filter_map(|p| p.parse().ok())
        .collect()
}
