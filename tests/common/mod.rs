//! Shared integration test helpers for pi-link.
//!
//! Include this module at the top of each test file that needs it:
//!
//! ```ignore
//! mod common;
//! use common::Fixture;
//! ```

#![allow(dead_code)]

use pi_link::remote::mock::MockProvider;
use pi_link::provision::{Provisioner, ProvisionOptions, Stage};
use pi_link_config::{ProvisionConfig, SettingSource, Settings};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// A throwaway home directory with a not-yet-created `.ssh` inside.
///
/// The `TempDir` must be kept alive for the duration of the test.
pub struct Fixture {
    pub dir: TempDir,
    pub config: ProvisionConfig,
}

impl Fixture {
    /// Target `pi@10.0.0.5:22`.
    pub fn new() -> Self {
        Self::with_target("10.0.0.5", "pi", 22)
    }

    pub fn with_target(host: &str, user: &str, port: u16) -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let mut settings = Settings::new();
        settings.set_host(host, SettingSource::Env);
        settings.set_user(user, SettingSource::Env);
        settings.set_port(port, SettingSource::Env);
        let config = ProvisionConfig::with_ssh_dir(&settings, dir.path().join(".ssh"))
            .expect("Fixture settings must be valid");
        Self { dir, config }
    }

    pub fn provisioner<'a>(&'a self, provider: &'a MockProvider) -> Provisioner<'a, MockProvider> {
        Provisioner::new(&self.config, provider)
    }

    pub fn rewriting_provisioner<'a>(
        &'a self,
        provider: &'a MockProvider,
    ) -> Provisioner<'a, MockProvider> {
        Provisioner::new(&self.config, provider).with_options(ProvisionOptions {
            rewrite_config: true,
        })
    }

    pub fn ssh_config_path(&self) -> PathBuf {
        self.config.ssh_config_path.clone()
    }

    /// Contents of the client config, empty if it does not exist.
    pub fn ssh_config(&self) -> String {
        fs::read_to_string(&self.config.ssh_config_path).unwrap_or_default()
    }

    /// Seed `~/.ssh/config` with `content`.
    pub fn write_ssh_config(&self, content: &str) {
        fs::create_dir_all(&self.config.ssh_dir).expect("Failed to create .ssh");
        fs::write(&self.config.ssh_config_path, content).expect("Failed to write ssh config");
    }

    /// Seed an existing key pair with recognizable contents.
    pub fn write_key_pair(&self, private: &str, public: &str) {
        fs::create_dir_all(&self.config.ssh_dir).expect("Failed to create .ssh");
        fs::write(&self.config.key_path, private).expect("Failed to write private key");
        fs::write(self.public_key_path(), public).expect("Failed to write public key");
    }

    pub fn public_key_path(&self) -> PathBuf {
        pi_link_ssh::KeyPair::at(&self.config.key_path).public
    }

    /// Number of `Host` lines naming the managed alias.
    pub fn alias_count(&self) -> usize {
        let wanted = format!("Host {}", self.config.alias);
        self.ssh_config()
            .lines()
            .filter(|l| l.trim() == wanted)
            .count()
    }
}

/// Stage observer that records the stages it saw.
pub fn stage_recorder(stages: &mut Vec<Stage>) -> impl FnMut(Stage) + '_ {
    move |stage| stages.push(stage)
}
