//! Capability boundary around the external OpenSSH tools.
//!
//! [`AccessProvider`] is what the provisioning pipeline talks to.
//! [`openssh::OpenSshProvider`] runs the real `ssh-keygen`, `ssh-copy-id` and
//! `ssh` binaries; [`mock::MockProvider`] records calls and replays scripted
//! results so the pipeline can be tested without a network or credentials.

pub mod mock;
pub mod openssh;

use pi_link_ssh::{KeySpec, SshTarget};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Coarse classification of an [`AccessError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessErrorKind {
    /// The external tool is not installed or not on `PATH`.
    ToolMissing,
    /// The tool ran past its deadline and was killed.
    TimedOut,
    /// The tool ran and reported failure (bad credentials, unreachable host, non-zero exit).
    Rejected,
    /// The tool could not be started or its output could not be read.
    Io,
}

/// Failure of a single external tool invocation.
#[derive(Debug, Error)]
pub enum AccessError {
    #[error("`{program}` was not found; install the OpenSSH client tools")]
    ToolMissing { program: String },

    #[error("`{program}` did not finish within {}s and was stopped", whole_secs(.after))]
    TimedOut { program: String, after: Duration },

    #[error("`{program}` exited with {}{}", exit_text(.code), stderr_suffix(.stderr))]
    Rejected {
        program: String,
        /// Exit code, `None` when killed by a signal
        code: Option<i32>,
        stderr: String,
    },

    #[error("failed to run `{program}`: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

impl AccessError {
    pub fn kind(&self) -> AccessErrorKind {
        match self {
            Self::ToolMissing { .. } => AccessErrorKind::ToolMissing,
            Self::TimedOut { .. } => AccessErrorKind::TimedOut,
            Self::Rejected { .. } => AccessErrorKind::Rejected,
            Self::Io { .. } => AccessErrorKind::Io,
        }
    }

    /// Exit code of a rejected invocation.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Rejected { code, .. } => *code,
            _ => None,
        }
    }

    pub fn rejected(program: &str, code: Option<i32>, stderr: impl Into<String>) -> Self {
        Self::Rejected {
            program: program.to_string(),
            code,
            stderr: stderr.into(),
        }
    }
}

fn whole_secs(after: &Duration) -> u64 {
    after.as_secs()
}

fn exit_text(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {code}"),
        None => "a signal".to_string(),
    }
}

fn stderr_suffix(stderr: &str) -> String {
    let stderr = stderr.trim();
    if stderr.is_empty() {
        String::new()
    } else {
        format!(": {stderr}")
    }
}

/// Captured result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// A non-interactive remote command over ssh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecRequest {
    pub target: SshTarget,
    pub identity: PathBuf,
    /// Remote shell command line, already quoted
    pub command: String,
    /// Handed to ssh as `ConnectTimeout`
    pub connect_timeout: Duration,
    /// Kill the local ssh process after this long
    pub deadline: Option<Duration>,
}

impl ExecRequest {
    /// Full ssh argument list: batch mode (never prompt), pinned identity,
    /// trust-on-first-use host keys, then the remote command.
    pub fn ssh_args(&self) -> Vec<String> {
        let mut args = self.target.ssh_args(
            Some(&self.identity),
            &[
                ("BatchMode", "yes".to_string()),
                ("IdentitiesOnly", "yes".to_string()),
                ("StrictHostKeyChecking", "accept-new".to_string()),
                ("ConnectTimeout", self.connect_timeout.as_secs().max(1).to_string()),
            ],
        );
        args.push(self.command.clone());
        args
    }
}

/// Operations the provisioner needs from the outside world.
///
/// Every call is attempted exactly once; implementations must not retry.
pub trait AccessProvider {
    /// Create a passphrase-less key pair at `private_key` (and `<private_key>.pub`).
    fn generate_key(&self, spec: &KeySpec, private_key: &Path) -> Result<(), AccessError>;

    /// Compute the public key line for an existing private key.
    fn derive_public_key(&self, private_key: &Path) -> Result<String, AccessError>;

    /// Append `public_key` to the remote authorized-keys list.
    ///
    /// May prompt the user for a password. `None` waits indefinitely.
    fn copy_id(
        &self,
        public_key: &Path,
        target: &SshTarget,
        timeout: Option<Duration>,
    ) -> Result<(), AccessError>;

    /// Run a command on the remote host without any prompts.
    fn exec(&self, request: &ExecRequest) -> Result<CommandOutput, AccessError>;
}
