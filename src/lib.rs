//! pi-link: provision and verify passwordless SSH access to a Raspberry Pi
//! running Pi Orchestrator.
//!
//! - [`provision`]: the five-step pipeline and its remediation text
//! - [`remote`]: the boundary around `ssh-keygen`, `ssh-copy-id` and `ssh`
//! - [`cli`]: argument parsing and the subcommand implementations
//! - [`debug`]: the file logger behind the `log` facade
//!
//! Settings resolution lives in the `pi-link-config` crate and the SSH file
//! formats in `pi-link-ssh`.

/// Application version (root crate version, for use by sub-crates).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod cli;
pub mod debug;
pub mod provision;
pub mod remote;
