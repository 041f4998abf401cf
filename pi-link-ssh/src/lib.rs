//! SSH plumbing for pi-link: the client config document, key pair files,
//! known_hosts lookups and optional mDNS discovery of SSH hosts.

pub mod client_config;
pub mod keys;
pub mod known_hosts;
#[cfg(feature = "mdns")]
pub mod mdns;
pub mod types;

pub use client_config::{Drift, EntryStatus, ReplaceOutcome, SshConfigDocument};
pub use keys::{KeyPair, KeySpec, KeyState};
pub use known_hosts::HostKeyState;
pub use types::{DiscoveredHost, HostEntry, SshTarget};
