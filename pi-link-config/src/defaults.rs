//! Default and fixed values.
//!
//! The `default_*` functions back `#[serde(default = "...")]` attributes on
//! [`crate::Settings`]. The constants are fixed parameters that no config
//! layer can override.

/// Environment variable holding the remote host address.
pub const ENV_HOST: &str = "PI_HOST";
/// Environment variable holding the SSH login user.
pub const ENV_USER: &str = "PI_USER";
/// Environment variable holding the SSH port.
pub const ENV_PORT: &str = "PI_PORT";

/// Alias written to `~/.ssh/config`.
pub const HOST_ALIAS: &str = "pi-orchestrator";
/// File name of the private key inside `~/.ssh`.
pub const KEY_FILE_NAME: &str = "pi_orchestrator_rsa";
/// Comment embedded in the generated public key.
pub const KEY_COMMENT: &str = "pi-link@pi-orchestrator";
/// RSA modulus size for generated keys.
pub const KEY_BITS: u32 = 4096;
/// Pattern matched against the remote process list.
pub const PROCESS_PATTERN: &str = "pi-orchestrator";
/// Port the Pi Orchestrator web service listens on.
pub const SERVICE_PORT: u16 = 9000;
/// `ConnectTimeout` handed to ssh during verification.
pub const CONNECT_TIMEOUT_SECS: u64 = 10;
/// Hard deadline for the verification and probe commands, on top of the connect timeout.
pub const COMMAND_GRACE_SECS: u64 = 20;

pub fn host() -> String {
    "192.168.1.100".to_string()
}

pub fn user() -> String {
    "pi".to_string()
}

pub fn port() -> u16 {
    22
}
