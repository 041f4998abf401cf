//! Environment variable layer.
//!
//! Only `PI_HOST`, `PI_USER` and `PI_PORT` are consulted. Empty values count
//! as unset so `PI_HOST= pi-link` falls back to the lower layers.

use crate::defaults::{ENV_HOST, ENV_PORT, ENV_USER};
use crate::error::ConfigError;
use crate::settings::{SettingSource, Settings, parse_port};

/// Apply the process environment on top of `settings`.
pub fn apply_process_env(settings: &mut Settings) -> Result<(), ConfigError> {
    apply_env_with(settings, |name| std::env::var(name).ok())
}

/// Apply environment overrides using a custom lookup.
///
/// Split out from [`apply_process_env`] so tests never mutate the real
/// process environment.
pub fn apply_env_with<F>(settings: &mut Settings, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    if let Some(host) = get(ENV_HOST) {
        log::debug!("{ENV_HOST} overrides host: {host}");
        settings.set_host(host.trim(), SettingSource::Env);
    }
    if let Some(user) = get(ENV_USER) {
        log::debug!("{ENV_USER} overrides user: {user}");
        settings.set_user(user.trim(), SettingSource::Env);
    }
    if let Some(port) = get(ENV_PORT) {
        let port = parse_port(&port)
            .map_err(|e| ConfigError::Validation(format!("{ENV_PORT}: {e}")))?;
        log::debug!("{ENV_PORT} overrides port: {port}");
        settings.set_port(port, SettingSource::Env);
    }
    Ok(())
}
