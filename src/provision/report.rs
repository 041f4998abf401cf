//! User-facing remediation text for failed or degraded runs.

use super::{ConfigAction, ProvisionError, ServiceStatus};
use pi_link_config::ProvisionConfig;
use pi_link_ssh::KeyPair;

/// Manual steps for installing the public key when `ssh-copy-id` failed.
///
/// `public_key` is the key line to paste; `None` when it could not be read.
pub fn manual_key_install(config: &ProvisionConfig, public_key: Option<&str>) -> String {
    let mut out = String::new();
    out.push_str("Install the key manually:\n");
    out.push_str(&format!(
        "  1. Log in with your password: ssh -p {} {}\n",
        config.port,
        config.destination()
    ));
    match public_key {
        Some(key) => {
            out.push_str("  2. On the Pi, run:\n");
            out.push_str(&format!(
                "     mkdir -p ~/.ssh && chmod 700 ~/.ssh && echo {} >> ~/.ssh/authorized_keys && chmod 600 ~/.ssh/authorized_keys\n",
                shell_words::quote(key)
            ));
        }
        None => {
            let pair = KeyPair::at(&config.key_path);
            out.push_str(&format!(
                "  2. Append the contents of {} to ~/.ssh/authorized_keys on the Pi\n",
                pair.public.display()
            ));
        }
    }
    out
}

/// Diagnostic hint after a failed verification.
pub fn verification_hint(config: &ProvisionConfig) -> String {
    format!(
        "Check that the Pi is reachable and the key is installed; for details run:\n  ssh -v -i {} -p {} {}\n",
        shell_words::quote(&config.key_path.to_string_lossy()),
        config.port,
        config.destination()
    )
}

/// Text printed after a step failure, tailored to the failing step.
pub fn failure_help(config: &ProvisionConfig, error: &ProvisionError) -> String {
    match error {
        ProvisionError::KeyDistribution { .. } => {
            let key = KeyPair::at(&config.key_path).read_public().ok();
            manual_key_install(config, key.as_deref())
        }
        ProvisionError::Verification { .. } => verification_hint(config),
        ProvisionError::KeyGeneration(_) | ProvisionError::KeyFile { .. } => format!(
            "Make sure ssh-keygen is installed and {} is writable\n",
            config.ssh_dir.display()
        ),
        ProvisionError::ClientConfig { path, .. } => {
            format!("Fix or remove {} and run setup again\n", path.display())
        }
    }
}

/// Warning for a service that is not confirmed running. `None` when it is.
pub fn service_warning(config: &ProvisionConfig, status: &ServiceStatus) -> Option<String> {
    match status {
        ServiceStatus::Running(_) => None,
        ServiceStatus::NotRunning => Some(format!(
            "Warning: Pi Orchestrator does not appear to be running on {}\n  Start it on the Pi, then browse to {}\n",
            config.host,
            config.service_url()
        )),
        ServiceStatus::ProbeFailed(reason) => Some(format!(
            "Warning: could not check for Pi Orchestrator on {}: {}\n",
            config.host, reason
        )),
    }
}

/// Note for a config alias that was left stale or could not be rewritten.
pub fn config_note(config: &ProvisionConfig, action: &ConfigAction) -> Option<String> {
    let (drift, advice) = match action {
        ConfigAction::Stale(drift) => (drift, "run `pi-link setup --rewrite-config` to update it"),
        ConfigAction::SharedBlock(drift) => (
            drift,
            "it shares a Host line with other hosts; edit it by hand",
        ),
        _ => return None,
    };
    let mut out = format!(
        "Warning: Host {} in {} differs from the current settings; {}\n",
        config.alias,
        config.ssh_config_path.display(),
        advice
    );
    for d in drift {
        out.push_str(&format!("  {}\n", d));
    }
    Some(out)
}
