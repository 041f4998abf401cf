//! Implementations of the pi-link subcommands.
//!
//! Each `*_cli` function prints its own progress and returns the process exit code.

use super::RuntimeOptions;
use crate::provision::report;
use crate::provision::{
    ConfigAction, KeyAction, ProvisionError, ProvisionOptions, Provisioner, ServiceStatus, Stage,
};
use crate::remote::AccessProvider;
use crate::remote::openssh::OpenSshProvider;
use pi_link_config::{ProvisionConfig, Settings, persistence};
use pi_link_ssh::known_hosts::HostKeyState;

const RULE: &str = "=============================================";

fn banner(title: &str) {
    println!("{}", RULE);
    println!("  {}", title);
    println!("{}", RULE);
    println!();
}

/// Resolve settings into the frozen provisioning parameters.
fn load_config(options: &RuntimeOptions) -> anyhow::Result<(Settings, ProvisionConfig)> {
    let settings = options.resolve_settings()?;
    let config = ProvisionConfig::from_settings(&settings)?;
    log::info!(
        "Target {}:{} (host from {}, user from {}, port from {})",
        config.destination(),
        config.port,
        settings.sources.host,
        settings.sources.user,
        settings.sources.port
    );
    Ok((settings, config))
}

/// Print "[n/total] description..." before each step.
fn progress(total: usize) -> impl FnMut(Stage) {
    let mut step = 0;
    move |stage: Stage| {
        step += 1;
        println!("[{}/{}] {}...", step, total, stage.description());
    }
}

/// Full pipeline: key, client config, key install, verification, service probe.
pub fn setup_cli(options: &RuntimeOptions, rewrite_config: bool) -> i32 {
    let config = match load_config(options) {
        Ok((_, config)) => config,
        Err(e) => {
            eprintln!("pi-link: error: {e:#}");
            return 1;
        }
    };

    run_setup_with(&OpenSshProvider::new(), &config, rewrite_config)
}

/// Setup against any provider: 1 when a step fails, 0 otherwise (a missing
/// service only warns).
pub fn run_setup_with<P: AccessProvider>(
    provider: &P,
    config: &ProvisionConfig,
    rewrite_config: bool,
) -> i32 {
    banner("pi-link SSH Setup");
    println!("Target: {} (port {})", config.destination(), config.port);
    println!();

    let provisioner =
        Provisioner::new(config, provider).with_options(ProvisionOptions { rewrite_config });

    match provisioner.run_setup(&mut progress(5)) {
        Ok(summary) => {
            println!();
            println!("{}", describe_key(summary.key, config));
            println!("{}", describe_config(&summary.config, config));
            if let Some(note) = report::config_note(config, &summary.config) {
                print!("{}", note);
            }
            println!("Host key: {}", summary.host_key);
            print_service(config, &summary.service);
            println!();
            println!("{}", RULE);
            println!("  Setup complete!");
            println!("{}", RULE);
            println!();
            println!("Connect with:");
            println!("  ssh {}", config.alias);
            0
        }
        Err(e) => report_failure(config, &e),
    }
}

/// Verification and service probe only. Verification failure exits 1.
pub fn test_cli(options: &RuntimeOptions) -> i32 {
    let config = match load_config(options) {
        Ok((_, config)) => config,
        Err(e) => {
            eprintln!("pi-link: error: {e:#}");
            return 1;
        }
    };

    run_test_with(&OpenSshProvider::new(), &config)
}

/// Test mode against any provider: 1 when verification fails, 0 otherwise.
pub fn run_test_with<P: AccessProvider>(provider: &P, config: &ProvisionConfig) -> i32 {
    banner("pi-link Connection Test");

    let provisioner = Provisioner::new(config, provider);

    match provisioner.run_test(&mut progress(2)) {
        Ok(summary) => {
            println!();
            println!("Passwordless login to {} works", config.destination());
            if summary.host_key != HostKeyState::Recorded {
                println!("Host key: {}", summary.host_key);
            }
            print_service(config, &summary.service);
            0
        }
        Err(e) => report_failure(config, &e),
    }
}

fn report_failure(config: &ProvisionConfig, error: &ProvisionError) -> i32 {
    log::error!("{} failed: {}", stage_name(error.stage()), error);
    eprintln!();
    eprintln!("pi-link: error: {}", error);
    eprintln!();
    eprint!("{}", report::failure_help(config, error));
    1
}

fn stage_name(stage: Stage) -> &'static str {
    match stage {
        Stage::KeyReady => "key pair",
        Stage::ConfigReady => "client config",
        Stage::KeyDistributed => "key distribution",
        Stage::ConnectionVerified => "verification",
        Stage::ServiceChecked => "service probe",
    }
}

fn describe_key(action: KeyAction, config: &ProvisionConfig) -> String {
    let path = config.key_path.display();
    match action {
        KeyAction::Generated => format!("Key pair: generated {}", path),
        KeyAction::PublicKeyRestored => format!("Key pair: restored public key for {}", path),
        KeyAction::Existing => format!("Key pair: using existing {}", path),
    }
}

fn describe_config(action: &ConfigAction, config: &ProvisionConfig) -> String {
    let path = config.ssh_config_path.display();
    match action {
        ConfigAction::Appended => format!("SSH config: added Host {} to {}", config.alias, path),
        ConfigAction::AlreadyPresent => {
            format!("SSH config: Host {} already present", config.alias)
        }
        ConfigAction::Rewritten(_) => {
            format!("SSH config: updated Host {} in {}", config.alias, path)
        }
        ConfigAction::Stale(_) | ConfigAction::SharedBlock(_) => {
            format!("SSH config: Host {} left unchanged", config.alias)
        }
    }
}

fn print_service(config: &ProvisionConfig, status: &ServiceStatus) {
    match report::service_warning(config, status) {
        Some(warning) => {
            println!();
            print!("{}", warning);
        }
        None => println!("Pi Orchestrator is running: {}", config.service_url()),
    }
}

/// Print the effective settings and the files pi-link reads and writes.
pub fn config_cli(options: &RuntimeOptions) -> i32 {
    match load_config(options) {
        Ok((settings, config)) => {
            println!("host:        {:<20} ({})", settings.host, settings.sources.host);
            println!("user:        {:<20} ({})", settings.user, settings.sources.user);
            println!("port:        {:<20} ({})", settings.port, settings.sources.port);
            println!();
            println!("config file: {}", persistence::config_path().display());
            println!("private key: {}", config.key_path.display());
            println!("ssh config:  {}", config.ssh_config_path.display());
            println!("alias:       {}", config.alias);
            println!("service:     {}", config.service_url());
            0
        }
        Err(e) => {
            eprintln!("pi-link: error: {e:#}");
            1
        }
    }
}

/// List SSH hosts announced over mDNS.
#[cfg(feature = "mdns")]
pub fn discover_cli(timeout_secs: u64, json: bool) -> i32 {
    let timeout = std::time::Duration::from_secs(timeout_secs);
    if !json {
        println!("Scanning for SSH hosts ({}s)...", timeout_secs);
    }
    let hosts = pi_link_ssh::mdns::scan(timeout);

    if json {
        return match serde_json::to_string_pretty(&hosts) {
            Ok(text) => {
                println!("{}", text);
                0
            }
            Err(e) => {
                eprintln!("pi-link: error: {e}");
                1
            }
        };
    }

    if hosts.is_empty() {
        println!("No SSH hosts found.");
        return 0;
    }
    for host in &hosts {
        let marker = if host.looks_like_pi() { "*" } else { " " };
        println!("{} {:<30} {}:{}", marker, host.name, host.hostname, host.port);
    }
    println!();
    println!("* looks like a Raspberry Pi. Use: pi-link setup --host <hostname>");
    0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::AccessError;
    use crate::remote::mock::{MockProvider, ok_output, ssh_rejected};
    use pi_link_config::SettingSource;
    use std::time::Duration;
    use tempfile::TempDir;

    fn config(dir: &TempDir) -> ProvisionConfig {
        let mut settings = Settings::new();
        settings.set_host("10.0.0.5", SettingSource::Cli);
        ProvisionConfig::with_ssh_dir(&settings, dir.path().join(".ssh")).unwrap()
    }

    #[test]
    fn test_setup_exits_zero_when_service_missing() {
        let dir = TempDir::new().unwrap();
        let provider = MockProvider::new()
            .with_exec_results(vec![ok_output(""), Err(AccessError::rejected("ssh", Some(1), ""))]);
        assert_eq!(run_setup_with(&provider, &config(&dir), false), 0);
    }

    #[test]
    fn test_setup_exits_zero_when_service_check_fails() {
        let dir = TempDir::new().unwrap();
        let provider = MockProvider::new().with_exec_results(vec![
            ok_output(""),
            Err(AccessError::TimedOut {
                program: "ssh".to_string(),
                after: Duration::from_secs(30),
            }),
        ]);
        assert_eq!(run_setup_with(&provider, &config(&dir), false), 0);
    }

    #[test]
    fn test_setup_exits_one_when_key_install_fails() {
        let dir = TempDir::new().unwrap();
        let provider = MockProvider::new()
            .with_copy_result(Err(AccessError::rejected("ssh-copy-id", Some(1), "denied")));
        assert_eq!(run_setup_with(&provider, &config(&dir), false), 1);
        assert!(provider.exec_commands().is_empty());
    }

    #[test]
    fn test_setup_exits_one_when_verification_fails() {
        let dir = TempDir::new().unwrap();
        let provider = MockProvider::new()
            .with_exec_results(vec![Err(ssh_rejected("Permission denied (publickey)."))]);
        assert_eq!(run_setup_with(&provider, &config(&dir), false), 1);
        assert_eq!(provider.exec_commands(), vec!["true"]);
    }

    #[test]
    fn test_test_mode_exit_codes() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);

        let failing = MockProvider::new().with_exec_results(vec![Err(ssh_rejected("timeout"))]);
        assert_eq!(run_test_with(&failing, &config), 1);

        let no_service = MockProvider::new()
            .with_exec_results(vec![ok_output(""), Err(AccessError::rejected("ssh", Some(1), ""))]);
        assert_eq!(run_test_with(&no_service, &config), 0);
    }
}
