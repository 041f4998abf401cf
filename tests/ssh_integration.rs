//! Integration tests for the SSH file formats.

use pi_link_ssh::known_hosts::host_key_state_str;
use pi_link_ssh::{EntryStatus, HostEntry, HostKeyState, SshConfigDocument, SshTarget};
use std::path::Path;
use tempfile::TempDir;

const EXISTING: &str = r#"# managed by hand
Include ~/.ssh/config.d/*

Host production
    HostName prod.example.com
    User deploy
    Port 22
    IdentityFile ~/.ssh/id_prod
    ProxyJump bastion

Match host *.internal
    User ops

Host *
    ServerAliveInterval 60
"#;

fn managed() -> HostEntry {
    HostEntry::managed(
        "pi-orchestrator",
        &SshTarget::new("10.0.0.5", "pi", 22),
        Path::new("/home/dev/.ssh/pi_orchestrator_rsa"),
    )
}

#[test]
fn test_ssh_config_roundtrip() {
    let doc = SshConfigDocument::parse(EXISTING);
    assert_eq!(doc.render(), EXISTING);

    let production = doc.find_entry("production").unwrap();
    assert_eq!(production.hostname.as_deref(), Some("prod.example.com"));
    assert_eq!(production.user.as_deref(), Some("deploy"));
    assert_eq!(doc.entry_status(&managed()), EntryStatus::Missing);
}

#[test]
fn test_append_save_and_reload() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join(".ssh").join("config");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, EXISTING).unwrap();

    let mut doc = SshConfigDocument::load(&path).unwrap();
    assert_eq!(doc.entry_status(&managed()), EntryStatus::Missing);
    doc.append(&managed());
    doc.save(&path).unwrap();

    let reloaded = SshConfigDocument::load(&path).unwrap();
    assert_eq!(reloaded.entry_status(&managed()), EntryStatus::Matches);
    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.starts_with(EXISTING));
    assert!(text.ends_with("    StrictHostKeyChecking accept-new\n"));
}

#[test]
fn test_managed_entry_ssh_args() {
    let target = SshTarget::new("10.0.0.5", "pi", 2222);
    let args = target.ssh_args(
        Some(Path::new("/k/id")),
        &[("BatchMode", "yes".to_string())],
    );
    assert_eq!(
        args,
        vec!["-i", "/k/id", "-p", "2222", "-o", "BatchMode=yes", "pi@10.0.0.5"]
    );
}

#[test]
fn test_known_hosts_after_first_login() {
    let content = "github.com ssh-ed25519 AAAA\n10.0.0.5 ecdsa-sha2-nistp256 AAAA\n";
    assert_eq!(host_key_state_str(content, "10.0.0.5", 22), HostKeyState::Recorded);
    assert_eq!(host_key_state_str(content, "10.0.0.5", 2222), HostKeyState::Absent);
}
