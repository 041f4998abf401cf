//! Lookups in ~/.ssh/known_hosts.
//!
//! Handles plain hostnames, comma-separated host lists and bracketed
//! `[host]:port` entries. Hashed (`|1|...`) entries cannot be matched without
//! the HMAC key material, so their presence makes a miss indeterminate.

use std::path::Path;

/// Whether a host key for a target has been recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostKeyState {
    Recorded,
    Absent,
    /// No plain entry matched, but the file contains hashed entries that might.
    Indeterminate,
}

impl std::fmt::Display for HostKeyState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Recorded => write!(f, "recorded"),
            Self::Absent => write!(f, "not recorded"),
            Self::Indeterminate => write!(f, "unknown (hashed known_hosts)"),
        }
    }
}

/// Look up `host`/`port` in a known_hosts file. A missing file means `Absent`.
pub fn host_key_state(path: &Path, host: &str, port: u16) -> HostKeyState {
    match std::fs::read_to_string(path) {
        Ok(content) => host_key_state_str(&content, host, port),
        Err(_) => HostKeyState::Absent,
    }
}

/// Look up `host`/`port` in known_hosts content.
pub fn host_key_state_str(content: &str, host: &str, port: u16) -> HostKeyState {
    let mut saw_hashed = false;

    for line in content.lines() {
        let line = line.trim();

        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        // `@cert-authority` / `@revoked` markers precede the host field.
        let mut fields = line.split_whitespace();
        let host_field = match fields.next() {
            Some(marker) if marker.starts_with('@') => {
                if marker == "@revoked" {
                    continue;
                }
                match fields.next() {
                    Some(f) => f,
                    None => continue,
                }
            }
            Some(f) => f,
            None => continue,
        };

        if host_field.starts_with("|1|") {
            saw_hashed = true;
            continue;
        }

        for entry in host_field.split(',') {
            if entry.starts_with('!') {
                continue;
            }
            let (hostname, entry_port) = parse_host_entry(entry);
            if hostname.eq_ignore_ascii_case(host) && entry_port.unwrap_or(22) == port {
                return HostKeyState::Recorded;
            }
        }
    }

    if saw_hashed {
        HostKeyState::Indeterminate
    } else {
        HostKeyState::Absent
    }
}

fn parse_host_entry(entry: &str) -> (&str, Option<u16>) {
    if let Some(rest) = entry.strip_prefix('[')
        && let Some(bracket_end) = rest.find(']')
    {
        let port = rest[bracket_end + 1..]
            .strip_prefix(':')
            .and_then(|p| p.parse().ok());
        return (&rest[..bracket_end], port);
    }
    (entry, None)
}
