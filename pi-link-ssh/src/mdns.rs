//! LAN discovery of SSH hosts over mDNS/Bonjour.
//!
//! Browses `_ssh._tcp.local.` with `mdns-sd` for a fixed window and returns
//! what answered. The browse runs on the calling thread.

use super::types::DiscoveredHost;
use mdns_sd::{ServiceDaemon, ServiceEvent};
use std::time::{Duration, Instant};

const SSH_SERVICE: &str = "_ssh._tcp.local.";

/// Longest single wait on the browse channel, so the deadline is re-checked often.
const RECV_SLICE: Duration = Duration::from_millis(500);

/// Listen for `timeout` and return every SSH host seen, Raspberry Pi-like names first.
///
/// A daemon that fails to start yields an empty list and a logged warning.
pub fn scan(timeout: Duration) -> Vec<DiscoveredHost> {
    let mut hosts = Vec::new();

    let daemon = match ServiceDaemon::new() {
        Ok(d) => d,
        Err(e) => {
            log::warn!("Failed to start mDNS daemon: {}", e);
            return hosts;
        }
    };

    match daemon.browse(SSH_SERVICE) {
        Ok(events) => {
            let deadline = Instant::now() + timeout;
            loop {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    break;
                }
                match events.recv_timeout(remaining.min(RECV_SLICE)) {
                    Ok(ServiceEvent::ServiceResolved(info)) => {
                        let host = resolved_host(
                            info.get_fullname(),
                            info.get_hostname(),
                            info.get_port(),
                        );
                        record(&mut hosts, host);
                    }
                    Ok(_) => {}
                    Err(_) if events.is_disconnected() => break,
                    Err(_) => {}
                }
            }
        }
        Err(e) => log::warn!("Failed to browse {}: {}", SSH_SERVICE, e),
    }

    if let Err(e) = daemon.shutdown() {
        log::debug!("mDNS daemon shutdown: {}", e);
    }

    sort_for_display(&mut hosts);
    hosts
}

/// Build a host from a resolved service record.
///
/// `fullname` looks like `kitchen-pi._ssh._tcp.local.`; the instance part
/// becomes the display name.
fn resolved_host(fullname: &str, hostname: &str, port: u16) -> DiscoveredHost {
    let hostname = hostname.trim_end_matches('.').to_string();
    let name = match fullname.split_once("._ssh._tcp") {
        Some((instance, _)) if !instance.is_empty() => instance.to_string(),
        _ => hostname.clone(),
    };
    DiscoveredHost {
        name,
        hostname,
        port,
    }
}

/// Add `host` unless the same hostname and port were already seen.
fn record(hosts: &mut Vec<DiscoveredHost>, host: DiscoveredHost) -> bool {
    if hosts
        .iter()
        .any(|h| h.hostname == host.hostname && h.port == host.port)
    {
        return false;
    }
    log::debug!("mDNS: found {} at {}:{}", host.name, host.hostname, host.port);
    hosts.push(host);
    true
}

fn sort_for_display(hosts: &mut [DiscoveredHost]) {
    hosts.sort_by(|a, b| {
        (!a.looks_like_pi(), &a.hostname, a.port).cmp(&(!b.looks_like_pi(), &b.hostname, b.port))
    });
}
