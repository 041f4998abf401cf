//! File logger behind the `log` facade.
//!
//! All `log::info!()` etc. output goes to `/tmp/pi_link_debug.log` on Unix,
//! or `%TEMP%\pi_link_debug.log` on Windows, so it never mixes with the
//! progress lines pi-link prints for the user. When `RUST_LOG` is set the
//! same lines are mirrored to stderr.

use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::OnceLock;

const LOG_FILE_NAME: &str = "pi_link_debug.log";

static LOGGER: OnceLock<BridgeLogger> = OnceLock::new();

struct BridgeLogger {
    level: log::LevelFilter,
    file: Mutex<Option<File>>,
    mirror_stderr: bool,
}

impl log::Log for BridgeLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format_line(
            &chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f").to_string(),
            record.level(),
            record.target(),
            &record.args().to_string(),
        );
        if let Some(file) = self.file.lock().as_mut() {
            let _ = file.write_all(line.as_bytes());
        }
        if self.mirror_stderr {
            eprint!("{}", line);
        }
    }

    fn flush(&self) {
        if let Some(file) = self.file.lock().as_mut() {
            let _ = file.flush();
        }
    }
}

fn format_line(timestamp: &str, level: log::Level, target: &str, msg: &str) -> String {
    format!("[{}] [{:<5}] [{}] {}\n", timestamp, level, target, msg)
}

/// Path of the debug log file.
pub fn log_path() -> PathBuf {
    #[cfg(unix)]
    {
        PathBuf::from("/tmp").join(LOG_FILE_NAME)
    }
    #[cfg(not(unix))]
    {
        std::env::temp_dir().join(LOG_FILE_NAME)
    }
}

/// Effective level: the CLI flag wins, then `RUST_LOG`, otherwise logging is off.
///
/// `RUST_LOG` may be a bare level (`debug`) or a directive list
/// (`pi_link=debug,warn`); for a list the most verbose level named is used.
pub fn resolve_level(cli: Option<log::LevelFilter>, rust_log: Option<&str>) -> log::LevelFilter {
    if let Some(level) = cli {
        return level;
    }
    let Some(spec) = rust_log else {
        return log::LevelFilter::Off;
    };
    spec.split(',')
        .filter_map(|directive| {
            let level = directive.rsplit('=').next().unwrap_or(directive);
            level.trim().parse::<log::LevelFilter>().ok()
        })
        .max()
        .unwrap_or(log::LevelFilter::Info)
}

/// Install the file logger. Safe to call more than once; later calls are ignored.
pub fn init_log_bridge(cli_level: Option<log::LevelFilter>) {
    let rust_log = std::env::var("RUST_LOG").ok();
    let level = resolve_level(cli_level, rust_log.as_deref());

    let logger = LOGGER.get_or_init(|| {
        let file = if level == log::LevelFilter::Off {
            None
        } else {
            OpenOptions::new()
                .write(true)
                .truncate(true)
                .create(true)
                .open(log_path())
                .ok()
        };
        BridgeLogger {
            level,
            file: Mutex::new(file),
            mirror_stderr: rust_log.is_some(),
        }
    });

    if log::set_logger(logger).is_ok() {
        log::set_max_level(logger.level);
        log::info!(
            "pi-link {} debug session started (level={})",
            crate::VERSION,
            logger.level
        );
    }
}
