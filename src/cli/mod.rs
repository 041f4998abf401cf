//! Command-line interface for pi-link.
//!
//! Parses arguments with clap and resolves the layered settings. The command
//! implementations live in the [`commands`] submodule.

pub mod commands;

use anyhow::Context;
use clap::{Parser, Subcommand};
use pi_link_config::settings::parse_port;
use pi_link_config::{SettingSource, Settings};

/// pi-link - passwordless SSH setup for a Pi running Pi Orchestrator
#[derive(Parser, Debug)]
#[command(name = "pi-link")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Pi hostname or IP address (overrides PI_HOST)
    #[arg(long, global = true, value_name = "HOST")]
    pub host: Option<String>,

    /// SSH login user (overrides PI_USER)
    #[arg(long, global = true, value_name = "USER")]
    pub user: Option<String>,

    /// SSH port (overrides PI_PORT)
    #[arg(long, global = true, value_name = "PORT", value_parser = parse_port)]
    pub port: Option<u16>,

    /// Set debug log level (overrides RUST_LOG)
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevelArg>,
}

/// Log level argument for CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogLevelArg {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevelArg {
    /// Convert to `log::LevelFilter`
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            LogLevelArg::Off => log::LevelFilter::Off,
            LogLevelArg::Error => log::LevelFilter::Error,
            LogLevelArg::Warn => log::LevelFilter::Warn,
            LogLevelArg::Info => log::LevelFilter::Info,
            LogLevelArg::Debug => log::LevelFilter::Debug,
            LogLevelArg::Trace => log::LevelFilter::Trace,
        }
    }
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Generate a key, add the SSH alias, install the key and verify (default)
    Setup {
        /// Replace an existing `Host pi-orchestrator` block whose values differ
        #[arg(long)]
        rewrite_config: bool,
    },

    /// Verify passwordless login and check for the Pi Orchestrator process
    Test,

    /// Browse the local network for SSH hosts via mDNS
    #[cfg(feature = "mdns")]
    Discover {
        /// Seconds to listen for announcements
        #[arg(long, default_value_t = 3, value_name = "SECS")]
        timeout: u64,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration and where each value came from
    Config,
}

/// What to run, extracted from the command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeOptions {
    pub command: Commands,
    /// Log level override from CLI
    pub log_level: Option<log::LevelFilter>,
    pub host: Option<String>,
    pub user: Option<String>,
    pub port: Option<u16>,
}

impl From<Cli> for RuntimeOptions {
    fn from(cli: Cli) -> Self {
        Self {
            command: cli.command.unwrap_or(Commands::Setup {
                rewrite_config: false,
            }),
            log_level: cli.log_level.map(|l| l.to_level_filter()),
            host: cli.host,
            user: cli.user,
            port: cli.port,
        }
    }
}

impl RuntimeOptions {
    /// Overlay the CLI flags on already-loaded settings.
    pub fn apply_overrides(&self, settings: &mut Settings) {
        if let Some(host) = &self.host {
            settings.set_host(host.as_str(), SettingSource::Cli);
        }
        if let Some(user) = &self.user {
            settings.set_user(user.as_str(), SettingSource::Cli);
        }
        if let Some(port) = self.port {
            settings.set_port(port, SettingSource::Cli);
        }
    }

    /// Defaults, config file and environment, then the CLI flags.
    pub fn resolve_settings(&self) -> anyhow::Result<Settings> {
        let mut settings = Settings::load().context("failed to load configuration")?;
        self.apply_overrides(&mut settings);
        settings.validate().context("invalid configuration")?;
        Ok(settings)
    }
}

/// Parse the process arguments
pub fn process_cli() -> RuntimeOptions {
    Cli::parse().into()
}

/// Run the selected command and return the process exit code.
pub fn run(options: &RuntimeOptions) -> i32 {
    match &options.command {
        Commands::Setup { rewrite_config } => commands::setup_cli(options, *rewrite_config),
        Commands::Test => commands::test_cli(options),
        #[cfg(feature = "mdns")]
        Commands::Discover { timeout, json } => commands::discover_cli(*timeout, *json),
        Commands::Config => commands::config_cli(options),
    }
}
