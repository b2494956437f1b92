use std::{fmt, io::IsTerminal, net::SocketAddr, path::PathBuf, str::FromStr};

use clap::{Parser, ValueEnum};
use config::Config;
use logforth::filter::EnvFilter;

/// Workspace crates that follow the `--log` verbosity. Everything else
/// stays at warn.
const WORKSPACE_CRATES: [&str; 4] = ["tollgate", "server", "engine", "config"];

#[derive(Debug, Parser)]
#[command(
    name = "tollgate",
    version,
    about = "Distributed rate-limiting gateway for storefront APIs"
)]
pub(crate) struct Args {
    /// Path to the TOML configuration file.
    #[arg(long, short, env = "TOLLGATE_CONFIG_PATH", default_value = "./tollgate.toml")]
    config: PathBuf,

    /// Socket address to listen on, overriding the configuration file.
    #[arg(long, short, env = "TOLLGATE_LISTEN_ADDRESS")]
    pub(crate) listen_address: Option<SocketAddr>,

    /// Verbosity for the tollgate crates.
    #[arg(long = "log", env = "TOLLGATE_LOG", value_enum, default_value = "info")]
    pub(crate) log_level: LogLevel,

    /// Log output style.
    #[arg(long, env = "TOLLGATE_LOG_STYLE", value_enum, default_value = "auto")]
    pub(crate) log_style: LogStyle,
}

impl Args {
    /// Load the configuration file, serving the built-in defaults when
    /// nothing exists at the configured path.
    pub(crate) fn load_config(&self) -> anyhow::Result<Config> {
        if !self.config.exists() {
            log::info!(
                "No configuration file at {}, serving built-in defaults",
                self.config.display()
            );

            return Ok(Config::default());
        }

        Config::load(&self.config)
    }
}

/// How log lines are rendered to stdout.
#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub(crate) enum LogStyle {
    /// Colorized when stdout is a terminal, plain text otherwise
    Auto,
    /// Colorized text
    Color,
    /// Plain text
    Text,
    /// JSON objects
    Json,
}

impl LogStyle {
    /// Whether rendered text should carry color codes.
    pub(crate) fn use_color(self) -> bool {
        match self {
            LogStyle::Color => true,
            LogStyle::Text | LogStyle::Json => false,
            LogStyle::Auto => std::io::stdout().is_terminal(),
        }
    }

    pub(crate) fn is_json(self) -> bool {
        self == LogStyle::Json
    }
}

/// Verbosity applied to the workspace crates.
#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub(crate) enum LogLevel {
    /// Disable logging
    Off,
    /// Only log errors
    Error,
    /// Errors and warnings
    Warn,
    /// Errors, warnings and info messages
    Info,
    /// Everything above plus debug messages
    Debug,
    /// Everything, including trace events
    Trace,
}

impl LogLevel {
    /// Filter directing the selected verbosity at the workspace crates
    /// while dependencies stay at warn.
    pub(crate) fn env_filter(self) -> EnvFilter {
        let spec = match self {
            LogLevel::Off => "off".to_string(),
            level => {
                let crates: Vec<String> = WORKSPACE_CRATES
                    .iter()
                    .map(|krate| format!("{krate}={level}"))
                    .collect();

                format!("warn,{}", crates.join(","))
            }
        };

        EnvFilter::from_str(&spec).expect("the filter spec is assembled from known values")
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogLevel::Off => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        };

        f.write_str(name)
    }
}
