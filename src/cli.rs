use clap::{Parser, ValueEnum};
use std::time::Duration;

use crate::config::ClientConfig;

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "remotezip")]
#[command(version)]
#[command(about = "Extract files from remote ZIP archives using HTTP Range requests", long_about = None)]
#[command(after_help = "Examples:\n  \
  remotezip -l https://example.com/firmware.ipsw                 list entries\n  \
  remotezip -p https://example.com/firmware.ipsw BuildManifest.plist | head\n  \
  remotezip -d out https://example.com/archive.zip docs/readme.txt")]
pub struct Cli {
    /// ZIP archive path or HTTP(S) URL
    #[arg(value_name = "ARCHIVE")]
    pub archive: String,

    /// Entries to extract, as stored in the archive (default: all files)
    #[arg(value_name = "ENTRIES")]
    pub entries: Vec<String>,

    /// List entry names
    #[arg(short = 'l')]
    pub list: bool,

    /// List verbosely (sizes, ratio, dates)
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Log level when RUST_LOG is unset (default: warn, or error with -qq)
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Extract files to pipe, no messages
    #[arg(short = 'p')]
    pub pipe: bool,

    /// Extract files into exdir
    #[arg(short = 'd', value_name = "DIR")]
    pub extract_dir: Option<String>,

    /// Overwrite files WITHOUT prompting
    #[arg(short = 'o')]
    pub overwrite: bool,

    /// Junk paths (do not make directories)
    #[arg(short = 'j')]
    pub junk_paths: bool,

    /// Per-request timeout in seconds
    #[arg(long, value_name = "SECS", default_value_t = 30)]
    pub timeout: u64,

    /// Skip CRC-32 and size verification
    #[arg(long)]
    pub no_verify: bool,

    /// Quiet mode (-qq => quieter)
    #[arg(short = 'q', action = clap::ArgAction::Count)]
    pub quiet: u8,
}

impl Cli {
    pub fn is_http_url(&self) -> bool {
        self.archive.starts_with("http://") || self.archive.starts_with("https://")
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet > 0 || self.pipe
    }

    pub fn is_very_quiet(&self) -> bool {
        self.quiet > 1
    }

    /// Default log filter when `RUST_LOG` is unset.
    pub fn log_filter(&self) -> &'static str {
        match self.log_level {
            Some(level) => level.as_str(),
            None if self.is_very_quiet() => "error",
            None => "warn",
        }
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig::default()
            .with_timeout(Duration::from_secs(self.timeout))
            .with_verify_checksum(!self.no_verify)
    }
}
