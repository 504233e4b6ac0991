//! Logging CLI arguments.

use std::path::PathBuf;

use clap::Args;

/// Default number of rotated log files to keep.
pub const DEFAULT_MAX_FILES: usize = 7;

/// Logging configuration.
#[derive(Debug, Args, Clone, PartialEq, Eq)]
#[command(next_help_heading = "Logging")]
pub struct LogArgs {
    /// Silence all output except errors.
    #[arg(short, long)]
    pub quiet: bool,

    /// Verbose mode (-v, -vv, etc.).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbosity: u8,

    /// Log filter directives (e.g., "meshlite_overlay=debug,libp2p=info").
    #[arg(long = "log.filter", value_name = "DIRECTIVE")]
    pub filter: Option<String>,

    /// Use JSON format for log output.
    #[arg(long = "log.json")]
    pub json: bool,

    /// Directory the rotating log file is written to.
    #[arg(long = "log.dir", default_value = ".", value_name = "DIR")]
    pub dir: PathBuf,

    /// Maximum number of rotated log files to keep.
    #[arg(long = "log.max-files", default_value_t = DEFAULT_MAX_FILES, value_name = "COUNT")]
    pub max_files: usize,
}

impl Default for LogArgs {
    fn default() -> Self {
        Self {
            quiet: false,
            verbosity: 0,
            filter: None,
            json: false,
            dir: PathBuf::from("."),
            max_files: DEFAULT_MAX_FILES,
        }
    }
}
