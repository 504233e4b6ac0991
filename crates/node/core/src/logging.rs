//! Logging initialisation for the meshlite node.

use std::io;

use eyre::{Result, WrapErr};
use tracing::Subscriber;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::args::LogArgs;

/// Prefix of the rotating log file, e.g. `meshlite.log.2026-10-19`.
pub const LOG_FILE_PREFIX: &str = "meshlite.log";

/// Build the level filter from command line arguments.
///
/// The filter is built with the following precedence:
/// 1. If `--quiet` is set, only errors are shown
/// 2. Otherwise, start with `RUST_LOG` if set, or a level derived from `-v`
/// 3. Apply any directives from `--log.filter`
pub fn build_filter(args: &LogArgs) -> Result<EnvFilter> {
    if args.quiet {
        return Ok(EnvFilter::new("error"));
    }

    let base_level = match args.verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let mut filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(base_level));

    if let Some(custom_filter) = &args.filter {
        for directive in custom_filter.split(',').filter(|d| !d.trim().is_empty()) {
            let directive = directive
                .trim()
                .parse::<Directive>()
                .wrap_err_with(|| format!("invalid log directive {directive:?}"))?;
            filter = filter.add_directive(directive);
        }
    }

    Ok(filter)
}

/// Compose the filter with a stdout layer and a file layer writing to
/// `file_writer`, both json formatted when `json` is set.
pub(crate) fn build_subscriber<W>(
    json: bool,
    filter: EnvFilter,
    file_writer: W,
) -> Box<dyn Subscriber + Send + Sync>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        Box::new(
            registry
                .with(fmt::layer().json().with_writer(io::stdout))
                .with(fmt::layer().json().with_writer(file_writer).with_ansi(false)),
        )
    } else {
        Box::new(
            registry
                .with(fmt::layer().with_writer(io::stdout))
                .with(fmt::layer().with_writer(file_writer).with_ansi(false)),
        )
    }
}

/// Install the global subscriber: stdout plus a daily rotating file in
/// `--log.dir`.
///
/// The returned guard flushes the file writer on drop and must be held for the
/// lifetime of the process.
pub fn init_logging(args: &LogArgs) -> Result<WorkerGuard> {
    let filter = build_filter(args)?;

    std::fs::create_dir_all(&args.dir)
        .wrap_err_with(|| format!("failed to create log directory {}", args.dir.display()))?;
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .max_log_files(args.max_files.max(1))
        .build(&args.dir)
        .wrap_err("failed to open log file")?;
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    build_subscriber(args.json, filter, file_writer)
        .try_init()
        .wrap_err("failed to install tracing subscriber")?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    use super::*;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn capture(json: bool) -> String {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = build_subscriber(json, EnvFilter::new("info"), move || writer.clone());
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(peers = 3, "node started");
            tracing::debug!("filtered out");
        });
        let bytes = captured.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn plain_file_output() {
        let output = capture(false);
        assert!(output.contains("node started"));
        assert!(output.contains("peers=3"));
        assert!(!output.contains("filtered out"));
        assert!(!output.contains('\u{1b}'));
    }

    #[test]
    fn json_file_output() {
        let output = capture(true);
        let line = output.lines().next().unwrap();
        assert!(line.starts_with('{'));
        assert!(line.contains("\"message\":\"node started\""));
        assert!(!output.contains("filtered out"));
    }

    #[test]
    fn quiet_only_shows_errors() {
        let args = LogArgs {
            quiet: true,
            filter: Some("meshlite=trace".to_string()),
            ..Default::default()
        };
        assert_eq!(build_filter(&args).unwrap().to_string(), "error");
    }

    #[test]
    fn custom_directives_are_added() {
        let args = LogArgs {
            filter: Some("libp2p=warn, meshlite_overlay=debug".to_string()),
            ..Default::default()
        };
        let filter = build_filter(&args).unwrap().to_string();
        assert!(filter.contains("libp2p=warn"));
        assert!(filter.contains("meshlite_overlay=debug"));
    }

    #[test]
    fn invalid_directive_is_an_error() {
        let args = LogArgs {
            filter: Some("meshlite=loud".to_string()),
            ..Default::default()
        };
        assert!(build_filter(&args).is_err());
    }
}
