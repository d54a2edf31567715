//! The program logger.
//!
//! Messages below warning level go to stdout and the rest to stderr. When a command writes to an
//! output folder, everything at or above the chosen level is also copied to `primecee.log` there.
use anyhow::{Context, Result, bail};
use chrono::Local;
use fern::{Dispatch, FormatCallback};
use log::{LevelFilter, Record};
use std::env;
use std::fmt::Arguments;
use std::fs::File;
use std::path::Path;
use std::sync::OnceLock;

static LOGGER_INIT: OnceLock<()> = OnceLock::new();

/// Environment variable which overrides the log level from the settings file
pub const LOG_LEVEL_ENV_VAR: &str = "PRIMECEE_LOG_LEVEL";

/// The log level used when neither [`LOG_LEVEL_ENV_VAR`] nor `settings.toml` gives one
pub const DEFAULT_LOG_LEVEL: &str = "info";

const LOG_FILE_NAME: &str = "primecee.log";

/// Whether [`init`] has already installed the logger
pub fn is_logger_initialised() -> bool {
    LOGGER_INIT.get().is_some()
}

/// Parse a log level name (`off`, `error`, `warn`, `info`, `debug` or `trace`)
pub fn parse_log_level(name: &str) -> Result<LevelFilter> {
    let level = match name.trim().to_lowercase().as_str() {
        "off" => LevelFilter::Off,
        "error" => LevelFilter::Error,
        "warn" | "warning" => LevelFilter::Warn,
        "info" => LevelFilter::Info,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        unknown => bail!("Unknown log level: {unknown}"),
    };

    Ok(level)
}

/// Install the program logger.
///
/// `PRIMECEE_LOG_LEVEL` takes precedence over `log_level_from_settings`. If `output_dir` is given,
/// a log file is created there. Later calls do nothing, so several commands can share a process.
pub fn init(log_level_from_settings: &str, output_dir: Option<&Path>) -> Result<()> {
    if is_logger_initialised() {
        return Ok(());
    }

    let log_level =
        env::var(LOG_LEVEL_ENV_VAR).unwrap_or_else(|_| log_level_from_settings.to_string());
    let log_level = parse_log_level(&log_level)?;

    let mut dispatch = Dispatch::new()
        .format(format_record)
        .level(log_level)
        .chain(
            Dispatch::new()
                .filter(|metadata| metadata.level() > LevelFilter::Warn)
                .chain(std::io::stdout()),
        )
        .chain(
            Dispatch::new()
                .level(LevelFilter::Warn)
                .chain(std::io::stderr()),
        );

    if let Some(output_dir) = output_dir {
        let file_path = output_dir.join(LOG_FILE_NAME);
        let file = File::create(&file_path)
            .with_context(|| format!("Could not create log file {}", file_path.display()))?;
        dispatch = dispatch.chain(file);
    }

    dispatch
        .apply()
        .context("Another logger has already been installed")?;
    LOGGER_INIT.get_or_init(|| ());

    Ok(())
}

/// Format a record as `[time level target] message`
fn format_record(out: FormatCallback, message: &Arguments, record: &Record) {
    let timestamp = Local::now().format("%H:%M:%S");
    let level = record.level();
    let target = record.target();

    out.finish(format_args!("[{timestamp} {level} {target}] {message}"));
}
