//! Logger setup: terminal output plus an optional log file, both through simplelog.

use std::fs::File;
use std::path::Path;

use simplelog::{
    ColorChoice, CombinedLogger, ConfigBuilder, LevelFilter, SharedLogger, TermLogger,
    TerminalMode, WriteLogger,
};

/// Installs the global logger. Returns an error if a logger is already set.
///
/// A log file that can't be created is skipped; terminal logging still works.
pub fn init(level: LevelFilter, log_file: Option<&Path>) -> Result<(), log::SetLoggerError> {
    let log_config = ConfigBuilder::new()
        .set_time_format_rfc3339()
        .build();

    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        level,
        log_config.clone(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )];

    if let Some(path) = log_file {
        match File::create(path) {
            Ok(file) => loggers.push(WriteLogger::new(level, log_config, file)),
            Err(e) => eprintln!("Could not open log file {}: {e}", path.display()),
        }
    }

    CombinedLogger::init(loggers)
}
