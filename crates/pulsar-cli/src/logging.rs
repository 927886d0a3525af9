use crate::error::{CliError, Result};
use std::fs::File;
use std::path::Path;
use tracing_subscriber::{
    filter::LevelFilter,
    fmt::{self},
    prelude::*,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct LogSettings {
    pub verbosity: u8,
    pub quiet: bool,
    /// Module debug output requested; raises the console level to at least DEBUG.
    pub debug: bool,
    pub color: bool,
}

impl LogSettings {
    pub fn level_filter(&self) -> LevelFilter {
        if self.quiet {
            return LevelFilter::OFF;
        }
        let level = match self.verbosity {
            0 => LevelFilter::WARN,
            1 => LevelFilter::INFO,
            2 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        };
        if self.debug { level.max(LevelFilter::DEBUG) } else { level }
    }
}

pub fn setup_logging(settings: LogSettings, log_file: Option<&Path>) -> Result<()> {
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(settings.color)
        .with_target(false)
        .compact();

    let subscriber = tracing_subscriber::registry()
        .with(settings.level_filter())
        .with(stderr_layer);

    let installed = if let Some(path) = log_file {
        let file = File::create(path)?;
        let file_layer = fmt::layer()
            .with_writer(file)
            .with_ansi(false)
            .with_thread_ids(true)
            .with_target(true);
        subscriber.with(file_layer).try_init()
    } else {
        subscriber.try_init()
    };
    installed.map_err(|e| CliError::Logging(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::path::PathBuf;
    use tracing::{debug, info};

    #[test]
    fn verbosity_maps_to_levels() {
        let at = |verbosity| LogSettings { verbosity, ..Default::default() }.level_filter();
        assert_eq!(at(0), LevelFilter::WARN);
        assert_eq!(at(1), LevelFilter::INFO);
        assert_eq!(at(2), LevelFilter::DEBUG);
        assert_eq!(at(7), LevelFilter::TRACE);
    }

    #[test]
    fn debug_raises_the_level_and_quiet_wins() {
        let debug = LogSettings { debug: true, ..Default::default() };
        assert_eq!(debug.level_filter(), LevelFilter::DEBUG);
        let trace = LogSettings { debug: true, verbosity: 3, ..Default::default() };
        assert_eq!(trace.level_filter(), LevelFilter::TRACE);
        let quiet = LogSettings { debug: true, quiet: true, ..Default::default() };
        assert_eq!(quiet.level_filter(), LevelFilter::OFF);
    }

    #[test]
    #[serial]
    fn file_layer_captures_module_events() {
        let temp_dir = tempfile::tempdir().unwrap();
        let log_path = temp_dir.path().join("run.log");

        let file = File::create(&log_path).unwrap();
        let file_layer = fmt::layer()
            .with_writer(file)
            .with_ansi(false)
            .with_thread_ids(true);
        let subscriber = tracing_subscriber::registry().with(file_layer);

        tracing::subscriber::with_default(subscriber, || {
            info!(module_key = "K1", module_id = 3u64, "Module test passed.");
            debug!("Message for file-only test.");
        });

        let content = std::fs::read_to_string(log_path).unwrap();
        assert!(content.contains("module_key=\"K1\""));
        assert!(content.contains("Message for file-only test."));
        assert!(content.contains("ThreadId"));
    }

    #[test]
    #[serial]
    fn invalid_log_file_path_propagates_error() {
        let invalid_path = PathBuf::from("/");

        if cfg!(unix) && invalid_path.is_dir() {
            let result = setup_logging(LogSettings::default(), Some(&invalid_path));
            assert!(matches!(result, Err(CliError::Io(_))));
        }
    }
}
