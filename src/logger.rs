//! Diagnostics of the host itself, written on stderr.
//!
//! Disabled unless `--log` (or `LUASHIM_LOG`) asks for it, so that a successful run
//! leaves stderr untouched.

use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{Layer, Registry, layer::SubscriberExt, util::SubscriberInitExt};

/// Log level
#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    /// Nothing is logged
    #[default]
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => LevelFilter::OFF,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

/// Installs the global subscriber (`LEVEL message` lines, no timestamps)
pub fn init(level: LogLevel) {
    if level == LogLevel::Off {
        return;
    }

    let layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .without_time()
        .with_target(false)
        .with_level(true)
        .with_ansi(console::colors_enabled_stderr())
        .compact()
        .with_filter(LevelFilter::from(level));

    // Only fails if a subscriber is already installed, in which case that one keeps receiving the events.
    let _ = Registry::default().with(layer).try_init();
}

#[cfg(test)]
mod tests {
    use tracing_subscriber::filter::LevelFilter;

    use super::LogLevel;

    #[test]
    fn default_is_off() {
        assert_eq!(LevelFilter::from(LogLevel::default()), LevelFilter::OFF);
    }

    #[test]
    fn levels_are_ordered() {
        let filters = [
            LogLevel::Error,
            LogLevel::Warn,
            LogLevel::Info,
            LogLevel::Debug,
            LogLevel::Trace,
        ]
        .map(LevelFilter::from);
        assert!(filters.windows(2).all(|pair| pair[0] < pair[1]));
    }
}
