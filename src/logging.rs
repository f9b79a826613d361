//! `tracing` subscriber setup for the binary, benches and tests.

use tracing_subscriber::EnvFilter;

/// Checked before `RUST_LOG`.
pub const LOG_ENV_VAR: &str = "STREAM_LIFE_LOG";
pub const DEFAULT_DIRECTIVE: &str = "warn";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Compact,
    Pretty,
}

#[derive(Clone, Debug)]
pub struct LogConfig {
    /// Used when neither environment variable is set.
    pub default_directive: String,
    pub format: LogFormat,
    pub ansi: bool,
    pub include_targets: bool,
    pub thread_names: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            default_directive: DEFAULT_DIRECTIVE.to_owned(),
            format: LogFormat::Compact,
            ansi: true,
            include_targets: false,
            thread_names: true,
        }
    }
}

impl LogConfig {
    pub fn directive(mut self, directive: impl Into<String>) -> Self {
        self.default_directive = directive.into();
        self
    }

    pub fn format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn ansi(mut self, enabled: bool) -> Self {
        self.ansi = enabled;
        self
    }

    fn resolve_filter(&self) -> Result<EnvFilter, LoggingError> {
        if let Ok(directives) = std::env::var(LOG_ENV_VAR) {
            return EnvFilter::try_new(&directives)
                .map_err(|err| LoggingError::InvalidFilter(format!("{LOG_ENV_VAR}: {err}")));
        }
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return Ok(filter);
        }
        EnvFilter::try_new(&self.default_directive)
            .map_err(|err| LoggingError::InvalidFilter(err.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("invalid log filter: {0}")]
    InvalidFilter(String),
    #[error("failed to install tracing subscriber: {0}")]
    Init(String),
}

/// Install the global subscriber. A second call fails with
/// [`LoggingError::Init`] and leaves the first subscriber in place.
pub fn init_tracing(config: &LogConfig) -> Result<(), LoggingError> {
    let filter = config.resolve_filter()?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.include_targets)
        .with_thread_names(config.thread_names)
        .with_ansi(config.ansi)
        .with_writer(std::io::stderr);
    let result = match config.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
    };
    result.map_err(|err| LoggingError::Init(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::{LogConfig, LoggingError, init_tracing};

    #[test]
    fn second_init_is_reported_not_fatal() {
        let config = LogConfig::default().ansi(false);
        let _ = init_tracing(&config);
        assert!(matches!(init_tracing(&config), Err(LoggingError::Init(_))));
    }
}
