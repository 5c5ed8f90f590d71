//! Logging setup for hosts embedding the session layer
//!
//! The crate itself only emits `tracing` events; installing a subscriber is
//! left to the application. [`setup_logging`] is a convenience for hosts and
//! test binaries that don't bring their own.

use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{fmt, EnvFilter};

use crate::error::{SessionError, SessionResult};

/// Configuration for the logging system
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: Level,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
    pub file_info: bool,
    /// Log span enter/exit events
    pub log_spans: bool,
    pub app_name: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: Level::INFO,
            json: false,
            file_info: false,
            log_spans: false,
            app_name: "conference-session".to_string(),
        }
    }
}

impl LoggingConfig {
    pub fn new(level: Level, app_name: impl Into<String>) -> Self {
        LoggingConfig {
            level,
            app_name: app_name.into(),
            ..Default::default()
        }
    }

    pub fn with_json(mut self) -> Self {
        self.json = true;
        self
    }

    pub fn with_file_info(mut self) -> Self {
        self.file_info = true;
        self
    }

    pub fn with_spans(mut self) -> Self {
        self.log_spans = true;
        self
    }
}

/// Install a global `tracing` subscriber
///
/// `RUST_LOG` directives are honoured on top of the configured level. Fails if
/// a global subscriber is already installed.
pub fn setup_logging(config: LoggingConfig) -> SessionResult<()> {
    let filter = EnvFilter::from_default_env().add_directive(config.level.into());

    let span_events = if config.log_spans {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_span_events(span_events)
        .with_file(config.file_info)
        .with_line_number(config.file_info);

    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| SessionError::internal_error(format!("logging setup failed: {}", e)))?;

    tracing::info!(app = %config.app_name, version = crate::VERSION, "Logging initialized");
    Ok(())
}

/// Parse a log level name such as `"debug"`
pub fn parse_log_level(level: &str) -> SessionResult<Level> {
    Level::from_str(level).map_err(|_| SessionError::invalid_configuration("log_level", format!("invalid log level: {}", level)))
}
