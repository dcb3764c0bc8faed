//! Structured logging for Huddle
//!
//! One call installs the global `tracing` subscriber: an `EnvFilter`
//! (honouring `RUST_LOG`), the [`SessionContextLayer`], and any of a JSON
//! console, a pretty console and a JSON file sink.
//!
//! ```ignore
//! use huddle_logging::{HuddleSubscriberBuilder, LogConfig};
//!
//! let _guard = HuddleSubscriberBuilder::new()
//!     .with_config(LogConfig::development())
//!     .init();
//! ```
//!
//! Records emitted inside a presence session carry `user_id` and
//! `instance_id` from its [`session_span`].

pub mod config;
pub mod context;
pub mod layers;

pub use config::{
    ConsoleConfig, ConsoleFormat, FileConfig, JsonlConfig, LogConfig, RotationStrategy,
};
pub use context::{SessionContextData, SessionContextGuard, session_span};
pub use layers::SessionContextLayer;

use std::fs::{self, File};

use thiserror::Error;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

/// Errors raised while installing the subscriber
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Failed to open log file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Global subscriber already set: {0}")]
    AlreadyInitialized(String),
}

/// Installs the process-wide subscriber from a [`LogConfig`]
pub struct HuddleSubscriberBuilder {
    config: LogConfig,
}

impl HuddleSubscriberBuilder {
    /// JSON lines on stdout at info
    pub fn new() -> Self {
        Self {
            config: LogConfig::default(),
        }
    }

    pub fn with_config(mut self, config: LogConfig) -> Self {
        self.config = config;
        self
    }

    /// Level used when `RUST_LOG` is unset
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.config.default_level = level.into();
        self
    }

    pub fn with_console(mut self, enabled: bool) -> Self {
        self.config.console.enabled = enabled;
        self
    }

    /// Also write JSON lines to disk
    pub fn with_file_output(mut self, config: FileConfig) -> Self {
        self.config.file = Some(config);
        self
    }

    /// Install the subscriber globally
    ///
    /// The returned guard flushes the file writer when dropped; keep it alive
    /// for the life of the program.
    pub fn try_init(self) -> Result<Option<WorkerGuard>, LoggingError> {
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.config.filter_directives()));

        let console = &self.config.console;
        let jsonl = &self.config.jsonl;

        let pretty_console = console.wants(ConsoleFormat::Pretty).then(|| {
            tracing_subscriber::fmt::layer()
                .with_ansi(console.ansi)
                .with_target(true)
        });

        let json_console = console.wants(ConsoleFormat::Json).then(|| {
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(jsonl.include_spans)
                .flatten_event(jsonl.flatten_events)
                .with_file(jsonl.include_location)
                .with_line_number(jsonl.include_location)
        });

        let (file_layer, guard) = match &self.config.file {
            Some(file_config) => {
                let (writer, guard) = file_writer(file_config)?;
                let layer = tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(jsonl.include_spans)
                    .flatten_event(jsonl.flatten_events)
                    .with_file(jsonl.include_location)
                    .with_line_number(jsonl.include_location)
                    .with_writer(writer);
                (Some(layer), Some(guard))
            }
            None => (None, None),
        };

        Registry::default()
            .with(env_filter)
            .with(SessionContextLayer::new())
            .with(pretty_console)
            .with(json_console)
            .with(file_layer)
            .try_init()
            .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))?;

        Ok(guard)
    }

    /// Install the subscriber globally, reporting failure on stderr
    pub fn init(self) -> Option<WorkerGuard> {
        match self.try_init() {
            Ok(guard) => guard,
            Err(e) => {
                eprintln!("Warning: {}", e);
                None
            }
        }
    }
}

impl Default for HuddleSubscriberBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Open the file sink: truncating for `Never`, rolling otherwise
fn file_writer(config: &FileConfig) -> Result<(NonBlocking, WorkerGuard), LoggingError> {
    fs::create_dir_all(&config.directory)?;
    let writer = match config.rotation {
        RotationStrategy::Never => {
            let path = config.directory.join(format!("{}.log", config.prefix));
            tracing_appender::non_blocking(File::create(path)?)
        }
        RotationStrategy::Daily => tracing_appender::non_blocking(RollingFileAppender::new(
            Rotation::DAILY,
            &config.directory,
            &config.prefix,
        )),
        RotationStrategy::Hourly => tracing_appender::non_blocking(RollingFileAppender::new(
            Rotation::HOURLY,
            &config.directory,
            &config.prefix,
        )),
    };
    Ok(writer)
}

/// JSON lines on stdout
pub fn init_default() {
    HuddleSubscriberBuilder::new().init();
}

/// Pretty debug output on stdout
pub fn init_development() {
    HuddleSubscriberBuilder::new()
        .with_config(LogConfig::development())
        .init();
}

/// Warnings only; a no-op if a subscriber is already installed
pub fn init_testing() {
    let _ = HuddleSubscriberBuilder::new()
        .with_config(LogConfig::testing())
        .try_init();
}
