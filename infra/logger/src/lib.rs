//! # Logger
//!
//! Centralized logging for generated services: console and rolling-file
//! layers with non-blocking I/O and environment-based filtering, behind a
//! single builder.
//!
//! * Optional `opentelemetry` support attaches a tracing layer that uses the
//!   global `OpenTelemetry` tracer. Configure a tracer provider before calling
//!   [`LoggerBuilder::init`].
//! * Optional `opentelemetry-otlp` helper installs an `OTLP` tracer provider.
//! * Use [`LoggerBuilder::env_filter`] to set module-directed filters
//!   (e.g., `"keel=debug,hyper=info"`), in addition to `RUST_LOG`.
//!
//! ## Example
//!
//! ```rust
//! # use keel_logger::{Logger, LevelFilter};
//!
//! let _logger = Logger::builder()
//!     .name("my-service")
//!     .console(true)
//!     .level(LevelFilter::DEBUG)
//!     .init()
//!     .unwrap();
//! ```

mod error;
#[cfg(feature = "opentelemetry-otlp")]
mod otlp;

pub use crate::error::LoggerError;
#[cfg(feature = "opentelemetry-otlp")]
pub use crate::otlp::{OtlpTracer, init_otlp_tracer};
pub use tracing::level_filters::LevelFilter;
pub use tracing_appender::rolling::Rotation;

use parking_lot::Mutex;
use std::fs;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::RollingFileAppender;
use tracing_subscriber::fmt::layer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

const DEFAULT_MAX_FILES: usize = 10;
const LOG_FILE_SUFFIX: &str = "log";

/// Parses a configured level string into a [`LevelFilter`].
///
/// Accepts the levels a service config declares (`debug`, `info`,
/// `warning`/`warn`, `error`) plus `trace` and `off`.
///
/// # Errors
/// Returns [`LoggerError::InvalidConfiguration`] for unrecognized values.
pub fn parse_level(level: &str) -> Result<LevelFilter, LoggerError> {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => Ok(LevelFilter::TRACE),
        "debug" => Ok(LevelFilter::DEBUG),
        "info" => Ok(LevelFilter::INFO),
        "warn" | "warning" => Ok(LevelFilter::WARN),
        "error" => Ok(LevelFilter::ERROR),
        "off" => Ok(LevelFilter::OFF),
        other => Err(LoggerError::InvalidConfiguration {
            message: format!("Unknown log level '{other}'").into(),
            context: None,
        }),
    }
}

/// A builder for configuring and initializing the global tracing subscriber.
#[must_use = "builders do nothing unless you call .init()"]
#[derive(Debug)]
pub struct LoggerBuilder {
    name: Option<String>,
    console: bool,
    json: bool,
    path: Option<PathBuf>,
    level: LevelFilter,
    rotation: Rotation,
    max_files: usize,
    env_filter: Option<String>,
    #[cfg(feature = "opentelemetry")]
    opentelemetry: bool,
}

impl Default for LoggerBuilder {
    fn default() -> Self {
        Self {
            name: None,
            console: true,
            json: false,
            path: None,
            level: LevelFilter::INFO,
            rotation: Rotation::DAILY,
            max_files: DEFAULT_MAX_FILES,
            env_filter: None,
            #[cfg(feature = "opentelemetry")]
            opentelemetry: false,
        }
    }
}

impl LoggerBuilder {
    /// Sets the logger name, used as the rolling-file prefix
    /// (e.g. `my-service.2026-08-06.log`). Required.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Configures the minimum log level to be emitted.
    pub const fn level(mut self, level: LevelFilter) -> Self {
        self.level = level;
        self
    }

    /// Adds an explicit env filter (e.g., `keel=debug,hyper=info`).
    ///
    /// Environment variables still override via `RUST_LOG`; this is a
    /// programmatic default. Invalid filters will cause
    /// [`LoggerBuilder::init`] to return an error.
    pub fn env_filter(mut self, filter: impl Into<String>) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    /// Enables console logging.
    pub const fn console(mut self, enabled: bool) -> Self {
        self.console = enabled;
        self
    }

    /// Enables JSON formatting for the file layer.
    pub const fn json(mut self, enabled: bool) -> Self {
        self.json = enabled;
        self
    }

    /// Sets the directory for rolling log files; enables the file layer.
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Configures the log file rotation strategy.
    pub const fn rotation(mut self, rotation: Rotation) -> Self {
        self.rotation = rotation;
        self
    }

    /// Configures the maximum number of log files to keep.
    pub const fn max_files(mut self, max: usize) -> Self {
        self.max_files = max;
        self
    }

    /// Enables `OpenTelemetry` tracing via `tracing-opentelemetry`.
    ///
    /// Attaches a tracing layer backed by the global `OpenTelemetry` tracer.
    /// Install a tracer provider before calling [`LoggerBuilder::init`].
    #[cfg(feature = "opentelemetry")]
    pub const fn opentelemetry(mut self, enabled: bool) -> Self {
        self.opentelemetry = enabled;
        self
    }

    /// Consumes the builder and initializes the global tracing subscriber.
    ///
    /// # Returns
    /// A [`Logger`] handle holding the non-blocking worker guard. Keep it
    /// alive until shutdown so buffered records are flushed.
    ///
    /// # Errors
    /// Returns [`LoggerError::Subscriber`] if a global subscriber has already
    /// been set, and [`LoggerError::InvalidConfiguration`] for invalid
    /// builder settings.
    pub fn init(self) -> Result<Logger, LoggerError> {
        let name = self.validate()?;
        let env_filter = self.build_env_filter()?;

        let mut layers = Vec::new();

        if self.console {
            layers.push(layer().compact().with_ansi(true).boxed());
        }

        #[cfg(feature = "opentelemetry")]
        if self.opentelemetry {
            let tracer = opentelemetry::global::tracer(name.clone());
            layers.push(tracing_opentelemetry::layer().with_tracer(tracer).boxed());
        }

        let guard = if let Some(path) = &self.path {
            fs::create_dir_all(path).map_err(|e| LoggerError::Internal {
                message: e.to_string().into(),
                context: Some(format!("Failed to create path: {}", path.display()).into()),
            })?;

            let file_appender = RollingFileAppender::builder()
                .rotation(self.rotation.clone())
                .filename_prefix(&name)
                .filename_suffix(LOG_FILE_SUFFIX)
                .max_log_files(self.max_files)
                .build(path)?;

            let (non_blocking, g) = tracing_appender::non_blocking(file_appender);

            let file_layer = layer().with_writer(non_blocking).with_ansi(false);

            let boxed = if self.json { file_layer.json().boxed() } else { file_layer.boxed() };

            layers.push(boxed);
            Some(g)
        } else {
            None
        };

        if layers.is_empty() {
            return Err(LoggerError::InvalidConfiguration {
                message:
                    "No logging layers enabled. Enable console, file output, or OpenTelemetry."
                        .into(),
                context: None,
            });
        }

        tracing_subscriber::registry().with(env_filter).with(layers).try_init()?;

        Ok(Logger { guard: Mutex::new(guard) })
    }

    fn validate(&self) -> Result<String, LoggerError> {
        let name = self.name.clone().unwrap_or_default();
        if name.trim().is_empty() {
            return Err(LoggerError::InvalidConfiguration {
                message: "Logger name cannot be empty".into(),
                context: None,
            });
        }

        if self.max_files == 0 {
            return Err(LoggerError::InvalidConfiguration {
                message: "max_files must be greater than zero".into(),
                context: None,
            });
        }

        Ok(name)
    }

    fn build_env_filter(&self) -> Result<EnvFilter, LoggerError> {
        let builder = EnvFilter::builder().with_default_directive(self.level.into());
        self.env_filter.as_ref().map_or_else(
            || Ok(builder.from_env_lossy()),
            |filter| {
                builder.parse(filter).map_err(|e| LoggerError::InvalidConfiguration {
                    message: format!("Invalid env filter '{filter}': {e}").into(),
                    context: None,
                })
            },
        )
    }
}

/// A handle to the initialized logging system.
///
/// Holds the background worker guard; [`Logger::close`] (or dropping the
/// handle) flushes pending records and stops the worker.
#[must_use = "Dropping this handle will stop background logging threads."]
#[derive(Debug)]
pub struct Logger {
    guard: Mutex<Option<WorkerGuard>>,
}

impl Logger {
    /// Returns a new [`LoggerBuilder`] to configure the global tracing subscriber.
    pub fn builder() -> LoggerBuilder {
        LoggerBuilder::default()
    }

    /// A handle for a subscriber owned by the embedding application.
    ///
    /// No layers are installed and no worker guard is held; `close` is a
    /// no-op. Used when a global subscriber already exists.
    #[must_use]
    pub const fn external() -> Self {
        Self { guard: Mutex::new(None) }
    }

    /// Best-effort synchronization point before shutdown.
    pub fn flush(&self) {
        tracing::debug!("Logger flushed");
    }

    /// Flushes and releases the non-blocking worker. Safe to call multiple
    /// times; only the first call has an effect.
    pub fn close(&self) {
        if let Some(guard) = self.guard.lock().take() {
            tracing::info!("Logging system shutting down, flushing buffers...");
            drop(guard);
        }
    }

    /// Whether the background worker is still attached.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.guard.lock().is_some()
    }
}

impl Drop for Logger {
    fn drop(&mut self) {
        self.close();
    }
}
