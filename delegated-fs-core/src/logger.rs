//! Bridge from the `log` facade to a host-provided sink.
//!
//! Hosts that do not install a `log` backend of their own (for example an
//! embedding service with its own telemetry) can hand a [`Logger`] to
//! [`set_logger`] and receive every engine record through it.

use std::sync::{Arc, OnceLock};

/// Sink for log records emitted by the engine and its adapters.
///
/// # Examples
///
/// ```rust
/// use delegated_fs_core::logger::{LogLevel, Logger};
///
/// struct StderrLogger;
///
/// impl Logger for StderrLogger {
///     fn log(&self, level: LogLevel, message: String) {
///         eprintln!("[{level:?}] {message}");
///     }
/// }
/// ```
pub trait Logger: Sync + Send {
    /// Receives one formatted record.
    fn log(&self, level: LogLevel, message: String);
}

/// Severity of a forwarded record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Very low priority, extremely detailed messages.
    Trace,
    /// Lower priority debugging information.
    Debug,
    /// Progress of normal operation.
    Info,
    /// Rejected requests and other recoverable conditions.
    Warn,
    /// Failures.
    Error,
}

struct ForwardingLogger;

impl log::Log for ForwardingLogger {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        if !should_forward(record.level(), record.module_path()) {
            return;
        }

        if let Some(logger) = LOGGER_INSTANCE.get() {
            logger.log(log_level(record.level()), format!("{}", record.args()));
        } else {
            eprintln!("Logger not set: {}", record.args());
        }
    }

    fn flush(&self) {}
}

/// Debug and trace records from dependencies are dropped; everything else
/// is forwarded.
fn should_forward(level: log::Level, module_path: Option<&str>) -> bool {
    let from_engine = module_path.is_some_and(|path| path.starts_with("delegated_fs"));
    let verbose = matches!(level, log::Level::Debug | log::Level::Trace);
    from_engine || !verbose
}

const fn log_level(level: log::Level) -> LogLevel {
    match level {
        log::Level::Error => LogLevel::Error,
        log::Level::Warn => LogLevel::Warn,
        log::Level::Info => LogLevel::Info,
        log::Level::Debug => LogLevel::Debug,
        log::Level::Trace => LogLevel::Trace,
    }
}

static LOGGER_INSTANCE: OnceLock<Arc<dyn Logger>> = OnceLock::new();

/// Installs `logger` as the process-wide sink.
///
/// Only the first call takes effect; later calls are ignored. If another
/// `log` backend is already installed, records keep flowing to that backend
/// instead.
pub fn set_logger(logger: Arc<dyn Logger>) {
    static LOGGER: ForwardingLogger = ForwardingLogger;

    if LOGGER_INSTANCE.set(logger).is_err() {
        eprintln!("Logger already set");
        return;
    }

    if let Err(e) = log::set_logger(&LOGGER) {
        eprintln!("Failed to set logger: {e}");
        return;
    }
    log::set_max_level(log::LevelFilter::Trace);
}
