//! Rolling file logging for embedding processes.
//!
//! # Responsibility
//! - Start one process-wide file logger for store diagnostics.
//! - Capture panics (including handler panics) into the log.
//!
//! # Invariants
//! - Repeating `init_logging` with an identical configuration is a no-op.
//! - A second, different configuration is rejected instead of replacing the
//!   active logger.
//! - Initialization never panics.

use flexi_logger::{
    Cleanup, Criterion, Duplicate, FileSpec, Logger, LoggerHandle, Naming, WriteMode,
};
use log::{error, info};
use once_cell::sync::OnceCell;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

const LOG_FILE_BASENAME: &str = "assetstore";
const MAX_LOG_FILE_SIZE_BYTES: u64 = 8 * 1024 * 1024;
const MAX_LOG_FILES: usize = 4;
const MAX_PANIC_PAYLOAD_CHARS: usize = 160;

static ACTIVE: OnceCell<ActiveLogger> = OnceCell::new();
static PANIC_HOOK_INSTALLED: OnceCell<()> = OnceCell::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn parse(value: &str) -> Result<Self, LoggingError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            other => Err(LoggingError::UnsupportedLevel(other.to_string())),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    /// `debug` for debug builds, `info` otherwise.
    pub fn build_default() -> Self {
        if cfg!(debug_assertions) {
            Self::Debug
        } else {
            Self::Info
        }
    }
}

/// What `init_logging` should start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: LogLevel,
    /// Absolute directory for rotated `assetstore*.log` files.
    pub log_dir: PathBuf,
    /// Mirror warnings and errors to stderr.
    pub warnings_to_stderr: bool,
}

impl LoggingConfig {
    pub fn new(level: LogLevel, log_dir: impl Into<PathBuf>) -> Self {
        Self {
            level,
            log_dir: log_dir.into(),
            warnings_to_stderr: false,
        }
    }

    pub fn warnings_to_stderr(mut self, enabled: bool) -> Self {
        self.warnings_to_stderr = enabled;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoggingError {
    UnsupportedLevel(String),
    InvalidLogDir(String),
    AlreadyInitialized {
        active: String,
        requested: String,
    },
    Backend(String),
}

impl Display for LoggingError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnsupportedLevel(value) => write!(
                f,
                "unsupported log level `{value}`; expected trace|debug|info|warn|error"
            ),
            Self::InvalidLogDir(message) => write!(f, "invalid log directory: {message}"),
            Self::AlreadyInitialized { active, requested } => write!(
                f,
                "logging already initialized with {active}; refusing to switch to {requested}"
            ),
            Self::Backend(message) => write!(f, "logger backend failed: {message}"),
        }
    }
}

impl Error for LoggingError {}

struct ActiveLogger {
    config: LoggingConfig,
    _handle: LoggerHandle,
}

/// Starts file logging for this process.
///
/// # Errors
/// - `InvalidLogDir` when the directory is empty, relative or cannot be created.
/// - `AlreadyInitialized` when a different configuration is already active.
/// - `Backend` when flexi_logger refuses to start.
pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingError> {
    validate_log_dir(config)?;

    if let Some(active) = ACTIVE.get() {
        return ensure_same(&active.config, config);
    }

    let active = ACTIVE.get_or_try_init(|| start(config))?;
    ensure_same(&active.config, config)
}

/// Active configuration, if logging was started.
pub fn logging_status() -> Option<LoggingConfig> {
    ACTIVE.get().map(|active| active.config.clone())
}

fn start(config: &LoggingConfig) -> Result<ActiveLogger, LoggingError> {
    std::fs::create_dir_all(&config.log_dir).map_err(|err| {
        LoggingError::InvalidLogDir(format!(
            "failed to create `{}`: {err}",
            config.log_dir.display()
        ))
    })?;

    let duplicate = if config.warnings_to_stderr {
        Duplicate::Warn
    } else {
        Duplicate::None
    };

    let handle = Logger::try_with_str(config.level.as_str())
        .map_err(|err| LoggingError::Backend(err.to_string()))?
        .log_to_file(
            FileSpec::default()
                .directory(config.log_dir.as_path())
                .basename(LOG_FILE_BASENAME),
        )
        .rotate(
            Criterion::Size(MAX_LOG_FILE_SIZE_BYTES),
            Naming::Numbers,
            Cleanup::KeepLogFiles(MAX_LOG_FILES),
        )
        .duplicate_to_stderr(duplicate)
        .write_mode(WriteMode::BufferAndFlush)
        .append()
        .format_for_files(flexi_logger::detailed_format)
        .start()
        .map_err(|err| LoggingError::Backend(err.to_string()))?;

    install_panic_hook_once();
    info!(
        "event=logging_start module=logging status=ok level={} version={}",
        config.level.as_str(),
        env!("CARGO_PKG_VERSION")
    );

    Ok(ActiveLogger {
        config: config.clone(),
        _handle: handle,
    })
}

fn validate_log_dir(config: &LoggingConfig) -> Result<(), LoggingError> {
    if config.log_dir.as_os_str().is_empty() {
        return Err(LoggingError::InvalidLogDir("path is empty".to_string()));
    }
    if !config.log_dir.is_absolute() {
        return Err(LoggingError::InvalidLogDir(format!(
            "`{}` is not absolute",
            config.log_dir.display()
        )));
    }
    Ok(())
}

fn ensure_same(active: &LoggingConfig, requested: &LoggingConfig) -> Result<(), LoggingError> {
    if active == requested {
        return Ok(());
    }
    Err(LoggingError::AlreadyInitialized {
        active: describe(active),
        requested: describe(requested),
    })
}

fn describe(config: &LoggingConfig) -> String {
    format!(
        "level `{}` at `{}`",
        config.level.as_str(),
        config.log_dir.display()
    )
}

fn install_panic_hook_once() {
    if PANIC_HOOK_INSTALLED.set(()).is_err() {
        return;
    }

    let previous_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let location = panic_info
            .location()
            .map(|loc| format!("{}:{}", loc.file(), loc.line()))
            .unwrap_or_else(|| "unknown".to_string());
        let payload = if let Some(message) = panic_info.payload().downcast_ref::<&str>() {
            (*message).to_string()
        } else if let Some(message) = panic_info.payload().downcast_ref::<String>() {
            message.clone()
        } else {
            "non-string panic payload".to_string()
        };
        error!(
            "event=panic_captured module=logging status=error location={} payload={}",
            location,
            sanitize_message(&payload, MAX_PANIC_PAYLOAD_CHARS)
        );
        previous_hook(panic_info);
    }));
}

/// Single-line, length-capped form of a free-text message.
fn sanitize_message(value: &str, max_chars: usize) -> String {
    let normalized = value.replace(['\n', '\r'], " ");
    let mut truncated = normalized.chars().take(max_chars).collect::<String>();
    if normalized.chars().count() > max_chars {
        truncated.push_str("...");
    }
    truncated
}
