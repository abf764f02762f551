//! Error types for ACE
//!
//! Every failure that crosses a component boundary is an [`EngineError`]:
//! - Unsafe instructions rejected before dispatch
//! - Duplicate server starts
//! - Timeouts and cancellations
//! - Subprocess and transport failures

use std::time::Duration;

/// Result alias used at every boundary
pub type EngineResult<T> = Result<T, EngineError>;

/// Main engine error type
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Instruction matched a safety rule
    #[error("unsafe instruction rejected: {0}")]
    Validation(#[from] SafetyViolation),

    /// Server start requested while starting or running
    #[error("server already running at {url}")]
    AlreadyRunning { url: String },

    /// Deadline elapsed before the operation finished
    #[error("operation timed out after {}ms", .after.as_millis())]
    Timeout { after: Duration },

    /// Cancelled through a cancellation token
    #[error("operation cancelled")]
    Cancelled,

    /// Spawn failure or nonzero exit
    #[error("process failed (exit code {exit_code:?}): {message}")]
    Process {
        /// Exit code, `None` when the process never ran or died by signal
        exit_code: Option<i32>,
        /// Spawn error or stderr tail
        message: String,
    },

    /// Backend output could not be interpreted
    #[error("unexpected engine output: {0}")]
    Parse(String),

    /// Transport failure talking to a server backend
    #[error("http error: {0}")]
    Http(String),

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Local I/O failure
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Classify without the payload
    #[inline]
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::AlreadyRunning { .. } => ErrorKind::AlreadyRunning,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Process { .. } => ErrorKind::Process,
            Self::Parse(_) => ErrorKind::Parse,
            Self::Http(_) => ErrorKind::Http,
            Self::Config(_) => ErrorKind::Config,
            Self::Io(_) => ErrorKind::Io,
        }
    }

    /// Check if a retry could plausibly succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::Process { .. } | Self::Http(_) | Self::Io(_)
        )
    }

    /// Create a process error for a failed spawn
    #[inline]
    pub fn spawn_failed(message: impl Into<String>) -> Self {
        Self::Process {
            exit_code: None,
            message: message.into(),
        }
    }
}

/// Error kind without payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Unsafe instruction
    Validation,
    /// Duplicate server start
    AlreadyRunning,
    /// Deadline elapsed
    Timeout,
    /// Cancelled by caller
    Cancelled,
    /// Subprocess failure
    Process,
    /// Unexpected output
    Parse,
    /// Transport failure
    Http,
    /// Bad configuration
    Config,
    /// Local I/O
    Io,
}

impl ErrorKind {
    /// Stable lowercase name, used as a metrics tag
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::AlreadyRunning => "already_running",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::Process => "process",
            Self::Parse => "parse",
            Self::Http => "http",
            Self::Config => "config",
            Self::Io => "io",
        }
    }
}

/// Rejection produced by the instruction validator
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{description}")]
pub struct SafetyViolation {
    /// Description of the first matching rule
    pub description: String,
    /// Severity of that rule
    pub severity: crate::safety::Severity,
}
