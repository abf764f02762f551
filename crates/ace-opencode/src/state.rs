//! Server lifecycle states
//!
//! ```text
//! Stopped -> Starting -> Running -> Stopping -> Stopped
//!               |
//!               +-> Failed -> Starting
//! ```

use ace_core::EngineError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of the managed server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerStatus {
    /// No process
    Stopped,
    /// Process launched, waiting for readiness
    Starting,
    /// Accepting requests
    Running,
    /// Terminating the process
    Stopping,
    /// Launch or readiness failed
    Failed,
}

impl ServerStatus {
    /// Whether a start request must be refused
    #[inline]
    #[must_use]
    pub fn is_active(self) -> bool {
        matches!(self, Self::Starting | Self::Running)
    }

    /// Lowercase name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transition outside the lifecycle table
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal server transition {from} -> {to}")]
pub struct IllegalTransition {
    /// Current state
    pub from: ServerStatus,
    /// Requested state
    pub to: ServerStatus,
}

impl From<IllegalTransition> for EngineError {
    fn from(err: IllegalTransition) -> Self {
        EngineError::Process {
            exit_code: None,
            message: err.to_string(),
        }
    }
}

/// Validate a lifecycle transition
///
/// # Errors
/// [`IllegalTransition`] when `to` is not reachable from `from`
pub fn validate_transition(from: ServerStatus, to: ServerStatus) -> Result<(), IllegalTransition> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(IllegalTransition { from, to })
    }
}

/// States reachable from `from` in one step
#[must_use]
pub fn allowed_transitions(from: ServerStatus) -> Vec<ServerStatus> {
    use ServerStatus::{Failed, Running, Starting, Stopped, Stopping};
    match from {
        Stopped | Failed => vec![Starting],
        Starting => vec![Running, Failed],
        Running => vec![Stopping],
        Stopping => vec![Stopped],
    }
}

/// Snapshot of the managed server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerHandle {
    /// Host the server binds
    pub host: String,
    /// Port the server binds
    pub port: u16,
    /// Lifecycle state
    pub status: ServerStatus,
    /// Process id while a process exists
    pub pid: Option<u32>,
}

impl ServerHandle {
    /// Stopped handle for an address
    #[must_use]
    pub fn stopped(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            status: ServerStatus::Stopped,
            pid: None,
        }
    }

    /// Base URL of the server
    #[must_use]
    pub fn url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}
