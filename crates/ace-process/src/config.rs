//! Effective per-call configuration
//!
//! [`ProcessConfig`] is resolved once at the start of a call from three
//! layers, highest precedence first:
//! 1. Per-call overrides carried by the request
//! 2. Engine-level defaults
//! 3. Built-in defaults
//!
//! Chat-only mode then forces the read-only tool subset unless the call
//! named its own allow-list. The result is never mutated afterwards.

use ace_core::{ChangeRequest, ProcessOptions, DEFAULT_TIMEOUT_SECS, READ_ONLY_TOOLS};
use std::path::PathBuf;
use std::time::Duration;

/// Fully resolved invocation settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessConfig {
    /// Executable
    pub command: String,
    /// Model identifier
    pub model: Option<String>,
    /// Plan without editing
    pub preview: bool,
    /// Conversation only
    pub chat_only: bool,
    /// Tools the engine may use
    pub allowed_tools: Vec<String>,
    /// Tools the engine must not use
    pub disallowed_tools: Vec<String>,
    /// Deadline for the whole call
    pub timeout: Duration,
    /// Repository checkout, used as the working directory
    pub working_dir: PathBuf,
    /// Instruction text
    pub instruction: String,
    /// Context files, absolute
    pub context_files: Vec<PathBuf>,
    /// Extra command-line arguments
    pub extra_args: Vec<String>,
}

impl ProcessConfig {
    /// Resolve the effective configuration for one request
    #[must_use]
    pub fn resolve(defaults: &ProcessOptions, request: &ChangeRequest, default_command: &str) -> Self {
        let merged = request.overrides.over(defaults);
        let chat_only = merged.chat_only.unwrap_or(false);

        let allowed_tools = match (&request.overrides.allowed_tools, chat_only) {
            (Some(explicit), _) => explicit.clone(),
            (None, true) => READ_ONLY_TOOLS.iter().map(ToString::to_string).collect(),
            (None, false) => merged.allowed_tools.unwrap_or_default(),
        };

        Self {
            command: merged
                .command
                .unwrap_or_else(|| default_command.to_string()),
            model: merged.model,
            preview: merged.preview.unwrap_or(false),
            chat_only,
            allowed_tools,
            disallowed_tools: merged.disallowed_tools.unwrap_or_default(),
            timeout: Duration::from_secs(merged.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)),
            working_dir: request.repo_path.clone(),
            instruction: request.instruction.clone(),
            context_files: request.resolved_context_files(),
            extra_args: merged.extra_args.unwrap_or_default(),
        }
    }

    /// Whether the engine must not edit files
    #[inline]
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.preview || self.chat_only
    }
}
