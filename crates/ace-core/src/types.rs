//! Core data model
//!
//! - Change summaries returned by every engine
//! - Chat messages parsed from structured engine output
//! - Per-call change requests

use crate::cancel::CancellationToken;
use crate::events::EventSender;
use crate::options::ProcessOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Diff for a single file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    /// Repository-relative path
    pub path: String,
    /// Unified-diff text for this file
    pub diff: String,
}

impl FileChange {
    /// Create a file change
    #[inline]
    #[must_use]
    pub fn new(path: impl Into<String>, diff: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            diff: diff.into(),
        }
    }
}

/// Result of one successful engine invocation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangesSummary {
    /// Changed files in encounter order
    pub files: Vec<FileChange>,
    /// Free-text summary
    pub summary: String,
}

impl ChangesSummary {
    /// Build from unified-diff text
    #[must_use]
    pub fn from_unified_diff(diff: &str, summary: impl Into<String>) -> Self {
        Self {
            files: crate::diff::split_file_diffs(diff),
            summary: summary.into(),
        }
    }

    /// Whether no file changed
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Changed paths
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.iter().map(|f| f.path.as_str())
    }

    /// All file diffs concatenated
    #[must_use]
    pub fn unified_diff(&self) -> String {
        self.files.iter().map(|f| f.diff.as_str()).collect()
    }
}

/// Speaker of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    /// Caller
    User,
    /// Engine model
    Assistant,
    /// Engine harness
    System,
    /// Tool invocation or result
    Tool,
}

/// Conversational output from an engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Speaker
    pub role: ChatRole,
    /// Text content
    pub content: String,
}

impl ChatMessage {
    /// Assistant message
    #[inline]
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }

    /// Message with an explicit role
    #[inline]
    #[must_use]
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Per-call input to an engine
#[derive(Debug, Clone)]
pub struct ChangeRequest {
    /// Natural-language instruction
    pub instruction: String,
    /// Repository checkout the engine works in
    pub repo_path: PathBuf,
    /// Files to put in the engine's context
    pub context_files: Vec<PathBuf>,
    /// Per-call option overrides
    pub overrides: ProcessOptions,
    /// Cancellation shared with the caller
    pub cancel: Option<CancellationToken>,
    /// Progress event stream
    pub events: Option<EventSender>,
}

impl ChangeRequest {
    /// Request with no overrides, cancellation or event stream
    #[must_use]
    pub fn new(instruction: impl Into<String>, repo_path: impl AsRef<Path>) -> Self {
        Self {
            instruction: instruction.into(),
            repo_path: repo_path.as_ref().to_path_buf(),
            context_files: Vec::new(),
            overrides: ProcessOptions::default(),
            cancel: None,
            events: None,
        }
    }

    /// With context files
    #[inline]
    #[must_use]
    pub fn with_context_files(mut self, files: Vec<PathBuf>) -> Self {
        self.context_files = files;
        self
    }

    /// With option overrides
    #[inline]
    #[must_use]
    pub fn with_overrides(mut self, overrides: ProcessOptions) -> Self {
        self.overrides = overrides;
        self
    }

    /// With a cancellation token
    #[inline]
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// With an event stream
    #[inline]
    #[must_use]
    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = Some(events);
        self
    }

    /// Context files made absolute against the repository
    #[must_use]
    pub fn resolved_context_files(&self) -> Vec<PathBuf> {
        self.context_files
            .iter()
            .map(|f| {
                if f.is_absolute() {
                    f.clone()
                } else {
                    self.repo_path.join(f)
                }
            })
            .collect()
    }
}
