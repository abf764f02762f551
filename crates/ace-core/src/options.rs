//! Caller-supplied invocation options
//!
//! [`ProcessOptions`] is the partial, "requested" side: every field is
//! optional and layers are merged field by field. Resolution into a fully
//! populated configuration happens once per call in the executing crate.

use serde::{Deserialize, Serialize};

/// Read-only tool subset forced by chat-only mode
pub const READ_ONLY_TOOLS: &[&str] = &["Read", "LS", "Grep"];

/// Default per-call timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Partial invocation options
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessOptions {
    /// Executable to launch
    pub command: Option<String>,
    /// Model identifier
    pub model: Option<String>,
    /// Plan without editing files
    pub preview: Option<bool>,
    /// Conversation only, read-only tools
    pub chat_only: Option<bool>,
    /// Tools the engine may use
    pub allowed_tools: Option<Vec<String>>,
    /// Tools the engine must not use
    pub disallowed_tools: Option<Vec<String>>,
    /// Per-call timeout
    pub timeout_secs: Option<u64>,
    /// Extra arguments appended to the command line
    pub extra_args: Option<Vec<String>>,
}

impl ProcessOptions {
    /// Empty options
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Layer `self` over `base`: set fields of `self` win
    #[must_use]
    pub fn over(&self, base: &ProcessOptions) -> ProcessOptions {
        ProcessOptions {
            command: self.command.clone().or_else(|| base.command.clone()),
            model: self.model.clone().or_else(|| base.model.clone()),
            preview: self.preview.or(base.preview),
            chat_only: self.chat_only.or(base.chat_only),
            allowed_tools: self
                .allowed_tools
                .clone()
                .or_else(|| base.allowed_tools.clone()),
            disallowed_tools: self
                .disallowed_tools
                .clone()
                .or_else(|| base.disallowed_tools.clone()),
            timeout_secs: self.timeout_secs.or(base.timeout_secs),
            extra_args: self.extra_args.clone().or_else(|| base.extra_args.clone()),
        }
    }

    /// With command
    #[inline]
    #[must_use]
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    /// With model
    #[inline]
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// With preview flag
    #[inline]
    #[must_use]
    pub fn with_preview(mut self, preview: bool) -> Self {
        self.preview = Some(preview);
        self
    }

    /// With chat-only flag
    #[inline]
    #[must_use]
    pub fn with_chat_only(mut self, chat_only: bool) -> Self {
        self.chat_only = Some(chat_only);
        self
    }

    /// With allow-list
    #[must_use]
    pub fn with_allowed_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_tools = Some(tools.into_iter().map(Into::into).collect());
        self
    }

    /// With deny-list
    #[must_use]
    pub fn with_disallowed_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.disallowed_tools = Some(tools.into_iter().map(Into::into).collect());
        self
    }

    /// With timeout
    #[inline]
    #[must_use]
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// With extra arguments
    #[must_use]
    pub fn with_extra_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_args = Some(args.into_iter().map(Into::into).collect());
        self
    }
}
