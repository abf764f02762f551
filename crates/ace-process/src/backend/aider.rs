//! Aider CLI backend
//!
//! Aider takes the instruction as `--message` and the context files as
//! positional arguments, prints plain text and describes its edits as
//! SEARCH/REPLACE blocks.

use super::{CliBackend, ParsedLine};
use crate::config::ProcessConfig;

const MODELS: &[&str] = &[
    "sonnet",
    "opus",
    "gpt-4o",
    "o3-mini",
    "deepseek",
    "gemini/gemini-2.5-pro",
];

/// Aider command-line backend
#[derive(Debug, Clone, Copy, Default)]
pub struct AiderCli;

impl AiderCli {
    /// Create backend
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl CliBackend for AiderCli {
    fn name(&self) -> &str {
        "aider"
    }

    fn default_command(&self) -> &str {
        "aider"
    }

    fn supported_models(&self) -> Vec<String> {
        MODELS.iter().map(ToString::to_string).collect()
    }

    fn build_args(&self, config: &ProcessConfig) -> Vec<String> {
        let mut args = vec![
            "--message".to_string(),
            config.instruction.clone(),
            "--yes-always".to_string(),
            "--no-auto-commits".to_string(),
            "--no-pretty".to_string(),
        ];

        if let Some(model) = &config.model {
            args.push("--model".to_string());
            args.push(model.clone());
        }
        if config.preview {
            args.push("--dry-run".to_string());
        }
        if config.chat_only {
            args.push("--chat-mode".to_string());
            args.push("ask".to_string());
        }

        args.extend(config.extra_args.iter().cloned());
        args.extend(
            config
                .context_files
                .iter()
                .map(|f| f.display().to_string()),
        );
        args
    }

    fn parse_line(&self, _line: &str) -> Option<ParsedLine> {
        None
    }
}
