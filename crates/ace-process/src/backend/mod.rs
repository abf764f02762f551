//! CLI backends
//!
//! A backend knows how to turn a [`ProcessConfig`] into a command line and
//! how to read the lines its tool prints. Spawning and supervision are the
//! executor's job.

mod aider;
mod claude_code;

pub use aider::AiderCli;
pub use claude_code::ClaudeCodeCli;

use crate::config::ProcessConfig;
use ace_core::ChatMessage;
use std::fmt::Write as _;

/// Interpretation of one output line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedLine {
    /// Conversational output
    Chat(ChatMessage),
    /// Final result text reported by the tool
    Result(String),
    /// Structured line with nothing to keep
    Skip,
}

/// Command-line coding tool
pub trait CliBackend: Send + Sync {
    /// Backend name
    fn name(&self) -> &str;

    /// Executable used when none is configured
    fn default_command(&self) -> &str;

    /// Model identifiers the tool accepts
    fn supported_models(&self) -> Vec<String>;

    /// Arguments for one invocation
    fn build_args(&self, config: &ProcessConfig) -> Vec<String>;

    /// Text written to stdin, if the tool reads its prompt there
    fn stdin_payload(&self, _config: &ProcessConfig) -> Option<String> {
        None
    }

    /// Interpret an output line; `None` keeps it as raw text
    fn parse_line(&self, line: &str) -> Option<ParsedLine>;
}

/// Instruction followed by a list of context files
pub(crate) fn prompt_with_context(config: &ProcessConfig) -> String {
    let mut prompt = config.instruction.clone();
    if !config.context_files.is_empty() {
        prompt.push_str("\n\nRelevant files:\n");
        for file in &config.context_files {
            let _ = writeln!(prompt, "- {}", file.display());
        }
    }
    prompt
}
