//! Claude Code CLI backend
//!
//! Runs `claude --print --output-format stream-json`, feeding the prompt on
//! stdin. Every stdout line is a JSON object; assistant text blocks become
//! chat messages and the closing `result` object carries the summary.

use super::{prompt_with_context, CliBackend, ParsedLine};
use crate::config::ProcessConfig;
use ace_core::ChatMessage;
use serde::Deserialize;

const MODELS: &[&str] = &[
    "sonnet",
    "opus",
    "haiku",
    "claude-sonnet-4-5",
    "claude-opus-4-1",
    "claude-3-5-haiku-latest",
];

/// Claude Code command-line backend
#[derive(Debug, Clone, Copy, Default)]
pub struct ClaudeCodeCli;

impl ClaudeCodeCli {
    /// Create backend
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamLine {
    Assistant {
        message: StreamMessage,
    },
    Result {
        #[serde(default)]
        result: Option<String>,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct StreamMessage {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}

impl CliBackend for ClaudeCodeCli {
    fn name(&self) -> &str {
        "claude-code"
    }

    fn default_command(&self) -> &str {
        "claude"
    }

    fn supported_models(&self) -> Vec<String> {
        MODELS.iter().map(ToString::to_string).collect()
    }

    fn build_args(&self, config: &ProcessConfig) -> Vec<String> {
        let mut args: Vec<String> = ["--print", "--output-format", "stream-json", "--verbose"]
            .iter()
            .map(ToString::to_string)
            .collect();

        if let Some(model) = &config.model {
            args.push("--model".to_string());
            args.push(model.clone());
        }
        if !config.allowed_tools.is_empty() {
            args.push("--allowedTools".to_string());
            args.push(config.allowed_tools.join(","));
        }
        if !config.disallowed_tools.is_empty() {
            args.push("--disallowedTools".to_string());
            args.push(config.disallowed_tools.join(","));
        }

        args.push("--permission-mode".to_string());
        args.push(if config.is_read_only() { "plan" } else { "acceptEdits" }.to_string());

        args.extend(config.extra_args.iter().cloned());
        args
    }

    fn stdin_payload(&self, config: &ProcessConfig) -> Option<String> {
        Some(prompt_with_context(config))
    }

    fn parse_line(&self, line: &str) -> Option<ParsedLine> {
        let trimmed = line.trim();
        if !trimmed.starts_with('{') {
            return None;
        }

        let parsed = match serde_json::from_str::<StreamLine>(trimmed) {
            Ok(parsed) => parsed,
            // Well-formed JSON of an unknown shape carries nothing for the
            // transcript; anything else stays raw text.
            Err(_) => {
                return serde_json::from_str::<serde_json::Value>(trimmed)
                    .ok()
                    .map(|_| ParsedLine::Skip)
            }
        };

        match parsed {
            StreamLine::Assistant { message } => {
                let text: Vec<String> = message
                    .content
                    .into_iter()
                    .filter_map(|block| match block {
                        ContentBlock::Text { text } => Some(text),
                        ContentBlock::Other => None,
                    })
                    .collect();
                if text.is_empty() {
                    Some(ParsedLine::Skip)
                } else {
                    Some(ParsedLine::Chat(ChatMessage::assistant(text.join("\n"))))
                }
            }
            StreamLine::Result { result: Some(text) } => Some(ParsedLine::Result(text)),
            StreamLine::Result { result: None } | StreamLine::Other => Some(ParsedLine::Skip),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ace_core::{ChangeRequest, ProcessOptions};
    use pretty_assertions::assert_eq;

    fn config(overrides: ProcessOptions) -> ProcessConfig {
        let request = ChangeRequest::new("rename foo to bar", "/repo")
            .with_context_files(vec!["src/foo.rs".into()])
            .with_overrides(overrides);
        ProcessConfig::resolve(&ProcessOptions::new(), &request, "claude")
    }

    #[test]
    fn edit_mode_args() {
        let args = ClaudeCodeCli.build_args(&config(
            ProcessOptions::new()
                .with_model("sonnet")
                .with_allowed_tools(["Read", "Edit"])
                .with_disallowed_tools(["Bash"]),
        ));

        assert_eq!(
            args,
            vec![
                "--print",
                "--output-format",
                "stream-json",
                "--verbose",
                "--model",
                "sonnet",
                "--allowedTools",
                "Read,Edit",
                "--disallowedTools",
                "Bash",
                "--permission-mode",
                "acceptEdits",
            ]
        );
    }

    #[test]
    fn chat_only_uses_plan_mode_and_read_only_tools() {
        let args = ClaudeCodeCli.build_args(&config(ProcessOptions::new().with_chat_only(true)));
        let joined = args.join(" ");
        assert!(joined.contains("--allowedTools Read,LS,Grep"));
        assert!(joined.ends_with("--permission-mode plan"));
    }

    #[test]
    fn prompt_goes_to_stdin_with_context() {
        let payload = ClaudeCodeCli
            .stdin_payload(&config(ProcessOptions::new()))
            .unwrap();
        assert!(payload.starts_with("rename foo to bar"));
        assert!(payload.contains("- /repo/src/foo.rs"));
    }

    #[test]
    fn parses_assistant_text() {
        let line = r#"{"type":"assistant","message":{"role":"assistant","content":[{"type":"text","text":"Done."},{"type":"tool_use","id":"t1","name":"Edit","input":{}}]}}"#;
        assert_eq!(
            ClaudeCodeCli.parse_line(line),
            Some(ParsedLine::Chat(ChatMessage::assistant("Done.")))
        );
    }

    #[test]
    fn parses_result_and_skips_other_json() {
        let result = r#"{"type":"result","subtype":"success","is_error":false,"result":"Renamed foo."}"#;
        assert_eq!(
            ClaudeCodeCli.parse_line(result),
            Some(ParsedLine::Result("Renamed foo.".to_string()))
        );

        let init = r#"{"type":"system","subtype":"init","session_id":"abc"}"#;
        assert_eq!(ClaudeCodeCli.parse_line(init), Some(ParsedLine::Skip));

        let tool_only = r#"{"type":"assistant","message":{"content":[{"type":"tool_use","name":"Read"}]}}"#;
        assert_eq!(ClaudeCodeCli.parse_line(tool_only), Some(ParsedLine::Skip));

        let odd = r#"{"type":"user","message":{"content":"plain string"}}"#;
        assert_eq!(ClaudeCodeCli.parse_line(odd), Some(ParsedLine::Skip));
    }

    #[test]
    fn plain_text_stays_raw() {
        assert_eq!(ClaudeCodeCli.parse_line("Warning: slow network"), None);
        assert_eq!(ClaudeCodeCli.parse_line("{not json"), None);
    }
}
