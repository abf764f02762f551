//! Configuration loading
//!
//! Layers, highest precedence first:
//! 1. Command-line flags (applied by the binary)
//! 2. Environment: `ACE_ENGINE`, `OPENCODE_HOST`, `OPENCODE_PORT`
//! 3. TOML file
//! 4. Built-in defaults
//!
//! A missing default file is not an error.

use ace_core::{EngineError, EngineResult, InstructionValidator, ProcessOptions, SafetyRuleSpec};
use ace_opencode::{EnvLookup, OpenCodeOptions, ServerOptions, HOST_ENV, PORT_ENV};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable selecting the engine
pub const ENGINE_ENV: &str = "ACE_ENGINE";

/// File looked up in the working directory when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "ace.toml";

/// Engine used when nothing selects one
pub const DEFAULT_ENGINE: &str = "opencode";

/// `[opencode]` table
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OpenCodeSection {
    /// Server launch settings
    #[serde(flatten)]
    pub server: ServerOptions,
    /// Engine settings
    #[serde(flatten)]
    pub engine: OpenCodeOptions,
}

/// `[safety]` table
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SafetySection {
    /// Rules appended after the built-in table
    pub extra_rules: Vec<SafetyRuleSpec>,
}

/// Whole configuration file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AceConfig {
    /// Engine selection key
    pub engine: Option<String>,
    /// OpenCode server and engine
    pub opencode: OpenCodeSection,
    /// Defaults shared by CLI engines
    pub process: ProcessOptions,
    /// Claude Code overrides, layered over `process`
    #[serde(rename = "claude-code")]
    pub claude_code: ProcessOptions,
    /// Aider overrides, layered over `process`
    pub aider: ProcessOptions,
    /// Safety rules
    pub safety: SafetySection,
}

impl AceConfig {
    /// Parse TOML text
    ///
    /// # Errors
    /// `EngineError::Config` on invalid TOML or unknown keys
    pub fn from_toml(text: &str) -> EngineResult<Self> {
        toml::from_str(text).map_err(|e| EngineError::Config(e.to_string()))
    }

    /// Read a file that must exist
    ///
    /// # Errors
    /// `EngineError::Config` when the file cannot be read or parsed
    pub fn from_file(path: &Path) -> EngineResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml(&text)
            .map_err(|e| EngineError::Config(format!("{}: {e}", path.display())))
    }

    /// Load an explicit file, or `ace.toml` in `dir` if present
    ///
    /// # Errors
    /// `EngineError::Config` when an existing file is invalid or an
    /// explicit file is missing
    pub fn load(explicit: Option<&Path>, dir: &Path) -> EngineResult<Self> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => {
                let path: PathBuf = dir.join(DEFAULT_CONFIG_FILE);
                if path.is_file() {
                    tracing::debug!(path = %path.display(), "loading config");
                    Self::from_file(&path)
                } else {
                    tracing::debug!("no config file, using defaults");
                    Ok(Self::default())
                }
            }
        }
    }

    /// Apply environment overrides
    ///
    /// Environment beats the file for the engine key and the server address.
    #[must_use]
    pub fn with_env(mut self, env: &EnvLookup) -> Self {
        if let Some(engine) = env.get(ENGINE_ENV) {
            self.engine = Some(engine);
        }
        if let Some(host) = env.get(HOST_ENV) {
            self.opencode.server.host = Some(host);
        }
        if let Some(port) = env.get(PORT_ENV) {
            match port.trim().parse() {
                Ok(port) => self.opencode.server.port = Some(port),
                Err(_) => tracing::warn!(value = %port, "ignoring invalid {PORT_ENV}"),
            }
        }
        self
    }

    /// Selected engine key
    #[must_use]
    pub fn engine_key(&self) -> &str {
        self.engine.as_deref().unwrap_or(DEFAULT_ENGINE)
    }

    /// Built-in safety rules plus configured ones
    ///
    /// # Errors
    /// `EngineError::Config` when a configured pattern does not compile
    pub fn validator(&self) -> EngineResult<InstructionValidator> {
        InstructionValidator::with_extra_rules(&self.safety.extra_rules)
    }

    /// Effective Claude Code defaults
    #[must_use]
    pub fn claude_code_defaults(&self) -> ProcessOptions {
        self.claude_code.over(&self.process)
    }

    /// Effective Aider defaults
    #[must_use]
    pub fn aider_defaults(&self) -> ProcessOptions {
        self.aider.over(&self.process)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ace_core::Severity;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    const FULL: &str = r#"
        engine = "claude-code"

        [opencode]
        host = "127.0.0.1"
        port = 4100
        command = "/opt/bin/opencode"
        startup_timeout_secs = 20
        auto_start = false
        model = "anthropic/claude-sonnet-4"

        [process]
        model = "sonnet"
        allowed_tools = ["Read", "Edit", "Write"]
        timeout_secs = 120

        [claude-code]
        command = "/usr/local/bin/claude"

        [aider]
        model = "gpt-4o"

        [[safety.extra_rules]]
        pattern = '\bshutdown\b'
        description = "System shutdown"
        severity = "high"
    "#;

    fn no_env() -> EnvLookup {
        EnvLookup::from_pairs(Vec::<(String, String)>::new())
    }

    #[test]
    fn parses_every_section() {
        let config = AceConfig::from_toml(FULL).unwrap();

        assert_eq!(config.engine_key(), "claude-code");
        assert_eq!(config.opencode.server.command, "/opt/bin/opencode");
        assert_eq!(config.opencode.server.port, Some(4100));
        assert_eq!(config.opencode.server.startup_timeout, Duration::from_secs(20));
        assert!(!config.opencode.engine.auto_start);
        assert_eq!(
            config.opencode.engine.model.as_deref(),
            Some("anthropic/claude-sonnet-4")
        );
        assert_eq!(config.safety.extra_rules[0].severity, Severity::High);
    }

    #[test]
    fn backend_tables_layer_over_process() {
        let config = AceConfig::from_toml(FULL).unwrap();

        let claude = config.claude_code_defaults();
        assert_eq!(claude.command.as_deref(), Some("/usr/local/bin/claude"));
        assert_eq!(claude.model.as_deref(), Some("sonnet"));
        assert_eq!(claude.timeout_secs, Some(120));

        let aider = config.aider_defaults();
        assert_eq!(aider.command, None);
        assert_eq!(aider.model.as_deref(), Some("gpt-4o"));
    }

    #[test]
    fn empty_file_is_all_defaults() {
        let config = AceConfig::from_toml("").unwrap();
        assert_eq!(config.engine_key(), DEFAULT_ENGINE);
        assert!(config.opencode.engine.auto_start);
        assert_eq!(config.opencode.server.command, "opencode");
        assert!(config.safety.extra_rules.is_empty());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(matches!(
            AceConfig::from_toml("engnie = \"aider\""),
            Err(EngineError::Config(_))
        ));
        assert!(matches!(
            AceConfig::from_toml("[process]\ntimeout = 3"),
            Err(EngineError::Config(_))
        ));
    }

    #[test]
    fn env_beats_file() {
        let env = EnvLookup::from_pairs([
            (ENGINE_ENV, "aider"),
            (HOST_ENV, "localhost"),
            (PORT_ENV, "9999"),
        ]);
        let config = AceConfig::from_toml(FULL).unwrap().with_env(&env);

        assert_eq!(config.engine_key(), "aider");
        assert_eq!(config.opencode.server.host.as_deref(), Some("localhost"));
        assert_eq!(config.opencode.server.port, Some(9999));
    }

    #[test]
    fn file_used_without_env() {
        let config = AceConfig::from_toml(FULL).unwrap().with_env(&no_env());
        assert_eq!(config.opencode.server.port, Some(4100));
    }

    #[test]
    fn missing_default_file_is_fine() {
        let dir = tempfile::tempdir().unwrap();
        let config = AceConfig::load(None, dir.path()).unwrap();
        assert_eq!(config.engine_key(), DEFAULT_ENGINE);
    }

    #[test]
    fn default_file_is_discovered() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(DEFAULT_CONFIG_FILE), "engine = \"aider\"\n").unwrap();
        let config = AceConfig::load(None, dir.path()).unwrap();
        assert_eq!(config.engine_key(), "aider");
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = AceConfig::load(Some(&dir.path().join("nope.toml")), dir.path()).unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[test]
    fn configured_rule_extends_validator() {
        let validator = AceConfig::from_toml(FULL).unwrap().validator().unwrap();
        let violation = validator.validate("please shutdown the box").unwrap_err();
        assert_eq!(violation.description, "System shutdown");
    }
}
