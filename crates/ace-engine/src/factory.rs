//! Engine selection
//!
//! Maps a configuration key to a boxed [`CodingEngine`]. Every engine built
//! by one factory shares the same validator and metrics collector, and all
//! OpenCode engines share one [`ServerManager`].

use crate::config::AceConfig;
use ace_core::{CodingEngine, EngineError, EngineResult, InstructionValidator, MetricsCollector};
use ace_opencode::{EnvLookup, OpenCodeEngine, ServerManager};
use ace_process::{AiderEngine, ClaudeCodeEngine};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Available engines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineKind {
    /// Long-lived OpenCode server
    OpenCode,
    /// Claude Code CLI, one process per call
    ClaudeCode,
    /// Aider CLI, one process per call
    Aider,
}

impl EngineKind {
    /// Every engine, in listing order
    pub const ALL: [EngineKind; 3] = [Self::OpenCode, Self::ClaudeCode, Self::Aider];

    /// Configuration key
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenCode => "opencode",
            Self::ClaudeCode => "claude-code",
            Self::Aider => "aider",
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EngineKind {
    type Err = EngineError;

    fn from_str(key: &str) -> Result<Self, Self::Err> {
        match key.trim().to_ascii_lowercase().as_str() {
            "opencode" => Ok(Self::OpenCode),
            "claude-code" | "claude_code" | "claude" => Ok(Self::ClaudeCode),
            "aider" => Ok(Self::Aider),
            other => Err(EngineError::Config(format!(
                "unknown engine '{other}', expected one of: opencode, claude-code, aider"
            ))),
        }
    }
}

/// Builds engines from one configuration
#[derive(Debug)]
pub struct EngineFactory {
    config: AceConfig,
    server: Arc<ServerManager>,
    /// False once a caller supplied the manager
    owns_server: bool,
    metrics: Arc<MetricsCollector>,
    validator: Arc<InstructionValidator>,
}

impl EngineFactory {
    /// Create factory
    ///
    /// # Errors
    /// `EngineError::Config` when a configured safety rule does not compile
    pub fn new(config: AceConfig) -> EngineResult<Self> {
        let validator = Arc::new(config.validator()?);
        let metrics = Arc::new(MetricsCollector::default());
        let server = owned_server(&config, &metrics);
        Ok(Self {
            config,
            server,
            owns_server: true,
            metrics,
            validator,
        })
    }

    /// Use an existing server manager
    #[inline]
    #[must_use]
    pub fn with_server(mut self, server: Arc<ServerManager>) -> Self {
        self.server = server;
        self.owns_server = false;
        self
    }

    /// Use an existing metrics collector
    ///
    /// Engines and the factory's own server manager record into it. A manager
    /// passed to [`with_server`](Self::with_server) keeps its own collector.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        if self.owns_server {
            self.server = owned_server(&self.config, &metrics);
        }
        self.metrics = metrics;
        self
    }

    /// Configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &AceConfig {
        &self.config
    }

    /// Shared server manager
    #[inline]
    #[must_use]
    pub fn server(&self) -> &Arc<ServerManager> {
        &self.server
    }

    /// Shared metrics collector
    #[inline]
    #[must_use]
    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    /// Build an engine
    #[must_use]
    pub fn create(&self, kind: EngineKind) -> Box<dyn CodingEngine> {
        tracing::debug!(engine = %kind, "creating engine");
        match kind {
            EngineKind::OpenCode => Box::new(
                OpenCodeEngine::new(Arc::clone(&self.server))
                    .with_options(self.config.opencode.engine.clone())
                    .with_validator(Arc::clone(&self.validator))
                    .with_metrics(Arc::clone(&self.metrics)),
            ),
            EngineKind::ClaudeCode => Box::new(
                ClaudeCodeEngine::default()
                    .with_defaults(self.config.claude_code_defaults())
                    .with_validator(Arc::clone(&self.validator))
                    .with_metrics(Arc::clone(&self.metrics)),
            ),
            EngineKind::Aider => Box::new(
                AiderEngine::default()
                    .with_defaults(self.config.aider_defaults())
                    .with_validator(Arc::clone(&self.validator))
                    .with_metrics(Arc::clone(&self.metrics)),
            ),
        }
    }

    /// Build the engine named by `key`
    ///
    /// # Errors
    /// `EngineError::Config` for an unknown key
    pub fn create_from_key(&self, key: &str) -> EngineResult<Box<dyn CodingEngine>> {
        Ok(self.create(key.parse()?))
    }

    /// Build the configured engine
    ///
    /// # Errors
    /// `EngineError::Config` for an unknown key
    pub fn create_default(&self) -> EngineResult<Box<dyn CodingEngine>> {
        self.create_from_key(self.config.engine_key())
    }

    /// Stop the shared server if this process started it
    pub async fn shutdown(&self) {
        self.server.stop().await;
    }
}

fn owned_server(config: &AceConfig, metrics: &Arc<MetricsCollector>) -> Arc<ServerManager> {
    Arc::new(
        ServerManager::with_env(config.opencode.server.clone(), EnvLookup::process())
            .with_metrics(Arc::clone(metrics)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use ace_core::ChangeRequest;
    use pretty_assertions::assert_eq;

    #[test]
    fn keys_parse_case_insensitively() {
        assert_eq!("OpenCode".parse::<EngineKind>().unwrap(), EngineKind::OpenCode);
        assert_eq!("claude".parse::<EngineKind>().unwrap(), EngineKind::ClaudeCode);
        assert_eq!(" AIDER ".parse::<EngineKind>().unwrap(), EngineKind::Aider);
        for kind in EngineKind::ALL {
            assert_eq!(kind.as_str().parse::<EngineKind>().unwrap(), kind);
        }
    }

    #[test]
    fn unknown_key_is_a_config_error() {
        let err = "cursor".parse::<EngineKind>().unwrap_err();
        assert!(matches!(err, EngineError::Config(ref m) if m.contains("cursor")));
    }

    #[test]
    fn engine_names_match_keys() {
        let factory = EngineFactory::new(AceConfig::default()).unwrap();
        for kind in EngineKind::ALL {
            assert_eq!(factory.create(kind).name(), kind.as_str());
        }
    }

    #[test]
    fn default_engine_is_opencode() {
        let factory = EngineFactory::new(AceConfig::default()).unwrap();
        assert_eq!(factory.create_default().unwrap().name(), "opencode");
    }

    #[test]
    fn invalid_safety_rule_fails_construction() {
        let config = AceConfig::from_toml(
            "[[safety.extra_rules]]\npattern = '('\ndescription = \"broken\"\n",
        )
        .unwrap();
        assert!(matches!(EngineFactory::new(config), Err(EngineError::Config(_))));
    }

    #[tokio::test]
    async fn engines_share_validator_and_metrics() {
        let config = AceConfig::from_toml(
            "[[safety.extra_rules]]\npattern = 'deploy'\ndescription = \"Deploy\"\n",
        )
        .unwrap();
        let factory = EngineFactory::new(config).unwrap();

        for kind in EngineKind::ALL {
            let err = factory
                .create(kind)
                .apply(ChangeRequest::new("deploy it", "/tmp"))
                .await
                .unwrap_err();
            assert!(matches!(err, EngineError::Validation(_)), "{kind}: {err}");
        }

        let rejected = factory
            .metrics()
            .get_metrics()
            .into_iter()
            .filter(|e| e.name == "validation.rejected.count")
            .count();
        assert_eq!(rejected, 3);
        assert_eq!(factory.server().status(), ace_opencode::ServerStatus::Stopped);
    }

    #[tokio::test]
    async fn injected_metrics_reach_the_server_manager() {
        let config = AceConfig::from_toml(
            "[opencode]\ncommand = \"/nonexistent/opencode\"\nport = 1\n",
        )
        .unwrap();
        let metrics = Arc::new(MetricsCollector::default());
        let factory = EngineFactory::new(config)
            .unwrap()
            .with_metrics(Arc::clone(&metrics));

        assert!(factory.server().start().await.is_err());
        let names: Vec<String> = metrics.get_metrics().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["server.start_failed.count".to_string()]);
    }

    #[test]
    fn injected_server_keeps_its_own_collector() {
        let server = Arc::new(ServerManager::new(ace_opencode::ServerOptions::new()));
        let factory = EngineFactory::new(AceConfig::default())
            .unwrap()
            .with_server(Arc::clone(&server))
            .with_metrics(Arc::default());
        assert!(Arc::ptr_eq(factory.server(), &server));
    }
}
