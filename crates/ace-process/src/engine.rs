//! Per-call CLI engine
//!
//! [`CliEngine`] pairs a [`CliBackend`] with engine-level defaults and runs
//! one subprocess per request. The instruction is validated before any
//! process is spawned.

use crate::backend::{AiderCli, CliBackend, ClaudeCodeCli};
use crate::config::ProcessConfig;
use crate::executor::ProcessExecutor;
use ace_core::{
    tags, ChangeRequest, ChangesSummary, CodingEngine, EngineError, EngineResult, EventEmitter,
    InstructionValidator, MetricsCollector, ProcessOptions, Termination,
};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::Instrument;
use ulid::Ulid;

/// Claude Code driven through its CLI
pub type ClaudeCodeEngine = CliEngine<ClaudeCodeCli>;

/// Aider driven through its CLI
pub type AiderEngine = CliEngine<AiderCli>;

/// Coding engine backed by a command-line tool
#[derive(Debug)]
pub struct CliEngine<B> {
    backend: B,
    defaults: ProcessOptions,
    validator: Arc<InstructionValidator>,
    executor: ProcessExecutor,
    metrics: Option<Arc<MetricsCollector>>,
}

impl<B: CliBackend + Default> Default for CliEngine<B> {
    fn default() -> Self {
        Self::new(B::default())
    }
}

impl<B: CliBackend> CliEngine<B> {
    /// Create engine with built-in defaults and safety rules
    #[must_use]
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            defaults: ProcessOptions::default(),
            validator: Arc::new(InstructionValidator::default()),
            executor: ProcessExecutor::new(),
            metrics: None,
        }
    }

    /// With engine-level option defaults
    #[inline]
    #[must_use]
    pub fn with_defaults(mut self, defaults: ProcessOptions) -> Self {
        self.defaults = defaults;
        self
    }

    /// With a custom instruction validator
    #[inline]
    #[must_use]
    pub fn with_validator(mut self, validator: Arc<InstructionValidator>) -> Self {
        self.validator = validator;
        self
    }

    /// With a metrics collector
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.executor = ProcessExecutor::with_metrics(Arc::clone(&metrics));
        self.metrics = Some(metrics);
        self
    }

    /// Engine-level defaults
    #[inline]
    #[must_use]
    pub fn defaults(&self) -> &ProcessOptions {
        &self.defaults
    }

    /// Effective configuration a request would run with
    #[must_use]
    pub fn resolve(&self, request: &ChangeRequest) -> ProcessConfig {
        ProcessConfig::resolve(&self.defaults, request, self.backend.default_command())
    }

    async fn run(&self, request: ChangeRequest) -> EngineResult<ChangesSummary> {
        if let Err(violation) = self.validator.validate(&request.instruction) {
            self.count("validation.rejected");
            let mut events = EventEmitter::new(request.events);
            events.finish(Termination::Failed);
            return Err(violation.into());
        }

        let config = self.resolve(&request);
        tracing::debug!(
            command = %config.command,
            model = ?config.model,
            preview = config.preview,
            chat_only = config.chat_only,
            "resolved process config"
        );

        self.count("engine.apply");
        let result = self
            .executor
            .run(&self.backend, &config, request.events, request.cancel.as_ref())
            .await;

        match &result {
            Ok(summary) => {
                tracing::info!(files = summary.files.len(), "changes produced");
                if let Some(metrics) = &self.metrics {
                    #[allow(clippy::cast_precision_loss)]
                    metrics.histogram(
                        "engine.files_changed",
                        summary.files.len() as f64,
                        Some(tags([("engine", self.backend.name())])),
                    );
                }
            }
            Err(e) => {
                tracing::warn!(kind = e.kind().as_str(), "engine call failed: {e}");
                if !matches!(e, EngineError::Cancelled) {
                    self.count("engine.apply_failed");
                }
            }
        }
        result
    }

    fn count(&self, name: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.increment(name, Some(tags([("engine", self.backend.name())])));
        }
    }
}

#[async_trait]
impl<B: CliBackend> CodingEngine for CliEngine<B> {
    fn name(&self) -> &str {
        self.backend.name()
    }

    fn supported_models(&self) -> Vec<String> {
        self.backend.supported_models()
    }

    async fn apply(&self, request: ChangeRequest) -> EngineResult<ChangesSummary> {
        let span = tracing::info_span!(
            "engine.apply",
            engine = self.backend.name(),
            invocation = %Ulid::new(),
            repo = %request.repo_path.display(),
        );
        self.run(request).instrument(span).await
    }
}
