//! Coding engine backed by the OpenCode server
//!
//! Each call makes sure the shared server is up, opens a session, sends the
//! instruction as one message and converts the text parts of the reply.
//! Cancellation and the call deadline race the whole exchange. When either
//! wins, an opened session is aborted on the server.

use crate::client::{
    CreateSessionRequest, MessageResponse, ModelSpec, OpenCodeClient, SendMessageRequest,
};
use crate::manager::ServerManager;
use crate::state::ServerStatus;
use ace_core::{
    convert_to_unified_diff, tags, ChangeRequest, ChangesSummary, ChatMessage, CodingEngine,
    EngineError, EngineResult, EventEmitter, InstructionValidator, MetricsCollector, Termination,
    DEFAULT_TIMEOUT_SECS,
};
use async_trait::async_trait;
use serde::Deserialize;
use std::fmt::Write as _;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::Instrument;
use ulid::Ulid;

/// Deadline for the best-effort abort after a cancel or timeout
const ABORT_TIMEOUT: Duration = Duration::from_secs(2);

const MODELS: &[&str] = &[
    "anthropic/claude-sonnet-4-5",
    "anthropic/claude-opus-4-1",
    "openai/gpt-5",
    "openai/gpt-4o",
    "google/gemini-2.5-pro",
];

/// Engine-level OpenCode settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OpenCodeOptions {
    /// Start the server when it is not running
    pub auto_start: bool,
    /// Default `provider/model`
    pub model: Option<String>,
    /// Per-call deadline in seconds
    pub timeout_secs: u64,
}

impl Default for OpenCodeOptions {
    fn default() -> Self {
        Self {
            auto_start: true,
            model: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// OpenCode engine
#[derive(Debug)]
pub struct OpenCodeEngine {
    manager: Arc<ServerManager>,
    options: OpenCodeOptions,
    http: reqwest::Client,
    validator: Arc<InstructionValidator>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl OpenCodeEngine {
    /// Create engine over a shared server manager
    #[must_use]
    pub fn new(manager: Arc<ServerManager>) -> Self {
        Self {
            manager,
            options: OpenCodeOptions::default(),
            http: reqwest::Client::new(),
            validator: Arc::new(InstructionValidator::default()),
            metrics: None,
        }
    }

    /// With engine-level settings
    #[inline]
    #[must_use]
    pub fn with_options(mut self, options: OpenCodeOptions) -> Self {
        self.options = options;
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
    #[inline]
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Shared server manager
    #[inline]
    #[must_use]
    pub fn manager(&self) -> &Arc<ServerManager> {
        &self.manager
    }

    async fn ensure_running(&self) -> EngineResult<()> {
        if !self.options.auto_start || self.manager.status() == ServerStatus::Running {
            return Ok(());
        }
        match self.manager.start().await {
            Ok(_) => Ok(()),
            // Lost the race to another caller; use whatever its start produced.
            Err(EngineError::AlreadyRunning { .. }) => match self.manager.settled().await {
                ServerStatus::Running => Ok(()),
                status => Err(EngineError::Process {
                    exit_code: None,
                    message: format!("server is {status}"),
                }),
            },
            Err(e) => Err(e),
        }
    }

    async fn run(&self, request: ChangeRequest) -> EngineResult<ChangesSummary> {
        let mut events = EventEmitter::new(request.events.clone());

        if let Err(violation) = self.validator.validate(&request.instruction) {
            self.count("validation.rejected");
            events.finish(Termination::Failed);
            return Err(violation.into());
        }
        if request.cancel.as_ref().is_some_and(|c| c.is_cancelled()) {
            events.finish(Termination::Cancelled);
            return Err(EngineError::Cancelled);
        }

        self.count("engine.apply");
        let result = self.dispatch(&request, &mut events).await;

        let termination = match &result {
            Ok(summary) => {
                tracing::info!(files = summary.files.len(), "changes produced");
                if let Some(metrics) = &self.metrics {
                    #[allow(clippy::cast_precision_loss)]
                    metrics.histogram(
                        "engine.files_changed",
                        summary.files.len() as f64,
                        Some(tags([("engine", "opencode")])),
                    );
                }
                events.changes(summary.clone());
                Termination::Completed
            }
            Err(e) => {
                tracing::warn!(kind = e.kind().as_str(), "engine call failed: {e}");
                if matches!(e, EngineError::Cancelled) {
                    Termination::Cancelled
                } else {
                    self.count("engine.apply_failed");
                    if matches!(e, EngineError::Timeout { .. }) {
                        Termination::TimedOut
                    } else {
                        Termination::Failed
                    }
                }
            }
        };
        events.finish(termination);
        result
    }

    /// Race the exchange against cancellation and the call deadline
    async fn dispatch(
        &self,
        request: &ChangeRequest,
        events: &mut EventEmitter,
    ) -> EngineResult<ChangesSummary> {
        let timeout = Duration::from_secs(
            request
                .overrides
                .timeout_secs
                .unwrap_or(self.options.timeout_secs),
        );
        let client = OpenCodeClient::with_client(self.http.clone(), self.manager.url())
            .with_directory(&request.repo_path);
        let session = OnceLock::new();
        let cancelled = async {
            match &request.cancel {
                Some(token) => token.cancelled().await,
                None => std::future::pending().await,
            }
        };

        let outcome = tokio::select! {
            biased;
            () = cancelled => Err(EngineError::Cancelled),
            () = tokio::time::sleep(timeout) => Err(EngineError::Timeout { after: timeout }),
            reply = self.exchange(request, &client, &session) => reply,
        };

        match outcome {
            Ok(reply) => Ok(summarize(&reply, events)),
            Err(e @ (EngineError::Cancelled | EngineError::Timeout { .. })) => {
                if let Some(id) = session.get() {
                    abort(&client, id).await;
                }
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    async fn exchange(
        &self,
        request: &ChangeRequest,
        client: &OpenCodeClient,
        session_slot: &OnceLock<String>,
    ) -> EngineResult<MessageResponse> {
        self.ensure_running().await?;

        let session = client
            .create_session(&CreateSessionRequest {
                title: Some(title_for(&request.instruction)),
            })
            .await?;
        tracing::debug!(session = %session.id, "session created");
        let session_id = session_slot.get_or_init(|| session.id);

        let model = request
            .overrides
            .model
            .clone()
            .or_else(|| self.options.model.clone());
        let model = model.as_deref().and_then(|m| {
            let spec = ModelSpec::parse(m);
            if spec.is_none() {
                tracing::warn!(model = m, "model is not provider/model, using server default");
            }
            spec
        });
        let read_only = request.overrides.preview.unwrap_or(false)
            || request.overrides.chat_only.unwrap_or(false);
        let message = SendMessageRequest::text(prompt_for(request))
            .with_model(model)
            .with_agent(read_only.then(|| "plan".to_string()));

        client.send_message(session_id, &message).await
    }

    fn count(&self, name: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.increment(name, Some(tags([("engine", "opencode")])));
        }
    }
}

async fn abort(client: &OpenCodeClient, session_id: &str) {
    match tokio::time::timeout(ABORT_TIMEOUT, client.abort(session_id)).await {
        Ok(Ok(())) => tracing::debug!(session = session_id, "session aborted"),
        Ok(Err(e)) => tracing::warn!(session = session_id, "abort failed: {e}"),
        Err(_) => tracing::warn!(session = session_id, "abort timed out"),
    }
}

fn title_for(instruction: &str) -> String {
    let first = instruction.lines().next().unwrap_or_default().trim();
    match first.char_indices().nth(60) {
        Some((idx, _)) => format!("{}...", &first[..idx]),
        None => first.to_string(),
    }
}

fn prompt_for(request: &ChangeRequest) -> String {
    let mut prompt = request.instruction.clone();
    let files = request.resolved_context_files();
    if !files.is_empty() {
        prompt.push_str("\n\nRelevant files:\n");
        for file in &files {
            let _ = writeln!(prompt, "- {}", file.display());
        }
    }
    prompt
}

fn summarize(reply: &MessageResponse, events: &mut EventEmitter) -> ChangesSummary {
    let mut transcript = String::new();
    let mut last = None;
    for text in reply.texts() {
        events.chat(ChatMessage::assistant(text));
        transcript.push_str(text);
        transcript.push('\n');
        last = Some(text);
    }

    let diff = convert_to_unified_diff(&transcript);
    let mut summary = ChangesSummary::from_unified_diff(&diff, String::new());
    summary.summary = last.map_or_else(
        || format!("{} file(s) changed", summary.files.len()),
        ToString::to_string,
    );
    summary
}

#[async_trait]
impl CodingEngine for OpenCodeEngine {
    fn name(&self) -> &str {
        "opencode"
    }

    fn supported_models(&self) -> Vec<String> {
        MODELS.iter().map(ToString::to_string).collect()
    }

    async fn apply(&self, request: ChangeRequest) -> EngineResult<ChangesSummary> {
        let span = tracing::info_span!(
            "engine.apply",
            engine = "opencode",
            invocation = %Ulid::new(),
            repo = %request.repo_path.display(),
        );
        self.run(request).instrument(span).await
    }
}
