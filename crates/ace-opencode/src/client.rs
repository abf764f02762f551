//! OpenCode session API client
//!
//! Covers the calls one change request needs:
//! - `POST /session` creates a session
//! - `POST /session/{id}/message` sends the prompt and returns the reply
//! - `POST /session/{id}/abort` stops an in-flight reply
//!
//! Requests carry the `directory` query parameter when a project directory
//! is set, so one server can serve several checkouts.

use ace_core::{EngineError, EngineResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Session created by the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Session id
    pub id: String,
    /// Session title
    #[serde(default)]
    pub title: Option<String>,
}

/// Body of `POST /session`
#[derive(Debug, Clone, Default, Serialize)]
pub struct CreateSessionRequest {
    /// Session title
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Provider and model pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSpec {
    /// Provider id, e.g. `anthropic`
    #[serde(rename = "providerID")]
    pub provider_id: String,
    /// Model id within the provider
    #[serde(rename = "modelID")]
    pub model_id: String,
}

impl ModelSpec {
    /// Parse `provider/model`
    #[must_use]
    pub fn parse(spec: &str) -> Option<Self> {
        let (provider, model) = spec.split_once('/')?;
        if provider.is_empty() || model.is_empty() {
            return None;
        }
        Some(Self {
            provider_id: provider.to_string(),
            model_id: model.to_string(),
        })
    }
}

/// Outgoing message part
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PartInput {
    /// Plain text
    Text {
        /// Text content
        text: String,
    },
}

/// Body of `POST /session/{id}/message`
#[derive(Debug, Clone, Serialize)]
pub struct SendMessageRequest {
    /// Message parts
    pub parts: Vec<PartInput>,
    /// Model override
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelSpec>,
    /// Agent, `plan` for read-only work
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
}

impl SendMessageRequest {
    /// Single text part
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            parts: vec![PartInput::Text { text: text.into() }],
            model: None,
            agent: None,
        }
    }

    /// With model
    #[must_use]
    pub fn with_model(mut self, model: Option<ModelSpec>) -> Self {
        self.model = model;
        self
    }

    /// With agent
    #[must_use]
    pub fn with_agent(mut self, agent: Option<String>) -> Self {
        self.agent = agent;
        self
    }
}

/// Reply part
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Part {
    /// Assistant text
    Text {
        /// Text content
        text: String,
    },
    /// Tool calls, reasoning, patches and anything newer
    #[serde(other)]
    Other,
}

/// Reply to a message
#[derive(Debug, Clone, Deserialize)]
pub struct MessageResponse {
    /// Message metadata
    #[serde(default)]
    pub info: serde_json::Value,
    /// Reply parts in order
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl MessageResponse {
    /// Text parts in order
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().filter_map(|part| match part {
            Part::Text { text } => Some(text.as_str()),
            Part::Other => None,
        })
    }
}

/// HTTP client bound to one server
#[derive(Debug, Clone)]
pub struct OpenCodeClient {
    http: reqwest::Client,
    base_url: String,
    directory: Option<String>,
}

impl OpenCodeClient {
    /// Client for `base_url`
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    /// Client reusing an existing connection pool
    #[must_use]
    pub fn with_client(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            directory: None,
        }
    }

    /// Scope requests to a project directory
    #[must_use]
    pub fn with_directory(mut self, directory: impl AsRef<std::path::Path>) -> Self {
        self.directory = Some(directory.as_ref().display().to_string());
        self
    }

    /// Server base URL
    #[inline]
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Create a session
    ///
    /// # Errors
    /// `EngineError::Http` on transport failure or non-2xx status
    pub async fn create_session(&self, request: &CreateSessionRequest) -> EngineResult<Session> {
        let url = format!("{}/session", self.base_url);
        tracing::debug!(%url, "creating session");
        let response = self.post(&url).json(request).send().await;
        handle_response(&url, response).await
    }

    /// Send a prompt and wait for the reply
    ///
    /// # Errors
    /// `EngineError::Http` on transport failure or non-2xx status,
    /// `EngineError::Parse` when the reply is not a message
    pub async fn send_message(
        &self,
        session_id: &str,
        request: &SendMessageRequest,
    ) -> EngineResult<MessageResponse> {
        let url = format!("{}/session/{session_id}/message", self.base_url);
        tracing::debug!(%url, model = ?request.model, "sending message");
        let response = self.post(&url).json(request).send().await;
        handle_response(&url, response).await
    }

    /// Abort the in-flight reply of a session
    ///
    /// # Errors
    /// `EngineError::Http` on transport failure or non-2xx status
    pub async fn abort(&self, session_id: &str) -> EngineResult<()> {
        let url = format!("{}/session/{session_id}/abort", self.base_url);
        tracing::debug!(%url, "aborting session");
        let response = self
            .post(&url)
            .send()
            .await
            .map_err(|e| EngineError::Http(format!("{url}: {e}")))?;
        check_status(&url, response).await.map(|_| ())
    }

    fn post(&self, url: &str) -> reqwest::RequestBuilder {
        let builder = self.http.post(url);
        match &self.directory {
            Some(dir) => builder.query(&[("directory", dir)]),
            None => builder,
        }
    }
}

async fn check_status(url: &str, response: reqwest::Response) -> EngineResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    tracing::warn!(%url, %status, "request failed");
    Err(EngineError::Http(format!(
        "{url} returned {status}: {}",
        truncate(&body, 200)
    )))
}

async fn handle_response<T: DeserializeOwned>(
    url: &str,
    response: reqwest::Result<reqwest::Response>,
) -> EngineResult<T> {
    let response = response.map_err(|e| EngineError::Http(format!("{url}: {e}")))?;
    let body = check_status(url, response)
        .await?
        .text()
        .await
        .map_err(|e| EngineError::Http(format!("{url}: {e}")))?;
    tracing::trace!(%url, body = truncate(&body, 500), "response");
    serde_json::from_str(&body).map_err(|e| {
        EngineError::Parse(format!("{url}: {e}; body: {}", truncate(&body, 200)))
    })
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn model_spec_parsing() {
        assert_eq!(
            ModelSpec::parse("anthropic/claude-sonnet-4"),
            Some(ModelSpec {
                provider_id: "anthropic".to_string(),
                model_id: "claude-sonnet-4".to_string(),
            })
        );
        assert_eq!(
            ModelSpec::parse("openrouter/meta/llama").map(|m| m.model_id),
            Some("meta/llama".to_string())
        );
        assert_eq!(ModelSpec::parse("sonnet"), None);
        assert_eq!(ModelSpec::parse("/x"), None);
    }

    #[test]
    fn message_request_wire_format() {
        let request = SendMessageRequest::text("hello")
            .with_model(ModelSpec::parse("openai/gpt-4o"))
            .with_agent(Some("plan".to_string()));
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "parts": [{"type": "text", "text": "hello"}],
                "model": {"providerID": "openai", "modelID": "gpt-4o"},
                "agent": "plan"
            })
        );

        let bare = serde_json::to_value(SendMessageRequest::text("x")).unwrap();
        assert_eq!(bare, serde_json::json!({"parts": [{"type": "text", "text": "x"}]}));
    }

    #[test]
    fn reply_keeps_text_parts_only() {
        let reply: MessageResponse = serde_json::from_str(
            r#"{
                "info": {"id": "msg_1", "role": "assistant"},
                "parts": [
                    {"type": "step-start"},
                    {"type": "text", "text": "first"},
                    {"type": "tool", "tool": "edit", "state": {}},
                    {"type": "text", "text": "second"}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(reply.texts().collect::<Vec<_>>(), vec!["first", "second"]);
    }

    #[test]
    fn base_url_trailing_slash_trimmed() {
        assert_eq!(OpenCodeClient::new("http://h:1/").base_url(), "http://h:1");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("hi", 10), "hi");
    }
}
