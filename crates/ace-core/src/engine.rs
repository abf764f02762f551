//! Coding engine contract
//!
//! Callers depend on [`CodingEngine`] only; whether a server backend or a
//! per-call CLI process sits behind it is decided by the factory.

use crate::error::EngineResult;
use crate::types::{ChangeRequest, ChangesSummary};
use std::path::{Path, PathBuf};

/// Polymorphic coding engine
#[async_trait::async_trait]
pub trait CodingEngine: Send + Sync {
    /// Engine name
    fn name(&self) -> &str;

    /// Model identifiers the engine accepts
    fn supported_models(&self) -> Vec<String>;

    /// Run one request
    ///
    /// Validates the instruction before anything is dispatched.
    ///
    /// # Errors
    /// - `EngineError::Validation` for an unsafe instruction
    /// - `EngineError::Timeout` / `EngineError::Cancelled` when interrupted
    /// - `EngineError::Process` / `EngineError::Http` for backend failures
    async fn apply(&self, request: ChangeRequest) -> EngineResult<ChangesSummary>;

    /// Run an instruction with default options
    ///
    /// # Errors
    /// Same as [`apply`](Self::apply)
    async fn apply_changes(
        &self,
        instruction: &str,
        repo_path: &Path,
        context_files: &[PathBuf],
    ) -> EngineResult<ChangesSummary> {
        self.apply(
            ChangeRequest::new(instruction, repo_path).with_context_files(context_files.to_vec()),
        )
        .await
    }
}
