//! ACE Core - shared execution primitives for coding engines
//!
//! Building blocks used by every engine backend:
//! - Typed errors and the [`EngineResult`] alias
//! - Cooperative [`CancellationToken`]
//! - Pre-flight [`InstructionValidator`] over a data-driven rule table
//! - SEARCH/REPLACE to unified diff conversion
//! - Bounded [`MetricsCollector`]
//! - The [`CodingEngine`] contract and its request/event types
//!
//! # Example
//!
//! ```rust,ignore
//! use ace_core::prelude::*;
//!
//! validate_instruction("add a --verbose flag")?;
//! let diff = convert_to_unified_diff(&engine_output);
//! let summary = ChangesSummary::from_unified_diff(&diff, "done");
//! ```

#![warn(unreachable_pub)]

pub mod cancel;
pub mod diff;
pub mod engine;
pub mod error;
pub mod events;
pub mod options;
pub mod safety;
pub mod telemetry;
pub mod types;

// Re-exports for convenience
pub use cancel::CancellationToken;
pub use diff::{convert_to_unified_diff, is_unified_diff, split_file_diffs};
pub use engine::CodingEngine;
pub use error::{EngineError, EngineResult, ErrorKind, SafetyViolation};
pub use events::{
    event_channel, EngineEvent, EventEmitter, EventReceiver, EventSender, Termination,
};
pub use options::{ProcessOptions, DEFAULT_TIMEOUT_SECS, READ_ONLY_TOOLS};
pub use safety::{validate_instruction, InstructionValidator, SafetyRule, SafetyRuleSpec, Severity};
pub use telemetry::{tags, MetricsCollector, MetricsEvent, Tags};
pub use types::{ChangeRequest, ChangesSummary, ChatMessage, ChatRole, FileChange};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with ACE Core
    pub use crate::{
        convert_to_unified_diff, validate_instruction, CancellationToken, ChangeRequest,
        ChangesSummary, CodingEngine, EngineError, EngineEvent, EngineResult, MetricsCollector,
        ProcessOptions, Termination,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
