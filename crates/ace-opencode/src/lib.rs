//! ACE OpenCode - coding engine backed by a long-lived OpenCode server
//!
//! - [`ServerManager`] owns the `opencode serve` process and its lifecycle
//! - [`OpenCodeClient`] speaks the session HTTP API
//! - [`OpenCodeEngine`] implements [`ace_core::CodingEngine`] on top of both
//!
//! # Example
//!
//! ```rust,ignore
//! use ace_opencode::{OpenCodeEngine, ServerManager, ServerOptions};
//! use std::sync::Arc;
//!
//! let manager = Arc::new(ServerManager::new(ServerOptions::new()));
//! let engine = OpenCodeEngine::new(Arc::clone(&manager));
//! let summary = engine.apply_changes("add a changelog", repo, &[]).await?;
//! manager.stop().await;
//! ```

#![warn(unreachable_pub)]

pub mod client;
pub mod engine;
pub mod manager;
pub mod options;
pub mod state;

pub use client::{ModelSpec, OpenCodeClient};
pub use engine::{OpenCodeEngine, OpenCodeOptions};
pub use manager::ServerManager;
pub use options::{EnvLookup, ServerOptions, DEFAULT_HOST, DEFAULT_PORT, HOST_ENV, PORT_ENV};
pub use state::{allowed_transitions, validate_transition, IllegalTransition, ServerHandle, ServerStatus};
