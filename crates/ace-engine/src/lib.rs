//! ACE Engine - configuration and engine selection
//!
//! Ties the backends together:
//! - [`AceConfig`] layers `ace.toml`, environment and defaults
//! - [`EngineFactory`] turns an engine key into a [`ace_core::CodingEngine`]
//!
//! The `ace` binary in this crate is a thin command-line front end.
//!
//! # Example
//!
//! ```rust,ignore
//! use ace_engine::{AceConfig, EngineFactory};
//!
//! let config = AceConfig::load(None, &std::env::current_dir()?)?;
//! let factory = EngineFactory::new(config)?;
//! let engine = factory.create_default()?;
//! let summary = engine.apply_changes("add a changelog", repo, &[]).await?;
//! factory.shutdown().await;
//! ```

#![warn(unreachable_pub)]

pub mod config;
pub mod factory;

pub use config::{AceConfig, OpenCodeSection, SafetySection, DEFAULT_ENGINE, ENGINE_ENV};
pub use factory::{EngineFactory, EngineKind};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
