//! ACE Process - coding engines driven through command-line tools
//!
//! Each call resolves a [`ProcessConfig`], spawns the tool in the target
//! repository, streams its output as events and converts what it printed
//! into a unified diff.
//!
//! - [`CliBackend`] implementations describe one tool each
//! - [`ProcessExecutor`] supervises the subprocess under a deadline and a
//!   cancellation token
//! - [`CliEngine`] ties both to the [`ace_core::CodingEngine`] contract

#![warn(unreachable_pub)]

pub mod backend;
pub mod config;
pub mod engine;
pub mod executor;

pub use backend::{AiderCli, CliBackend, ClaudeCodeCli, ParsedLine};
pub use config::ProcessConfig;
pub use engine::{AiderEngine, ClaudeCodeEngine, CliEngine};
pub use executor::ProcessExecutor;
