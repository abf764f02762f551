//! Testing utilities for ACE workspace
//!
//! Shared fixtures: throwaway repositories, fake CLI tools written as shell
//! scripts, and event stream helpers.

#![allow(missing_docs)]

use ace_core::{EngineEvent, EventReceiver, Termination};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

/// Engine output editing `src/lib.rs` in SEARCH/REPLACE form
pub const SAMPLE_SEARCH_REPLACE: &str = "\
I'll rename the function.

src/lib.rs
<<<<<<< SEARCH
fn old_name() {}
=======
fn new_name() {}
>>>>>>> REPLACE
";

/// Temporary repository with a small Rust source tree
pub fn temp_repo() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("src")).unwrap();
    fs::write(dir.path().join("src/lib.rs"), "fn old_name() {}\n").unwrap();
    fs::write(dir.path().join("README.md"), "# fixture\n").unwrap();
    dir
}

/// Write an executable `sh` script and return its path
#[cfg(unix)]
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    let mut perms = fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).unwrap();
    path
}

/// Script printing `text` verbatim on stdout
#[cfg(unix)]
pub fn echo_script(dir: &Path, name: &str, text: &str) -> PathBuf {
    let body = format!("cat <<'ACE_EOF'\n{}\nACE_EOF", text.trim_end());
    write_script(dir, name, &body)
}

/// Receive until the stream closes or `timeout` passes
pub async fn collect_events(rx: &mut EventReceiver, timeout: Duration) -> Vec<EngineEvent> {
    let mut events = Vec::new();
    let _ = tokio::time::timeout(timeout, async {
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
    })
    .await;
    events
}

/// Raw log lines in order
pub fn log_lines(events: &[EngineEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            EngineEvent::Log { line } => Some(line.clone()),
            _ => None,
        })
        .collect()
}

/// Assert the stream ends with exactly one `Finished` of the given kind
pub fn assert_finished_once(events: &[EngineEvent], expected: Termination) {
    let finished: Vec<usize> = events
        .iter()
        .enumerate()
        .filter(|(_, e)| e.is_terminal())
        .map(|(i, _)| i)
        .collect();
    assert_eq!(finished.len(), 1, "expected one Finished event: {events:?}");
    assert_eq!(finished[0], events.len() - 1, "Finished is not last: {events:?}");
    assert_eq!(
        events[finished[0]],
        EngineEvent::Finished {
            termination: expected
        }
    );
}
