//! One-shot subprocess supervision
//!
//! The executor spawns a backend's CLI for a single call, streams its
//! output as events, and turns the transcript into a [`ChangesSummary`].
//!
//! # Termination
//!
//! Timeout and cancellation race inside one `select!` loop, so whichever is
//! observed first decides the error (`Timeout` or `Cancelled`) and the other
//! can no longer fire. Either way the child is killed and reaped, output
//! still buffered in the pipes is discarded, and the only event delivered
//! afterwards is the `Finished` marker.

use crate::backend::{CliBackend, ParsedLine};
use crate::config::ProcessConfig;
use ace_core::{
    convert_to_unified_diff, tags, CancellationToken, ChangesSummary, ChatRole, EngineError,
    EngineResult, EventEmitter, EventSender, MetricsCollector, Termination,
};
use std::collections::VecDeque;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;

/// Stderr lines kept for error reports
const STDERR_TAIL_LINES: usize = 20;

/// Spawns and supervises CLI processes
#[derive(Debug, Clone, Default)]
pub struct ProcessExecutor {
    metrics: Option<Arc<MetricsCollector>>,
}

/// What ended the supervision loop
#[derive(Debug)]
enum Interrupt {
    Exited(std::io::Result<ExitStatus>),
    TimedOut,
    Cancelled,
}

/// Accumulated output of one call
#[derive(Debug, Default)]
struct Transcript {
    text: String,
    result: Option<String>,
    last_chat: Option<String>,
}

impl Transcript {
    fn ingest(&mut self, backend: &dyn CliBackend, line: &str, events: &mut EventEmitter) {
        events.log(line);
        match backend.parse_line(line) {
            Some(ParsedLine::Chat(message)) => {
                self.push(&message.content);
                if message.role == ChatRole::Assistant {
                    self.last_chat = Some(message.content.clone());
                }
                events.chat(message);
            }
            Some(ParsedLine::Result(text)) => self.result = Some(text),
            Some(ParsedLine::Skip) => {}
            None => self.push(line),
        }
    }

    fn push(&mut self, text: &str) {
        self.text.push_str(text);
        self.text.push('\n');
    }

    fn into_summary(self) -> ChangesSummary {
        let diff = convert_to_unified_diff(&self.text);
        let mut summary = ChangesSummary::from_unified_diff(&diff, String::new());
        summary.summary = self
            .result
            .or(self.last_chat)
            .unwrap_or_else(|| format!("{} file(s) changed", summary.files.len()));
        summary
    }
}

impl ProcessExecutor {
    /// Executor without metrics
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Executor reporting to a metrics collector
    #[inline]
    #[must_use]
    pub fn with_metrics(metrics: Arc<MetricsCollector>) -> Self {
        Self {
            metrics: Some(metrics),
        }
    }

    /// Run one invocation to completion
    ///
    /// Events go to `events` in output order, followed by `Changes` on
    /// success and always by exactly one `Finished` marker.
    ///
    /// # Errors
    /// - `EngineError::Process` on spawn failure or nonzero exit
    /// - `EngineError::Timeout` when `config.timeout` elapses first
    /// - `EngineError::Cancelled` when `cancel` fires first
    pub async fn run(
        &self,
        backend: &dyn CliBackend,
        config: &ProcessConfig,
        events: Option<EventSender>,
        cancel: Option<&CancellationToken>,
    ) -> EngineResult<ChangesSummary> {
        let mut emitter = EventEmitter::new(events);
        let result = self.supervise(backend, config, &mut emitter, cancel).await;

        let termination = match &result {
            Ok(summary) => {
                emitter.changes(summary.clone());
                Termination::Completed
            }
            Err(EngineError::Timeout { .. }) => Termination::TimedOut,
            Err(EngineError::Cancelled) => Termination::Cancelled,
            Err(_) => Termination::Failed,
        };
        emitter.finish(termination);
        result
    }

    async fn supervise(
        &self,
        backend: &dyn CliBackend,
        config: &ProcessConfig,
        events: &mut EventEmitter,
        cancel: Option<&CancellationToken>,
    ) -> EngineResult<ChangesSummary> {
        if cancel.is_some_and(CancellationToken::is_cancelled) {
            return Err(EngineError::Cancelled);
        }

        let payload = backend.stdin_payload(config);
        let mut command = Command::new(&config.command);
        command
            .args(backend.build_args(config))
            .current_dir(&config.working_dir)
            .stdin(if payload.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let started = Instant::now();
        let mut child = command.spawn().map_err(|e| {
            self.count("process.spawn_failed", backend);
            EngineError::spawn_failed(format!("failed to spawn {}: {e}", config.command))
        })?;
        self.count("process.spawned", backend);
        tracing::debug!(
            command = %config.command,
            pid = child.id(),
            cwd = %config.working_dir.display(),
            "process spawned"
        );

        if let (Some(payload), Some(mut stdin)) = (payload, child.stdin.take()) {
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(payload.as_bytes()).await {
                    tracing::debug!("stdin write failed: {e}");
                }
                // Dropping stdin closes the pipe so the tool sees EOF.
            });
        }

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::spawn_failed("stdout not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| EngineError::spawn_failed("stderr not captured"))?;

        let mut stdout_lines = read_lines(stdout, "stdout");
        let mut stderr_rx = read_lines(stderr, "stderr");
        let mut stdout_open = true;
        let mut stderr_open = true;
        let mut stderr_tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);
        let mut transcript = Transcript::default();

        let deadline = tokio::time::sleep(config.timeout);
        tokio::pin!(deadline);
        let cancelled = async {
            match cancel {
                Some(token) => token.cancelled().await,
                None => std::future::pending().await,
            }
        };
        tokio::pin!(cancelled);

        let interrupt = loop {
            tokio::select! {
                biased;
                () = &mut cancelled => break Interrupt::Cancelled,
                () = &mut deadline => break Interrupt::TimedOut,
                line = stdout_lines.recv(), if stdout_open => match line {
                    Some(line) => transcript.ingest(backend, &line, events),
                    None => stdout_open = false,
                },
                line = stderr_rx.recv(), if stderr_open => match line {
                    Some(line) => {
                        events.log(line.as_str());
                        if stderr_tail.len() == STDERR_TAIL_LINES {
                            stderr_tail.pop_front();
                        }
                        stderr_tail.push_back(line);
                    }
                    None => stderr_open = false,
                },
                status = child.wait(), if !stdout_open && !stderr_open => {
                    break Interrupt::Exited(status);
                }
            }
        };

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        if let Some(metrics) = &self.metrics {
            metrics.histogram(
                "process.duration_ms",
                elapsed_ms,
                Some(tags([("engine", backend.name())])),
            );
        }

        match interrupt {
            Interrupt::Cancelled => {
                tracing::info!(elapsed_ms, "process cancelled");
                terminate(&mut child).await;
                self.count("process.cancelled", backend);
                Err(EngineError::Cancelled)
            }
            Interrupt::TimedOut => {
                tracing::warn!(timeout = ?config.timeout, "process timed out");
                terminate(&mut child).await;
                self.count("process.timeout", backend);
                Err(EngineError::Timeout {
                    after: config.timeout,
                })
            }
            Interrupt::Exited(status) => {
                let status = status.map_err(|e| wait_failed(&config.command, &e))?;
                if let Some(metrics) = &self.metrics {
                    metrics.histogram(
                        "process.exit_code",
                        f64::from(status.code().unwrap_or(-1)),
                        Some(tags([("engine", backend.name())])),
                    );
                }
                if !status.success() {
                    tracing::warn!(?status, "process failed");
                    return Err(EngineError::Process {
                        exit_code: status.code(),
                        message: Vec::from(stderr_tail).join("\n"),
                    });
                }
                tracing::debug!(elapsed_ms, "process exited");
                Ok(transcript.into_summary())
            }
        }
    }

    fn count(&self, name: &str, backend: &dyn CliBackend) {
        if let Some(metrics) = &self.metrics {
            metrics.increment(name, Some(tags([("engine", backend.name())])));
        }
    }
}

/// Kill and reap so no orphan outlives the call
async fn terminate(child: &mut Child) {
    if let Err(e) = child.start_kill() {
        tracing::debug!("kill failed (already exited?): {e}");
    }
    match child.wait().await {
        Ok(status) => tracing::debug!(?status, "process reaped"),
        Err(e) => tracing::warn!("failed to reap process: {e}"),
    }
}

fn wait_failed(command: &str, e: &std::io::Error) -> EngineError {
    EngineError::spawn_failed(format!("failed to wait for {command}: {e}"))
}

/// Forward a pipe line by line until EOF
///
/// Bytes that are not valid UTF-8 are replaced rather than ending the stream.
fn read_lines<R>(pipe: R, stream: &'static str) -> mpsc::UnboundedReceiver<String>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let mut reader = BufReader::new(pipe);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    if tx.send(decode_line(&buf)).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(stream, "read failed: {e}");
                    break;
                }
            }
        }
    });
    rx
}

fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{AiderCli, ClaudeCodeCli};

    #[test]
    fn wait_error_is_a_process_error() {
        let err = wait_failed("aider", &std::io::Error::other("no child"));
        assert_eq!(err.kind(), ace_core::ErrorKind::Process);
        assert!(matches!(
            err,
            EngineError::Process { exit_code: None, ref message } if message == "failed to wait for aider: no child"
        ));
    }

    #[test]
    fn lines_lose_terminators_and_keep_invalid_bytes() {
        assert_eq!(decode_line(b"plain\n"), "plain");
        assert_eq!(decode_line(b"crlf\r\n"), "crlf");
        assert_eq!(decode_line(b"no newline"), "no newline");
        assert_eq!(decode_line(b"caf\xe9 note\n"), "caf\u{FFFD} note");
    }

    #[tokio::test]
    async fn invalid_utf8_does_not_end_the_stream() {
        let input: &[u8] = b"first \xff\nsecond\n";
        let mut lines = read_lines(input, "stdout");
        assert_eq!(lines.recv().await.as_deref(), Some("first \u{FFFD}"));
        assert_eq!(lines.recv().await.as_deref(), Some("second"));
        assert_eq!(lines.recv().await, None);
    }

    #[test]
    fn transcript_keeps_chat_text_and_raw_lines() {
        let mut transcript = Transcript::default();
        let mut events = EventEmitter::new(None);
        let backend = ClaudeCodeCli;

        transcript.ingest(&backend, r#"{"type":"system","subtype":"init"}"#, &mut events);
        transcript.ingest(
            &backend,
            r#"{"type":"assistant","message":{"content":[{"type":"text","text":"a.rs"}]}}"#,
            &mut events,
        );
        transcript.ingest(&backend, "raw line", &mut events);
        transcript.ingest(&backend, r#"{"type":"result","result":"all done"}"#, &mut events);

        assert_eq!(transcript.text, "a.rs\nraw line\n");
        assert_eq!(transcript.last_chat.as_deref(), Some("a.rs"));
        assert_eq!(transcript.result.as_deref(), Some("all done"));
    }

    #[test]
    fn summary_prefers_result_then_chat_then_count() {
        let with_result = Transcript {
            text: String::new(),
            result: Some("r".to_string()),
            last_chat: Some("c".to_string()),
        };
        assert_eq!(with_result.into_summary().summary, "r");

        let with_chat = Transcript {
            text: String::new(),
            result: None,
            last_chat: Some("c".to_string()),
        };
        assert_eq!(with_chat.into_summary().summary, "c");

        let bare = Transcript {
            text: "x.rs\n<<<<<<< SEARCH\na\n=======\nb\n>>>>>>> REPLACE\n".to_string(),
            result: None,
            last_chat: None,
        };
        let summary = bare.into_summary();
        assert_eq!(summary.summary, "1 file(s) changed");
        assert_eq!(summary.files[0].path, "x.rs");
    }

    #[test]
    fn plain_backend_lines_go_to_transcript() {
        let mut transcript = Transcript::default();
        let (tx, mut rx) = ace_core::event_channel();
        let mut events = EventEmitter::new(Some(tx));

        transcript.ingest(&AiderCli, "Applied edit to x.rs", &mut events);

        assert_eq!(transcript.text, "Applied edit to x.rs\n");
        assert!(matches!(
            rx.try_recv(),
            Ok(ace_core::EngineEvent::Log { ref line }) if line == "Applied edit to x.rs"
        ));
        assert!(rx.try_recv().is_err());
    }
}
