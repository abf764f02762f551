//! Long-lived server lifecycle
//!
//! [`ServerManager`] owns at most one server process. Transitions run under
//! an async mutex so two `start` calls can never both pass the stopped
//! check; the status snapshot sits behind a separate lock and can be read
//! while a transition is in flight.
//!
//! Readiness is the first of a stdout line containing the ready marker or a
//! successful TCP connect, bounded by the startup timeout. A port that
//! already accepts connections before launch is refused, so another
//! listener is never mistaken for our server. A start abandoned midway
//! (its future dropped) leaves the manager `Failed` and the child killed.

use crate::options::{EnvLookup, ServerOptions};
use crate::state::{validate_transition, ServerHandle, ServerStatus};
use ace_core::{tags, EngineError, EngineResult, MetricsCollector};
use parking_lot::RwLock;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, Mutex};

/// Interval between TCP readiness probes
const PROBE_INTERVAL: Duration = Duration::from_millis(100);

/// Grace period for a stopped server to exit after the kill signal
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Manager for one server process
#[derive(Debug)]
pub struct ServerManager {
    options: ServerOptions,
    env: EnvLookup,
    handle: RwLock<ServerHandle>,
    process: Mutex<Option<Child>>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl ServerManager {
    /// Create manager reading the process environment
    #[must_use]
    pub fn new(options: ServerOptions) -> Self {
        Self::with_env(options, EnvLookup::process())
    }

    /// Create manager with an explicit environment
    #[must_use]
    pub fn with_env(options: ServerOptions, env: EnvLookup) -> Self {
        let handle = ServerHandle::stopped(options.resolve_host(&env), options.resolve_port(&env));
        Self {
            options,
            env,
            handle: RwLock::new(handle),
            process: Mutex::new(None),
            metrics: None,
        }
    }

    /// With a metrics collector
    #[inline]
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Launch options
    #[inline]
    #[must_use]
    pub fn options(&self) -> &ServerOptions {
        &self.options
    }

    /// Current snapshot
    #[must_use]
    pub fn handle(&self) -> ServerHandle {
        self.handle.read().clone()
    }

    /// Current status
    #[must_use]
    pub fn status(&self) -> ServerStatus {
        self.handle.read().status
    }

    /// Status once any in-flight transition has finished
    pub async fn settled(&self) -> ServerStatus {
        let _transition = self.process.lock().await;
        self.status()
    }

    /// Base URL from the resolved host and port
    ///
    /// Performs no I/O and works before the first start.
    #[must_use]
    pub fn url(&self) -> String {
        format!(
            "http://{}:{}",
            self.options.resolve_host(&self.env),
            self.options.resolve_port(&self.env)
        )
    }

    /// Launch the server and wait for readiness
    ///
    /// # Errors
    /// - `EngineError::AlreadyRunning` while starting or running
    /// - `EngineError::Process` when the launch fails or the process exits early
    /// - `EngineError::Timeout` when readiness is not observed in time
    pub async fn start(&self) -> EngineResult<ServerHandle> {
        if self.status().is_active() {
            return Err(EngineError::AlreadyRunning { url: self.url() });
        }

        let mut process = self.process.lock().await;
        if self.status().is_active() {
            return Err(EngineError::AlreadyRunning { url: self.url() });
        }

        let host = self.options.resolve_host(&self.env);
        let port = self.options.resolve_port(&self.env);
        {
            let mut handle = self.handle.write();
            validate_transition(handle.status, ServerStatus::Starting)?;
            *handle = ServerHandle {
                host: host.clone(),
                port,
                status: ServerStatus::Starting,
                pid: None,
            };
        }

        tracing::info!(command = %self.options.command, %host, port, "starting server");
        let started = Instant::now();

        // Dropped before `process`, so the status settles while the lock is held.
        let mut abandoned = StartGuard {
            manager: self,
            armed: true,
        };
        let launched = self.launch(&host, port).await;
        abandoned.armed = false;

        match launched {
            Ok(child) => {
                let pid = child.id();
                *process = Some(child);
                self.transition(ServerStatus::Running, pid)?;
                tracing::info!(
                    %host,
                    port,
                    pid,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "server running"
                );
                self.count("server.start");
                Ok(self.handle())
            }
            Err(e) => {
                tracing::error!(%host, port, "server failed to start: {e}");
                self.transition(ServerStatus::Failed, None)?;
                self.count("server.start_failed");
                Err(e)
            }
        }
    }

    /// Terminate the server
    ///
    /// A no-op when nothing is running; never fails.
    pub async fn stop(&self) {
        let mut process = self.process.lock().await;
        let status = self.status();
        if matches!(status, ServerStatus::Stopped | ServerStatus::Failed) {
            tracing::debug!(%status, "stop requested, nothing running");
            return;
        }

        let pid = self.handle.read().pid;
        if let Err(e) = self.transition(ServerStatus::Stopping, pid) {
            tracing::error!("{e}");
            return;
        }
        tracing::info!("stopping server");

        if let Some(mut child) = process.take() {
            if let Err(e) = child.start_kill() {
                tracing::debug!("kill failed (already exited?): {e}");
            }
            match tokio::time::timeout(STOP_TIMEOUT, child.wait()).await {
                Ok(Ok(status)) => tracing::debug!(?status, "server exited"),
                Ok(Err(e)) => tracing::warn!("failed to reap server: {e}"),
                Err(_) => tracing::warn!("server did not exit within {STOP_TIMEOUT:?}"),
            }
        }

        if let Err(e) = self.transition(ServerStatus::Stopped, None) {
            tracing::error!("{e}");
        }
        self.count("server.stop");
        tracing::info!("server stopped");
    }

    /// Stop then start
    ///
    /// # Errors
    /// Same as [`start`](Self::start)
    pub async fn restart(&self) -> EngineResult<ServerHandle> {
        self.stop().await;
        self.start().await
    }

    fn transition(&self, to: ServerStatus, pid: Option<u32>) -> EngineResult<()> {
        let mut handle = self.handle.write();
        validate_transition(handle.status, to)?;
        tracing::debug!(from = %handle.status, %to, "server transition");
        handle.status = to;
        handle.pid = pid;
        Ok(())
    }

    async fn launch(&self, host: &str, port: u16) -> EngineResult<Child> {
        let mut command = Command::new(&self.options.command);
        command
            .args(self.options.launch_args(host, port))
            .envs(&self.options.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &self.options.cwd {
            command.current_dir(cwd);
        }

        let address = format!("{host}:{port}");
        if let Ok(Ok(_)) = tokio::time::timeout(PROBE_INTERVAL, TcpStream::connect(&address)).await {
            return Err(EngineError::spawn_failed(format!("{address} is already in use")));
        }

        let mut child = command.spawn().map_err(|e| {
            EngineError::spawn_failed(format!("failed to spawn {}: {e}", self.options.command))
        })?;

        match self.wait_ready(&mut child, host, port).await {
            Ok(()) => Ok(child),
            Err(e) => {
                if let Err(kill_err) = child.start_kill() {
                    tracing::debug!("kill failed (already exited?): {kill_err}");
                }
                match child.wait().await {
                    Ok(status) => tracing::debug!(?status, "server exited"),
                    Err(wait_err) => tracing::warn!("failed to reap server: {wait_err}"),
                }
                Err(e)
            }
        }
    }

    async fn wait_ready(&self, child: &mut Child, host: &str, port: u16) -> EngineResult<()> {
        let (ready_tx, mut ready_rx) = oneshot::channel::<()>();
        if let Some(stdout) = child.stdout.take() {
            let marker = self.options.ready_marker.clone();
            tokio::spawn(async move {
                let mut ready_tx = Some(ready_tx);
                let mut reader = BufReader::new(stdout);
                while let Some(line) = next_line(&mut reader).await {
                    tracing::debug!(target: "ace_opencode::server", "{line}");
                    if !marker.is_empty() && line.contains(&marker) {
                        if let Some(tx) = ready_tx.take() {
                            let _ = tx.send(());
                        }
                    }
                }
            });
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut reader = BufReader::new(stderr);
                while let Some(line) = next_line(&mut reader).await {
                    tracing::debug!(target: "ace_opencode::server", stream = "stderr", "{line}");
                }
            });
        }

        let deadline = tokio::time::sleep(self.options.startup_timeout);
        tokio::pin!(deadline);
        let mut probe =
            tokio::time::interval_at(tokio::time::Instant::now() + PROBE_INTERVAL, PROBE_INTERVAL);
        let mut marker_open = true;
        let address = format!("{host}:{port}");

        loop {
            tokio::select! {
                biased;
                () = &mut deadline => {
                    return Err(EngineError::Timeout { after: self.options.startup_timeout });
                }
                status = child.wait() => {
                    let status = status.map_err(|e| {
                        EngineError::spawn_failed(format!("failed to wait for server: {e}"))
                    })?;
                    return Err(exited_early(status.code()));
                }
                marker = &mut ready_rx, if marker_open => match marker {
                    Ok(()) => {
                        tracing::debug!("ready marker seen");
                        return Ok(());
                    }
                    Err(_) => marker_open = false,
                },
                _ = probe.tick() => {
                    if TcpStream::connect(&address).await.is_ok() {
                        // The listener must belong to a process that is still ours.
                        if let Ok(Some(status)) = child.try_wait() {
                            return Err(exited_early(status.code()));
                        }
                        tracing::debug!(%address, "server accepting connections");
                        return Ok(());
                    }
                }
            }
        }
    }

    fn count(&self, name: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.increment(name, Some(tags([("server", self.options.command.as_str())])));
        }
    }
}

/// Next output line, lossily decoded; `None` at EOF or on a read error
async fn next_line<R: AsyncBufRead + Unpin>(reader: &mut R) -> Option<String> {
    let mut buf = Vec::new();
    match reader.read_until(b'\n', &mut buf).await {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(String::from_utf8_lossy(&buf).trim_end_matches(['\r', '\n']).to_string()),
    }
}

fn exited_early(exit_code: Option<i32>) -> EngineError {
    EngineError::Process {
        exit_code,
        message: "server exited before becoming ready".to_string(),
    }
}

/// Marks a start whose future was dropped mid-launch as failed
struct StartGuard<'a> {
    manager: &'a ServerManager,
    armed: bool,
}

impl Drop for StartGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        tracing::warn!("server start abandoned");
        if let Err(e) = self.manager.transition(ServerStatus::Failed, None) {
            tracing::error!("{e}");
        }
        self.manager.count("server.start_failed");
    }
}
