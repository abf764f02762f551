//! Server launch options and address resolution
//!
//! Host and port resolve per field: explicit option, then environment
//! (`OPENCODE_HOST`, `OPENCODE_PORT`), then `127.0.0.1:4096`.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Environment variable overriding the host
pub const HOST_ENV: &str = "OPENCODE_HOST";
/// Environment variable overriding the port
pub const PORT_ENV: &str = "OPENCODE_PORT";
/// Built-in host
pub const DEFAULT_HOST: &str = "127.0.0.1";
/// Built-in port
pub const DEFAULT_PORT: u16 = 4096;
/// Built-in readiness deadline
pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(15);
/// Stdout text signalling readiness
pub const DEFAULT_READY_MARKER: &str = "listening";

/// Environment lookup, injectable for tests
#[derive(Clone)]
pub struct EnvLookup(Arc<dyn Fn(&str) -> Option<String> + Send + Sync>);

impl EnvLookup {
    /// Read the process environment
    #[must_use]
    pub fn process() -> Self {
        Self(Arc::new(|key| std::env::var(key).ok()))
    }

    /// Fixed set of variables
    #[must_use]
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars: BTreeMap<String, String> = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self(Arc::new(move |key| vars.get(key).cloned()))
    }

    /// Value of `key`, if set and non-empty
    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }
}

impl Default for EnvLookup {
    fn default() -> Self {
        Self::process()
    }
}

impl fmt::Debug for EnvLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EnvLookup(..)")
    }
}

/// How to launch and reach the server
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerOptions {
    /// Executable
    pub command: String,
    /// Arguments; empty means `serve --hostname {host} --port {port}`
    pub args: Vec<String>,
    /// Explicit host
    pub host: Option<String>,
    /// Explicit port
    pub port: Option<u16>,
    /// Readiness deadline
    #[serde(rename = "startup_timeout_secs", with = "secs")]
    pub startup_timeout: Duration,
    /// Working directory of the server process
    pub cwd: Option<PathBuf>,
    /// Extra environment for the server process
    pub env: BTreeMap<String, String>,
    /// Stdout text signalling readiness
    pub ready_marker: String,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            command: "opencode".to_string(),
            args: Vec::new(),
            host: None,
            port: None,
            startup_timeout: DEFAULT_STARTUP_TIMEOUT,
            cwd: None,
            env: BTreeMap::new(),
            ready_marker: DEFAULT_READY_MARKER.to_string(),
        }
    }
}

impl ServerOptions {
    /// Create default options
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With executable
    #[must_use]
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = command.into();
        self
    }

    /// With explicit arguments
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// With explicit host
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// With explicit port
    #[inline]
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// With readiness deadline
    #[inline]
    #[must_use]
    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    /// With working directory
    #[must_use]
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// With one extra environment variable
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// With readiness marker
    #[must_use]
    pub fn with_ready_marker(mut self, marker: impl Into<String>) -> Self {
        self.ready_marker = marker.into();
        self
    }

    /// Effective host
    #[must_use]
    pub fn resolve_host(&self, env: &EnvLookup) -> String {
        self.host
            .clone()
            .or_else(|| env.get(HOST_ENV))
            .unwrap_or_else(|| DEFAULT_HOST.to_string())
    }

    /// Effective port; an unparsable environment value is ignored
    #[must_use]
    pub fn resolve_port(&self, env: &EnvLookup) -> u16 {
        self.port
            .or_else(|| {
                let raw = env.get(PORT_ENV)?;
                match raw.trim().parse() {
                    Ok(port) => Some(port),
                    Err(_) => {
                        tracing::warn!(value = %raw, "ignoring invalid {PORT_ENV}");
                        None
                    }
                }
            })
            .unwrap_or(DEFAULT_PORT)
    }

    /// Launch arguments for a resolved address
    #[must_use]
    pub fn launch_args(&self, host: &str, port: u16) -> Vec<String> {
        if self.args.is_empty() {
            vec![
                "serve".to_string(),
                "--hostname".to_string(),
                host.to_string(),
                "--port".to_string(),
                port.to_string(),
            ]
        } else {
            self.args.clone()
        }
    }
}

mod secs {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}
